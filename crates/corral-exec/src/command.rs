use std::path::Path;

use corral_core::shell_quote;
use corral_model::{LaunchContext, constants::LOG_DIR_TOKEN};

/// Shell line for `ctx` with the log-directory token expanded to `log_dir`.
pub fn render_command(ctx: &LaunchContext, log_dir: &Path) -> String {
    let log_dir = shell_quote(&log_dir.display().to_string());
    ctx.command_line().replace(LOG_DIR_TOKEN, &log_dir)
}
