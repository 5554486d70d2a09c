use clap::Args;
use corral_cluster::NodeConfig;
use corral_model::ResourceCapability;
use corral_observe::{LoggerConfig, LoggerFormat, LoggerLevel, logger_init};

/// Logging flags shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// `EnvFilter` directive, e.g. `info` or `corral_core=debug,warn`.
    #[arg(long, env = "CORRAL_LOG", default_value = "info")]
    pub log_level: String,

    /// Output format: text, json or journald.
    #[arg(long, env = "CORRAL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl LogArgs {
    pub fn logger_config(&self) -> anyhow::Result<LoggerConfig> {
        Ok(LoggerConfig {
            format: self.log_format.parse::<LoggerFormat>()?,
            level: self.log_level.parse::<LoggerLevel>()?,
            ..Default::default()
        })
    }

    /// Install the global subscriber.
    pub fn init(&self) -> anyhow::Result<()> {
        logger_init(&self.logger_config()?)?;
        Ok(())
    }
}

/// Parse `MEMORY_MB:VCORES`, e.g. `1024:2`.
pub fn parse_capability(s: &str) -> Result<ResourceCapability, String> {
    let (memory, vcores) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("'{s}': expected MEMORY_MB:VCORES"))?;
    let memory: u32 = memory
        .trim()
        .parse()
        .map_err(|_| format!("'{s}': memory is not a number"))?;
    let vcores: u32 = vcores
        .trim()
        .parse()
        .map_err(|_| format!("'{s}': vcores is not a number"))?;
    ResourceCapability::new(memory, vcores).map_err(|e| format!("'{s}': {e}"))
}

/// Parse `NAME=MEMORY_MB:VCORES`, e.g. `node-a=4096:4`.
pub fn parse_node(s: &str) -> Result<NodeConfig, String> {
    let (name, capability) = s
        .split_once('=')
        .ok_or_else(|| format!("'{s}': expected NAME=MEMORY_MB:VCORES"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("'{s}': node name is empty"));
    }
    Ok(NodeConfig {
        name: name.to_string(),
        capability: parse_capability(capability)?,
    })
}
