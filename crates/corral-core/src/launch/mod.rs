//! Pure construction of [`LaunchContext`]s.
mod shell;
pub use shell::{shell_quote, split_words};

use std::collections::BTreeMap;

use corral_model::{
    ArtifactDescriptor, ArtifactManifest, Env, LaunchContext,
    constants::{ENV_ARTIFACTS, LOG_DIR_TOKEN},
};

use crate::error::BuildError;

/// Shape of a command line before quoting.
///
/// `program` and `args` are raw tokens and get shell-quoted on build;
/// `stdout` / `stderr` name files inside the launcher's log directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandTemplate {
    pub program: Vec<String>,
    pub args: Vec<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdout_to(mut self, file: impl Into<String>) -> Self {
        self.stdout = Some(file.into());
        self
    }

    pub fn stderr_to(mut self, file: impl Into<String>) -> Self {
        self.stderr = Some(file.into());
        self
    }

    /// `<interpreter...> <script>` with output captured as `container.stdout` / `container.stderr`.
    ///
    /// `interpreter` is already split into words; each one is quoted on its own.
    pub fn worker<I, S>(interpreter: I, script: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(interpreter)
            .arg(script)
            .stdout_to("container.stdout")
            .stderr_to("container.stderr")
    }

    /// `./<binary>` with output captured as `supervisor.stdout` / `supervisor.stderr`.
    pub fn supervisor(binary: &str) -> Self {
        Self::new([format!("./{binary}")])
            .stdout_to("supervisor.stdout")
            .stderr_to("supervisor.stderr")
    }

    fn render(&self) -> Result<Vec<String>, BuildError> {
        if self.program.is_empty() || self.program.iter().all(|p| p.trim().is_empty()) {
            return Err(BuildError::EmptyCommand);
        }
        let mut tokens: Vec<String> = self
            .program
            .iter()
            .chain(self.args.iter())
            .map(|t| shell_quote(t))
            .collect();
        if let Some(out) = &self.stdout {
            tokens.push(format!("1>{LOG_DIR_TOKEN}/{}", shell_quote(out)));
        }
        if let Some(err) = &self.stderr {
            tokens.push(format!("2>{LOG_DIR_TOKEN}/{}", shell_quote(err)));
        }
        Ok(tokens)
    }
}

/// Assembles artifacts, environment and command into a [`LaunchContext`].
///
/// The result embeds a manifest of every artifact under [`ENV_ARTIFACTS`] so
/// the launched process can rediscover its inputs from its environment alone.
#[derive(Debug, Clone, Default)]
pub struct LaunchContextBuilder {
    artifacts: Vec<ArtifactDescriptor>,
    env: Env,
}

impl LaunchContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact(mut self, artifact: ArtifactDescriptor) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn artifacts<I>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = ArtifactDescriptor>,
    {
        self.artifacts.extend(artifacts);
        self
    }

    pub fn env(mut self, env: &Env) -> Self {
        self.env = self.env.merged(env);
        self
    }

    pub fn build(&self, template: &CommandTemplate) -> Result<LaunchContext, BuildError> {
        if self.env.get(ENV_ARTIFACTS).is_some() {
            return Err(BuildError::ReservedEnv(ENV_ARTIFACTS.to_string()));
        }
        let manifest = ArtifactManifest::new(self.artifacts.clone())?;

        let mut artifacts = BTreeMap::new();
        for a in manifest.iter() {
            artifacts.insert(a.logical_name.clone(), a.clone());
        }

        let mut environment = self.env.to_map();
        environment.insert(ENV_ARTIFACTS.to_string(), manifest.to_env_value());

        Ok(LaunchContext {
            artifacts,
            environment,
            command: template.render()?,
        })
    }
}

/// Functional form of [`LaunchContextBuilder`].
pub fn build_launch_context(
    artifacts: &[ArtifactDescriptor],
    extra_env: &Env,
    template: &CommandTemplate,
) -> Result<LaunchContext, BuildError> {
    LaunchContextBuilder::new()
        .artifacts(artifacts.iter().cloned())
        .env(extra_env)
        .build(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_model::Visibility;

    fn descriptor(name: &str, size: u64) -> ArtifactDescriptor {
        ArtifactDescriptor {
            logical_name: name.to_string(),
            remote_location: format!("file:///store/job_1/{name}"),
            size_bytes: size,
            last_modified: 1_700_000_000_123,
            visibility: Visibility::Public,
        }
    }

    #[test]
    fn worker_command_is_quoted_and_redirected() {
        let ctx = build_launch_context(
            &[descriptor("script.py", 10)],
            &Env::new(),
            &CommandTemplate::worker(["/usr/bin/env", "python"], "script.py"),
        )
        .unwrap();

        assert_eq!(
            ctx.command_line(),
            "/usr/bin/env python script.py 1><LOG_DIR>/container.stdout 2><LOG_DIR>/container.stderr"
        );
    }

    #[test]
    fn paths_with_spaces_are_single_quoted() {
        let template = CommandTemplate::new(["/opt/my tools/run"]).arg("it's here.py");
        let ctx = build_launch_context(&[], &Env::new(), &template).unwrap();

        assert_eq!(
            ctx.command,
            vec!["'/opt/my tools/run'".to_string(), r"'it'\''s here.py'".to_string()]
        );
    }

    #[test]
    fn interpreter_path_with_spaces_stays_one_word() {
        let interpreter = split_words("'/opt/my tools/python' -u").unwrap();
        let ctx = build_launch_context(
            &[descriptor("script.py", 10)],
            &Env::new(),
            &CommandTemplate::worker(interpreter, "script.py"),
        )
        .unwrap();

        assert_eq!(
            ctx.command,
            vec![
                "'/opt/my tools/python'".to_string(),
                "-u".to_string(),
                "script.py".to_string(),
                "1><LOG_DIR>/container.stdout".to_string(),
                "2><LOG_DIR>/container.stderr".to_string(),
            ]
        );
    }

    #[test]
    fn manifest_carries_every_artifact() {
        let artifacts = [descriptor("script.py", 10), descriptor("input.txt", 99)];
        let ctx = build_launch_context(
            &artifacts,
            &Env::single("EXTRA", "1"),
            &CommandTemplate::supervisor("corral-am"),
        )
        .unwrap();

        let manifest = ArtifactManifest::from_env_value(&ctx.environment[ENV_ARTIFACTS]).unwrap();
        assert_eq!(manifest.len(), 2);
        let input = manifest.get("input.txt").unwrap();
        assert_eq!(input.size_bytes, 99);
        assert_eq!(input.last_modified, 1_700_000_000_123);
        assert_eq!(ctx.environment["EXTRA"], "1");
        assert_eq!(ctx.artifacts.len(), 2);
    }

    #[test]
    fn building_twice_is_deterministic() {
        let b = LaunchContextBuilder::new()
            .artifact(descriptor("b", 1))
            .artifact(descriptor("a", 2))
            .env(&Env::new().with("Z", "z").with("A", "a"));
        let t = CommandTemplate::worker(["sh"], "script.py");

        assert_eq!(b.build(&t).unwrap(), b.build(&t).unwrap());
    }

    #[test]
    fn duplicate_artifact_names_are_rejected() {
        let err = build_launch_context(
            &[descriptor("x", 1), descriptor("x", 2)],
            &Env::new(),
            &CommandTemplate::worker(["sh"], "x"),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::DuplicateArtifact("x".into()));
    }

    #[test]
    fn manifest_variable_cannot_be_overridden() {
        let err = build_launch_context(
            &[],
            &Env::single(ENV_ARTIFACTS, "[]"),
            &CommandTemplate::worker(["sh"], "x"),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::ReservedEnv(ENV_ARTIFACTS.into()));
    }

    #[test]
    fn empty_program_is_rejected() {
        let err = build_launch_context(&[], &Env::new(), &CommandTemplate::worker(["  "], "x"))
            .unwrap_err();
        assert_eq!(err, BuildError::EmptyCommand);
    }
}
