//! Subprocess execution utilities.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

use crate::core::platform::Environment;

/// Builder for subprocess execution.
///
/// When an [`Environment`] is supplied, the child sees exactly that set of
/// variables and nothing inherited from this process.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: Option<Environment>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: None,
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Add user-supplied options, dropping empty ones.
    pub fn options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kept: Vec<String> = options
            .into_iter()
            .filter(|o| !o.as_ref().is_empty())
            .map(|o| o.as_ref().to_string())
            .collect();
        self.args(kept)
    }

    /// Replace the child's whole environment.
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref env) = self.env {
            cmd.env_clear();
            cmd.envs(env.iter());
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Run with inherited stdio and return the exit code.
    ///
    /// A child killed by a signal has no exit code and is reported as an error.
    pub fn run(&self) -> Result<i32> {
        tracing::info!("Executing {}", self.display_command());
        if let Some(ref cwd) = self.cwd {
            tracing::debug!("Working directory: {}", cwd.display());
        }
        let status = self
            .build_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        match status.code() {
            Some(code) => Ok(code),
            None => bail!("`{}` was terminated by a signal", self.display_command()),
        }
    }

    /// Display the command for log and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{Classifier, Platform};

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("cmake").args(["--install", "target/cmake"]);

        assert_eq!(pb.display_command(), "cmake --install target/cmake");
    }

    #[test]
    fn test_options_drop_empty_strings() {
        let pb = ProcessBuilder::new("ctest").options(["", "-V", "", "-R", "unit"]);

        assert_eq!(pb.get_args(), ["-V", "-R", "unit"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_returns_exit_code() {
        let code = ProcessBuilder::new("sh").args(["-c", "exit 3"]).run().unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_replaces_inherited() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("env.txt");
        let platform = Platform::new(Classifier::LinuxX86_64);
        let mut env = Environment::empty(&platform);
        env.set("CMAKEUP_MARKER", "present");

        let code = ProcessBuilder::new("/bin/sh")
            .arg("-c")
            .arg(format!("/usr/bin/env > '{}'", out.display()))
            .environment(env)
            .run()
            .unwrap();

        assert_eq!(code, 0);
        let vars = std::fs::read_to_string(&out).unwrap();
        assert!(vars.lines().any(|l| l == "CMAKEUP_MARKER=present"));
        assert!(!vars.lines().any(|l| l.starts_with("HOME=")));
    }

    #[cfg(unix)]
    #[test]
    fn test_cwd_is_applied() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("pwd.txt");

        let code = ProcessBuilder::new("sh")
            .arg("-c")
            .arg(format!("pwd > '{}'", out.display()))
            .cwd(tmp.path())
            .run()
            .unwrap();

        assert_eq!(code, 0);
        let reported = std::fs::read_to_string(&out).unwrap();
        let reported = std::fs::canonicalize(reported.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_missing_program_fails() {
        let err = ProcessBuilder::new("/nonexistent/cmake").run().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cmake"));
    }
}
