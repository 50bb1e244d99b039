//! Command implementations

pub mod generate;
pub mod get_binaries;
pub mod install;
pub mod test;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::ToolchainArgs;
use cmakeup::ops::ToolchainOptions;
use cmakeup::util::GlobalContext;

/// Context for the current directory with the `--build-dir` override applied.
pub fn context(build_dir: Option<PathBuf>) -> Result<GlobalContext> {
    Ok(GlobalContext::new()?.with_build_dir(build_dir))
}

pub fn toolchain_options(args: &ToolchainArgs) -> ToolchainOptions {
    ToolchainOptions {
        download: args.download(),
        cmake_dir: args.cmake_dir.clone(),
        version: args.cmake_version.clone(),
        environment: args.env.iter().cloned().collect(),
        options: args.options.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse_toolchain_args(args: &[&str]) -> ToolchainArgs {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            toolchain: ToolchainArgs,
        }
        TestCli::parse_from(args).toolchain
    }

    #[test]
    fn test_toolchain_defaults() {
        let args = parse_toolchain_args(&["test"]);
        let opts = toolchain_options(&args);

        assert_eq!(opts.download, None);
        assert!(opts.cmake_dir.is_none());
        assert!(opts.environment.is_empty());
        assert!(opts.options.is_empty());
    }

    #[test]
    fn test_download_flags_last_one_wins() {
        let args = parse_toolchain_args(&["test", "--download", "--no-download"]);
        assert_eq!(args.download(), Some(false));

        let args = parse_toolchain_args(&["test", "--no-download", "--download"]);
        assert_eq!(args.download(), Some(true));
    }

    #[test]
    fn test_env_overrides() {
        let args = parse_toolchain_args(&["test", "--env", "PATH=/opt/bin", "--env", "EMPTY="]);
        let opts = toolchain_options(&args);

        assert_eq!(opts.environment["PATH"], "/opt/bin");
        assert_eq!(opts.environment["EMPTY"], "");
    }

    #[test]
    fn test_env_requires_key_value() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            toolchain: ToolchainArgs,
        }
        assert!(TestCli::try_parse_from(["test", "--env", "NOVALUE"]).is_err());
        assert!(TestCli::try_parse_from(["test", "--env", "=value"]).is_err());
    }

    #[test]
    fn test_passthrough_options() {
        let args = parse_toolchain_args(&["test", "--cmake-dir", "/opt", "--", "-DFOO=1", "--trace"]);

        assert_eq!(args.cmake_dir, Some(PathBuf::from("/opt")));
        assert_eq!(args.options, vec!["-DFOO=1", "--trace"]);
    }
}
