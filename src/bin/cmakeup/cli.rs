//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use cmakeup::core::Classifier;

/// cmakeup - provisions CMake and drives cmake/ctest for native projects
#[derive(Parser)]
#[command(name = "cmakeup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and unpack the CMake binaries for a platform
    GetBinaries(GetBinariesArgs),

    /// Generate the project files with cmake
    Generate(GenerateArgs),

    /// Install a built project with cmake --install
    Install(InstallArgs),

    /// Run the project's tests with ctest
    Test(TestArgs),
}

/// Options shared by every goal that runs cmake or ctest.
#[derive(Args, Debug, Clone)]
pub struct ToolchainArgs {
    /// Download prebuilt CMake binaries (default when the platform has them)
    #[arg(long, overrides_with = "no_download")]
    pub download: bool,

    /// Use an installed CMake instead of downloading one
    #[arg(long, overrides_with = "download")]
    pub no_download: bool,

    /// Directory containing cmake and ctest (ignored when downloading)
    #[arg(long, value_name = "DIR")]
    pub cmake_dir: Option<PathBuf>,

    /// CMake version to download, e.g. 3.27.4
    #[arg(long, value_name = "VERSION")]
    pub cmake_version: Option<String>,

    /// Override an existing environment variable of the child process
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Build output directory [default: target]
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Extra options passed to cmake/ctest
    #[arg(last = true, value_name = "OPTIONS")]
    pub options: Vec<String>,
}

impl ToolchainArgs {
    /// `Some` only when one of the download flags was given.
    pub fn download(&self) -> Option<bool> {
        if self.download {
            Some(true)
        } else if self.no_download {
            Some(false)
        } else {
            None
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err("environment variable name may not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Args)]
pub struct GetBinariesArgs {
    /// Platform classifier, e.g. linux-x86_64 [default: host platform]
    #[arg(long)]
    pub classifier: Option<Classifier>,

    /// CMake version, e.g. 3.27.4 or 3.27.4-1
    #[arg(long = "version", value_name = "VERSION")]
    pub cmake_version: Option<String>,

    /// Build output directory [default: target]
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Directory containing CMakeLists.txt
    #[arg(long, value_name = "DIR")]
    pub source_path: PathBuf,

    /// Directory to generate the project into [default: <build-dir>/cmake]
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// CMake generator, e.g. Ninja
    #[arg(short = 'G', long, value_name = "GENERATOR")]
    pub generator: Option<String>,

    #[arg(long, hide = true)]
    pub target_path: Option<PathBuf>,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Generated project directory [default: <build-dir>/cmake]
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Build configuration to install, e.g. Release
    #[arg(long)]
    pub config: Option<String>,

    /// Installation prefix
    #[arg(long, value_name = "DIR")]
    pub prefix: Option<PathBuf>,

    /// Pass --verbose to cmake --install
    #[arg(long)]
    pub verbose_install: bool,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}

#[derive(Args)]
pub struct TestArgs {
    /// Generated project directory [default: <build-dir>/cmake]
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Build configuration to test, e.g. Debug
    #[arg(long)]
    pub config: Option<String>,

    /// Number of tests to run in parallel [default: logical CPUs]
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Submit results to a dashboard, e.g. Experimental
    #[arg(long)]
    pub dashboard: Option<String>,

    /// Report test failures as warnings
    #[arg(long)]
    pub ignore_failure: bool,

    /// Skip running the tests
    #[arg(long)]
    pub skip: bool,

    #[arg(long, hide = true)]
    pub build_directory: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub ctest_skip: bool,

    #[arg(long, hide = true)]
    pub ctest_dashboard: Option<String>,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}
