//! High-level operations.
//!
//! This module contains the implementation of cmakeup commands.

pub mod ctest_report;
pub mod errors;
pub mod generate;
pub mod get_binaries;
pub mod install;
pub mod test;
pub mod toolchain;

pub use ctest_report::{write_report, ReportError};
pub use errors::{ConfigError, ReturnCodeError};
pub use generate::{generate, GenerateOptions};
pub use get_binaries::{get_binaries, GetBinariesOptions};
pub use install::{install, InstallOptions};
pub use test::{run_tests, TestOptions, TestOutcome};
pub use toolchain::{Toolchain, ToolchainOptions};
