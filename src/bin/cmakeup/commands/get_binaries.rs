//! `cmakeup get-binaries` command

use anyhow::Result;

use crate::cli::GetBinariesArgs;
use cmakeup::ops::{get_binaries, GetBinariesOptions};

pub fn execute(args: GetBinariesArgs) -> Result<()> {
    let ctx = super::context(args.build_dir)?;

    let opts = GetBinariesOptions {
        version: args.cmake_version,
        classifier: args.classifier,
    };
    let dir = get_binaries(&ctx, &opts)?;
    eprintln!("    Unpacked CMake into {}", dir.display());

    Ok(())
}
