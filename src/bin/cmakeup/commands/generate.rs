//! `cmakeup generate` command

use anyhow::Result;

use crate::cli::GenerateArgs;
use cmakeup::ops::{generate, GenerateOptions};

pub fn execute(args: GenerateArgs) -> Result<()> {
    let ctx = super::context(args.toolchain.build_dir.clone())?;

    let opts = GenerateOptions {
        source_path: args.source_path,
        project_dir: args.project_dir,
        generator: args.generator,
        target_path: args.target_path,
        toolchain: super::toolchain_options(&args.toolchain),
    };
    generate(&ctx, &opts)
}
