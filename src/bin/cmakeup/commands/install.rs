//! `cmakeup install` command

use anyhow::Result;

use crate::cli::InstallArgs;
use cmakeup::ops::{install, InstallOptions};

pub fn execute(args: InstallArgs) -> Result<()> {
    let ctx = super::context(args.toolchain.build_dir.clone())?;

    let opts = InstallOptions {
        project_dir: args.project_dir,
        config: args.config,
        prefix: args.prefix,
        verbose: args.verbose_install,
        toolchain: super::toolchain_options(&args.toolchain),
    };
    install(&ctx, &opts)
}
