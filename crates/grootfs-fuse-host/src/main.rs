// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fuse-grootfs — mount the permission-faking filesystem over a directory.
//!
//! Debugging front end for the filesystem driver: it uses the FUSE
//! library's own mounting path instead of the namespace choreography, and
//! disables identity projection (there is no namespace to hide ids from).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fuser::MountOption;
use tracing::info;

use grootfs_core::Backing;
use grootfs_fuse_host::GrootFs;

#[derive(Parser)]
#[command(name = "fuse-grootfs")]
struct Args {
    /// Directory whose contents are served with faked permissions
    basepath: PathBuf,

    /// Where to mount the faked view
    mountpoint: PathBuf,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Log debug info
    #[arg(short = 'd')]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug || std::env::var_os("GROOT_DEBUG").is_some() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let base = Backing::open_base_dir(&args.basepath)
        .with_context(|| format!("opening basepath {}", args.basepath.display()))?;
    let fs = GrootFs::new(Backing::new(base, u32::MAX, u32::MAX));

    let mut options = vec![MountOption::FSName("fuse-grootfs".to_string())];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }

    info!(
        "mounting grootfs over {} at {}",
        args.basepath.display(),
        args.mountpoint.display()
    );
    fuser::mount2(fs, &args.mountpoint, &options)
        .with_context(|| format!("mounting at {}", args.mountpoint.display()))?;
    Ok(())
}
