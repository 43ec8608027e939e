// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! groot — run a command tree as apparent root.
//!
//! `groot [options] command [args…]`: everything from the first non-option
//! argument on is the target command; options appearing after it are not
//! consumed.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::unistd::execvp;

#[derive(Parser)]
#[command(name = "groot", disable_version_flag = true)]
struct Args {
    /// Wrap directory (repeatable)
    #[arg(short = 'w', value_name = "DIR")]
    wrap: Vec<PathBuf>,

    /// Log debug info
    #[arg(short = 'd')]
    debug: bool,

    /// Command to run inside the namespace
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true,
        num_args = 1..
    )]
    command: Vec<OsString>,
}

fn init_tracing(debug: bool) {
    let level = if debug || std::env::var_os("GROOT_DEBUG").is_some() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Wraps from the environment are appended to those given with `-w`.
fn env_wrapdirs() -> Vec<PathBuf> {
    match std::env::var_os("GROOT_WRAPFS") {
        Some(value) => std::env::split_paths(&value).collect(),
        None => Vec::new(),
    }
}

fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            exit(code);
        }
    }
}

fn run() -> Result<()> {
    let args = parse_args();
    init_tracing(args.debug);

    let mut wrapdirs = args.wrap.clone();
    wrapdirs.extend(env_wrapdirs());

    groot_ns::setup_namespace(&wrapdirs)?;

    let argv: Vec<CString> = args
        .command
        .iter()
        .map(|arg| CString::new(arg.as_bytes()).context("argument contains NUL"))
        .collect::<Result<_>>()?;

    // Only returns on failure.
    match execvp(&argv[0], &argv) {
        Ok(void) => match void {},
        Err(err) => bail!("exec failed: {}", err),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("groot: {:#}", err);
        exit(1);
    }
}
