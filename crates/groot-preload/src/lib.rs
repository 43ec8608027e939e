// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! LD_PRELOAD delivery of the namespace entry.
//!
//! An `.init_array` constructor runs the same choreography as the CLI
//! before the host program's `main`. Two things differ in this context:
//! the login name comes from `GROOT_USER` when set (name-service libraries
//! are not safe to call during early init — the coordinator already
//! prefers the hint), and both the injection variable and a re-entry guard
//! are scrubbed from the environment so the target's children do not
//! re-enter the namespace.

use std::ffi::c_char;
use std::path::PathBuf;
use std::process::exit;

use once_cell::sync::OnceCell;

static INITIALISED: OnceCell<()> = OnceCell::new();

/// Remove `name` from the process environment by rewriting `environ` in
/// place. libc's unsetenv is not reliable inside an init constructor.
unsafe fn scrub_env(name: &str) {
    extern "C" {
        static mut environ: *mut *mut c_char;
    }

    let name = name.as_bytes();
    let mut entry = environ;
    while !entry.is_null() && !(*entry).is_null() {
        let var = std::ffi::CStr::from_ptr(*entry).to_bytes();
        let matches = var.len() > name.len() && var.starts_with(name) && var[name.len()] == b'=';
        if matches {
            // Shift the rest of the vector down, including the NULL.
            let mut dst = entry;
            loop {
                *dst = *dst.add(1);
                if (*dst).is_null() {
                    break;
                }
                dst = dst.add(1);
            }
        } else {
            entry = entry.add(1);
        }
    }
}

fn env_wrapdirs() -> Vec<PathBuf> {
    match std::env::var_os("GROOT_WRAPFS") {
        Some(value) => std::env::split_paths(&value).collect(),
        None => Vec::new(),
    }
}

#[cfg_attr(test, allow(dead_code))]
unsafe extern "C" fn groot_preload_init() {
    if INITIALISED.set(()).is_err() {
        return;
    }

    let disabled = std::env::var_os("GROOT_DISABLED").is_some();
    let debug = std::env::var_os("GROOT_DEBUG").is_some();
    let wrapdirs = env_wrapdirs();

    // Children of the target must not re-enter the namespace, whether
    // through the injection variable or a re-enabled copy of it.
    scrub_env("LD_PRELOAD");
    if disabled {
        return;
    }
    std::env::set_var("GROOT_DISABLED", "1");

    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!(target: "groot::ns", "preload entry, {} wraps", wrapdirs.len());

    if let Err(err) = groot_ns::setup_namespace(&wrapdirs) {
        eprintln!("groot: {}", err);
        exit(1);
    }
}

// The registration is kept out of test binaries: the constructor would
// otherwise run before the test harness's main.
#[cfg(not(test))]
#[used]
#[link_section = ".init_array"]
static GROOT_INIT: unsafe extern "C" fn() = groot_preload_init;
