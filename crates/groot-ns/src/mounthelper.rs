// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The mount helper.
//!
//! Wrap directories are opened *before* forking so the user hears about
//! bad paths synchronously; a wrap that fails to open is nulled out and
//! skipped everywhere after that. The detached worker then receives one
//! FUSE device handle per surviving wrap, in wrap order, and runs a
//! filesystem session for each; it acknowledges only once every session is
//! attached.

use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::thread;

use tracing::{debug, error, warn};

use grootfs_core::Backing;
use grootfs_fuse_host::{install_exit_handlers, serve_on_fd, session_exited, GrootFs};

use crate::error::NsError;
use crate::helper::{self, HelperChannel};

pub struct MountHelper {
    pub channel: HelperChannel,
    /// Wrap paths in request order; `None` marks a wrap whose directory
    /// could not be opened.
    pub wraps: Vec<Option<PathBuf>>,
}

pub fn spawn(wrapdirs: &[PathBuf], max_uid: u32, max_gid: u32) -> Result<MountHelper, NsError> {
    let mut opened: Vec<Option<OwnedFd>> = Vec::with_capacity(wrapdirs.len());
    let mut wraps: Vec<Option<PathBuf>> = Vec::with_capacity(wrapdirs.len());
    for dir in wrapdirs {
        match Backing::open_base_dir(dir) {
            Ok(fd) => {
                opened.push(Some(fd));
                wraps.push(Some(dir.clone()));
            }
            Err(err) => {
                warn!(target: "groot::ns", "cannot wrap {}: {}", dir.display(), err);
                opened.push(None);
                wraps.push(None);
            }
        }
    }

    let channel =
        helper::spawn_detached(move |ch| mount_helper_main(ch, opened, max_uid, max_gid))?;
    Ok(MountHelper { channel, wraps })
}

fn mount_helper_main(
    mut channel: HelperChannel,
    wraps: Vec<Option<OwnedFd>>,
    max_uid: u32,
    max_gid: u32,
) -> i32 {
    if let Err(err) = install_exit_handlers() {
        error!(target: "groot::ns", "installing signal handlers: {}", err);
        return 1;
    }

    let mut sessions = Vec::new();
    for basefd in wraps.into_iter().flatten() {
        let dev_fuse = match channel.recv_fd() {
            Ok(fd) => fd,
            Err(err) => {
                error!(target: "groot::ns", "no fuse device handle received: {}", err);
                return 1;
            }
        };
        let fs = GrootFs::new(Backing::new(basefd, max_uid, max_gid));
        let spawned = thread::Builder::new()
            .name("grootfs-session".into())
            .spawn(move || serve_on_fd(fs, dev_fuse));
        match spawned {
            Ok(handle) => sessions.push(handle),
            Err(err) => {
                error!(target: "groot::ns", "starting session thread: {}", err);
                return 1;
            }
        }
    }

    if channel.send_token().is_err() {
        return 1;
    }

    // Sessions drain when their wrap is unmounted (or the namespace goes
    // away with the target command).
    let mut code = 0;
    for session in sessions {
        match session.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(target: "groot::ns", "fuse session: {}", err);
                code = 1;
            }
            Err(_) => {
                error!(target: "groot::ns", "fuse session panicked");
                code = 1;
            }
        }
    }
    if session_exited() {
        debug!(target: "groot::ns", "sessions stopped by signal");
    }
    code
}
