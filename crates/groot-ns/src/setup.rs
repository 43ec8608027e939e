// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The entry coordinator.
//!
//! Sequencing matters here: helpers must exist before the namespace does
//! (the privilege-map helper has to see the caller from the host side),
//! `PR_SET_NO_NEW_PRIVS` must precede the unshare, the id mappings must be
//! in place before anything trusts in-namespace credentials, and the
//! wraps must be mounted and acknowledged before the caller execs.

use std::env;
use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::sched::{unshare, CloneFlags};
use nix::unistd::{getgid, getpid, getuid, User};
use tracing::{debug, warn};

use groot_proto::max_ns_id;

use crate::error::NsError;
use crate::{caps, fusemount, idmap, mounthelper, privmap};

/// Resolve the caller's login name. The environment hint wins so that the
/// preload variant never touches name-service libraries during early init.
fn resolve_username() -> Option<String> {
    if let Some(name) = env::var_os("GROOT_USER") {
        return Some(name.to_string_lossy().into_owned());
    }
    match User::from_uid(getuid()) {
        Ok(Some(user)) => Some(user.name),
        _ => None,
    }
}

/// Enter the namespace: after this returns the process is uid/gid 0 with
/// full ambient capabilities, and every requested wrap directory is served
/// through the permission-faking filesystem. The caller execs the target.
pub fn setup_namespace(wrapdirs: &[PathBuf]) -> Result<(), NsError> {
    let uid = getuid().as_raw();
    let gid = getgid().as_raw();
    let pid = getpid().as_raw() as u32;

    let username = resolve_username();
    if username.is_none() {
        warn!(target: "groot::ns", "cannot resolve login name for uid {}", uid);
    }

    let uid_table = idmap::build_table(username.as_deref(), Path::new("/etc/subuid"), uid);
    let gid_table = idmap::build_table(username.as_deref(), Path::new("/etc/subgid"), gid);

    let mount_helper = if wrapdirs.is_empty() {
        None
    } else {
        Some(mounthelper::spawn(
            wrapdirs,
            max_ns_id(&uid_table),
            max_ns_id(&gid_table),
        )?)
    };

    let mut privmap = privmap::spawn(pid, uid_table, gid_table)?;

    // Never gain any more privs during exec.
    let res = unsafe {
        libc::prctl(
            libc::PR_SET_NO_NEW_PRIVS,
            1 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if res != 0 {
        return Err(NsError::os(
            "prctl(PR_SET_NO_NEW_PRIVS) failed",
            io::Error::last_os_error(),
        ));
    }

    unshare(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUSER)
        .map_err(|err| NsError::os("unshare failed", err.into()))?;

    // Wake the privilege-map helper, then wait for it to run the setuid
    // mapping binaries against us from outside.
    privmap
        .send_token()
        .map_err(|err| NsError::os("write to status socket", err))?;
    match privmap.recv_token() {
        Ok(true) => debug!(target: "groot::ns", "uid/gid mappings in place"),
        _ => return Err(NsError::msg("failed to set up uid/gid mappings")),
    }

    if let Some(mut helper) = mount_helper {
        for wrap in &helper.wraps {
            let Some(dir) = wrap else {
                continue; // the open failed earlier, already reported
            };
            let dev_fuse = fusemount::mount_wrap(dir)?;
            helper
                .channel
                .send_fd(dev_fuse.as_fd())
                .map_err(|err| NsError::os("send fuse device handle", err))?;
            // The helper owns the handle now; this copy closes here.
            drop(dev_fuse);
        }

        match helper.channel.recv_token() {
            Ok(true) => debug!(target: "groot::ns", "all wraps attached"),
            _ => return Err(NsError::msg("fuse setup failed")),
        }
    }

    caps::raise_ambient()?;
    Ok(())
}
