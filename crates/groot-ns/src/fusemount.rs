// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The in-namespace FUSE mount.
//!
//! Root inside the new user namespace is root enough to mount a FUSE
//! filesystem directly: open `/dev/fuse`, pin the device handle into the
//! mount options, and hand the handle off to whoever will serve it.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use nix::mount::{mount, MsFlags};
use tracing::debug;

use crate::error::NsError;

/// Mount a grootfs instance over `wrapdir` and return the FUSE device
/// handle whose session will serve it.
pub fn mount_wrap(wrapdir: &Path) -> Result<OwnedFd, NsError> {
    let dev_fuse = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/fuse")
        .map_err(|err| NsError::os("failed to open /dev/fuse", err))?;

    let options = format!(
        "fd={},rootmode=40000,user_id=0,group_id=0,allow_other",
        dev_fuse.as_raw_fd()
    );
    debug!(target: "groot::ns", "mounting grootfs at {} ({})", wrapdir.display(), options);

    mount(
        Some("fuse-grootfs"),
        wrapdir,
        Some("fuse.fuse-grootfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        Some(options.as_str()),
    )
    .map_err(|err| NsError::os("mount fuse", err.into()))?;

    Ok(OwnedFd::from(dev_fuse))
}
