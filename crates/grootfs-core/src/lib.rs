// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! grootfs core — a permission-faking view over a real directory.
//!
//! Every file served out of a wrapped directory carries its *claimed* owner
//! uid, owner gid and permission bits in the `user.grootfs` extended
//! attribute, while the real on-disk bits are forced to a shape that keeps
//! the (unprivileged) serving user able to read, write and traverse the
//! tree. This crate implements the record codec, the real-bits policy and
//! the backing-directory engine; the FUSE dispatch layer lives in
//! `grootfs-fuse-host`.

pub mod backing;
pub mod error;
pub mod record;

pub use backing::{Backing, DirEntryInfo, Faked};
pub use error::{errno_from_fs_error, FsError, FsResult};
pub use record::{real_mode, FakeRecord, CUSTOM_XATTR_PREFIX, FAKE_XATTR, MODE_PERM_MASK};
