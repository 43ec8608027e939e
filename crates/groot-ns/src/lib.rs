// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! groot namespace entry.
//!
//! Places the calling process in a new user namespace in which it appears
//! as root, maps the caller's subordinate id ranges through the setuid
//! `newuidmap`/`newgidmap` helpers, overlays the requested wrap directories
//! with the permission-faking filesystem, and raises the full ambient
//! capability set so it survives `execve` of the target command.
//!
//! The choreography is a multi-process dance: a privilege-map helper runs
//! *outside* the namespace (the id-mapping helpers must see the caller from
//! the host side), a mount helper hosts the filesystem sessions, and the
//! coordinator gates every step over socketpair rendezvous bytes.

pub mod caps;
pub mod error;
pub mod fdpass;
pub mod fusemount;
pub mod helper;
pub mod idmap;
pub mod mounthelper;
pub mod privmap;
pub mod setup;

pub use error::NsError;
pub use setup::setup_namespace;
