// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! grootfs FUSE host — dispatch layer between the kernel and the
//! permission-faking engine in `grootfs-core`.

pub mod adapter;
pub mod session;

pub use adapter::GrootFs;
pub use session::{install_exit_handlers, serve_on_fd, session_exited};
