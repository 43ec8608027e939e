// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session hosting over an already-mounted FUSE device.
//!
//! The coordinator performs the kernel mount inside the namespace and hands
//! the device handle over a socket; here it becomes a session loop bound to
//! a [`GrootFs`] instance. SIGHUP/SIGINT/SIGTERM flip an exit flag so a
//! graceful unmount can be observed from outside; SIGPIPE is ignored.

use std::io;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};

use fuser::{Session, SessionACL};
use libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

use crate::adapter::GrootFs;

static SESSION_EXIT: AtomicBool = AtomicBool::new(false);

extern "C" fn flag_exit(sig: c_int) {
    let _ = sig;
    SESSION_EXIT.store(true, Ordering::SeqCst);
}

/// Whether a termination signal has asked the sessions to wind down.
pub fn session_exited() -> bool {
    SESSION_EXIT.load(Ordering::SeqCst)
}

/// Install the exit-flag handlers. Called once per helper process, before
/// the first session starts serving.
pub fn install_exit_handlers() -> io::Result<()> {
    let flag = SigAction::new(
        SigHandler::Handler(flag_exit),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        for sig in [Signal::SIGHUP, Signal::SIGINT, Signal::SIGTERM] {
            sigaction(sig, &flag).map_err(io::Error::from)?;
        }
        sigaction(Signal::SIGPIPE, &ignore).map_err(io::Error::from)?;
    }
    Ok(())
}

/// Run one filesystem session on a FUSE device handle received from the
/// mounting side. Returns when the wrap is unmounted or the kernel closes
/// the channel.
pub fn serve_on_fd(fs: GrootFs, dev_fuse: OwnedFd) -> io::Result<()> {
    let mut session = Session::from_fd(fs, dev_fuse, SessionACL::All);
    let result = session.run();
    debug!(target: "grootfs::fuse", "session loop finished: {:?}", result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_flag_starts_clear_and_latches() {
        assert!(!session_exited());
        flag_exit(libc::SIGTERM);
        assert!(session_exited());
        SESSION_EXIT.store(false, Ordering::SeqCst);
    }
}
