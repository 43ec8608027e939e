// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Detached helpers with a rendezvous socket.
//!
//! Each helper double-forks so the worker reparents to PID 1 (nobody has to
//! reap it) and becomes a session leader; the coordinator keeps one end of
//! a socketpair as a typed channel. A helper dying closes its socket, which
//! the coordinator observes as a short token read.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::process;

use nix::sys::wait::waitpid;
use nix::unistd::{fork, setsid, ForkResult};

use crate::error::NsError;
use crate::fdpass;

/// One end of a helper's rendezvous socket.
pub struct HelperChannel {
    sock: UnixStream,
}

impl HelperChannel {
    fn new(sock: UnixStream) -> HelperChannel {
        HelperChannel { sock }
    }

    /// Send the one-byte rendezvous token.
    pub fn send_token(&mut self) -> io::Result<()> {
        self.sock.write_all(b"x")
    }

    /// Block for the rendezvous token. `Ok(false)` is a short read: the
    /// peer went away without acknowledging.
    pub fn recv_token(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        loop {
            match self.sock.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub fn send_fd(&self, fd: BorrowedFd<'_>) -> io::Result<()> {
        fdpass::send_fd(&self.sock, fd)
    }

    pub fn recv_fd(&self) -> io::Result<OwnedFd> {
        fdpass::recv_fd(&self.sock)
    }

    pub fn send_message<T: ssz::Encode>(&mut self, message: &T) -> io::Result<()> {
        groot_proto::write_message(&mut self.sock, message)
    }

    pub fn recv_message<T: ssz::Decode>(&mut self) -> io::Result<T> {
        groot_proto::read_message(&mut self.sock)
    }
}

impl AsFd for HelperChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

/// Fork off a detached helper running `body` and return the coordinator's
/// channel end. The intermediate child is reaped here; the grandchild
/// belongs to PID 1 and exits with whatever `body` returns.
pub fn spawn_detached<F>(body: F) -> Result<HelperChannel, NsError>
where
    F: FnOnce(HelperChannel) -> i32,
{
    let (parent_sock, child_sock) = UnixStream::pair()
        .map_err(|err| NsError::os("socketpair failed", err))?;

    match unsafe { fork() } {
        Err(err) => Err(NsError::os("fork failed", io::Error::from(err))),
        Ok(ForkResult::Parent { child }) => {
            drop(child_sock);
            // `body` still owns pre-opened resources; this side has no use
            // for them.
            drop(body);
            waitpid(child, None)
                .map_err(|err| NsError::os("waitpid failed", io::Error::from(err)))?;
            Ok(HelperChannel::new(parent_sock))
        }
        Ok(ForkResult::Child) => {
            drop(parent_sock);
            match unsafe { fork() } {
                Ok(ForkResult::Parent { .. }) => unsafe { libc::_exit(0) },
                Ok(ForkResult::Child) => {
                    let _ = setsid();
                    let code = body(HelperChannel::new(child_sock));
                    process::exit(code);
                }
                Err(_) => unsafe { libc::_exit(1) },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groot_proto::{IdRange, MapSetup};

    fn channel_pair() -> (HelperChannel, HelperChannel) {
        let (a, b) = UnixStream::pair().unwrap();
        (HelperChannel::new(a), HelperChannel::new(b))
    }

    #[test]
    fn tokens_round_trip() {
        let (mut a, mut b) = channel_pair();
        a.send_token().unwrap();
        assert!(b.recv_token().unwrap());
    }

    #[test]
    fn a_dead_peer_reads_as_short() {
        let (a, mut b) = channel_pair();
        drop(a);
        assert!(!b.recv_token().unwrap());
    }

    #[test]
    fn messages_round_trip() {
        let (mut a, mut b) = channel_pair();
        let setup = MapSetup {
            pid: 1,
            uid_ranges: vec![IdRange {
                ns_start: 0,
                host_start: 1000,
                count: 1,
            }],
            gid_ranges: vec![],
        };
        a.send_message(&setup).unwrap();
        let got: MapSetup = b.recv_message().unwrap();
        assert_eq!(got, setup);
    }
}
