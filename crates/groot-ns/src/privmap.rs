// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The privilege-map helper.
//!
//! Launched before the namespace is created, it waits outside for the
//! coordinator to unshare, then invokes the host's setuid `newuidmap` and
//! `newgidmap` binaries on the coordinator's PID to write the sub-id
//! tables into the namespace. Any mapping failure is fatal for the helper;
//! the coordinator notices through the short rendezvous read.

use std::process::Command;

use groot_proto::{IdRange, MapSetup};
use tracing::{debug, error};

use crate::error::NsError;
use crate::helper::{self, HelperChannel};

/// Spawn the helper and hand it the tables over its socket.
pub fn spawn(
    pid: u32,
    uid_ranges: Vec<IdRange>,
    gid_ranges: Vec<IdRange>,
) -> Result<HelperChannel, NsError> {
    let mut channel = helper::spawn_detached(privmap_main)?;
    let setup = MapSetup {
        pid,
        uid_ranges,
        gid_ranges,
    };
    channel
        .send_message(&setup)
        .map_err(|err| NsError::os("sending id tables to helper", err))?;
    Ok(channel)
}

fn privmap_main(mut channel: HelperChannel) -> i32 {
    let setup: MapSetup = match channel.recv_message() {
        Ok(setup) => setup,
        Err(err) => {
            error!(target: "groot::ns", "reading id tables: {}", err);
            return 1;
        }
    };

    // Block until the coordinator has entered the new namespace. A short
    // read means it died first; there is nothing left to map.
    match channel.recv_token() {
        Ok(true) => {}
        _ => return 0,
    }

    if let Err(err) = run_newidmap("newuidmap", setup.pid, &setup.uid_ranges) {
        error!(target: "groot::ns", "{}", err);
        return 1;
    }
    if let Err(err) = run_newidmap("newgidmap", setup.pid, &setup.gid_ranges) {
        error!(target: "groot::ns", "{}", err);
        return 1;
    }

    debug!(target: "groot::ns", "id mappings written for pid {}", setup.pid);
    if channel.send_token().is_err() {
        return 1;
    }
    0
}

fn idmap_args(pid: u32, ranges: &[IdRange]) -> Vec<String> {
    let mut args = vec![pid.to_string()];
    for range in ranges {
        args.push(range.ns_start.to_string());
        args.push(range.host_start.to_string());
        args.push(range.count.to_string());
    }
    args
}

fn run_newidmap(bin: &str, pid: u32, ranges: &[IdRange]) -> Result<(), NsError> {
    let status = Command::new(bin)
        .args(idmap_args(pid, ranges))
        .status()
        .map_err(|err| NsError::os(format!("exec {} failed", bin), err))?;
    if !status.success() {
        return Err(NsError::msg(format!("{} exited with {}", bin, status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_expand_to_pid_plus_triples() {
        let ranges = [
            IdRange {
                ns_start: 0,
                host_start: 1000,
                count: 1,
            },
            IdRange {
                ns_start: 1,
                host_start: 100000,
                count: 65536,
            },
        ];
        assert_eq!(
            idmap_args(4242, &ranges),
            vec!["4242", "0", "1000", "1", "1", "100000", "65536"]
        );
    }
}
