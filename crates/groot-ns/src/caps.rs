// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capability preservation across exec.
//!
//! Inside the namespace the coordinator holds a full permitted set. Making
//! it inheritable and then ambient (under `PR_SET_NO_NEW_PRIVS`) is what
//! lets the target command see itself as fully capable root after
//! `execve`. Capability numbers the running kernel does not know are
//! skipped, not fatal.

use std::io;

use libc::c_int;

use crate::error::NsError;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// Raise every currently-permitted capability to inheritable and every
/// effective one to ambient.
pub fn raise_ambient() -> Result<(), NsError> {
    let mut header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    let mut data = [CapUserData::default(); 2];

    unsafe {
        if libc::syscall(libc::SYS_capget, &mut header as *mut CapUserHeader, data.as_mut_ptr())
            != 0
        {
            return Err(NsError::os("capget failed", io::Error::last_os_error()));
        }

        let effective = ((data[1].effective as u64) << 32) | data[0].effective as u64;

        data[0].inheritable = data[0].permitted;
        data[1].inheritable = data[1].permitted;
        if libc::syscall(libc::SYS_capset, &mut header as *mut CapUserHeader, data.as_ptr()) != 0 {
            return Err(NsError::os("capset failed", io::Error::last_os_error()));
        }

        for cap in 0..64u64 {
            if effective & (1u64 << cap) == 0 {
                continue;
            }
            let res = libc::prctl(
                libc::PR_CAP_AMBIENT,
                libc::PR_CAP_AMBIENT_RAISE as libc::c_ulong,
                cap as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            );
            if res != 0 {
                let err = io::Error::last_os_error();
                // EINVAL: the kernel does not know this capability.
                if err.raw_os_error() != Some(libc::EINVAL) {
                    return Err(NsError::os(
                        format!("adding ambient capability {}", cap),
                        err,
                    ));
                }
            }
        }
    }

    Ok(())
}
