// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The on-disk fake-metadata record and the real-bits policy.
//!
//! The record is a stable cross-tool disk format: exactly 16 bytes, four
//! big-endian u32 fields, stored in the `user.grootfs` attribute of the
//! backing inode (or in a sidecar file for symlinks). This module is the
//! single point of truth for that encoding.

/// Attribute holding the fake record on the backing inode.
pub const FAKE_XATTR: &str = "user.grootfs";

/// Prefix under which user-visible xattrs are stored on the backing inode.
/// The full requested name (e.g. `user.foo`) is appended verbatim.
pub const CUSTOM_XATTR_PREFIX: &str = "user.grootfs.";

/// Permission bits a claim may carry: rwx for all classes plus
/// setuid/setgid/sticky.
pub const MODE_PERM_MASK: u32 = 0o7777;

/// Claimed owner uid, owner gid and permission bits for one inode.
///
/// A missing record is equivalent to `FakeRecord::default()`: no fields
/// claimed, the real (projected) metadata shows through.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FakeRecord {
    pub flags: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl FakeRecord {
    /// Exact on-disk length; any other length is a corruption error.
    pub const LEN: usize = 16;

    pub const UID_SET: u32 = 1 << 0;
    pub const GID_SET: u32 = 1 << 1;
    pub const MODE_SET: u32 = 1 << 2;

    /// A fresh record claiming everything, as written for newly created
    /// files and directories.
    pub fn for_new_node(mode: u32, uid: u32, gid: u32) -> FakeRecord {
        FakeRecord {
            flags: Self::UID_SET | Self::GID_SET | Self::MODE_SET,
            uid,
            gid,
            mode: mode & MODE_PERM_MASK,
        }
    }

    pub fn set_uid(&mut self, uid: u32) {
        self.uid = uid;
        self.flags |= Self::UID_SET;
    }

    pub fn set_gid(&mut self, gid: u32) {
        self.gid = gid;
        self.flags |= Self::GID_SET;
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode & MODE_PERM_MASK;
        self.flags |= Self::MODE_SET;
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&self.flags.to_be_bytes());
        buf[4..8].copy_from_slice(&self.uid.to_be_bytes());
        buf[8..12].copy_from_slice(&self.gid.to_be_bytes());
        buf[12..16].copy_from_slice(&self.mode.to_be_bytes());
        buf
    }

    /// Decode a record read back from disk. Returns `None` when the stored
    /// length is not exactly [`Self::LEN`].
    pub fn decode(buf: &[u8]) -> Option<FakeRecord> {
        if buf.len() != Self::LEN {
            return None;
        }
        let word = |i: usize| u32::from_be_bytes(buf[i..i + 4].try_into().unwrap());
        Some(FakeRecord {
            flags: word(0),
            uid: word(4),
            gid: word(8),
            mode: word(12),
        })
    }

    /// Overlay the claimed fields onto a real stat result and hide
    /// namespace-external identities: any uid/gid above the configured
    /// maxima is rewritten to 0.
    pub fn project(&self, st: &mut libc::stat, max_uid: u32, max_gid: u32) {
        if self.flags & Self::UID_SET != 0 {
            st.st_uid = self.uid;
        }
        if self.flags & Self::GID_SET != 0 {
            st.st_gid = self.gid;
        }
        if self.flags & Self::MODE_SET != 0 {
            st.st_mode = (st.st_mode & !MODE_PERM_MASK) | (self.mode & MODE_PERM_MASK);
        }

        if st.st_uid > max_uid {
            st.st_uid = 0;
        }
        if st.st_gid > max_gid {
            st.st_gid = 0;
        }
    }
}

/// Real on-disk bits for a faked file: user rw, read for the rest, with
/// execute/search for all classes on directories and on files whose claimed
/// mode has the owner-executable bit.
pub fn real_mode(is_dir: bool, executable: bool) -> u32 {
    let mut mode = 0o644;
    if is_dir || executable {
        mode |= 0o111;
    }
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn zeroed_stat() -> libc::stat {
        unsafe { mem::zeroed() }
    }

    #[test]
    fn encode_is_big_endian_and_16_bytes() {
        let rec = FakeRecord {
            flags: FakeRecord::MODE_SET,
            uid: 0x0102_0304,
            gid: 5,
            mode: 0o4755,
        };
        let buf = rec.encode();
        assert_eq!(buf.len(), FakeRecord::LEN);
        assert_eq!(&buf[0..4], &[0, 0, 0, 4]);
        assert_eq!(&buf[4..8], &[1, 2, 3, 4]);
        assert_eq!(FakeRecord::decode(&buf), Some(rec));
    }

    #[test]
    fn decode_rejects_wrong_lengths() {
        assert_eq!(FakeRecord::decode(&[]), None);
        assert_eq!(FakeRecord::decode(&[0u8; 15]), None);
        assert_eq!(FakeRecord::decode(&[0u8; 17]), None);
        assert_eq!(FakeRecord::decode(&[0u8; 16]), Some(FakeRecord::default()));
    }

    #[test]
    fn project_applies_only_claimed_fields() {
        let mut st = zeroed_stat();
        st.st_mode = libc::S_IFREG | 0o600;
        st.st_uid = 42;
        st.st_gid = 42;

        let mut rec = FakeRecord::default();
        rec.set_mode(0o4755);
        rec.project(&mut st, u32::MAX, u32::MAX);

        assert_eq!(st.st_mode, libc::S_IFREG | 0o4755);
        assert_eq!(st.st_uid, 42);
        assert_eq!(st.st_gid, 42);
    }

    #[test]
    fn project_caps_foreign_identities() {
        let mut st = zeroed_stat();
        st.st_uid = 65534;
        st.st_gid = 65534;

        FakeRecord::default().project(&mut st, 999, 999);
        assert_eq!(st.st_uid, 0);
        assert_eq!(st.st_gid, 0);
    }

    #[test]
    fn claims_above_the_cap_are_also_hidden() {
        let mut st = zeroed_stat();
        let mut rec = FakeRecord::default();
        rec.set_uid(100_000);
        rec.project(&mut st, 999, 999);
        assert_eq!(st.st_uid, 0);
    }

    #[test]
    fn real_mode_policy_table() {
        assert_eq!(real_mode(false, false), 0o644);
        assert_eq!(real_mode(false, true), 0o755);
        assert_eq!(real_mode(true, false), 0o755);
        assert_eq!(real_mode(true, true), 0o755);
    }

    #[test]
    fn unrelated_updates_commute() {
        let mut a = FakeRecord::default();
        a.set_uid(7);
        a.set_mode(0o700);

        let mut b = FakeRecord::default();
        b.set_mode(0o700);
        b.set_uid(7);

        assert_eq!(a, b);
    }
}
