// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backing-engine behaviour against a real scratch directory.
//!
//! These tests need user xattrs on the filesystem behind the tempdir; when
//! the kernel/filesystem refuses them (ENOTSUP) the tests skip themselves,
//! the same way the tool degrades at runtime.

use std::fs;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use grootfs_core::{Backing, FakeRecord};
use tempfile::TempDir;

fn scratch(max_uid: u32, max_gid: u32) -> (TempDir, Backing) {
    // The on-disk policy bits assertions assume the conventional umask.
    unsafe { libc::umask(0o022) };
    let dir = TempDir::new().expect("tempdir");
    let base = Backing::open_base_dir(dir.path()).expect("open base dir");
    (dir, Backing::new(base, max_uid, max_gid))
}

fn xattrs_supported(dir: &TempDir) -> bool {
    let probe = dir.path().join(".xattr-probe");
    fs::write(&probe, b"").unwrap();
    let path = std::ffi::CString::new(probe.to_str().unwrap()).unwrap();
    let name = std::ffi::CString::new("user.probe").unwrap();
    let res = unsafe { libc::lsetxattr(path.as_ptr(), name.as_ptr(), b"1".as_ptr().cast(), 1, 0) };
    fs::remove_file(&probe).unwrap();
    res == 0
}

macro_rules! require_xattrs {
    ($dir:expr) => {
        if !xattrs_supported(&$dir) {
            eprintln!("skipping: no user xattr support on the test filesystem");
            return;
        }
    };
}

#[test]
fn create_claims_mode_and_owner() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    let fd = backing
        .open(b"f", libc::O_CREAT | libc::O_WRONLY, 0o640, 1000, 1000)
        .expect("create");
    drop(fd);

    let faked = backing.getattr(b"f").expect("getattr");
    assert_eq!(faked.st.st_uid, 1000);
    assert_eq!(faked.st.st_gid, 1000);
    assert_eq!(faked.st.st_mode & 0o7777, 0o640);

    // The real bits follow the policy, not the claim.
    let real = fs::metadata(dir.path().join("f")).unwrap();
    assert_eq!(real.permissions().mode() & 0o7777, 0o644);
}

#[test]
fn chmod_records_claim_and_forces_policy_bits() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("bin"), b"#!/bin/sh\n").unwrap();

    backing.chmod(b"bin", 0o4755).expect("chmod");
    let faked = backing.getattr(b"bin").expect("getattr");
    assert_eq!(faked.st.st_mode & 0o7777, 0o4755);

    let real = fs::metadata(dir.path().join("bin")).unwrap();
    assert_eq!(real.permissions().mode() & 0o7777, 0o755);

    // Without the owner-executable bit the real bits drop back to rw-r--r--.
    backing.chmod(b"bin", 0o600).expect("chmod");
    let real = fs::metadata(dir.path().join("bin")).unwrap();
    assert_eq!(real.permissions().mode() & 0o7777, 0o644);
    let faked = backing.getattr(b"bin").expect("getattr");
    assert_eq!(faked.st.st_mode & 0o7777, 0o600);
}

#[test]
fn chown_updates_only_requested_fields() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("f"), b"x").unwrap();

    backing.chown(b"f", Some(1000), None).expect("chown uid");
    let faked = backing.getattr(b"f").expect("getattr");
    assert_eq!(faked.st.st_uid, 1000);
    let real_gid = fs::metadata(dir.path().join("f")).unwrap().gid();
    assert_eq!(faked.st.st_gid, real_gid);

    backing.chown(b"f", None, Some(7)).expect("chown gid");
    let faked = backing.getattr(b"f").expect("getattr");
    assert_eq!(faked.st.st_uid, 1000);
    assert_eq!(faked.st.st_gid, 7);
}

#[test]
fn claims_survive_reopen_with_o_creat() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    let fd = backing
        .open(b"f", libc::O_CREAT | libc::O_WRONLY, 0o644, 0, 0)
        .expect("create");
    drop(fd);
    backing.chown(b"f", Some(1000), Some(1000)).expect("chown");

    // O_CREAT without O_EXCL on an existing file must not look like a fresh
    // creation, so the claim stays.
    let fd = backing
        .open(b"f", libc::O_CREAT | libc::O_WRONLY, 0o644, 0, 0)
        .expect("reopen");
    drop(fd);

    let faked = backing.getattr(b"f").expect("getattr");
    assert_eq!(faked.st.st_uid, 1000);
}

#[test]
fn mkdir_claims_caller_identity() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    backing.mkdir(b"d", 0o700, 1234, 4321).expect("mkdir");

    let faked = backing.getattr(b"d").expect("getattr");
    assert_eq!(faked.st.st_uid, 1234);
    assert_eq!(faked.st.st_gid, 4321);
    assert_eq!(faked.st.st_mode & 0o7777, 0o700);

    let real = fs::metadata(dir.path().join("d")).unwrap();
    assert_eq!(real.permissions().mode() & 0o7777, 0o755);
}

#[test]
fn fd_backed_getattr_sees_the_same_claims() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    let fd = backing
        .open(b"f", libc::O_CREAT | libc::O_RDWR, 0o600, 77, 88)
        .expect("create");

    let faked = backing.getattr_fd(fd.as_raw_fd()).expect("fgetattr");
    assert_eq!(faked.st.st_uid, 77);
    assert_eq!(faked.st.st_gid, 88);
    assert_eq!(faked.st.st_mode & 0o7777, 0o600);
}

#[test]
fn symlink_claims_live_in_a_sidecar_and_die_with_the_link() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    backing.symlink(b"/target", b"l", 10, 20).expect("symlink");

    let faked = backing.getattr(b"l").expect("getattr");
    assert_eq!(faked.st.st_mode & libc::S_IFMT, libc::S_IFLNK);
    assert_eq!(faked.st.st_uid, 10);
    assert_eq!(faked.st.st_gid, 20);

    backing.chown(b"l", Some(0), Some(0)).expect("chown symlink");
    let faked = backing.getattr(b"l").expect("getattr");
    assert_eq!(faked.st.st_uid, 0);

    let sidecars = || {
        fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".groot.symlink."))
            .count()
    };
    assert_eq!(sidecars(), 1);

    backing.unlink(b"l").expect("unlink");
    assert_eq!(sidecars(), 0);
    assert!(backing.getattr(b"l").is_err());
}

#[test]
fn readlink_round_trip() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    backing.symlink(b"/somewhere/else", b"l", 0, 0).expect("symlink");
    assert_eq!(backing.readlink(b"l").expect("readlink"), b"/somewhere/else");
}

#[test]
fn readdir_hides_the_reserved_namespace() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("visible"), b"").unwrap();
    backing.symlink(b"/t", b"l", 0, 0).expect("symlink");

    let names: Vec<String> = backing
        .readdir(b"")
        .expect("readdir")
        .into_iter()
        .map(|e| e.name.to_string_lossy().into_owned())
        .collect();

    assert!(names.contains(&"visible".to_string()));
    assert!(names.contains(&"l".to_string()));
    assert!(!names.iter().any(|n| n.starts_with(".groot.")));
}

#[test]
fn user_xattrs_are_remapped_under_the_prefix() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("f"), b"x").unwrap();
    // Give the file a fake record too, to prove it never leaks into listings.
    backing.chmod(b"f", 0o600).expect("chmod");

    backing.setxattr(b"f", b"user.foo", b"bar", 0).expect("setxattr");
    assert_eq!(backing.getxattr(b"f", b"user.foo").expect("getxattr"), b"bar");

    let names = backing.listxattr(b"f").expect("listxattr");
    assert_eq!(names, vec![b"user.foo".to_vec()]);

    backing.removexattr(b"f", b"user.foo").expect("removexattr");
    assert!(backing.getxattr(b"f", b"user.foo").is_err());
    assert!(backing.listxattr(b"f").expect("listxattr").is_empty());

    // The raw record attribute is still on disk, under its own name.
    let path = std::ffi::CString::new(dir.path().join("f").to_str().unwrap().to_owned()).unwrap();
    let name = std::ffi::CString::new("user.grootfs").unwrap();
    let mut buf = [0u8; FakeRecord::LEN];
    let res = unsafe {
        libc::lgetxattr(path.as_ptr(), name.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
    };
    assert_eq!(res as usize, FakeRecord::LEN);
}

#[test]
fn corrupt_records_surface_as_errors() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("f"), b"x").unwrap();
    let path = std::ffi::CString::new(dir.path().join("f").to_str().unwrap().to_owned()).unwrap();
    let name = std::ffi::CString::new("user.grootfs").unwrap();
    let res = unsafe { libc::lsetxattr(path.as_ptr(), name.as_ptr(), b"short".as_ptr().cast(), 5, 0) };
    assert_eq!(res, 0);

    let err = backing.getattr(b"f").unwrap_err();
    assert_eq!(grootfs_core::errno_from_fs_error(&err), libc::EIO);
}

#[test]
fn claims_above_the_identity_cap_read_as_root() {
    let (dir, backing) = scratch(999, 999);
    require_xattrs!(dir);

    fs::write(dir.path().join("f"), b"x").unwrap();

    backing.chown(b"f", Some(5000), Some(500)).expect("chown");
    let faked = backing.getattr(b"f").expect("getattr");
    assert_eq!(faked.st.st_uid, 0);
    assert_eq!(faked.st.st_gid, 500);
}

#[test]
fn rename_and_link_are_forwarded() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("a"), b"data").unwrap();
    backing.chown(b"a", Some(42), None).expect("chown");

    backing.rename(b"a", b"b").expect("rename");
    assert!(!dir.path().join("a").exists());
    // The claim rides on the inode's xattr, so it follows the rename.
    assert_eq!(backing.getattr(b"b").expect("getattr").st.st_uid, 42);

    backing.link(b"b", b"c").expect("link");
    // Hardlinks share the backing inode and therefore the claim.
    assert_eq!(backing.getattr(b"c").expect("getattr").st.st_uid, 42);

    backing.chown(b"c", Some(43), None).expect("chown");
    assert_eq!(backing.getattr(b"b").expect("getattr").st.st_uid, 43);
}

#[test]
fn truncate_refuses_symlinks() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    fs::write(dir.path().join("f"), b"0123456789").unwrap();
    backing.truncate(b"f", 4).expect("truncate");
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"0123");

    backing.symlink(b"f", b"l", 0, 0).expect("symlink");
    assert!(backing.truncate(b"l", 0).is_err());
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"0123");
}

#[test]
fn mkdir_then_rmdir() {
    let (dir, backing) = scratch(u32::MAX, u32::MAX);
    require_xattrs!(dir);

    backing.mkdir(b"d", 0o755, 0, 0).expect("mkdir");
    assert!(dir.path().join("d").is_dir());
    backing.rmdir(b"d").expect("rmdir");
    assert!(!dir.path().join("d").exists());
}
