// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The backing-directory engine.
//!
//! All operations are interpreted relative to one open directory handle and
//! performed through `…at` syscalls so that path components cannot change
//! meaning underneath us. Paths naming a parent plus a base component are
//! handled by walking to the parent first, which keeps the distinction
//! between a symlink and its target explicit and enables
//! `AT_SYMLINK_NOFOLLOW` semantics.
//!
//! Fake records live in the `user.grootfs` xattr of the backing inode.
//! Symlink inodes cannot carry user xattrs on common filesystems, so their
//! records live in a sidecar file at the wrap root named
//! `.groot.symlink.<devhex>_<inohex>`; symlinks cannot be hardlinked, so the
//! sidecar is unlinked together with its symlink.

use std::ffi::{CStr, CString, OsString};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::record::{real_mode, FakeRecord, CUSTOM_XATTR_PREFIX, FAKE_XATTR, MODE_PERM_MASK};

/// Names with this prefix are reserved for grootfs bookkeeping and are
/// hidden from directory listings.
pub const RESERVED_NAME_PREFIX: &[u8] = b".groot.";

/// One entry yielded by [`Backing::readdir`].
pub struct DirEntryInfo {
    pub ino: u64,
    pub kind: u8,
    pub name: OsString,
}

/// Stat result with the fake record already applied.
#[derive(Debug)]
pub struct Faked {
    pub st: libc::stat,
}

/// The engine: one open handle to the backing directory plus the identity
/// caps used when projecting real uids/gids.
pub struct Backing {
    base: OwnedFd,
    max_uid: u32,
    max_gid: u32,
}

fn cstr(bytes: &[u8]) -> FsResult<CString> {
    CString::new(bytes).map_err(|_| FsError::from_errno(libc::EINVAL))
}

/// Strip leading slashes; an empty path denotes the root itself.
fn norm(rel: &[u8]) -> &[u8] {
    let mut rel = rel;
    while rel.first() == Some(&b'/') {
        rel = &rel[1..];
    }
    rel
}

fn rel_cstr(rel: &[u8]) -> FsResult<CString> {
    let rel = norm(rel);
    if rel.is_empty() {
        cstr(b".")
    } else {
        cstr(rel)
    }
}

/// Split a relative path into its parent directory and base component,
/// ignoring trailing slashes.
fn split_parent(rel: &[u8]) -> (&[u8], &[u8]) {
    let mut rel = norm(rel);
    while rel.last() == Some(&b'/') {
        rel = &rel[..rel.len() - 1];
    }
    match rel.iter().rposition(|&b| b == b'/') {
        Some(i) => (&rel[..i], &rel[i + 1..]),
        None if rel.is_empty() => (b".", b"."),
        None => (b".", rel),
    }
}

fn sidecar_name(st: &libc::stat) -> Vec<u8> {
    format!(".groot.symlink.{:x}_{:x}", st.st_dev, st.st_ino).into_bytes()
}

/// `/proc/self/fd/<dirfd>[/<name>]`, used to address an entry for the
/// l*xattr family without following symlinks in the directory part.
fn proc_fd_path(dirfd: RawFd, name: Option<&CStr>) -> FsResult<CString> {
    let mut path = format!("/proc/self/fd/{}", dirfd).into_bytes();
    if let Some(name) = name {
        path.push(b'/');
        path.extend_from_slice(name.to_bytes());
    }
    cstr(&path)
}

/// Everything needed to operate on one directory entry: where it lives, its
/// (unprojected) stat and its current fake record.
struct EntryInfo {
    dirfd: OwnedFd,
    name: CString,
    st: libc::stat,
    record: FakeRecord,
    sidecar: Option<CString>,
}

impl Backing {
    pub fn new(base: OwnedFd, max_uid: u32, max_gid: u32) -> Backing {
        Backing {
            base,
            max_uid,
            max_gid,
        }
    }

    /// Open a directory the way every backing handle is opened: never a
    /// controlling terminal, never following into anything but a directory.
    pub fn open_base_dir(path: &Path) -> io::Result<OwnedFd> {
        use std::os::unix::ffi::OsStrExt;
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let fd = unsafe {
            libc::openat(
                libc::AT_FDCWD,
                cpath.as_ptr(),
                libc::O_RDONLY | libc::O_NONBLOCK | libc::O_DIRECTORY | libc::O_CLOEXEC | libc::O_NOCTTY,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    pub fn max_uid(&self) -> u32 {
        self.max_uid
    }

    pub fn max_gid(&self) -> u32 {
        self.max_gid
    }

    fn open_dir_at(&self, rel: &[u8]) -> FsResult<OwnedFd> {
        let path = rel_cstr(rel)?;
        let fd = unsafe {
            libc::openat(
                self.base.as_raw_fd(),
                path.as_ptr(),
                libc::O_RDONLY | libc::O_NONBLOCK | libc::O_DIRECTORY | libc::O_CLOEXEC | libc::O_NOCTTY,
            )
        };
        if fd < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Open the parent directory of `rel`, returning the handle and the base
    /// component to operate on from there.
    fn open_parent(&self, rel: &[u8]) -> FsResult<(OwnedFd, CString)> {
        let (dir, base) = split_parent(rel);
        let dirfd = self.open_dir_at(dir)?;
        Ok((dirfd, cstr(base)?))
    }

    // Record store ---------------------------------------------------------

    fn read_record(path_or_fd: &str, res: isize, buf: &[u8]) -> FsResult<FakeRecord> {
        if res as usize != FakeRecord::LEN {
            warn!(target: "grootfs::fuse", "wrong xattr size for {}", path_or_fd);
            return Err(FsError::Record(format!("wrong xattr size for {}", path_or_fd)));
        }
        // Length was checked above, decode cannot fail.
        Ok(FakeRecord::decode(&buf[..FakeRecord::LEN]).unwrap_or_default())
    }

    /// Read the fake record of `name` under `dirfd`. An absent attribute
    /// (or a filesystem without user xattrs) reads as the all-zero record.
    fn get_record(&self, dirfd: RawFd, name: &CStr, allow_noent: bool) -> FsResult<FakeRecord> {
        let proc_path = proc_fd_path(dirfd, Some(name))?;
        let fake_xattr = cstr(FAKE_XATTR.as_bytes())?;
        let mut buf = [0u8; FakeRecord::LEN];
        let res = unsafe {
            libc::lgetxattr(
                proc_path.as_ptr(),
                fake_xattr.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if res < 0 {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            if (allow_noent && errno == libc::ENOENT)
                || errno == libc::ENODATA
                || errno == libc::ENOTSUP
            {
                return Ok(FakeRecord::default());
            }
            let what = name.to_string_lossy();
            if errno == libc::ERANGE {
                warn!(target: "grootfs::fuse", "wrong xattr size for {}", what);
            } else {
                warn!(target: "grootfs::fuse", "lgetxattr {} failed with errno {}", what, errno);
            }
            return Err(FsError::Record(format!("lgetxattr {} errno {}", what, errno)));
        }
        Self::read_record(&name.to_string_lossy(), res, &buf)
    }

    fn get_record_fd(&self, fd: RawFd) -> FsResult<FakeRecord> {
        let fake_xattr = cstr(FAKE_XATTR.as_bytes())?;
        let mut buf = [0u8; FakeRecord::LEN];
        let res =
            unsafe { libc::fgetxattr(fd, fake_xattr.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        if res < 0 {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            if errno == libc::ENODATA || errno == libc::ENOTSUP {
                return Ok(FakeRecord::default());
            }
            warn!(target: "grootfs::fuse", "fgetxattr fd {} failed with errno {}", fd, errno);
            return Err(FsError::Record(format!("fgetxattr fd {} errno {}", fd, errno)));
        }
        Self::read_record(&format!("fd {}", fd), res, &buf)
    }

    /// Write a fake record for `name` under `dirfd`. With `ensure_exists`
    /// the target is created first (sidecars have no other creation path).
    fn set_record(
        &self,
        dirfd: RawFd,
        name: &CStr,
        ensure_exists: bool,
        record: &FakeRecord,
    ) -> FsResult<()> {
        if ensure_exists {
            let fd = unsafe {
                libc::openat(
                    dirfd,
                    name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY,
                    0o666 as libc::c_uint,
                )
            };
            if fd < 0 {
                let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
                if errno != libc::EEXIST {
                    return Err(FsError::from_errno(errno));
                }
            } else {
                unsafe { libc::close(fd) };
            }
        }

        let proc_path = proc_fd_path(dirfd, Some(name))?;
        let fake_xattr = cstr(FAKE_XATTR.as_bytes())?;
        let buf = record.encode();
        let res = unsafe {
            libc::lsetxattr(
                proc_path.as_ptr(),
                fake_xattr.as_ptr(),
                buf.as_ptr().cast(),
                buf.len(),
                0,
            )
        };
        if res < 0 {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            warn!(
                target: "grootfs::fuse",
                "lsetxattr {} failed with errno {}",
                name.to_string_lossy(),
                errno
            );
            return Err(FsError::Record(format!(
                "lsetxattr {} errno {}",
                name.to_string_lossy(),
                errno
            )));
        }
        Ok(())
    }

    fn set_record_fd(&self, fd: RawFd, record: &FakeRecord) -> FsResult<()> {
        let fake_xattr = cstr(FAKE_XATTR.as_bytes())?;
        let buf = record.encode();
        let res = unsafe {
            libc::fsetxattr(fd, fake_xattr.as_ptr(), buf.as_ptr().cast(), buf.len(), 0)
        };
        if res < 0 {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            warn!(target: "grootfs::fuse", "fsetxattr fd {} failed with errno {}", fd, errno);
            return Err(FsError::Record(format!("fsetxattr fd {} errno {}", fd, errno)));
        }
        Ok(())
    }

    // Entry resolution -----------------------------------------------------

    fn entry(&self, rel: &[u8]) -> FsResult<EntryInfo> {
        let (dirfd, name) = self.open_parent(rel)?;

        let mut st: libc::stat = unsafe { mem::zeroed() };
        let res = unsafe {
            libc::fstatat(
                dirfd.as_raw_fd(),
                name.as_ptr(),
                &mut st,
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }

        let (record, sidecar) = if st.st_mode & libc::S_IFMT == libc::S_IFLNK {
            let sidecar = cstr(&sidecar_name(&st))?;
            let record = self.get_record(self.base.as_raw_fd(), &sidecar, true)?;
            (record, Some(sidecar))
        } else {
            (self.get_record(dirfd.as_raw_fd(), &name, false)?, None)
        };

        Ok(EntryInfo {
            dirfd,
            name,
            st,
            record,
            sidecar,
        })
    }

    fn save_record(&self, info: &EntryInfo) -> FsResult<()> {
        match &info.sidecar {
            Some(sidecar) => self.set_record(self.base.as_raw_fd(), sidecar, true, &info.record),
            None => self.set_record(info.dirfd.as_raw_fd(), &info.name, false, &info.record),
        }
    }

    fn project(&self, mut st: libc::stat, record: &FakeRecord) -> Faked {
        record.project(&mut st, self.max_uid, self.max_gid);
        Faked { st }
    }

    // Operations -----------------------------------------------------------

    pub fn getattr(&self, rel: &[u8]) -> FsResult<Faked> {
        let info = self.entry(rel)?;
        Ok(self.project(info.st, &info.record))
    }

    pub fn getattr_fd(&self, fd: RawFd) -> FsResult<Faked> {
        let mut st: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } < 0 {
            return Err(FsError::last_os_error());
        }
        let record = self.get_record_fd(fd)?;
        Ok(self.project(st, &record))
    }

    /// Record the claimed mode and force the real bits to the policy shape.
    /// The kernel resolves symlinks before this is called, so no NOFOLLOW.
    pub fn chmod(&self, rel: &[u8], mode: u32) -> FsResult<()> {
        let mut info = self.entry(rel)?;

        let is_dir = info.st.st_mode & libc::S_IFMT == libc::S_IFDIR;
        let real = real_mode(is_dir, mode & libc::S_IXUSR != 0);
        let res = unsafe {
            libc::fchmodat(info.dirfd.as_raw_fd(), info.name.as_ptr(), real as libc::mode_t, 0)
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }

        info.record.set_mode(mode & MODE_PERM_MASK);
        self.save_record(&info)
    }

    /// Update only the claimed owner fields; the backing ownership never
    /// changes.
    pub fn chown(&self, rel: &[u8], uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let mut info = self.entry(rel)?;
        if let Some(uid) = uid {
            info.record.set_uid(uid);
        }
        if let Some(gid) = gid {
            info.record.set_gid(gid);
        }
        self.save_record(&info)
    }

    pub fn mkdir(&self, rel: &[u8], mode: u32, uid: u32, gid: u32) -> FsResult<()> {
        let (dirfd, name) = self.open_parent(rel)?;

        let real = real_mode(true, false);
        if unsafe { libc::mkdirat(dirfd.as_raw_fd(), name.as_ptr(), real as libc::mode_t) } < 0 {
            return Err(FsError::last_os_error());
        }

        // mkdirat succeeding guarantees a fresh directory: no prior record.
        let record = FakeRecord::for_new_node(mode, uid, gid);
        self.set_record(dirfd.as_raw_fd(), &name, false, &record)
    }

    /// Open (and possibly create) a file. When `O_CREAT` is requested
    /// without `O_EXCL` the open is retried with `O_EXCL` first so that
    /// creation is detected deterministically; `EEXIST` falls back to the
    /// caller's flags. A newly created file gets a fresh record with the
    /// request mode and the caller's identity.
    pub fn open(&self, rel: &[u8], flags: i32, mode: u32, uid: u32, gid: u32) -> FsResult<OwnedFd> {
        let path = rel_cstr(rel)?;

        let o_creat = flags & libc::O_CREAT != 0;
        let o_excl = flags & libc::O_EXCL != 0;
        let mut created = o_creat;
        let real = real_mode(false, mode & libc::S_IXUSR != 0);

        let probe_flags = if o_creat && !o_excl {
            flags | libc::O_EXCL
        } else {
            flags
        };
        let mut fd = unsafe {
            libc::openat(self.base.as_raw_fd(), path.as_ptr(), probe_flags, real as libc::c_uint)
        };
        if fd < 0 && o_creat && !o_excl {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == libc::EEXIST {
                created = false;
                fd = unsafe {
                    libc::openat(self.base.as_raw_fd(), path.as_ptr(), flags, real as libc::c_uint)
                };
            }
        }
        if fd < 0 {
            return Err(FsError::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        if created {
            let record = FakeRecord::for_new_node(mode, uid, gid);
            self.set_record_fd(fd.as_raw_fd(), &record)?;
        }

        Ok(fd)
    }

    pub fn truncate(&self, rel: &[u8], size: i64) -> FsResult<()> {
        let path = rel_cstr(rel)?;
        let fd = unsafe {
            libc::openat(
                self.base.as_raw_fd(),
                path.as_ptr(),
                libc::O_NOFOLLOW | libc::O_WRONLY,
            )
        };
        if fd < 0 {
            return Err(FsError::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        if unsafe { libc::ftruncate(fd.as_raw_fd(), size) } < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    pub fn utimens(&self, rel: &[u8], times: &[libc::timespec; 2]) -> FsResult<()> {
        let path = rel_cstr(rel)?;
        let res = unsafe {
            libc::utimensat(
                self.base.as_raw_fd(),
                path.as_ptr(),
                times.as_ptr(),
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    /// List a directory, hiding the reserved `.groot.` namespace.
    pub fn readdir(&self, rel: &[u8]) -> FsResult<Vec<DirEntryInfo>> {
        let fd = self.open_dir_at(rel)?;
        let dirp = unsafe { libc::fdopendir(fd.into_raw_fd()) };
        if dirp.is_null() {
            return Err(FsError::last_os_error());
        }

        let mut entries = Vec::new();
        loop {
            let de = unsafe { libc::readdir(dirp) };
            if de.is_null() {
                break;
            }
            let name = unsafe { CStr::from_ptr((*de).d_name.as_ptr()) }.to_bytes();
            if name.starts_with(RESERVED_NAME_PREFIX) {
                continue;
            }
            entries.push(DirEntryInfo {
                ino: unsafe { (*de).d_ino },
                kind: unsafe { (*de).d_type },
                name: OsString::from_vec(name.to_vec()),
            });
        }
        unsafe { libc::closedir(dirp) };
        Ok(entries)
    }

    pub fn readlink(&self, rel: &[u8]) -> FsResult<Vec<u8>> {
        let path = rel_cstr(rel)?;
        let mut buf = vec![0u8; 4096];
        loop {
            let res = unsafe {
                libc::readlinkat(
                    self.base.as_raw_fd(),
                    path.as_ptr(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            if res < 0 {
                return Err(FsError::last_os_error());
            }
            let len = res as usize;
            if len < buf.len() {
                buf.truncate(len);
                return Ok(buf);
            }
            buf.resize(buf.len() * 2, 0);
        }
    }

    /// Create a symlink and give it a sidecar record owned by the caller.
    pub fn symlink(&self, target: &[u8], rel: &[u8], uid: u32, gid: u32) -> FsResult<()> {
        let target = cstr(target)?;
        let path = rel_cstr(rel)?;
        let res =
            unsafe { libc::symlinkat(target.as_ptr(), self.base.as_raw_fd(), path.as_ptr()) };
        if res < 0 {
            return Err(FsError::last_os_error());
        }

        // Default ownership for the fresh link; failure to record it leaves
        // the link usable with projected metadata.
        match self.entry(rel) {
            Ok(mut info) => {
                info.record.set_uid(uid);
                info.record.set_gid(gid);
                if let Err(err) = self.save_record(&info) {
                    debug!(target: "grootfs::fuse", "symlink record not saved: {}", err);
                }
            }
            Err(err) => {
                debug!(target: "grootfs::fuse", "symlink record not initialised: {}", err);
            }
        }
        Ok(())
    }

    /// Unlink an entry; a symlink's sidecar goes with it (symlinks cannot be
    /// hardlinked, so this was the last reference).
    pub fn unlink(&self, rel: &[u8]) -> FsResult<()> {
        let info = self.entry(rel)?;
        if unsafe { libc::unlinkat(info.dirfd.as_raw_fd(), info.name.as_ptr(), 0) } < 0 {
            return Err(FsError::last_os_error());
        }
        if let Some(sidecar) = &info.sidecar {
            unsafe { libc::unlinkat(self.base.as_raw_fd(), sidecar.as_ptr(), 0) };
        }
        Ok(())
    }

    pub fn rmdir(&self, rel: &[u8]) -> FsResult<()> {
        let path = rel_cstr(rel)?;
        let res = unsafe {
            libc::unlinkat(self.base.as_raw_fd(), path.as_ptr(), libc::AT_REMOVEDIR)
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    pub fn rename(&self, from: &[u8], to: &[u8]) -> FsResult<()> {
        let from = rel_cstr(from)?;
        let to = rel_cstr(to)?;
        let res = unsafe {
            libc::renameat(
                self.base.as_raw_fd(),
                from.as_ptr(),
                self.base.as_raw_fd(),
                to.as_ptr(),
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    pub fn link(&self, from: &[u8], to: &[u8]) -> FsResult<()> {
        let from = rel_cstr(from)?;
        let to = rel_cstr(to)?;
        let res = unsafe {
            libc::linkat(
                self.base.as_raw_fd(),
                from.as_ptr(),
                self.base.as_raw_fd(),
                to.as_ptr(),
                0,
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    pub fn statfs(&self) -> FsResult<libc::statvfs> {
        let mut st: libc::statvfs = unsafe { mem::zeroed() };
        if unsafe { libc::fstatvfs(self.base.as_raw_fd(), &mut st) } < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(st)
    }

    pub fn access(&self, rel: &[u8], mode: i32) -> FsResult<()> {
        let path = rel_cstr(rel)?;
        let res = unsafe {
            libc::faccessat(
                self.base.as_raw_fd(),
                path.as_ptr(),
                mode,
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    // User xattrs ----------------------------------------------------------

    fn prefixed_name(name: &[u8]) -> FsResult<CString> {
        let mut full = CUSTOM_XATTR_PREFIX.as_bytes().to_vec();
        full.extend_from_slice(name);
        cstr(&full)
    }

    fn entry_proc_path(&self, rel: &[u8]) -> FsResult<(OwnedFd, CString)> {
        let (dirfd, name) = self.open_parent(rel)?;
        let proc_path = proc_fd_path(dirfd.as_raw_fd(), Some(&name))?;
        Ok((dirfd, proc_path))
    }

    pub fn setxattr(&self, rel: &[u8], name: &[u8], value: &[u8], flags: i32) -> FsResult<()> {
        let (_dirfd, proc_path) = self.entry_proc_path(rel)?;
        let full_name = Self::prefixed_name(name)?;
        let res = unsafe {
            libc::lsetxattr(
                proc_path.as_ptr(),
                full_name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                flags,
            )
        };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }

    pub fn getxattr(&self, rel: &[u8], name: &[u8]) -> FsResult<Vec<u8>> {
        let (_dirfd, proc_path) = self.entry_proc_path(rel)?;
        let full_name = Self::prefixed_name(name)?;
        loop {
            let size = unsafe {
                libc::lgetxattr(proc_path.as_ptr(), full_name.as_ptr(), std::ptr::null_mut(), 0)
            };
            if size < 0 {
                return Err(FsError::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            let res = unsafe {
                libc::lgetxattr(
                    proc_path.as_ptr(),
                    full_name.as_ptr(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            if res < 0 {
                let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
                if errno == libc::ERANGE {
                    // Value grew between the probe and the read.
                    continue;
                }
                return Err(FsError::from_errno(errno));
            }
            buf.truncate(res as usize);
            return Ok(buf);
        }
    }

    /// The user sees only the prefix-stripped names below
    /// `user.grootfs.`; the bare fake-record attribute never shows up.
    pub fn listxattr(&self, rel: &[u8]) -> FsResult<Vec<Vec<u8>>> {
        let (_dirfd, proc_path) = self.entry_proc_path(rel)?;
        let raw = loop {
            // Size-0 probe first, then an exactly-sized buffer.
            let size = unsafe { libc::llistxattr(proc_path.as_ptr(), std::ptr::null_mut(), 0) };
            if size < 0 {
                return Err(FsError::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            let res = unsafe {
                libc::llistxattr(proc_path.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
            };
            if res < 0 {
                let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
                if errno == libc::ERANGE {
                    continue;
                }
                return Err(FsError::from_errno(errno));
            }
            buf.truncate(res as usize);
            break buf;
        };

        let prefix = CUSTOM_XATTR_PREFIX.as_bytes();
        let names = raw
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .filter(|name| name.starts_with(prefix))
            .map(|name| name[prefix.len()..].to_vec())
            .collect();
        Ok(names)
    }

    pub fn removexattr(&self, rel: &[u8], name: &[u8]) -> FsResult<()> {
        let (_dirfd, proc_path) = self.entry_proc_path(rel)?;
        let full_name = Self::prefixed_name(name)?;
        let res = unsafe { libc::lremovexattr(proc_path.as_ptr(), full_name.as_ptr()) };
        if res < 0 {
            return Err(FsError::last_os_error());
        }
        Ok(())
    }
}
