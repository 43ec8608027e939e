// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! grootfs FUSE adapter.
//!
//! Maps the kernel's inode-based FUSE operations onto the path-based
//! backing engine. The adapter keeps an inode↔path table (the kernel only
//! ever learns inode numbers we handed out through `lookup`) and a table of
//! open file handles; everything else is resolved per operation against the
//! backing directory, so there is no state to fall out of sync with the
//! real filesystem.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr,
    Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::{c_int, EBADF, EINVAL, ENAMETOOLONG, ENOENT, EROFS};
use tracing::debug;

use grootfs_core::{errno_from_fs_error, Backing, FsError, FsResult};

/// Attribute and entry validity handed to the kernel. Claims only change
/// through this mount, so a short positive cache is safe.
const TTL: Duration = Duration::from_secs(1);

/// Maximum single path component length to guard against overly long names.
const NAME_MAX: usize = 255;

struct InodeEntry {
    path: Vec<u8>,
    lookups: u64,
}

/// The permission-faking filesystem served to the kernel.
pub struct GrootFs {
    backing: Backing,
    inodes: HashMap<u64, InodeEntry>,
    by_path: HashMap<Vec<u8>, u64>,
    next_ino: u64,
    handles: HashMap<u64, File>,
}

fn child_path(parent: &[u8], name: &OsStr) -> Vec<u8> {
    let mut path = parent.to_vec();
    if !path.is_empty() {
        path.push(b'/');
    }
    path.extend_from_slice(name.as_bytes());
    path
}

fn to_system_time(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn kind_of_mode(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        m if m == libc::S_IFDIR => FileType::Directory,
        m if m == libc::S_IFLNK => FileType::Symlink,
        m if m == libc::S_IFCHR => FileType::CharDevice,
        m if m == libc::S_IFBLK => FileType::BlockDevice,
        m if m == libc::S_IFIFO => FileType::NamedPipe,
        m if m == libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

fn kind_of_dirent(d_type: u8) -> FileType {
    match d_type {
        t if t == libc::DT_DIR => FileType::Directory,
        t if t == libc::DT_LNK => FileType::Symlink,
        t if t == libc::DT_CHR => FileType::CharDevice,
        t if t == libc::DT_BLK => FileType::BlockDevice,
        t if t == libc::DT_FIFO => FileType::NamedPipe,
        t if t == libc::DT_SOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

fn stat_to_attr(st: &libc::stat, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        atime: to_system_time(st.st_atime, st.st_atime_nsec),
        mtime: to_system_time(st.st_mtime, st.st_mtime_nsec),
        ctime: to_system_time(st.st_ctime, st.st_ctime_nsec),
        crtime: to_system_time(st.st_ctime, st.st_ctime_nsec),
        kind: kind_of_mode(st.st_mode),
        perm: (st.st_mode & 0o7777) as u16,
        nlink: st.st_nlink as u32,
        uid: st.st_uid,
        gid: st.st_gid,
        rdev: st.st_rdev as u32,
        blksize: st.st_blksize as u32,
        flags: 0,
    }
}

fn reply_errno(err: &FsError) -> c_int {
    errno_from_fs_error(err)
}

impl GrootFs {
    pub fn new(backing: Backing) -> GrootFs {
        let mut inodes = HashMap::new();
        let mut by_path = HashMap::new();
        inodes.insert(
            FUSE_ROOT_ID,
            InodeEntry {
                path: Vec::new(),
                lookups: 1,
            },
        );
        by_path.insert(Vec::new(), FUSE_ROOT_ID);
        GrootFs {
            backing,
            inodes,
            by_path,
            next_ino: FUSE_ROOT_ID + 1,
            handles: HashMap::new(),
        }
    }

    fn path_of(&self, ino: u64) -> Option<Vec<u8>> {
        self.inodes.get(&ino).map(|entry| entry.path.clone())
    }

    fn ino_for_path(&mut self, path: &[u8]) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(
            ino,
            InodeEntry {
                path: path.to_vec(),
                lookups: 0,
            },
        );
        self.by_path.insert(path.to_vec(), ino);
        ino
    }

    fn bump_lookup(&mut self, ino: u64) {
        if let Some(entry) = self.inodes.get_mut(&ino) {
            entry.lookups += 1;
        }
    }

    fn drop_path_mapping(&mut self, path: &[u8]) {
        self.by_path.remove(path);
    }

    /// Rewrite the table after a rename: the entry itself and everything
    /// below it keeps its inode but moves to the new prefix.
    fn remap_tree(&mut self, old: &[u8], new: &[u8]) {
        let mut moved = Vec::new();
        for (&ino, entry) in &self.inodes {
            let within = entry.path == old
                || (entry.path.starts_with(old) && entry.path.get(old.len()) == Some(&b'/'));
            if within {
                let mut path = new.to_vec();
                path.extend_from_slice(&entry.path[old.len()..]);
                moved.push((ino, entry.path.clone(), path));
            }
        }
        for (ino, old_path, new_path) in moved {
            if let Some(entry) = self.inodes.get_mut(&ino) {
                entry.path = new_path.clone();
            }
            if self.by_path.get(&old_path) == Some(&ino) {
                self.by_path.remove(&old_path);
            }
            self.by_path.insert(new_path, ino);
        }
    }

    /// Look the path up in the backing directory and answer a lookup-style
    /// reply, registering the inode.
    fn entry_reply(&mut self, path: Vec<u8>, reply: ReplyEntry) {
        match self.backing.getattr(&path) {
            Ok(faked) => {
                let ino = self.ino_for_path(&path);
                let attr = stat_to_attr(&faked.st, ino);
                self.bump_lookup(ino);
                reply.entry(&TTL, &attr, 0);
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn apply_times(
        &self,
        path: &[u8],
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> FsResult<()> {
        fn to_timespec(time: Option<TimeOrNow>) -> libc::timespec {
            let mut ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_OMIT,
            };
            match time {
                None => {}
                Some(TimeOrNow::Now) => ts.tv_nsec = libc::UTIME_NOW,
                Some(TimeOrNow::SpecificTime(at)) => {
                    let since_epoch = at
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or(Duration::ZERO);
                    ts.tv_sec = since_epoch.as_secs() as libc::time_t;
                    ts.tv_nsec = since_epoch.subsec_nanos() as libc::c_long;
                }
            }
            ts
        }

        let times = [to_timespec(atime), to_timespec(mtime)];
        self.backing.utimens(path, &times)
    }
}

impl Filesystem for GrootFs {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), c_int> {
        debug!(target: "grootfs::fuse", "session initialised");
        Ok(())
    }

    fn destroy(&mut self) {
        debug!(target: "grootfs::fuse", "session destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        self.entry_reply(child_path(&parent_path, name), reply);
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        let gone = match self.inodes.get_mut(&ino) {
            Some(entry) => {
                entry.lookups = entry.lookups.saturating_sub(nlookup);
                entry.lookups == 0
            }
            None => false,
        };
        if gone {
            if let Some(entry) = self.inodes.remove(&ino) {
                if self.by_path.get(&entry.path) == Some(&ino) {
                    self.by_path.remove(&entry.path);
                }
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        debug!(target: "grootfs::fuse", "getattr ino={} fh={:?}", ino, fh);

        if let Some(fh) = fh {
            if let Some(file) = self.handles.get(&fh) {
                match self.backing.getattr_fd(file.as_raw_fd()) {
                    Ok(faked) => reply.attr(&TTL, &stat_to_attr(&faked.st, ino)),
                    Err(err) => reply.error(reply_errno(&err)),
                }
                return;
            }
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.getattr(&path) {
            Ok(faked) => reply.attr(&TTL, &stat_to_attr(&faked.st, ino)),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        debug!(
            target: "grootfs::fuse",
            "setattr ino={} mode={:?} uid={:?} gid={:?} size={:?}",
            ino, mode, uid, gid, size
        );

        if let Some(size) = size {
            let via_handle = fh.and_then(|fh| self.handles.get(&fh));
            let result = match via_handle {
                Some(file) => file.set_len(size).map_err(FsError::from),
                None => self.backing.truncate(&path, size as i64),
            };
            if let Err(err) = result {
                reply.error(reply_errno(&err));
                return;
            }
        }

        if let Some(mode) = mode {
            if let Err(err) = self.backing.chmod(&path, mode) {
                reply.error(reply_errno(&err));
                return;
            }
        }

        if uid.is_some() || gid.is_some() {
            if let Err(err) = self.backing.chown(&path, uid, gid) {
                reply.error(reply_errno(&err));
                return;
            }
        }

        if atime.is_some() || mtime.is_some() {
            if let Err(err) = self.apply_times(&path, atime, mtime) {
                reply.error(reply_errno(&err));
                return;
            }
        }

        let result = match fh.and_then(|fh| self.handles.get(&fh)) {
            Some(file) => self.backing.getattr_fd(file.as_raw_fd()),
            None => self.backing.getattr(&path),
        };
        match result {
            Ok(faked) => reply.attr(&TTL, &stat_to_attr(&faked.st, ino)),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.readlink(&path) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        _parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!(target: "grootfs::fuse", "mknod {:?} refused", name);
        reply.error(EROFS);
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        if name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        if let Err(err) = self.backing.mkdir(&path, mode, req.uid(), req.gid()) {
            reply.error(reply_errno(&err));
            return;
        }
        self.entry_reply(path, reply);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        match self.backing.unlink(&path) {
            Ok(()) => {
                self.drop_path_mapping(&path);
                reply.ok();
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        match self.backing.rmdir(&path) {
            Ok(()) => {
                self.drop_path_mapping(&path);
                reply.ok();
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn symlink(
        &mut self,
        req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        if link_name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let path = child_path(&parent_path, link_name);
        let result = self.backing.symlink(
            target.as_os_str().as_bytes(),
            &path,
            req.uid(),
            req.gid(),
        );
        if let Err(err) = result {
            reply.error(reply_errno(&err));
            return;
        }
        self.entry_reply(path, reply);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if name.as_bytes().len() > NAME_MAX || newname.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        if flags != 0 {
            reply.error(EINVAL);
            return;
        }
        let (parent_path, newparent_path) = match (self.path_of(parent), self.path_of(newparent)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                reply.error(ENOENT);
                return;
            }
        };
        let from = child_path(&parent_path, name);
        let to = child_path(&newparent_path, newname);
        match self.backing.rename(&from, &to) {
            Ok(()) => {
                self.drop_path_mapping(&to);
                self.remap_tree(&from, &to);
                reply.ok();
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        if newname.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let (from, newparent_path) = match (self.path_of(ino), self.path_of(newparent)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                reply.error(ENOENT);
                return;
            }
        };
        let to = child_path(&newparent_path, newname);
        if let Err(err) = self.backing.link(&from, &to) {
            reply.error(reply_errno(&err));
            return;
        }
        self.entry_reply(to, reply);
    }

    fn open(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        debug!(target: "grootfs::fuse", "open ino={} flags={:#x}", ino, flags);
        match self.backing.open(&path, flags, 0, req.uid(), req.gid()) {
            Ok(fd) => {
                let fh = fd.as_raw_fd() as u64;
                self.handles.insert(fh, File::from(fd));
                reply.opened(fh, 0);
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        if name.as_bytes().len() > NAME_MAX {
            reply.error(ENAMETOOLONG);
            return;
        }
        let parent_path = match self.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        debug!(target: "grootfs::fuse", "create {:?} mode={:o}", name, mode);
        match self
            .backing
            .open(&path, flags | libc::O_CREAT, mode, req.uid(), req.gid())
        {
            Ok(fd) => match self.backing.getattr_fd(fd.as_raw_fd()) {
                Ok(faked) => {
                    let ino = self.ino_for_path(&path);
                    let attr = stat_to_attr(&faked.st, ino);
                    let fh = fd.as_raw_fd() as u64;
                    self.handles.insert(fh, File::from(fd));
                    self.bump_lookup(ino);
                    reply.created(&TTL, &attr, 0, fh, 0);
                }
                Err(err) => reply.error(reply_errno(&err)),
            },
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let file = match self.handles.get(&fh) {
            Some(f) => f,
            None => {
                reply.error(EBADF);
                return;
            }
        };
        let mut buf = vec![0u8; size as usize];
        match file.read_at(&mut buf, offset as u64) {
            Ok(read) => {
                buf.truncate(read);
                reply.data(&buf);
            }
            Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let file = match self.handles.get(&fh) {
            Some(f) => f,
            None => {
                reply.error(EBADF);
                return;
            }
        };
        match file.write_at(data, offset as u64) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(&fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let file = match self.handles.get(&fh) {
            Some(f) => f,
            None => {
                reply.error(EBADF);
                return;
            }
        };
        let result = if datasync {
            file.sync_data()
        } else {
            file.sync_all()
        };
        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.readdir(&path) {
            Ok(entries) => {
                for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
                    let kind = kind_of_dirent(entry.kind);
                    if reply.add(entry.ino, (i + 1) as i64, kind, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.backing.statfs() {
            Ok(st) => reply.statfs(
                st.f_blocks,
                st.f_bfree,
                st.f_bavail,
                st.f_files,
                st.f_ffree,
                st.f_bsize as u32,
                st.f_namemax as u32,
                st.f_frsize as u32,
            ),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.setxattr(&path, name.as_bytes(), value, flags) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.getxattr(&path, name.as_bytes()) {
            Ok(value) => {
                if size == 0 {
                    reply.size(value.len() as u32);
                } else if value.len() <= size as usize {
                    reply.data(&value);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.listxattr(&path) {
            Ok(names) => {
                let mut buffer = Vec::new();
                for name in &names {
                    buffer.extend_from_slice(name);
                    buffer.push(0);
                }
                if size == 0 {
                    reply.size(buffer.len() as u32);
                } else if buffer.len() <= size as usize {
                    reply.data(&buffer);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.removexattr(&path, name.as_bytes()) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.backing.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reply_errno(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_fs() -> (TempDir, GrootFs) {
        let dir = TempDir::new().expect("tempdir");
        let base = Backing::open_base_dir(dir.path()).expect("open base dir");
        (dir, GrootFs::new(Backing::new(base, u32::MAX, u32::MAX)))
    }

    #[test]
    fn child_path_joins_from_the_root() {
        assert_eq!(child_path(b"", OsStr::new("a")), b"a".to_vec());
        assert_eq!(child_path(b"a/b", OsStr::new("c")), b"a/b/c".to_vec());
    }

    #[test]
    fn dirent_kinds_cover_the_common_types() {
        assert_eq!(kind_of_dirent(libc::DT_DIR), FileType::Directory);
        assert_eq!(kind_of_dirent(libc::DT_LNK), FileType::Symlink);
        assert_eq!(kind_of_dirent(libc::DT_REG), FileType::RegularFile);
        assert_eq!(kind_of_dirent(libc::DT_UNKNOWN), FileType::RegularFile);
    }

    #[test]
    fn inode_numbers_are_stable_per_path() {
        let (_dir, mut fs) = test_fs();
        let a = fs.ino_for_path(b"x");
        let b = fs.ino_for_path(b"x");
        assert_eq!(a, b);
        assert_ne!(a, fs.ino_for_path(b"y"));
        assert_eq!(fs.path_of(a), Some(b"x".to_vec()));
    }

    #[test]
    fn remap_tree_moves_descendants() {
        let (_dir, mut fs) = test_fs();
        let dir_ino = fs.ino_for_path(b"old");
        let file_ino = fs.ino_for_path(b"old/sub/file");
        let other_ino = fs.ino_for_path(b"older");

        fs.remap_tree(b"old", b"new");

        assert_eq!(fs.path_of(dir_ino), Some(b"new".to_vec()));
        assert_eq!(fs.path_of(file_ino), Some(b"new/sub/file".to_vec()));
        // A sibling that merely shares the name prefix must not move.
        assert_eq!(fs.path_of(other_ino), Some(b"older".to_vec()));
        assert_eq!(fs.ino_for_path(b"new"), dir_ino);
    }

    #[test]
    fn negative_times_stay_representable() {
        let t = to_system_time(-10, 0);
        assert!(t < UNIX_EPOCH);
        let t = to_system_time(10, 500_000_000);
        assert_eq!(
            t.duration_since(UNIX_EPOCH).unwrap(),
            Duration::new(10, 500_000_000)
        );
    }
}
