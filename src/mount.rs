// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the session filesystem through a FUSE mount.
// Author: Lukas Bower
#![forbid(unsafe_code)]

#[cfg(feature = "fuse")]
use std::collections::HashMap;
#[cfg(feature = "fuse")]
use std::ffi::OsStr;
use std::path::Path;
#[cfg(feature = "fuse")]
use std::sync::Mutex;
#[cfg(feature = "fuse")]
use std::time::{Duration, SystemTime};

#[cfg(not(feature = "fuse"))]
use anyhow::anyhow;
#[cfg(feature = "fuse")]
use anyhow::Context;
use anyhow::Result;

use crate::driver::PromptFs;
use crate::gateway::CompletionGateway;
#[cfg(feature = "fuse")]
use crate::namespace::{Entry, EntryKind};

#[cfg(feature = "fuse")]
const ROOT_INODE: u64 = 1;
#[cfg(feature = "fuse")]
const TTL: Duration = Duration::from_secs(1);

/// Mount the session filesystem at `at` and serve until unmounted.
pub fn mount<G: CompletionGateway + Send + 'static>(fs: PromptFs<G>, at: &Path) -> Result<()> {
    #[cfg(feature = "fuse")]
    {
        let filesystem = PromptFuse::new(fs);
        let options = [
            fuser::MountOption::FSName("promptfs".to_owned()),
            fuser::MountOption::AutoUnmount,
        ];
        fuser::mount2(filesystem, at, &options)
            .with_context(|| format!("mount {}", at.display()))?;
        Ok(())
    }
    #[cfg(not(feature = "fuse"))]
    {
        let _ = fs;
        let _ = at;
        Err(anyhow!(
            "fuse support disabled; rebuild promptfs with --features fuse"
        ))
    }
}

#[cfg(feature = "fuse")]
struct PromptFuse<G: CompletionGateway> {
    fs: PromptFs<G>,
    inodes: Mutex<InodeTable>,
}

#[cfg(feature = "fuse")]
impl<G: CompletionGateway> PromptFuse<G> {
    fn new(fs: PromptFs<G>) -> Self {
        Self {
            fs,
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    fn path_of(&self, inode: u64) -> Option<String> {
        let inodes = self.inodes.lock().expect("inode lock");
        inodes.path_for(inode).map(str::to_owned)
    }

    fn register(&self, path: &str) -> u64 {
        let mut inodes = self.inodes.lock().expect("inode lock");
        inodes.insert(path)
    }

    fn child_path(parent: &str, name: &OsStr) -> String {
        let name = name.to_string_lossy();
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }
}

#[cfg(feature = "fuse")]
fn entry_to_attr(inode: u64, entry: &Entry) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: inode,
        size: entry.size,
        blocks: entry.size.div_ceil(512),
        atime: entry.accessed,
        mtime: entry.modified,
        ctime: entry.modified,
        crtime: entry.created,
        kind: match entry.kind {
            EntryKind::Directory => fuser::FileType::Directory,
            EntryKind::RegularFile => fuser::FileType::RegularFile,
        },
        perm: entry.perm,
        nlink: entry.nlink,
        uid: entry.uid,
        gid: entry.gid,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

#[cfg(feature = "fuse")]
fn resolve_time(time: fuser::TimeOrNow) -> SystemTime {
    match time {
        fuser::TimeOrNow::SpecificTime(time) => time,
        fuser::TimeOrNow::Now => SystemTime::now(),
    }
}

#[cfg(feature = "fuse")]
impl<G: CompletionGateway> fuser::Filesystem for PromptFuse<G> {
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.getattr(&path) {
            Ok(entry) => {
                let inode = self.register(&path);
                reply.entry(&TTL, &entry_to_attr(inode, &entry), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(entry) => reply.attr(&TTL, &entry_to_attr(ino, &entry)),
            Err(err) => reply.error(err.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(mode) = mode {
            if let Err(err) = self.fs.chmod(&path, (mode & 0o7777) as u16) {
                reply.error(err.errno());
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            if let Err(err) = self.fs.chown(&path, uid, gid) {
                reply.error(err.errno());
                return;
            }
        }
        if let Some(size) = size {
            if let Err(err) = self.fs.truncate(&path, size) {
                reply.error(err.errno());
                return;
            }
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .utimens(&path, atime.map(resolve_time), mtime.map(resolve_time));
        }
        match self.fs.getattr(&path) {
            Ok(entry) => reply.attr(&TTL, &entry_to_attr(ino, &entry)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        if let Err(err) = self.fs.mkdir(&path, (mode & 0o7777) as u16) {
            reply.error(err.errno());
            return;
        }
        match self.fs.getattr(&path) {
            Ok(entry) => {
                let inode = self.register(&path);
                reply.entry(&TTL, &entry_to_attr(inode, &entry), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.rmdir(&path) {
            Ok(()) => {
                let mut inodes = self.inodes.lock().expect("inode lock");
                inodes.remove_subtree(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        let fh = match self.fs.create(&path, (mode & 0o7777) as u16) {
            Ok(fh) => fh,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };
        match self.fs.getattr(&path) {
            Ok(entry) => {
                let inode = self.register(&path);
                reply.created(&TTL, &entry_to_attr(inode, &entry), 0, fh, 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
        if self.path_of(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        reply.opened(self.fs.open(), 0);
    }

    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.read(&path, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.write(&path, offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut listing = Vec::new();
        listing.push((ino, fuser::FileType::Directory, ".".to_owned()));
        listing.push((ROOT_INODE, fuser::FileType::Directory, "..".to_owned()));
        for name in self.fs.readdir(&path) {
            let child = Self::child_path(&path, OsStr::new(&name));
            let Ok(entry) = self.fs.getattr(&child) else {
                continue;
            };
            let kind = match entry.kind {
                EntryKind::Directory => fuser::FileType::Directory,
                EntryKind::RegularFile => fuser::FileType::RegularFile,
            };
            let inode = self.register(&child);
            listing.push((inode, kind, name));
        }
        let start = offset.max(0) as usize;
        for (idx, (inode, kind, name)) in listing.into_iter().enumerate().skip(start) {
            if reply.add(inode, (idx + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let stats = self.fs.statfs();
        reply.statfs(
            stats.blocks,
            stats.blocks_free,
            stats.blocks_available,
            0,
            0,
            stats.block_size,
            255,
            stats.block_size,
        );
    }

    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let parent_path = self.path_of(parent).unwrap_or_else(|| "/".to_owned());
        let path = Self::child_path(&parent_path, name);
        match self.fs.unlink(&path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        let from_parent = self.path_of(parent).unwrap_or_else(|| "/".to_owned());
        let to_parent = self.path_of(newparent).unwrap_or_else(|| "/".to_owned());
        let from = Self::child_path(&from_parent, name);
        let to = Self::child_path(&to_parent, newname);
        match self.fs.rename(&from, &to) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: fuser::ReplyEntry,
    ) {
        let parent_path = self.path_of(parent).unwrap_or_else(|| "/".to_owned());
        let link = Self::child_path(&parent_path, link_name);
        let code = self
            .fs
            .symlink(&target.to_string_lossy(), &link)
            .err()
            .map_or(libc::EIO, |err| err.errno());
        reply.error(code);
    }

    fn setxattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _name: &OsStr,
        size: u32,
        reply: fuser::ReplyXattr,
    ) {
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    fn listxattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        size: u32,
        reply: fuser::ReplyXattr,
    ) {
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    fn removexattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    #[allow(clippy::too_many_arguments)]
    fn getlk(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        _start: u64,
        _end: u64,
        _typ: i32,
        _pid: u32,
        reply: fuser::ReplyLock,
    ) {
        reply.locked(0, 0, libc::F_UNLCK, 0);
    }

    #[allow(clippy::too_many_arguments)]
    fn setlk(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        _start: u64,
        _end: u64,
        _typ: i32,
        _pid: u32,
        _sleep: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn flush(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn access(&mut self, _req: &fuser::Request<'_>, _ino: u64, _mask: i32, reply: fuser::ReplyEmpty) {
        reply.ok();
    }
}

#[cfg(feature = "fuse")]
#[derive(Debug)]
struct InodeTable {
    by_inode: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_inode: u64,
}

#[cfg(feature = "fuse")]
impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            by_inode: HashMap::new(),
            by_path: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.by_inode.insert(ROOT_INODE, "/".to_owned());
        table.by_path.insert("/".to_owned(), ROOT_INODE);
        table
    }

    fn insert(&mut self, path: &str) -> u64 {
        if let Some(existing) = self.by_path.get(path) {
            return *existing;
        }
        let inode = self.next_inode;
        self.next_inode = self.next_inode.saturating_add(1);
        self.by_inode.insert(inode, path.to_owned());
        self.by_path.insert(path.to_owned(), inode);
        inode
    }

    fn path_for(&self, inode: u64) -> Option<&str> {
        self.by_inode.get(&inode).map(String::as_str)
    }

    fn remove_subtree(&mut self, dir: &str) {
        let prefix = format!("{dir}/");
        let doomed: Vec<String> = self
            .by_path
            .keys()
            .filter(|path| path.as_str() == dir || path.starts_with(&prefix))
            .cloned()
            .collect();
        for path in doomed {
            if let Some(inode) = self.by_path.remove(&path) {
                self.by_inode.remove(&inode);
            }
        }
    }
}
