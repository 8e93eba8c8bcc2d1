// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Own the in-memory namespace entries and file buffers.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

/// Kind of a namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory node.
    Directory,
    /// Regular file backed by a byte buffer.
    RegularFile,
}

/// POSIX-like metadata for one node in the namespace tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Directory or regular file.
    pub kind: EntryKind,
    /// Permission bits; the file type is carried by `kind`.
    pub perm: u16,
    /// Byte length of the backing buffer; always 0 for directories.
    pub size: u64,
    /// Link count.
    pub nlink: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Creation time.
    pub created: SystemTime,
    /// Last content mutation time.
    pub modified: SystemTime,
    /// Last access time.
    pub accessed: SystemTime,
}

impl Entry {
    /// New directory entry with the supplied permission bits.
    #[must_use]
    pub fn directory(perm: u16) -> Self {
        let now = SystemTime::now();
        Self {
            kind: EntryKind::Directory,
            perm,
            size: 0,
            nlink: 2,
            uid: 0,
            gid: 0,
            created: now,
            modified: now,
            accessed: now,
        }
    }

    /// New empty regular-file entry with the supplied permission bits.
    #[must_use]
    pub fn regular(perm: u16) -> Self {
        let now = SystemTime::now();
        Self {
            kind: EntryKind::RegularFile,
            perm,
            size: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            created: now,
            modified: now,
            accessed: now,
        }
    }

    /// True when the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    buffers: HashMap<String, Vec<u8>>,
}

/// In-memory store owning every namespace entry and file buffer.
///
/// Every method runs under one internal lock, so a concurrent reader never
/// observes an entry whose size disagrees with its buffer.
#[derive(Debug)]
pub struct NamespaceStore {
    state: Mutex<State>,
}

impl NamespaceStore {
    /// New store holding only the root directory.
    #[must_use]
    pub fn new(root_perm: u16) -> Self {
        let mut state = State::default();
        state.entries.insert("/".to_owned(), Entry::directory(root_perm));
        Self {
            state: Mutex::new(state),
        }
    }

    /// Look up the entry at `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Entry> {
        let state = self.state.lock().expect("namespace lock");
        state.entries.get(path).cloned()
    }

    /// True when an entry exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        let state = self.state.lock().expect("namespace lock");
        state.entries.contains_key(path)
    }

    /// Atomically insert a directory and its file members.
    ///
    /// Returns false without mutating anything when `dir` already exists.
    /// Each file member gets an empty backing buffer.
    pub fn insert_tree(&self, dir: &str, dir_entry: Entry, files: Vec<(String, Entry)>) -> bool {
        let mut state = self.state.lock().expect("namespace lock");
        if state.entries.contains_key(dir) {
            return false;
        }
        state.entries.insert(dir.to_owned(), dir_entry);
        for (path, entry) in files {
            state.buffers.insert(path.clone(), Vec::new());
            state.entries.insert(path, entry);
        }
        true
    }

    /// Atomically remove a directory, its children, and their buffers.
    ///
    /// Returns false when `dir` is absent.
    pub fn remove_subtree(&self, dir: &str) -> bool {
        let mut state = self.state.lock().expect("namespace lock");
        if !state.entries.contains_key(dir) {
            return false;
        }
        let prefix = format!("{dir}/");
        state
            .entries
            .retain(|path, _| path != dir && !path.starts_with(&prefix));
        state.buffers.retain(|path, _| !path.starts_with(&prefix));
        true
    }

    /// Materialize a regular-file entry at `path` if none exists.
    ///
    /// The entry size adopts the length of any buffer already present, so a
    /// lazily registered file reports its real content length.
    pub fn ensure_file(&self, path: &str, perm: u16) -> Entry {
        let mut state = self.state.lock().expect("namespace lock");
        let len = state.buffers.entry(path.to_owned()).or_default().len() as u64;
        state
            .entries
            .entry(path.to_owned())
            .or_insert_with(|| {
                let mut entry = Entry::regular(perm);
                entry.size = len;
                entry
            })
            .clone()
    }

    /// Replace the entry at `path` with a fresh empty regular file.
    pub fn reset_file(&self, path: &str, perm: u16) {
        let mut state = self.state.lock().expect("namespace lock");
        state.buffers.insert(path.to_owned(), Vec::new());
        state.entries.insert(path.to_owned(), Entry::regular(perm));
    }

    /// Names of the direct children of `path`, in no particular order.
    #[must_use]
    pub fn children_of(&self, path: &str) -> Vec<String> {
        let state = self.state.lock().expect("namespace lock");
        let prefix = if path == "/" {
            "/".to_owned()
        } else {
            format!("{path}/")
        };
        state
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_owned)
            .collect()
    }

    /// Bytes `[offset, offset + size)` of the buffer, clipped to its length.
    #[must_use]
    pub fn read_range(&self, path: &str, offset: u64, size: u32) -> Option<Vec<u8>> {
        let state = self.state.lock().expect("namespace lock");
        let buffer = state.buffers.get(path)?;
        let start = (offset as usize).min(buffer.len());
        let end = start.saturating_add(size as usize).min(buffer.len());
        Some(buffer[start..end].to_vec())
    }

    /// Full copy of the buffer at `path`.
    #[must_use]
    pub fn read_all(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().expect("namespace lock");
        state.buffers.get(path).cloned()
    }

    /// Splice `data` into the buffer at `path` and return the new length.
    ///
    /// An offset of 0 replaces the buffer wholesale. A positive offset
    /// gap-fills with null bytes up to `offset` when the buffer is shorter,
    /// then overwrites the spliced region. Size and mtime move in the same
    /// critical section.
    pub fn splice(&self, path: &str, offset: u64, data: &[u8]) -> u64 {
        let mut state = self.state.lock().expect("namespace lock");
        let len = {
            let buffer = state.buffers.entry(path.to_owned()).or_default();
            let offset = offset as usize;
            if offset == 0 {
                buffer.clear();
                buffer.extend_from_slice(data);
            } else {
                if buffer.len() < offset {
                    buffer.resize(offset, 0);
                }
                let end = offset + data.len();
                if buffer.len() < end {
                    buffer.resize(end, 0);
                }
                buffer[offset..end].copy_from_slice(data);
            }
            buffer.len() as u64
        };
        if let Some(entry) = state.entries.get_mut(path) {
            entry.size = len;
            entry.modified = SystemTime::now();
        }
        len
    }

    /// Overwrite the buffer at `path` wholesale.
    pub fn replace_bytes(&self, path: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().expect("namespace lock");
        let len = bytes.len() as u64;
        state.buffers.insert(path.to_owned(), bytes);
        if let Some(entry) = state.entries.get_mut(path) {
            entry.size = len;
            entry.modified = SystemTime::now();
        }
    }

    /// Empty the buffer at `path`.
    pub fn clear_bytes(&self, path: &str) {
        self.replace_bytes(path, Vec::new());
    }

    /// Shrink the buffer at `path` to at most `len` bytes.
    ///
    /// A length beyond the buffer leaves the content untouched; the entry
    /// size always tracks the resulting buffer length.
    pub fn truncate(&self, path: &str, len: u64) {
        let mut state = self.state.lock().expect("namespace lock");
        let size = {
            let buffer = state.buffers.entry(path.to_owned()).or_default();
            if buffer.len() as u64 > len {
                buffer.truncate(len as usize);
            }
            buffer.len() as u64
        };
        if let Some(entry) = state.entries.get_mut(path) {
            entry.size = size;
            entry.modified = SystemTime::now();
        }
    }

    /// Set the permission bits of the entry at `path`.
    ///
    /// Returns false when the entry is absent.
    pub fn set_perm(&self, path: &str, perm: u16) -> bool {
        let mut state = self.state.lock().expect("namespace lock");
        match state.entries.get_mut(path) {
            Some(entry) => {
                entry.perm = perm;
                true
            }
            None => false,
        }
    }

    /// Set the owner of the entry at `path`.
    ///
    /// Returns false when the entry is absent.
    pub fn set_owner(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> bool {
        let mut state = self.state.lock().expect("namespace lock");
        match state.entries.get_mut(path) {
            Some(entry) => {
                if let Some(uid) = uid {
                    entry.uid = uid;
                }
                if let Some(gid) = gid {
                    entry.gid = gid;
                }
                true
            }
            None => false,
        }
    }

    /// Set the access and modification times of the entry at `path`.
    ///
    /// Returns false when the entry is absent.
    pub fn set_times(&self, path: &str, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> bool {
        let mut state = self.state.lock().expect("namespace lock");
        match state.entries.get_mut(path) {
            Some(entry) => {
                if let Some(atime) = atime {
                    entry.accessed = atime;
                }
                if let Some(mtime) = mtime {
                    entry.modified = mtime;
                }
                true
            }
            None => false,
        }
    }
}
