// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Dispatch filesystem operations onto the session namespace.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use log::{debug, warn};

use crate::gateway::CompletionGateway;
use crate::namespace::{Entry, NamespaceStore};
use crate::session::{self, PathClass, SpecialKind, SPECIAL_FILE_PERM};
use crate::FsError;

/// Permission bits of the filesystem root.
pub const ROOT_PERM: u16 = 0o755;

/// Fixed figures reported by statfs for the virtual filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Block size in bytes.
    pub block_size: u32,
    /// Total block count.
    pub blocks: u64,
    /// Free block count.
    pub blocks_free: u64,
    /// Block count available to unprivileged callers.
    pub blocks_available: u64,
}

/// Path-based operation handlers over the session namespace.
///
/// Lock order: the request guard is always taken before any store access;
/// the store lock is only ever held for a single atomic operation.
pub struct PromptFs<G> {
    store: NamespaceStore,
    gateway: G,
    request_guard: Mutex<()>,
    next_handle: AtomicU64,
}

impl<G: CompletionGateway> PromptFs<G> {
    /// New filesystem holding only the root directory.
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self {
            store: NamespaceStore::new(ROOT_PERM),
            gateway,
            request_guard: Mutex::new(()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn allocate_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Metadata for the entry at `path`.
    ///
    /// A member file whose session directory exists is materialized on
    /// first sight and registered with its session.
    pub fn getattr(&self, path: &str) -> Result<Entry, FsError> {
        if let Some(entry) = self.store.lookup(path) {
            return Ok(entry);
        }
        if let PathClass::Special { session, .. } = session::classify(path) {
            if self.store.contains(&session::session_dir(&session)) {
                return Ok(self.store.ensure_file(path, SPECIAL_FILE_PERM));
            }
        }
        Err(FsError::NotFound)
    }

    /// Child names of `path`: session names at root, member names inside a
    /// session, nothing anywhere else.
    #[must_use]
    pub fn readdir(&self, path: &str) -> Vec<String> {
        match session::classify(path) {
            PathClass::Root => self.store.children_of("/"),
            PathClass::Session(name) => {
                let dir = session::session_dir(&name);
                if self.store.contains(&dir) {
                    self.store.children_of(&dir)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Create a session directory with its three member files.
    pub fn mkdir(&self, path: &str, perm: u16) -> Result<(), FsError> {
        debug!("mkdir {path}");
        session::create_session(&self.store, path, perm)
    }

    /// Remove a session directory, its member files, and their buffers.
    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        debug!("rmdir {path}");
        // An in-flight request cycle must finish before its buffers go away.
        let _guard = self.request_guard.lock().expect("request guard");
        session::remove_session(&self.store, path)
    }

    /// Reinitialize a member file and hand out a fresh handle.
    ///
    /// Only member-file paths are creatable; the session directory itself
    /// must already exist so no file can outlive its session.
    pub fn create(&self, path: &str, perm: u16) -> Result<u64, FsError> {
        debug!("create {path}");
        let PathClass::Special { session, .. } = session::classify(path) else {
            return Err(FsError::NotPermitted);
        };
        if !self.store.contains(&session::session_dir(&session)) {
            return Err(FsError::NotFound);
        }
        self.store.reset_file(path, perm);
        Ok(self.allocate_handle())
    }

    /// Allocate a monotonically increasing file handle.
    #[must_use]
    pub fn open(&self) -> u64 {
        self.allocate_handle()
    }

    /// Bytes `[offset, offset + size)` of a member file, clipped to its
    /// buffer length.
    pub fn read(&self, path: &str, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        if self.store.lookup(path).is_none() {
            return Err(FsError::NotFound);
        }
        if !session::is_special_file(path) {
            return Err(FsError::NotPermitted);
        }
        Ok(self.store.read_range(path, offset, size).unwrap_or_default())
    }

    /// Accept prompt bytes into a request file and run one completion cycle.
    ///
    /// The whole cycle runs under the process-wide request guard: splice the
    /// bytes into the request buffer, clear both outcome files, call the
    /// gateway with the full request buffer, then populate exactly one of
    /// `response` or `error`. The write itself succeeds once the bytes are
    /// accepted, whatever the gateway outcome.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        let PathClass::Special { session, kind } = session::classify(path) else {
            return Err(FsError::NotPermitted);
        };
        let _guard = self.request_guard.lock().expect("request guard");
        let dir = session::session_dir(&session);
        if !self.store.contains(&dir) {
            return Err(FsError::NotFound);
        }
        if kind != SpecialKind::Request {
            return Err(FsError::NotPermitted);
        }
        self.store.ensure_file(path, SPECIAL_FILE_PERM);
        let buffered = self.store.splice(path, offset, data);
        debug!(
            "accepted {} bytes at offset {offset} into {path} ({buffered} buffered)",
            data.len()
        );

        let response_path = session::special_path(&session, SpecialKind::Response);
        let error_path = session::special_path(&session, SpecialKind::Error);
        self.store.ensure_file(&response_path, SPECIAL_FILE_PERM);
        self.store.ensure_file(&error_path, SPECIAL_FILE_PERM);
        self.store.clear_bytes(&response_path);
        self.store.clear_bytes(&error_path);

        let prompt = self.store.read_all(path).unwrap_or_default();
        match self.gateway.complete(&prompt) {
            Ok(completion) => {
                debug!("completion for {dir}: {} bytes", completion.len());
                self.store.replace_bytes(&response_path, completion);
            }
            Err(reason) => {
                warn!("completion failed for {dir}: {reason}");
                self.store
                    .replace_bytes(&error_path, format!("Error: {reason}").into_bytes());
            }
        }
        Ok(data.len())
    }

    /// Shrink a member file's buffer to at most `len` bytes.
    pub fn truncate(&self, path: &str, len: u64) -> Result<(), FsError> {
        let PathClass::Special { session, .. } = session::classify(path) else {
            return Err(FsError::NotPermitted);
        };
        if !self.store.contains(&session::session_dir(&session)) {
            return Err(FsError::NotFound);
        }
        self.store.ensure_file(path, SPECIAL_FILE_PERM);
        self.store.truncate(path, len);
        Ok(())
    }

    /// Set the permission bits of an entry.
    pub fn chmod(&self, path: &str, perm: u16) -> Result<(), FsError> {
        if self.store.set_perm(path, perm & 0o7777) {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }

    /// Set the owner of an entry.
    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), FsError> {
        if self.store.set_owner(path, uid, gid) {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }

    /// Set access and modification times; silently ignores absent entries.
    pub fn utimens(&self, path: &str, atime: Option<SystemTime>, mtime: Option<SystemTime>) {
        let _ = self.store.set_times(path, atime, mtime);
    }

    /// Unsupported by design; the session layout is fixed.
    pub fn unlink(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    /// Unsupported by design; the session layout is fixed.
    pub fn rename(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    /// Unsupported by design; the namespace has no links.
    pub fn symlink(&self, _target: &str, _link: &str) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    /// Fixed filesystem statistics.
    #[must_use]
    pub fn statfs(&self) -> FsStats {
        FsStats {
            block_size: 512,
            blocks: 4096,
            blocks_free: 2048,
            blocks_available: 2048,
        }
    }
}
