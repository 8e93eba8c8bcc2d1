// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide the promptfs session-filesystem library.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Session filesystem bridging file writes to a text-completion service.
//!
//! A client creates a session directory under the mount root, writes a
//! prompt into its `request` file, and reads the completion back from the
//! sibling `response` file. Failures land in `error` instead; exactly one
//! of the two is populated after each request cycle.

/// Gateway configuration loader.
pub mod config;
/// Path-based operation handlers and access policy.
pub mod driver;
/// Blocking completion-service client.
pub mod gateway;
/// FUSE mount adapter.
pub mod mount;
/// In-memory entry and buffer store.
pub mod namespace;
/// Session layout rules and path classification.
pub mod session;

use thiserror::Error;

/// Filesystem-level failures surfaced to the host dispatch layer.
///
/// Completion failures never appear here; they are delivered through the
/// session's `error` file while the triggering write still succeeds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsError {
    /// The path does not resolve to a live entry.
    #[error("no such entry")]
    NotFound,
    /// The operation falls outside the fixed session layout.
    #[error("operation not permitted by the session layout")]
    NotPermitted,
    /// The session directory already exists.
    #[error("session already exists")]
    Exists,
}

impl FsError {
    /// OS error code reported to the host dispatch layer.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotPermitted => libc::EPERM,
            FsError::Exists => libc::EEXIST,
        }
    }
}
