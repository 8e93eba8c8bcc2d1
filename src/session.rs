// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Enforce the fixed session layout of the prompt namespace.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use crate::namespace::{Entry, NamespaceStore};
use crate::FsError;

/// Name of the prompt input file inside a session.
pub const REQUEST_FILE: &str = "request";
/// Name of the completion output file inside a session.
pub const RESPONSE_FILE: &str = "response";
/// Name of the failure diagnostic file inside a session.
pub const ERROR_FILE: &str = "error";
/// The three member files every session carries.
pub const SPECIAL_FILES: [&str; 3] = [REQUEST_FILE, RESPONSE_FILE, ERROR_FILE];
/// Default permission bits for session member files.
pub const SPECIAL_FILE_PERM: u16 = 0o666;

/// Role of a member file inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    /// Prompt input; writing here triggers a completion cycle.
    Request,
    /// Holds the last completion result.
    Response,
    /// Holds the last failure diagnostic, empty on success.
    Error,
}

impl SpecialKind {
    /// Kind matching a member-file name, if any.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            REQUEST_FILE => Some(Self::Request),
            RESPONSE_FILE => Some(Self::Response),
            ERROR_FILE => Some(Self::Error),
            _ => None,
        }
    }

    /// File name of this kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Request => REQUEST_FILE,
            Self::Response => RESPONSE_FILE,
            Self::Error => ERROR_FILE,
        }
    }
}

/// Category of a namespace path, decided by shape alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// The filesystem root.
    Root,
    /// A session directory directly under root.
    Session(String),
    /// A member file inside a session.
    Special {
        /// Owning session name.
        session: String,
        /// Which member file.
        kind: SpecialKind,
    },
    /// Any other shape; rejected by every mutating operation.
    Invalid,
}

/// Classify a slash-separated absolute path by shape.
///
/// Every operation handler consumes this single parse instead of matching
/// path strings itself.
#[must_use]
pub fn classify(path: &str) -> PathClass {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return PathClass::Root;
    }
    let mut segments = trimmed.split('/');
    let first = segments.next().unwrap_or_default().to_owned();
    match (segments.next(), segments.next()) {
        (None, _) => PathClass::Session(first),
        (Some(name), None) => match SpecialKind::from_name(name) {
            Some(kind) => PathClass::Special {
                session: first,
                kind,
            },
            None => PathClass::Invalid,
        },
        _ => PathClass::Invalid,
    }
}

/// Top-level segment of `path`, regardless of whether the path exists.
#[must_use]
pub fn resolve_session_for(path: &str) -> Option<&str> {
    let trimmed = path.trim_matches('/');
    trimmed.split('/').next().filter(|segment| !segment.is_empty())
}

/// True when `path` has the shape of a session member file.
#[must_use]
pub fn is_special_file(path: &str) -> bool {
    matches!(classify(path), PathClass::Special { .. })
}

/// True when `path` has the shape of a session request file.
#[must_use]
pub fn is_request_file(path: &str) -> bool {
    matches!(
        classify(path),
        PathClass::Special {
            kind: SpecialKind::Request,
            ..
        }
    )
}

/// Absolute path of the session directory named `name`.
#[must_use]
pub fn session_dir(name: &str) -> String {
    format!("/{name}")
}

/// Absolute path of a member file inside the session named `session`.
#[must_use]
pub fn special_path(session: &str, kind: SpecialKind) -> String {
    format!("/{session}/{}", kind.name())
}

/// Create a session directory and its three member files atomically.
///
/// Sessions only exist directly under root; anything else is a layout
/// violation. Member files start empty with default permissions.
pub fn create_session(store: &NamespaceStore, path: &str, perm: u16) -> Result<(), FsError> {
    let PathClass::Session(name) = classify(path) else {
        return Err(FsError::NotPermitted);
    };
    let dir = session_dir(&name);
    let files = SPECIAL_FILES
        .iter()
        .map(|member| (format!("{dir}/{member}"), Entry::regular(SPECIAL_FILE_PERM)))
        .collect();
    if store.insert_tree(&dir, Entry::directory(perm), files) {
        Ok(())
    } else {
        Err(FsError::Exists)
    }
}

/// Remove a session directory, its member files, and their buffers.
pub fn remove_session(store: &NamespaceStore, path: &str) -> Result<(), FsError> {
    let PathClass::Session(name) = classify(path) else {
        return Err(FsError::NotPermitted);
    };
    if store.remove_subtree(&session_dir(&name)) {
        Ok(())
    } else {
        Err(FsError::NotFound)
    }
}
