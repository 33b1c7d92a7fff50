use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::ocfl::VersionNum;

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Application errors. Every variant maps to one of the ten error kinds the engine
/// distinguishes: not-found, invalid-path, corrupt-object, digest-mismatch, conflict,
/// digest-algorithm-mismatch, unknown-extension, unsupported, cancelled, io.
#[derive(Error)]
pub enum OcflError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path {path}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Digest mismatch for {path}: expected {expected}, computed {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Conflict at {path}: {message}")]
    Conflict { path: String, message: String },

    #[error("Digest algorithm mismatch: object uses {existing}, stage uses {requested}")]
    DigestAlgorithmMismatch { existing: String, requested: String },

    #[error("Unknown extension: {0}")]
    UnknownExtension(String),

    #[error("Unsupported operation on this backend: {0}")]
    Unsupported(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to acquire lock for object {0}: {1}")]
    LockAcquire(String, String),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

/// Constructs an `OcflError::NotFound` error
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for OcflError {
    fn from(e: io::Error) -> Self {
        OcflError::Io(e)
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<walkdir::Error> for OcflError {
    fn from(e: walkdir::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<toml::de::Error> for OcflError {
    fn from(e: toml::de::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}
