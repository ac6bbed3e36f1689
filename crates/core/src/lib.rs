//! Core building blocks for rebuilding Debian package history: changelog stanza
//! parsing, clearsigned document framing, and the result types shared with the
//! signature verifier.
//!
//! This crate has no process, network or CLI dependencies.

pub mod armor;
pub mod changelog;
pub mod diagnostics;
pub mod error;
pub mod types;

pub use armor::{ClearsignedDocument, count_signature_blocks, split_clearsigned};
pub use changelog::{
    ChangelogHistory, ChangelogParser, ParseResult, TopEntry, parse_changelog,
};
pub use diagnostics::{Diagnostics, TracingDiagnostics};
pub use error::{ArmorError, ChangelogError};
pub use types::*;
