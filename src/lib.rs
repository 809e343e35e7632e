//! Signature-driven binary patching with backup and restore.
//!
//! A [`catalog::SignatureCatalog`] describes known releases of a target file
//! and the byte substitutions each one needs. The [`patcher::Patcher`]
//! classifies a target, applies the substitutions atomically while keeping
//! the original bytes beside it, and records what it did in a metadata
//! trailer. The same backups let [`restore::restore_directory`] undo it.

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod hashing;
pub mod inspect;
pub mod io;
pub mod logging;
pub mod patcher;
pub mod restore;
pub mod scanner;

pub use catalog::{PatternPair, SignatureCatalog, SignatureEntry};
pub use config::PatcherConfig;
pub use core::{Fingerprint, PatchMetadata, Version};
pub use error::{ErrorKind, PatchError, Result};
pub use patcher::{PatchOutcome, PatchStage, Patcher, RepatchOutcome};
pub use restore::RestoreReport;
pub use scanner::{Classification, Scanner};
