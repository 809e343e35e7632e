//! Core data types shared by the catalog, scanner and engines.

pub mod fingerprint;
pub mod metadata;
pub mod version;

pub use fingerprint::Fingerprint;
pub use metadata::PatchMetadata;
pub use version::Version;
