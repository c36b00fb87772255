//! Object store gateway.
//!
//! Sources, converted outputs and metadata documents are blobs addressed by
//! the deterministic keys in [`keys`]. The [`ObjectStore`] trait hides the
//! backend; [`FsObjectStore`] keeps objects on local disk and hands out
//! signed URLs that the HTTP server honours.

mod config;
mod error;
mod fs_store;
pub mod keys;
mod signer;
mod traits;
mod types;

pub use config::StorageConfig;
pub use error::StorageError;
pub use fs_store::{FsObjectStore, ObjectWriter};
pub use signer::{encode_key, UrlSigner, OBJECTS_PATH};
pub use traits::ObjectStore;
pub use types::{ChecksumAlgorithm, ObjectMeta, PresignedUrl, UrlMethod};
