// ABOUTME: Artifact store adapters for fetching, uploading and listing code artifacts
// ABOUTME: Exposes the ArtifactStore trait with S3 and in-memory implementations

pub mod error;
pub mod memory;
pub mod s3;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryArtifactStore;
pub use s3::S3ArtifactStore;
pub use store::{
    content_type_for_filename, generate_key, validate_key, ArtifactStore, ArtifactUpload,
    KeyStream, SOURCE_CONTENT_TYPES,
};
