pub mod blob;
pub mod chunking;
pub mod error;
pub mod parse;
pub mod upload;

pub use blob::{BlobStore, LocalFsBlobStore};
pub use chunking::chunk_fixed_window;
pub use parse::{parse_document_job, parse_document_sync};
pub use upload::upload_document;
