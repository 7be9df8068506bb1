//! Service modules for the ingest pathways
//!
//! - [`item_source`]: work items from the source dataset
//! - [`remote_caller`]: the per-item remote call seam
//! - [`vision_client`]: embedding service callers
//! - [`blob_client`]: object storage upload caller

pub mod blob_client;
pub mod item_source;
pub mod remote_caller;
pub mod vision_client;

pub use blob_client::{BlobContainerClient, UploadReceipt};
pub use item_source::{ItemSource, LocatorStrategy};
pub use remote_caller::RemoteCaller;
pub use vision_client::{VectorizeMode, VisionCaller, VisionClient};
