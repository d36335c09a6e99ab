//! Queue-driven processing: a producer uploads an image and publishes its `bucket/key`, a
//! worker drains the queue and stores filtered PNGs back into the object store.

pub(crate) mod store;
pub(crate) mod transport;
pub(crate) mod worker;

pub use store::{FsObjectStore, ObjectStore};
pub use transport::{Delivery, MemoryTransport, MessageTransport, TransportStats};
pub use worker::{
    DrainSummary, IMAGE_QUEUE, PRESIGN_TTL, PROCESSED_CONTENT_TYPE, Submission, UPLOAD_BUCKET,
    drain_queue, parse_reference, process_delivery, processed_key, submit_image,
};
