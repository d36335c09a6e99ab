use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use crate::buffer::BufferStrategy;
use crate::codec;
use crate::foundation::core::CancelToken;
use crate::foundation::error::{ConvError, ConvResult};
use crate::kernel::Kernel;
use crate::service::store::ObjectStore;
use crate::service::transport::{Delivery, MessageTransport};

pub const IMAGE_QUEUE: &str = "image-queue";
pub const UPLOAD_BUCKET: &str = "tmp-images";
pub const PRESIGN_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const PROCESSED_CONTENT_TYPE: &str = "image/png";

/// Split a `bucket/key` message body. Exactly one `/` is accepted.
pub fn parse_reference(payload: &[u8]) -> ConvResult<(String, String)> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ConvError::invalid_input(format!("message is not utf-8: {e}")))?;
    match text.trim().split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() && !key.contains('/') => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(ConvError::invalid_input(format!(
            "expected 'bucket/key', got '{text}'"
        ))),
    }
}

pub fn processed_key(key: &str) -> String {
    format!("processed-{key}")
}

/// Filter the object a delivery points at and store the PNG result next to it.
///
/// The delivery is acked on success and rejected otherwise; the returned value is the stored
/// key or the reason for the rejection.
#[tracing::instrument(skip_all, fields(tag = delivery.tag, strategy = strategy.name()))]
pub fn process_delivery(
    store: &dyn ObjectStore,
    transport: &dyn MessageTransport,
    delivery: &Delivery,
    strategy: &dyn BufferStrategy,
    cancel: &CancelToken,
) -> ConvResult<String> {
    let outcome = filter_object(store, delivery, strategy, cancel);
    match &outcome {
        Ok(key) => {
            transport.ack(delivery)?;
            tracing::info!(key = %key, "stored processed object");
        }
        Err(e) => {
            transport.reject(delivery)?;
            tracing::warn!(error = %e, "rejected delivery");
        }
    }
    outcome
}

fn filter_object(
    store: &dyn ObjectStore,
    delivery: &Delivery,
    strategy: &dyn BufferStrategy,
    cancel: &CancelToken,
) -> ConvResult<String> {
    cancel.check()?;
    let (bucket, key) = parse_reference(&delivery.payload)?;
    let bytes = store.fetch(&bucket, &key)?;
    let src = codec::decode_raster(&bytes)?;
    let out = strategy.apply(&src, Kernel::laplace(), cancel)?;
    let png = codec::encode_raster(&out, image::ImageFormat::Png)?;
    let out_key = processed_key(&key);
    store.store(&bucket, &out_key, &png, PROCESSED_CONTENT_TYPE)?;
    Ok(out_key)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Keys written, in processing order.
    pub stored: Vec<String>,
    pub rejected: usize,
}

/// Process deliveries from `queue` until it is empty or `cancel` fires.
///
/// A failing delivery is rejected and draining continues; only transport failures end the
/// drain early.
pub fn drain_queue(
    store: &dyn ObjectStore,
    transport: &dyn MessageTransport,
    queue: &str,
    strategy: &dyn BufferStrategy,
    cancel: &CancelToken,
) -> ConvResult<DrainSummary> {
    let mut summary = DrainSummary::default();
    while !cancel.is_cancelled() {
        let Some(delivery) = transport.consume(queue)? else {
            break;
        };
        match process_delivery(store, transport, &delivery, strategy, cancel) {
            Ok(key) => summary.stored.push(key),
            Err(e @ ConvError::Transport(_)) => return Err(e),
            Err(_) => summary.rejected += 1,
        }
    }
    Ok(summary)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub bucket: String,
    pub key: String,
    /// Read URL for the uploaded original, valid for [`PRESIGN_TTL`].
    pub url: String,
}

/// Upload a local image and queue it for processing.
pub fn submit_image(
    store: &dyn ObjectStore,
    transport: &dyn MessageTransport,
    path: &Path,
) -> ConvResult<Submission> {
    let bytes = std::fs::read(path)
        .map_err(|e| ConvError::invalid_input(format!("read '{}': {e}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvError::invalid_input(format!("no file name in '{}'", path.display())))?;

    let key = format!("{:016x}-{file_name}", object_hash(path, &bytes));
    store.ensure_bucket(UPLOAD_BUCKET)?;
    store.store(UPLOAD_BUCKET, &key, &bytes, content_type_for(path))?;
    let url = store.presign(UPLOAD_BUCKET, &key, PRESIGN_TTL)?;
    transport.publish(IMAGE_QUEUE, format!("{UPLOAD_BUCKET}/{key}").as_bytes())?;
    tracing::info!(key = %key, bytes = bytes.len(), "submitted image");

    Ok(Submission {
        bucket: UPLOAD_BUCKET.to_string(),
        key,
        url,
    })
}

/// Same file submitted twice still gets two keys: the upload time seeds the hash.
fn object_hash(path: &Path, bytes: &[u8]) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    let seed = xxh3_64(path.as_os_str().as_encoded_bytes()) ^ nanos;
    xxh3_64_with_seed(bytes, seed)
}

fn content_type_for(path: &Path) -> &'static str {
    match image::ImageFormat::from_path(path) {
        Ok(f) => f.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_exactly_bucket_and_key() {
        assert_eq!(
            parse_reference(b"tmp-images/abc-cat.jpg").unwrap(),
            ("tmp-images".to_string(), "abc-cat.jpg".to_string())
        );
        for bad in [&b"noslash"[..], b"/k", b"b/", b"b/k/x", b"b//k", b"\xff/x"] {
            assert!(matches!(parse_reference(bad), Err(ConvError::InvalidInput(_))));
        }
    }

    #[test]
    fn processed_key_prefix() {
        assert_eq!(processed_key("abc-cat.jpg"), "processed-abc-cat.jpg");
    }
}
