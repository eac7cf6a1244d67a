use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GenericImageView, ImageFormat};
use mime_guess::from_path;
use spin_sdk::http::Response;

use crate::config::blob_key;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::new_id;

/// Where image bytes live. Posts only keep the returned reference.
pub trait BlobStore {
    fn put(&self, bytes: &[u8], extension: &str) -> anyhow::Result<String>;
    fn fetch(&self, reference: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn remove(&self, reference: &str) -> anyhow::Result<()>;
}

/// Blob storage on top of the key-value backend.
pub struct KvBlobStore<'a, S: KvStore>(pub &'a S);

impl<S: KvStore> BlobStore for KvBlobStore<'_, S> {
    fn put(&self, bytes: &[u8], extension: &str) -> anyhow::Result<String> {
        let reference = format!("posts/{}.{}", new_id(), extension);
        self.0.set(&blob_key(&reference), bytes)?;
        Ok(reference)
    }

    fn fetch(&self, reference: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.0.get(&blob_key(reference))
    }

    fn remove(&self, reference: &str) -> anyhow::Result<()> {
        self.0.delete(&blob_key(reference))
    }
}

/// Checks that `bytes` decodes as a raster image we accept and returns its
/// extension. The whole payload is decoded, not just the header.
pub fn validate_image(bytes: &[u8]) -> Result<&'static str, DomainError> {
    if bytes.is_empty() {
        return Err(DomainError::validation("image", "The submitted file is empty"));
    }

    let format = image::guess_format(bytes).map_err(|_| {
        DomainError::validation(
            "image",
            "Upload a valid image. The file is either not an image or a corrupted image",
        )
    })?;
    let extension = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        other => {
            return Err(DomainError::validation(
                "image",
                format!("Unsupported image format: {:?}", other),
            ))
        }
    };

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        tracing::debug!(error = %e, "image failed to decode");
        DomainError::validation("image", "Corrupted image")
    })?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(DomainError::validation("image", "Corrupted image"));
    }
    Ok(extension)
}

/// Decodes a base64 image payload, validates it and stores it.
pub fn store_image<B: BlobStore>(blobs: &B, payload: &str) -> Result<String, DomainError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| DomainError::validation("image", "Image payload is not valid base64"))?;
    let extension = validate_image(&bytes)?;
    Ok(blobs.put(&bytes, extension)?)
}

pub fn serve_media<S: KvStore>(store: &S, path: &str) -> anyhow::Result<Response> {
    let reference = path.trim_start_matches("/media/");
    let blobs = KvBlobStore(store);

    match blobs.fetch(reference)? {
        Some(bytes) => {
            let mime = from_path(reference).first_or_octet_stream();
            Ok(Response::builder()
                .status(200)
                .header("Content-Type", mime.as_ref())
                .body(bytes)
                .build())
        }
        None => Ok(ApiError::NotFound("File not found".to_string()).into()),
    }
}
