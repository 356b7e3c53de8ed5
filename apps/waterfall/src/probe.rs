//! Asset probing — natural width/height of a tile's asset before placement.
//!
//! `HttpAssetProbe` streams the asset only until its image header is readable,
//! up to [`MAX_HEADER_BYTES`]; pixels are never decoded.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Natural pixel size of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// A zero-width asset cannot keep its aspect ratio and is never placed.
    pub fn is_placeable(&self) -> bool {
        self.width > 0
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Asset returned status {0}")]
    Status(u16),

    #[error("Unrecognized image data: {0}")]
    Decode(String),

    #[error("Probe task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait AssetProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<Dimensions, ProbeError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HttpAssetProbe
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpAssetProbe {
    client: Client,
}

impl HttpAssetProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetProbe for HttpAssetProbe {
    async fn probe(&self, url: &str) -> Result<Dimensions, ProbeError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let mut header = HeaderBuffer::new(MAX_HEADER_BYTES);
        let dims = loop {
            match response.chunk().await? {
                Some(chunk) => {
                    if let Some(dims) = header.push(&chunk)? {
                        break dims;
                    }
                }
                None => break header.finish()?,
            }
        };
        debug!(url, width = dims.width, height = dims.height, read = header.len(), "Probed asset");
        Ok(dims)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Header reading
// ────────────────────────────────────────────────────────────────────────────

/// Most bytes of an asset read while looking for its header.
pub const MAX_HEADER_BYTES: usize = 256 * 1024;

/// Accumulates the start of an asset until its dimensions can be read.
#[derive(Debug)]
pub struct HeaderBuffer {
    buf: BytesMut,
    limit: usize,
}

impl HeaderBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Appends the next chunk. `Ok(None)` means more data is needed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Dimensions>, ProbeError> {
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        match read_dimensions(&self.buf) {
            Ok(dims) => Ok(Some(dims)),
            Err(e) if self.buf.len() >= self.limit => Err(ProbeError::Decode(format!(
                "no readable header in the first {} bytes: {e}",
                self.limit
            ))),
            Err(_) => Ok(None),
        }
    }

    /// The asset ended; reads whatever arrived.
    pub fn finish(&self) -> Result<Dimensions, ProbeError> {
        read_dimensions(&self.buf)
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

/// Reads width and height from an encoded image header.
pub fn read_dimensions(data: &[u8]) -> Result<Dimensions, ProbeError> {
    let (width, height) = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProbeError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ProbeError::Decode(e.to_string()))?;
    Ok(Dimensions { width, height })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_read_dimensions_from_png_header() {
        let dims = read_dimensions(&png_bytes(640, 480)).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_read_dimensions_rejects_garbage() {
        let result = read_dimensions(b"not an image at all");
        assert!(matches!(result, Err(ProbeError::Decode(_))));
    }

    #[test]
    fn test_header_buffer_waits_for_more_data() {
        let png = png_bytes(32, 16);
        let mut header = HeaderBuffer::new(MAX_HEADER_BYTES);
        assert!(header.push(&png[..12]).unwrap().is_none());
        assert_eq!(
            header.push(&png[12..]).unwrap(),
            Some(Dimensions {
                width: 32,
                height: 16
            })
        );
    }

    #[test]
    fn test_header_buffer_gives_up_at_limit() {
        let mut header = HeaderBuffer::new(64);
        assert!(header.push(&[0u8; 40]).unwrap().is_none());
        assert!(matches!(
            header.push(&[0u8; 40]),
            Err(ProbeError::Decode(_))
        ));
        assert_eq!(header.len(), 64);
    }

    #[test]
    fn test_header_buffer_finish_on_short_asset() {
        let mut header = HeaderBuffer::new(MAX_HEADER_BYTES);
        assert!(header.push(b"GIF").unwrap().is_none());
        assert!(matches!(header.finish(), Err(ProbeError::Decode(_))));
    }

    #[test]
    fn test_zero_width_not_placeable() {
        assert!(!Dimensions {
            width: 0,
            height: 10
        }
        .is_placeable());
        assert!(Dimensions {
            width: 1,
            height: 0
        }
        .is_placeable());
    }
}
