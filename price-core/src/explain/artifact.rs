//! Explanation artifacts
//!
//! Charts are stored as JPEG under a fresh UUID and never overwritten.
//! Nothing is cleaned up; the directory grows by one file per prediction.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// Write-once blob storage addressed by identifier
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `id`, returning the public URL
    fn put(&self, id: Uuid, bytes: &[u8]) -> Result<String, ArtifactError>;
}

pub fn artifact_file_name(id: Uuid) -> String {
    format!("shap_explanation_{}.jpeg", id)
}

/// Files in a directory that is also served over HTTP under `url_prefix`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
    url_prefix: String,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, id: Uuid, bytes: &[u8]) -> Result<String, ArtifactError> {
        let name = artifact_file_name(id);
        let path = self.dir.join(&name);
        let io_err = |source: std::io::Error| ArtifactError::Io {
            path: path.clone(),
            source,
        };

        // create_new: an identifier collision fails instead of overwriting
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;

        log::debug!("Stored artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(format!("{}/{}", self.url_prefix, name))
    }
}

/// Composite any transparency over an opaque background
pub fn flatten_alpha(image: &DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8, bg: u8| ((c as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// JPEG-encode an image, flattening alpha onto white first
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ArtifactError> {
    let rgb = flatten_alpha(image, Rgb([255, 255, 255]));
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| ArtifactError::Encode(e.to_string()))?;
    Ok(bytes)
}
