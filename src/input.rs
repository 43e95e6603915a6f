//! Input images: discovery on disk and the in-memory [`ImageInput`] the
//! pipeline consumes.
//!
//! The core only ever sees `(identifier, bytes, media type)` triples. Directory
//! scanning is a convenience for the CLI and lives here so the batch runner
//! does not depend on the file system.

use crate::error::InputError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions picked up by [`discover_images`] when none are given.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// One image to classify, owned and ready to send.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Identifier used in logs and reports (usually the file path).
    pub id: String,
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: String,
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("id", &self.id)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl ImageInput {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Build an input whose media type is sniffed from the magic bytes.
    ///
    /// Falls back to `image/jpeg` when the format is not recognised; the
    /// provider is the final judge of whether it can read the bytes.
    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let media_type = sniff_media_type(&bytes).unwrap_or("image/jpeg");
        Self::new(id, bytes, media_type)
    }

    /// Read a file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| InputError::ReadFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(path.display().to_string(), bytes))
    }
}

/// MIME type from the file signature, if it is an image format we know.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// List image files in `dir` whose extension matches (case-insensitive).
///
/// Results are sorted by path so batch order is reproducible. An empty result
/// is an error: running a batch over nothing would print a misleading
/// "all done" summary.
pub fn discover_images(dir: impl AsRef<Path>, extensions: &[&str]) -> Result<Vec<PathBuf>, InputError> {
    let dir = dir.as_ref();
    let extensions: Vec<&str> = if extensions.is_empty() {
        DEFAULT_EXTENSIONS.to_vec()
    } else {
        extensions.to_vec()
    };

    if !dir.is_dir() {
        return Err(InputError::DirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| InputError::ReadFailed {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_extension(p, &extensions))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(InputError::NoImages {
            path: dir.to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| format!("*.{e}"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    debug!("Discovered {} images in {}", files.len(), dir.display());
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
