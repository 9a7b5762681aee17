//! File intake: the checks a document must pass before anything reads,
//! decodes or hashes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Largest accepted document, 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Please select a valid PDF file.")]
    NotPdf { mime: String },

    #[error("File size must be less than {}.", size_limit_label(.max))]
    TooLarge { size: u64, max: u64 },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What the caller declares about a file before its bytes are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl FileDescriptor {
    /// Descriptor for a path, with the MIME type guessed from the extension.
    pub fn for_path(path: &Path, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        FileDescriptor {
            mime: mime_from_extension(path).to_string(),
            name,
            size,
        }
    }
}

/// MIME type for the handful of extensions a user is likely to pick.
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Accepts a file whose MIME type mentions `pdf` and whose size is at most
/// `max_size` bytes.
pub fn validate(file: &FileDescriptor, max_size: u64) -> Result<(), IntakeError> {
    if !file.mime.contains("pdf") {
        return Err(IntakeError::NotPdf {
            mime: file.mime.clone(),
        });
    }
    if file.size > max_size {
        return Err(IntakeError::TooLarge {
            size: file.size,
            max: max_size,
        });
    }
    Ok(())
}

/// A validated document and its raw bytes.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    descriptor: FileDescriptor,
    bytes: Arc<[u8]>,
}

impl SelectedFile {
    /// Opens a file from disk.
    ///
    /// The size comes from metadata and is checked before any byte is read;
    /// it is checked again against what was actually read.
    pub async fn open(path: impl AsRef<Path>, max_size: u64) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let io_err = |source| IntakeError::Io {
            path: path.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
        let descriptor = FileDescriptor::for_path(path, metadata.len());
        if let Err(e) = validate(&descriptor, max_size) {
            tracing::info!(name = %descriptor.name, size = descriptor.size, error = %e, "file rejected");
            return Err(e);
        }

        let bytes = tokio::fs::read(path).await.map_err(io_err)?;
        Self::from_bytes(descriptor.name, descriptor.mime, bytes, max_size)
    }

    /// Wraps bytes that already live in memory, applying the same checks.
    pub fn from_bytes(
        name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        max_size: u64,
    ) -> Result<Self, IntakeError> {
        let bytes: Arc<[u8]> = bytes.into();
        let descriptor = FileDescriptor {
            name: name.into(),
            mime: mime.into(),
            size: bytes.len() as u64,
        };
        if let Err(e) = validate(&descriptor, max_size) {
            tracing::info!(name = %descriptor.name, size = descriptor.size, error = %e, "file rejected");
            return Err(e);
        }

        tracing::info!(name = %descriptor.name, size = descriptor.size, "file accepted");
        Ok(SelectedFile { descriptor, bytes })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn mime(&self) -> &str {
        &self.descriptor.mime
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, for the decoder.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// Human-readable size with base-1024 units, e.g. `1.5 KB`, `0 Bytes`.
///
/// At most two decimals; trailing zeros are dropped.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", scaled);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// The size limit as shown to users: `10MB` for the default.
fn size_limit_label(max: &u64) -> String {
    format_file_size(*max).replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(size: u64) -> FileDescriptor {
        FileDescriptor {
            name: "paper.pdf".to_string(),
            mime: "application/pdf".to_string(),
            size,
        }
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        assert!(validate(&pdf(MAX_FILE_SIZE), MAX_FILE_SIZE).is_ok());
        let err = validate(&pdf(MAX_FILE_SIZE + 1), MAX_FILE_SIZE).unwrap_err();
        assert!(matches!(err, IntakeError::TooLarge { .. }));
        assert_eq!(err.to_string(), "File size must be less than 10MB.");
    }

    #[test]
    fn test_size_message_names_configured_limit() {
        let err = validate(&pdf(3 * 1024 * 1024), 2 * 1024 * 1024).unwrap_err();
        assert_eq!(err.to_string(), "File size must be less than 2MB.");

        let err = validate(&pdf(4096), 1536).unwrap_err();
        assert_eq!(err.to_string(), "File size must be less than 1.5KB.");
    }

    #[test]
    fn test_mime_must_mention_pdf() {
        let mut file = pdf(10);
        file.mime = "text/plain".to_string();
        let err = validate(&file, MAX_FILE_SIZE).unwrap_err();
        assert_eq!(err.to_string(), "Please select a valid PDF file.");

        file.mime = "application/x-pdf".to_string();
        assert!(validate(&file, MAX_FILE_SIZE).is_ok());
    }

    #[test]
    fn test_type_is_checked_before_size() {
        let file = FileDescriptor {
            name: "huge.bin".to_string(),
            mime: "application/octet-stream".to_string(),
            size: MAX_FILE_SIZE * 2,
        };
        assert!(matches!(
            validate(&file, MAX_FILE_SIZE),
            Err(IntakeError::NotPdf { .. })
        ));
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension(Path::new("a/b/Paper.PDF")), "application/pdf");
        assert_eq!(mime_from_extension(Path::new("notes.txt")), "text/plain");
        assert_eq!(mime_from_extension(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(50 * 1024 + 123), "50.12 KB");
        assert_eq!(format_file_size(MAX_FILE_SIZE), "10 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn test_from_bytes_measures_real_length() {
        let file = SelectedFile::from_bytes("a.pdf", "application/pdf", vec![0u8; 42], 100).unwrap();
        assert_eq!(file.size(), 42);
        assert_eq!(file.bytes().len(), 42);
        assert!(SelectedFile::from_bytes("a.pdf", "application/pdf", vec![0u8; 101], 100).is_err());
    }
}
