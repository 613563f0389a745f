//! X-ray file storage.
//!
//! Files live under `<upload_root>/doctor_<id>/`. Names are sanitized,
//! content is checked against PNG/JPEG magic bytes, and files are created
//! exclusively so two uploads never overwrite each other: a taken name is
//! retried as `scan_1.png`, `scan_2.png` and so on. Every path is built
//! through a [`PathBoundary`] rooted at the upload directory, so neither a
//! stored path nor a symlink under the root can reach outside it.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use strict_path::{PathBoundary, StrictPath, StrictPathError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClinicConfig;
use crate::models::DoctorId;

const MAX_NAME_LEN: usize = 100;
const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;
const FALLBACK_STEM: &str = "xray";

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("file content does not match an image type: {0}")]
    ContentMismatch(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("file is empty: {0}")]
    Empty(String),

    #[error("invalid stored path: {0}")]
    InvalidPath(String),

    #[error("no free file name for {0}")]
    NameExhausted(String),

    #[error("upload root unusable: {0}")]
    Root(#[source] StrictPathError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// True when the upload itself was unacceptable, as opposed to a
    /// server-side I/O failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            StorageError::Io(_) | StorageError::NameExhausted(_) | StorageError::Root(_)
        )
    }
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// A file written to disk, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub original_name: String,
    /// Relative to the upload root, always `/`-separated
    pub stored_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Detect PNG or JPEG from magic bytes.
pub fn detect_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        _ => None,
    }
}

fn expected_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Reduce a client file name to `[A-Za-z0-9._-]`, with no path separators,
/// no `..` and no leading dot.
pub fn sanitize_filename(name: &str) -> String {
    // keep only the final path segment
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut cleaned = cleaned;
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    let cleaned = cleaned.trim_start_matches('.');

    let (stem, ext) = split_extension(cleaned);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    let ext_len = ext.map(|e| e.len() + 1).unwrap_or(0);
    let stem: String = stem.chars().take(MAX_NAME_LEN.saturating_sub(ext_len)).collect();

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        Some((stem, _)) => (stem, None),
        None => (name, None),
    }
}

fn candidate_name(stem: &str, ext: Option<&str>, attempt: u32) -> String {
    match (attempt, ext) {
        (0, Some(ext)) => format!("{}.{}", stem, ext),
        (0, None) => stem.to_string(),
        (n, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
        (n, None) => format!("{}_{}", stem, n),
    }
}

/// Marker for paths inside the X-ray upload root.
pub struct XrayFiles;

/// Filesystem store for X-ray images.
#[derive(Debug, Clone)]
pub struct XrayStore {
    root: PathBuf,
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl XrayStore {
    pub fn new(config: &ClinicConfig) -> Self {
        Self {
            root: config.upload_root.clone(),
            max_bytes: config.max_upload_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The upload root as a boundary, created on first use.
    fn boundary(&self) -> Result<PathBoundary<XrayFiles>, StorageError> {
        PathBoundary::try_new_create(&self.root).map_err(StorageError::Root)
    }

    /// Check an upload without touching the disk; returns its content type.
    pub fn validate(&self, upload: &Upload) -> Result<&'static str, StorageError> {
        let name = sanitize_filename(&upload.file_name);
        let extension = split_extension(&name)
            .1
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if !self.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(StorageError::UnsupportedType(upload.file_name.clone()));
        }
        if upload.bytes.is_empty() {
            return Err(StorageError::Empty(upload.file_name.clone()));
        }
        let size = upload.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let detected = detect_image_type(&upload.bytes);
        match (detected, expected_type(&extension)) {
            (Some(found), Some(expected)) if found == expected => Ok(found),
            _ => Err(StorageError::ContentMismatch(upload.file_name.clone())),
        }
    }

    /// Validate every upload, then write them all. On failure, files
    /// already written by this call are removed.
    pub fn store_all(&self, doctor: DoctorId, uploads: &[Upload]) -> Result<Vec<StoredFile>, StorageError> {
        let content_types = uploads
            .iter()
            .map(|u| self.validate(u))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stored = Vec::with_capacity(uploads.len());
        for (upload, content_type) in uploads.iter().zip(content_types) {
            match self.write_unique(doctor, upload, content_type) {
                Ok(file) => stored.push(file),
                Err(e) => {
                    self.discard(&stored);
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Validate and write a single upload.
    pub fn store(&self, doctor: DoctorId, upload: &Upload) -> Result<StoredFile, StorageError> {
        let content_type = self.validate(upload)?;
        self.write_unique(doctor, upload, content_type)
    }

    fn write_unique(
        &self,
        doctor: DoctorId,
        upload: &Upload,
        content_type: &str,
    ) -> Result<StoredFile, StorageError> {
        let dir_name = format!("doctor_{}", doctor);
        let dir = self
            .boundary()?
            .strict_join(&dir_name)
            .map_err(|_| StorageError::InvalidPath(dir_name.clone()))?;
        dir.create_dir_all()?;

        let name = sanitize_filename(&upload.file_name);
        let (stem, ext) = split_extension(&name);

        for attempt in 0..MAX_SUFFIX_ATTEMPTS {
            let candidate = candidate_name(stem, ext, attempt);
            let path = dir
                .strict_join(&candidate)
                .map_err(|_| StorageError::InvalidPath(format!("{}/{}", dir_name, candidate)))?;
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.interop_path())
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = file.write_all(&upload.bytes).and_then(|_| file.sync_all()) {
                drop(file);
                let _ = path.remove_file();
                return Err(e.into());
            }

            debug!(stored = %candidate, doctor = %doctor, "Stored x-ray file");
            return Ok(StoredFile {
                original_name: upload.file_name.clone(),
                stored_path: format!("{}/{}", dir_name, candidate),
                content_type: content_type.to_string(),
                size_bytes: upload.bytes.len() as u64,
                sha256: hex::encode(Sha256::digest(&upload.bytes)),
            });
        }

        Err(StorageError::NameExhausted(name))
    }

    /// Resolve a stored relative path, refusing anything that could leave
    /// the upload root.
    fn resolve(&self, stored_path: &str) -> Result<StrictPath<XrayFiles>, StorageError> {
        let invalid = || StorageError::InvalidPath(stored_path.to_string());
        if stored_path.is_empty() || Path::new(stored_path).is_absolute() {
            return Err(invalid());
        }
        self.boundary()?.strict_join(stored_path).map_err(|_| invalid())
    }

    pub fn read(&self, stored_path: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.resolve(stored_path)?.read()?)
    }

    pub fn exists(&self, stored_path: &str) -> bool {
        self.resolve(stored_path).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Remove one file; a file that is already gone is not an error.
    pub fn remove(&self, stored_path: &str) -> Result<(), StorageError> {
        match self.resolve(stored_path)?.remove_file() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal after the owning rows are gone; failures are
    /// logged and otherwise ignored.
    pub fn remove_paths<'a, I>(&self, paths: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for path in paths {
            if let Err(e) = self.remove(path) {
                warn!(stored = %path, error = %e, "Failed to remove x-ray file");
            }
        }
    }

    /// Remove files written by [`store_all`](Self::store_all) whose rows
    /// could not be recorded.
    pub fn discard(&self, files: &[StoredFile]) {
        self.remove_paths(files.iter().map(|f| f.stored_path.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn store() -> (TempDir, XrayStore) {
        let dir = TempDir::new().unwrap();
        let store = XrayStore::new(&ClinicConfig::with_upload_root(dir.path()));
        (dir, store)
    }

    #[test]
    fn sanitize_path_traversal() {
        let result = sanitize_filename("../../etc/passwd.png");
        assert_eq!(result, "passwd.png");
        assert!(!result.contains(".."));
        assert!(!result.contains('/'));
    }

    #[test]
    fn sanitize_windows_path_and_specials() {
        assert_eq!(sanitize_filename("C:\\Users\\me\\chest x-ray (1).PNG"), "chest_x-ray__1_.PNG");
        assert_eq!(sanitize_filename("file\0name.jpg"), "filename.jpg");
    }

    #[test]
    fn sanitize_hidden_and_empty() {
        assert_eq!(sanitize_filename(".png"), "png");
        assert_eq!(sanitize_filename(""), "xray");
        assert_eq!(sanitize_filename("...jpg"), "jpg");
        assert_eq!(sanitize_filename("a..b.png"), "a.b.png");
    }

    #[test]
    fn sanitize_long_name_keeps_extension() {
        let result = sanitize_filename(&format!("{}.jpeg", "a".repeat(300)));
        assert!(result.len() <= 100);
        assert!(result.ends_with(".jpeg"));
    }

    #[test]
    fn detect_magic_bytes() {
        assert_eq!(detect_image_type(PNG), Some("image/png"));
        assert_eq!(detect_image_type(JPEG), Some("image/jpeg"));
        assert_eq!(detect_image_type(b"hello world"), None);
        assert_eq!(detect_image_type(&[]), None);
    }

    #[test]
    fn validate_rejects_bad_uploads() {
        let (_dir, store) = store();

        let text_as_png = Upload::new("scan.png", b"not an image at all".to_vec());
        assert!(matches!(store.validate(&text_as_png), Err(StorageError::ContentMismatch(_))));

        let jpeg_as_png = Upload::new("scan.png", JPEG.to_vec());
        assert!(matches!(store.validate(&jpeg_as_png), Err(StorageError::ContentMismatch(_))));

        let pdf = Upload::new("report.pdf", b"%PDF-1.4".to_vec());
        assert!(matches!(store.validate(&pdf), Err(StorageError::UnsupportedType(_))));

        let empty = Upload::new("scan.png", Vec::new());
        assert!(matches!(store.validate(&empty), Err(StorageError::Empty(_))));

        assert_eq!(store.validate(&Upload::new("SCAN.JPG", JPEG.to_vec())).unwrap(), "image/jpeg");
    }

    #[test]
    fn validate_enforces_size_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = ClinicConfig::with_upload_root(dir.path());
        config.max_upload_bytes = 8;
        let store = XrayStore::new(&config);

        let err = store.validate(&Upload::new("scan.png", PNG.to_vec())).unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 12, limit: 8 }));
        assert!(err.is_rejection());
    }

    #[test]
    fn same_name_gets_suffix() {
        let (dir, store) = store();
        let doctor = DoctorId(3);

        let first = store.store(doctor, &Upload::new("scan.png", PNG.to_vec())).unwrap();
        let second = store.store(doctor, &Upload::new("scan.png", PNG.to_vec())).unwrap();
        let third = store.store(doctor, &Upload::new("scan.png", PNG.to_vec())).unwrap();

        assert_eq!(first.stored_path, "doctor_3/scan.png");
        assert_eq!(second.stored_path, "doctor_3/scan_1.png");
        assert_eq!(third.stored_path, "doctor_3/scan_2.png");
        assert!(dir.path().join("doctor_3").join("scan_1.png").is_file());
        assert_eq!(store.read(&second.stored_path).unwrap(), PNG);
    }

    #[test]
    fn traversal_name_stays_in_doctor_dir() {
        let (dir, store) = store();
        let stored = store
            .store(DoctorId(1), &Upload::new("../../etc/passwd.png", PNG.to_vec()))
            .unwrap();

        assert_eq!(stored.stored_path, "doctor_1/passwd.png");
        assert_eq!(stored.original_name, "../../etc/passwd.png");
        let on_disk = dir.path().join("doctor_1").join("passwd.png");
        assert!(on_disk.starts_with(dir.path().join("doctor_1")));
        assert!(on_disk.is_file());
    }

    #[test]
    fn store_all_is_all_or_nothing() {
        let (dir, store) = store();
        let uploads = vec![
            Upload::new("a.png", PNG.to_vec()),
            Upload::new("b.png", b"garbage".to_vec()),
        ];
        assert!(store.store_all(DoctorId(1), &uploads).is_err());
        assert!(!dir.path().join("doctor_1").join("a.png").exists());
    }

    #[test]
    fn digest_and_removal() {
        let (_dir, store) = store();
        let stored = store.store(DoctorId(1), &Upload::new("a.jpg", JPEG.to_vec())).unwrap();
        assert_eq!(stored.sha256, hex::encode(Sha256::digest(JPEG)));
        assert_eq!(stored.size_bytes, JPEG.len() as u64);

        store.remove(&stored.stored_path).unwrap();
        assert!(!store.exists(&stored.stored_path));
        // removing twice is fine
        store.remove(&stored.stored_path).unwrap();
    }

    #[test]
    fn resolve_rejects_escaping_paths() {
        let (_dir, store) = store();
        assert!(matches!(store.read("../secret"), Err(StorageError::InvalidPath(_))));
        assert!(matches!(store.read("doctor_1/../../secret"), Err(StorageError::InvalidPath(_))));
        assert!(matches!(store.read("/etc/passwd"), Err(StorageError::InvalidPath(_))));
        assert!(matches!(store.read(""), Err(StorageError::InvalidPath(_))));
        assert!(!store.exists("../secret"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_refused() {
        let (dir, store) = store();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.png"), PNG).unwrap();
        std::fs::create_dir_all(dir.path().join("doctor_1")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("doctor_1").join("link")).unwrap();

        assert!(matches!(
            store.read("doctor_1/link/secret.png"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(store.remove("doctor_1/link/secret.png").is_err());
        assert!(outside.path().join("secret.png").is_file());
    }

    #[test]
    fn unusable_root_is_a_server_error() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("uploads");
        std::fs::write(&not_a_dir, b"file").unwrap();
        let store = XrayStore::new(&ClinicConfig::with_upload_root(&not_a_dir));

        let err = store.store(DoctorId(1), &Upload::new("scan.png", PNG.to_vec())).unwrap_err();
        assert!(matches!(err, StorageError::Root(_)), "{:?}", err);
        assert!(!err.is_rejection());
    }

    #[test]
    fn concurrent_same_name_uploads_never_overwrite() {
        const WRITERS: usize = 16;
        let (_dir, store) = store();
        let doctor = DoctorId(7);

        let stored: Vec<StoredFile> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|i| {
                    let store = store.clone();
                    scope.spawn(move || {
                        // Distinct payloads so a lost write would show up as a mismatch.
                        let mut bytes = PNG.to_vec();
                        bytes.extend_from_slice(format!("writer-{}", i).as_bytes());
                        let file = store.store(doctor, &Upload::new("scan.png", bytes.clone())).unwrap();
                        (file, bytes)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    let (file, bytes) = h.join().unwrap();
                    assert_eq!(store.read(&file.stored_path).unwrap(), bytes);
                    file
                })
                .collect()
        });

        let mut paths: Vec<&str> = stored.iter().map(|f| f.stored_path.as_str()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), WRITERS);
        assert!(paths.contains(&"doctor_7/scan.png"));
        assert!(paths.iter().all(|p| p.starts_with("doctor_7/scan")));
    }
}
