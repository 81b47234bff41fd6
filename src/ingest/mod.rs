//! Shared acceptance protocol for the three intake flows.
//!
//! A drop is classified against an [`AcceptPolicy`] into accepted files and
//! [`Rejection`]s carrying one or more reason codes. The flows in the
//! submodules decide what to do with accepted files.

pub mod audio;
pub mod breakdown;
pub mod images;

use crate::breakdown::BreakdownError;
use crate::lyrics::LyricsError;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub enum ByteSource {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

impl ByteSource {
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            Self::File(path) => Ok(Box::new(File::open(path)?)),
        }
    }

    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.to_vec()),
            Self::File(path) => fs::read(path),
        }
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        String::from_utf8(self.read_all()?)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::File(path) => Some(path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DroppedFile {
    pub name: String,
    pub declared_type: String,
    pub size: u64,
    pub source: ByteSource,
}

impl DroppedFile {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            declared_type: declared_type_for(&name).to_string(),
            name,
            size: metadata.len(),
            source: ByteSource::File(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.to_string(),
            declared_type: declared_type_for(name).to_string(),
            size: bytes.len() as u64,
            source: ByteSource::Memory(bytes),
        }
    }

    pub fn with_declared_type(mut self, declared_type: &str) -> Self {
        self.declared_type = declared_type.to_string();
        self
    }

    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        (!stem.is_empty()).then(|| format!(".{}", ext.to_ascii_lowercase()))
    }
}

/// An accepted file held by a flow. `preview` is what the UI shows for it
/// until a remote URL replaces it.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub name: String,
    pub source: ByteSource,
    pub preview: String,
}

impl From<DroppedFile> for MediaAsset {
    fn from(file: DroppedFile) -> Self {
        let preview = match &file.source {
            ByteSource::File(path) => path.display().to_string(),
            ByteSource::Memory(_) => format!("memory:{}", file.name),
        };
        Self {
            name: file.name,
            source: file.source,
            preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("File size exceeds {}MB limit", format_megabytes(*limit_bytes))]
    FileTooLarge { limit_bytes: u64 },
    #[error("File type {declared:?} is not accepted")]
    InvalidType { declared: String },
    #[error("Only one file can be dropped here")]
    TooManyFiles,
    #[error("File could not be read: {0}")]
    Unreadable(String),
    #[error("{0}")]
    Breakdown(BreakdownError),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileTooLarge { .. } => "file-too-large",
            Self::InvalidType { .. } => "file-invalid-type",
            Self::TooManyFiles => "too-many-files",
            Self::Unreadable(_) => "file-unreadable",
            Self::Breakdown(err) => err.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub reasons: Vec<RejectReason>,
}

impl Rejection {
    pub fn new(file_name: &str, reason: RejectReason) -> Self {
        Self {
            file_name: file_name.to_string(),
            reasons: vec![reason],
        }
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(RejectReason::code).collect()
    }
}

/// Rejected entries kept for listing until dismissed.
#[derive(Debug, Clone, Default)]
pub struct RejectionList {
    entries: Vec<Rejection>,
}

impl RejectionList {
    pub fn replace(&mut self, entries: Vec<Rejection>) {
        self.entries = entries;
    }

    pub fn extend(&mut self, entries: Vec<Rejection>) {
        self.entries.extend(entries);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !same_file_name(&entry.file_name, name));
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rejection> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub mime: &'static str,
    pub extensions: &'static [&'static str],
}

impl TypeRule {
    fn matches(&self, file: &DroppedFile) -> bool {
        let declared = file.declared_type.to_ascii_lowercase();
        let mime_match = match self.mime.strip_suffix("/*") {
            Some(family) => declared
                .split_once('/')
                .is_some_and(|(head, _)| head == family),
            None => declared == self.mime,
        };
        mime_match
            || file
                .extension()
                .is_some_and(|ext| self.extensions.contains(&ext.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct AcceptPolicy {
    pub rules: Vec<TypeRule>,
    pub max_bytes: u64,
    pub multiple: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DropOutcome {
    pub accepted: Vec<DroppedFile>,
    pub rejected: Vec<Rejection>,
}

impl AcceptPolicy {
    pub fn images(limit_mb: f64) -> Self {
        Self {
            rules: vec![TypeRule {
                mime: "image/*",
                extensions: &[],
            }],
            max_bytes: size_ceiling(limit_mb),
            multiple: true,
        }
    }

    pub fn audio_lyrics(limit_mb: f64) -> Self {
        Self {
            rules: vec![
                TypeRule {
                    mime: "audio/*",
                    extensions: &[],
                },
                TypeRule {
                    mime: "text/plain",
                    extensions: &[".lrc", ".txt"],
                },
            ],
            max_bytes: size_ceiling(limit_mb),
            multiple: false,
        }
    }

    pub fn breakdown(limit_mb: f64) -> Self {
        Self {
            rules: vec![TypeRule {
                mime: "application/json",
                extensions: &[".bkdn", ".json"],
            }],
            max_bytes: size_ceiling(limit_mb),
            multiple: false,
        }
    }

    pub fn classify(&self, files: Vec<DroppedFile>) -> DropOutcome {
        let too_many = !self.multiple && files.len() > 1;
        let mut outcome = DropOutcome::default();

        for file in files {
            let mut reasons = Vec::new();
            if !self.rules.iter().any(|rule| rule.matches(&file)) {
                reasons.push(RejectReason::InvalidType {
                    declared: file.declared_type.clone(),
                });
            }
            if file.size > self.max_bytes {
                reasons.push(RejectReason::FileTooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
            if too_many {
                reasons.push(RejectReason::TooManyFiles);
            }

            if reasons.is_empty() {
                outcome.accepted.push(file);
            } else {
                let codes: Vec<_> = reasons.iter().map(RejectReason::code).collect();
                debug!(file = %file.name, ?codes, "file rejected");
                outcome.rejected.push(Rejection {
                    file_name: file.name,
                    reasons,
                });
            }
        }

        outcome
    }
}

pub fn size_ceiling(limit_mb: f64) -> u64 {
    (limit_mb.max(0.0) * 1024.0 * 1000.0) as u64
}

fn format_megabytes(limit_bytes: u64) -> String {
    let mb = limit_bytes as f64 / (1024.0 * 1000.0);
    let rounded = (mb * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as u64)
    } else {
        format!("{rounded:.1}")
    }
}

/// MIME type a browser would report for `name`; empty when unknown.
pub fn declared_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "",
    }
}

/// Turns dropped paths into files, walking directories. Paths that cannot be
/// read become rejections instead of failing the whole drop.
pub fn expand_drop(paths: &[PathBuf]) -> (Vec<DroppedFile>, Vec<Rejection>) {
    let mut candidates = Vec::new();
    let mut unreadable = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false) {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        candidates.push(entry.into_path())
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(path = %path.display(), "walk failed: {err}");
                        let name = err
                            .path()
                            .unwrap_or(path.as_path())
                            .display()
                            .to_string();
                        unreadable.push(Rejection::new(
                            &name,
                            RejectReason::Unreadable(err.to_string()),
                        ));
                    }
                }
            }
        } else {
            candidates.push(path.clone());
        }
    }

    candidates.sort();
    let mut files = Vec::with_capacity(candidates.len());
    for path in candidates {
        match DroppedFile::from_path(&path) {
            Ok(file) => files.push(file),
            Err(err) => unreadable.push(Rejection::new(
                &path.display().to_string(),
                RejectReason::Unreadable(err.to_string()),
            )),
        }
    }
    (files, unreadable)
}

/// Filename identity, compared after NFC normalisation.
pub fn same_file_name(left: &str, right: &str) -> bool {
    left == right || left.nfc().eq(right.nfc())
}

/// Name without its final extension; the whole name when there is none.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("nothing to submit")]
    NothingToSubmit,
    #[error("an upload batch is still in flight")]
    UploadInProgress,
    #[error("an audio file is required")]
    MissingAudio,
    #[error("a lyrics file is required")]
    MissingLyrics,
    #[error(transparent)]
    Lyrics(#[from] LyricsError),
    #[error("file could not be read: {0}")]
    Unreadable(String),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NothingToSubmit => "nothing-to-submit",
            Self::UploadInProgress => "upload-in-progress",
            Self::MissingAudio => "missing-audio",
            Self::MissingLyrics => "missing-lyrics",
            Self::Lyrics(err) => err.code(),
            Self::Unreadable(_) => "file-unreadable",
        }
    }
}
