// LogDeck - core/normalize.rs
//
// Rotation-aware path normalization. Pure string manipulation, no I/O.
//
// `normalize` strips, in order, a trailing compression suffix (.gz/.bz2/.xz)
// and then a trailing rotation suffix (.N or .YYYYMMDD) so every rotated or
// archived copy of a log collapses onto the same logical path.

use crate::core::model::Compression;
use std::path::{Path, PathBuf};

/// Rotation suffix recognised after compression has been stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationSuffix {
    /// logrotate numeric suffix, e.g. `.1`.
    Numeric(u32),
    /// Date-stamped suffix, e.g. `.20240101`.
    Dated(u32),
}

/// The pieces `normalize` found on a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub logical: PathBuf,
    pub compression: Option<Compression>,
    pub rotation: Option<RotationSuffix>,
}

impl PathParts {
    /// True when the path is the live (unrotated, uncompressed) file.
    pub fn is_current(&self) -> bool {
        self.compression.is_none() && self.rotation.is_none()
    }
}

/// Strip rotation/compression suffixes from `path` to get its logical identity.
///
/// Idempotent: `normalize(&normalize(p)) == normalize(p)`.
pub fn normalize(path: &Path) -> PathBuf {
    split(path).logical
}

/// Like `normalize`, but also reports which suffixes were removed.
pub fn split(path: &Path) -> PathParts {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return PathParts {
            logical: path.to_path_buf(),
            compression: None,
            rotation: None,
        };
    };

    let (name, compression) = strip_compression(name);
    let (name, rotation) = strip_rotation(name);

    let logical = if compression.is_none() && rotation.is_none() {
        path.to_path_buf()
    } else {
        path.with_file_name(name)
    };

    PathParts {
        logical,
        compression,
        rotation,
    }
}

/// Compression wrapper implied by the file extension, if any.
pub fn compression_of(path: &Path) -> Option<Compression> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Compression::from_extension)
}

fn strip_compression(name: &str) -> (&str, Option<Compression>) {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        // "x.gz.gz" is left alone: stripping once would leave a name that
        // strips again, breaking idempotence.
        if !stem.is_empty() && !ends_with_compression(stem) {
            if let Some(c) = Compression::from_extension(ext) {
                return (stem, Some(c));
            }
        }
    }
    (name, None)
}

fn strip_rotation(name: &str) -> (&str, Option<RotationSuffix>) {
    let Some((stem, suffix)) = name.rsplit_once('.') else {
        return (name, None);
    };
    if stem.is_empty() || suffix.is_empty() || !is_digits(suffix) {
        return (name, None);
    }
    // Refuse ambiguous stems ("app-1.2.3", "x.gz.1") whose remainder would
    // itself look like a rotated or compressed name.
    if ends_with_compression(stem) || last_extension(stem).is_some_and(is_digits) {
        return (name, None);
    }
    let Ok(value) = suffix.parse::<u32>() else {
        return (name, None);
    };
    let rotation = if suffix.len() == 8 {
        RotationSuffix::Dated(value)
    } else {
        RotationSuffix::Numeric(value)
    };
    (stem, Some(rotation))
}

fn last_extension(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

fn ends_with_compression(name: &str) -> bool {
    last_extension(name).is_some_and(|ext| Compression::from_extension(ext).is_some())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Sort key ordering physical variants of one logical file newest-first:
/// the live file, then `.1`, `.2`, ... (numeric), with dated copies ordered
/// by descending date after numeric ones.
pub fn rotation_rank(parts: &PathParts) -> (u8, u64) {
    match parts.rotation {
        None => (0, 0),
        Some(RotationSuffix::Numeric(n)) => (1, u64::from(n)),
        Some(RotationSuffix::Dated(d)) => (2, u64::from(u32::MAX - d)),
    }
}
