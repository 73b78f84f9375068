// crates/fedis-bench-core/src/store.rs
// ============================================================================
// Module: Result Store
// Description: Atomic persistence of metrics records and threshold loading.
// Purpose: Never leave a partial results document behind.
// Dependencies: crate::record, serde, serde_json, thiserror, toml
// ============================================================================

//! ## Overview
//! Records are written to a unique sibling temp file, synced, then renamed
//! over the destination, so readers observe either the previous document or
//! the new one. Loads are size-limited and must be UTF-8. A missing results
//! file is reported separately from an unreadable one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::record::MetricsRecord;
use crate::record::QuickThresholds;
use crate::record::ThresholdRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted size of any document read by the store.
pub const MAX_DOCUMENT_SIZE: u64 = 1024 * 1024;
/// Attempts made to allocate a unique temp file.
const TEMP_ATTEMPTS: usize = 16;
/// Per-process temp file counter.
static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Result store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The document does not exist.
    #[error("missing file: {}", path.display())]
    Missing {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// Reading or writing failed.
    #[error("io error on {}: {message}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Error description.
        message: String,
    },
    /// The document exceeds [`MAX_DOCUMENT_SIZE`] or is not UTF-8.
    #[error("invalid document {}: {message}", path.display())]
    Invalid {
        /// Path involved.
        path: PathBuf,
        /// Error description.
        message: String,
    },
    /// The document did not deserialize.
    #[error("failed to parse {}: {message}", path.display())]
    Parse {
        /// Path involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// The record did not serialize.
    #[error("failed to serialize record: {0}")]
    Serialize(String),
}

// ============================================================================
// SECTION: Save
// ============================================================================

/// Writes `record` to `path` as pretty JSON, replacing any previous document.
///
/// # Errors
///
/// Returns [`StoreError`] when serialization or any filesystem step fails.
/// On failure the destination is left untouched.
pub fn save_record(record: &MetricsRecord, path: &Path) -> Result<(), StoreError> {
    let mut contents =
        serde_json::to_string_pretty(record).map_err(|err| StoreError::Serialize(err.to_string()))?;
    contents.push('\n');
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| io_error(parent, &err))?;
    }
    let (temp_path, mut file) = create_temp_file(path)?;
    if let Err(err) = file.write_all(contents.as_bytes()).and_then(|()| file.sync_all()) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(&temp_path, &err));
    }
    drop(file);
    persist_temp_file(&temp_path, path)
}

/// Creates a unique temp file next to `path`.
fn create_temp_file(path: &Path) -> Result<(PathBuf, fs::File), StoreError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name =
        path.file_name().and_then(|name| name.to_str()).ok_or_else(|| StoreError::Invalid {
            path: path.to_path_buf(),
            message: "output path does not include a file name".to_string(),
        })?;
    for _ in 0 .. TEMP_ATTEMPTS {
        let attempt = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = parent.join(format!(".{file_name}.tmp.{}.{attempt}", std::process::id()));
        match OpenOptions::new().write(true).create_new(true).open(&temp_path) {
            Ok(file) => return Ok((temp_path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(io_error(&temp_path, &err)),
        }
    }
    Err(StoreError::Io {
        path: path.to_path_buf(),
        message: "failed to allocate temporary output path".to_string(),
    })
}

/// Renames the temp file over the destination.
fn persist_temp_file(temp_path: &Path, path: &Path) -> Result<(), StoreError> {
    match fs::rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            // Platforms without replace-on-rename need the old file gone first.
            if path.exists() {
                fs::remove_file(path).map_err(|err| io_error(path, &err))?;
                fs::rename(temp_path, path).map_err(|err| io_error(path, &err))?;
                return Ok(());
            }
            let _ = fs::remove_file(temp_path);
            Err(io_error(path, &err))
        }
    }
}

// ============================================================================
// SECTION: Load
// ============================================================================

/// Reads a metrics record written by [`save_record`].
///
/// # Errors
///
/// Returns [`StoreError::Missing`] when the file does not exist, or another
/// [`StoreError`] when it cannot be read or parsed.
pub fn load_record(path: &Path) -> Result<MetricsRecord, StoreError> {
    let content = read_document(path)?;
    parse_json(path, &content)
}

/// Reads regression limits from JSON, or TOML for a `.toml` path.
///
/// # Errors
///
/// Returns [`StoreError`] when the file is missing, unreadable, or malformed.
pub fn load_thresholds(path: &Path) -> Result<ThresholdRecord, StoreError> {
    load_structured(path)
}

/// Reads quick-gate limits from JSON, or TOML for a `.toml` path.
///
/// # Errors
///
/// Returns [`StoreError`] when the file is missing, unreadable, or malformed.
pub fn load_quick_thresholds(path: &Path) -> Result<QuickThresholds, StoreError> {
    load_structured(path)
}

/// Reads and decodes a document, selecting the format by extension.
fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = read_document(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(|err| StoreError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    } else {
        parse_json(path, &content)
    }
}

/// Decodes a JSON document.
fn parse_json<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, StoreError> {
    serde_json::from_str(content).map_err(|err| StoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Reads a size-limited UTF-8 document.
fn read_document(path: &Path) -> Result<String, StoreError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StoreError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(io_error(path, &err)),
    };
    if metadata.len() > MAX_DOCUMENT_SIZE {
        return Err(StoreError::Invalid {
            path: path.to_path_buf(),
            message: "document exceeds size limit".to_string(),
        });
    }
    let bytes = fs::read(path).map_err(|err| io_error(path, &err))?;
    String::from_utf8(bytes).map_err(|_| StoreError::Invalid {
        path: path.to_path_buf(),
        message: "document must be utf-8".to_string(),
    })
}

/// Wraps an I/O error with its path.
fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::fs;

    use super::StoreError;
    use super::load_quick_thresholds;
    use super::load_record;
    use super::load_thresholds;

    #[test]
    fn missing_record_is_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_results.json");
        assert_eq!(
            load_record(&path),
            Err(StoreError::Missing {
                path,
            })
        );
    }

    #[test]
    fn malformed_record_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_results.json");
        fs::write(&path, "{\"single\": ").unwrap();
        assert!(matches!(load_record(&path), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn non_utf8_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(load_thresholds(&path), Err(StoreError::Invalid { .. })));
    }

    #[test]
    fn thresholds_load_from_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.toml");
        let contents = "[single]\nset_ops_sec_min = 500.0\n\n\
                        [concurrent]\nget_ops_sec_min = 900.0\n";
        fs::write(&path, contents).unwrap();
        let limits = load_thresholds(&path).unwrap();
        assert_eq!(limits.single.set_ops_sec_min, Some(500.0));
        assert_eq!(limits.concurrent.get_ops_sec_min, Some(900.0));
        assert_eq!(limits.single.ping_p99_ms_max, None);
    }

    #[test]
    fn quick_thresholds_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        let contents =
            r#"{"duration_sec": 2, "set_ops_per_sec_min": 800, "get_ops_per_sec_min": 900}"#;
        fs::write(&path, contents).unwrap();
        let limits = load_quick_thresholds(&path).unwrap();
        assert_eq!(limits.duration_sec, 2);
        assert!((limits.get_ops_per_sec_min - 900.0).abs() < f64::EPSILON);
    }
}
