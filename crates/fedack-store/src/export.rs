//! JSONL export of the full ledger, with size-based rotation.
//!
//! Each export rewrites the whole file: one [`LedgerEntry`] per line,
//! ordered by `timestamp`. When the existing file is larger than the
//! rotation threshold it is first renamed to `<path>.<unix_ms>.bak`.
//! The new dump is written beside the target and renamed over it, so the
//! export path never holds a partial file. A failed write removes the
//! staged file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use fedack_core::{Clock, LedgerEntry, SystemClock};

use crate::error::Result;
use crate::traits::AckStore;

/// Rotate the export once it exceeds this many bytes.
pub const DEFAULT_ROTATE_BYTES: u64 = 5 * 1024 * 1024;

/// What an export did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub rows: usize,
    pub bytes_written: u64,
    /// Backup path, when the previous export was rotated away.
    pub rotated_to: Option<PathBuf>,
}

/// Writes full-ledger JSONL dumps to a fixed path.
#[derive(Clone)]
pub struct JsonlExporter {
    path: PathBuf,
    rotate_bytes: u64,
    clock: Arc<dyn Clock>,
}

impl JsonlExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotate_bytes: DEFAULT_ROTATE_BYTES,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_rotate_bytes(mut self, rotate_bytes: u64) -> Self {
        self.rotate_bytes = rotate_bytes;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the export file, 0 if it does not exist.
    pub fn size_bytes(&self) -> Result<u64> {
        file_size(&self.path)
    }

    /// Dump every ACK in `store` to the export path.
    pub fn export<S: AckStore + ?Sized>(&self, store: &S) -> Result<ExportReport> {
        let rotated_to = self.rotate_if_needed()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let entries = store.all_acks()?;
        let staging = sibling(&self.path, "tmp");

        let written = write_jsonl(&staging, &entries).and_then(|bytes| {
            fs::rename(&staging, &self.path)?;
            Ok(bytes)
        });
        let bytes_written = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e);
            }
        };

        info!(
            rows = entries.len(),
            bytes = bytes_written,
            path = %self.path.display(),
            "exported ack ledger"
        );

        Ok(ExportReport {
            rows: entries.len(),
            bytes_written,
            rotated_to,
        })
    }

    fn rotate_if_needed(&self) -> Result<Option<PathBuf>> {
        if file_size(&self.path)? <= self.rotate_bytes {
            return Ok(None);
        }

        let mut stamp = self.clock.now_millis();
        let mut backup = sibling(&self.path, &format!("{stamp}.bak"));
        while backup.exists() {
            stamp += 1;
            backup = sibling(&self.path, &format!("{stamp}.bak"));
        }

        fs::rename(&self.path, &backup)?;
        info!(backup = %backup.display(), "rotated ack ledger export");
        Ok(Some(backup))
    }
}

impl std::fmt::Debug for JsonlExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlExporter")
            .field("path", &self.path)
            .field("rotate_bytes", &self.rotate_bytes)
            .finish()
    }
}

fn write_jsonl(path: &Path, entries: &[LedgerEntry]) -> Result<u64> {
    let mut bytes_written = 0u64;
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in entries {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        bytes_written += line.len() as u64;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes_written)
}

/// `<path>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn file_size(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
