//! Durable result store backed by an append-only journal
//!
//! # Record format
//! ```text
//! [body_len: u32 LE]
//! [body: bincode(MonitoringResult)]
//! [checksum: u32 LE]  // CRC32C over body
//! ```
//!
//! The whole journal is replayed into an in-memory index on open. A record
//! cut short at the end of the file, or a final record with a bad checksum,
//! is a torn write: the tail is truncated and the store opens. Any bad
//! record followed by more data is corruption and `open` fails.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32c::crc32c;
use tracing::{debug, info, warn};

use types::monitoring::{MonitorSignedRoot, MonitoringResult, VerificationError};
use types::response::MutationsResponse;

use super::ResultStore;
use crate::error::StoreError;

const LEN_PREFIX: usize = 4;
const CHECKSUM_LEN: usize = 4;

/// Bodies above this size can only come from a corrupted length prefix.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

// ── Record codec ────────────────────────────────────────────────────

fn encode_record(result: &MonitoringResult) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serialize(result)?;
    let body_len = u32::try_from(body.len()).map_err(|_| StoreError::Corruption {
        offset: 0,
        detail: format!("record of {} bytes exceeds the length prefix", body.len()),
    })?;

    let mut buf = Vec::with_capacity(LEN_PREFIX + body.len() + CHECKSUM_LEN);
    buf.extend_from_slice(&body_len.to_le_bytes());
    buf.extend_from_slice(&body);
    buf.extend_from_slice(&crc32c(&body).to_le_bytes());
    Ok(buf)
}

/// Outcome of decoding the record at the start of a byte slice.
enum Decoded {
    Record { result: MonitoringResult, len: usize },
    /// Not enough bytes left for a whole record.
    Truncated,
    Invalid(String),
}

fn decode_record(data: &[u8]) -> Decoded {
    if data.len() < LEN_PREFIX {
        return Decoded::Truncated;
    }
    let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if body_len > MAX_BODY_LEN {
        return Decoded::Invalid(format!("implausible body length {body_len}"));
    }
    let total = LEN_PREFIX + body_len + CHECKSUM_LEN;
    if data.len() < total {
        return Decoded::Truncated;
    }

    let body = &data[LEN_PREFIX..LEN_PREFIX + body_len];
    let stored = &data[LEN_PREFIX + body_len..total];
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    if crc32c(body) != stored {
        return Decoded::Invalid("checksum mismatch".to_string());
    }

    match bincode::deserialize::<MonitoringResult>(body) {
        Ok(result) => Decoded::Record { result, len: total },
        Err(e) => Decoded::Invalid(format!("undecodable body: {e}")),
    }
}

// ── Store ───────────────────────────────────────────────────────────

struct Journal {
    file: File,
    /// Length of the valid prefix of the file.
    len: u64,
    results: BTreeMap<u64, MonitoringResult>,
}

/// Result store persisted to a single journal file.
pub struct FileResultStore {
    path: PathBuf,
    journal: Mutex<Journal>,
}

impl FileResultStore {
    /// Open (or create) the journal at `path` and rebuild the index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (results, valid_len) = replay(&data)?;
        if valid_len < data.len() {
            warn!(
                path = %path.display(),
                offset = valid_len,
                dropped = data.len() - valid_len,
                "Truncating torn journal tail"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            results = results.len(),
            "Opened monitoring result journal"
        );

        Ok(Self {
            path,
            journal: Mutex::new(Journal {
                file,
                len: valid_len as u64,
                results,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parse every record in `data`. Returns the index and the length of the
/// valid prefix.
fn replay(data: &[u8]) -> Result<(BTreeMap<u64, MonitoringResult>, usize), StoreError> {
    let mut results = BTreeMap::new();
    let mut offset = 0usize;

    while offset < data.len() {
        match decode_record(&data[offset..]) {
            Decoded::Record { result, len } => {
                let epoch = result.epoch;
                if results.insert(epoch, result).is_some() {
                    return Err(StoreError::Corruption {
                        offset: offset as u64,
                        detail: format!("epoch {epoch} recorded twice"),
                    });
                }
                offset += len;
            }
            Decoded::Truncated => break,
            Decoded::Invalid(detail) => {
                if is_final_record(&data[offset..]) {
                    break;
                }
                return Err(StoreError::Corruption {
                    offset: offset as u64,
                    detail,
                });
            }
        }
    }

    Ok((results, offset))
}

/// True when the record at the start of `data` (as its length prefix
/// declares it) reaches exactly or past the end of the file.
fn is_final_record(data: &[u8]) -> bool {
    if data.len() < LEN_PREFIX {
        return true;
    }
    let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    LEN_PREFIX.saturating_add(body_len).saturating_add(CHECKSUM_LEN) >= data.len()
}

fn write_synced(file: &mut File, record: &[u8]) -> std::io::Result<()> {
    file.write_all(record)?;
    file.sync_data()
}

impl ResultStore for FileResultStore {
    fn set(
        &self,
        epoch: u64,
        seen_nanos: i64,
        signed_root: Option<MonitorSignedRoot>,
        response: Option<MutationsResponse>,
        errors: Vec<VerificationError>,
    ) -> Result<(), StoreError> {
        let mut journal = self.lock();
        if journal.results.contains_key(&epoch) {
            return Err(StoreError::AlreadyStored { epoch });
        }

        let result = MonitoringResult {
            epoch,
            seen_nanos,
            signed_root,
            errors,
            response,
        };
        let record = encode_record(&result)?;

        if let Err(e) = write_synced(&mut journal.file, &record) {
            // Drop whatever part of the record landed so the next append
            // does not sit behind garbage.
            let len = journal.len;
            if let Err(truncate) = journal.file.set_len(len) {
                warn!(epoch, error = %truncate, "Failed to roll back partial journal write");
            }
            return Err(StoreError::Persistence(e));
        }

        journal.len += record.len() as u64;
        journal.results.insert(epoch, result);
        debug!(epoch, bytes = record.len(), "Persisted monitoring result");
        Ok(())
    }

    fn get(&self, epoch: u64) -> Result<MonitoringResult, StoreError> {
        self.lock()
            .results
            .get(&epoch)
            .cloned()
            .ok_or(StoreError::NotFound { epoch })
    }

    fn latest_epoch(&self) -> u64 {
        self.lock().results.keys().next_back().copied().unwrap_or(0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
