use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use roam_event::StorageUpdateEvent;
use roam_types::SourceAddress;

use crate::clock::{HybridLogicalClock, Timestamp};
use crate::entry::EventStreamEntry;
use crate::error::{StreamError, StreamResult};
use crate::log::EventLog;
use crate::stream::EventStream;

/// Flush/sync strategy for the log file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// `fsync` on the first append after the interval has elapsed.
    Periodic(Duration),
    /// Flush to the OS and let it decide when to write back.
    #[default]
    OsDefault,
}

/// Configuration for a [`WalEventLog`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Sync strategy.
    pub sync_mode: SyncMode,
    /// Drop recovered entries whose id does not match their content.
    pub verify_on_recover: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            verify_on_recover: true,
        }
    }
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct WalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the file.
    offset: u64,
    last_sync: Instant,
}

impl WalWriter {
    /// Write one record and return its offset.
    fn write_record(&mut self, entry: &EventStreamEntry, mode: &SyncMode) -> StreamResult<u64> {
        let payload =
            bincode::serialize(entry).map_err(|e| StreamError::Serialization(e.to_string()))?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);
        let entry_offset = self.offset;

        self.writer.write_all(&length.to_le_bytes())?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;

        let sync = match mode {
            SyncMode::EveryWrite => true,
            SyncMode::Periodic(interval) => self.last_sync.elapsed() >= *interval,
            SyncMode::OsDefault => false,
        };
        if sync {
            self.writer.get_ref().sync_all()?;
            self.last_sync = Instant::now();
        }

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        Ok(entry_offset)
    }
}

/// State shared with the blocking writer task.
struct WalShared {
    source: SourceAddress,
    clock: HybridLogicalClock,
    writer: Mutex<WalWriter>,
    stream: RwLock<EventStream>,
}

impl WalShared {
    /// Stamp and persist one entry, then index it. The writer lock is held
    /// throughout, so file order matches timestamp order.
    fn append(
        &self,
        target_id: String,
        event: StorageUpdateEvent,
        mode: &SyncMode,
    ) -> StreamResult<(EventStreamEntry, u64)> {
        let mut writer = self.writer.lock().expect("WAL mutex poisoned");
        let entry = EventStreamEntry::new(target_id, event, self.clock.now(), self.source.clone());
        let offset = writer.write_record(&entry, mode)?;
        self.stream
            .write()
            .expect("lock poisoned")
            .append(entry.clone())?;
        Ok((entry, offset))
    }
}

/// Result of scanning a log file front-to-back.
struct Recovered {
    entries: Vec<EventStreamEntry>,
    /// End of the last complete record; anything after it is a torn write.
    valid_len: u64,
}

/// Crash-recoverable [`EventLog`] backed by a single file.
///
/// On-disk format, one record per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized EventStreamEntry)]
/// ```
///
/// Opening the log replays the file. Records failing the CRC check are
/// skipped; a record cut short by a crash ends recovery and is truncated
/// away so later appends start on a clean boundary.
///
/// Appends run on tokio's blocking pool, so an `fsync` never stalls an
/// async worker.
pub struct WalEventLog {
    path: PathBuf,
    shared: Arc<WalShared>,
    config: WalConfig,
}

impl WalEventLog {
    /// Open (or create) the log at `path` for `source`.
    pub fn open(path: &Path, source: SourceAddress, config: WalConfig) -> StreamResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let recovered = Self::scan(path, config.verify_on_recover)?;
        if file.metadata()?.len() > recovered.valid_len {
            warn!(
                path = %path.display(),
                valid_len = recovered.valid_len,
                "truncating torn tail"
            );
            file.set_len(recovered.valid_len)?;
        }

        let mut stream = EventStream::new(source.clone());
        for entry in recovered.entries {
            if let Err(e) = stream.append(entry) {
                warn!(error = %e, "skipping recovered entry");
            }
        }

        let clock = match stream.head() {
            Some(head) => HybridLogicalClock::starting_after(head.timestamp),
            None => HybridLogicalClock::new(),
        };

        info!(
            path = %path.display(),
            source = %source,
            entries = stream.len(),
            "opened local log"
        );

        Ok(Self {
            path: path.to_path_buf(),
            shared: Arc::new(WalShared {
                source,
                clock,
                writer: Mutex::new(WalWriter {
                    writer: BufWriter::new(file),
                    offset: recovered.valid_len,
                    last_sync: Instant::now(),
                }),
                stream: RwLock::new(stream),
            }),
            config,
        })
    }

    /// Re-read every valid entry from the file.
    pub fn recover(&self) -> StreamResult<Vec<EventStreamEntry>> {
        Ok(Self::scan(&self.path, self.config.verify_on_recover)?.entries)
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.shared.writer.lock().expect("WAL mutex poisoned").offset
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(path: &Path, verify: bool) -> StreamResult<Recovered> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "invalid record length; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated record; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let record_end = offset + HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping record"
                );
                offset = record_end;
                continue;
            }

            match bincode::deserialize::<EventStreamEntry>(&payload) {
                Ok(entry) if verify && !entry.verify_integrity() => {
                    warn!(offset, entry = %entry.id, "entry id mismatch; skipping record");
                }
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(offset, error = %e, "failed to deserialize record; skipping");
                }
            }

            offset = record_end;
        }

        debug!(recovered = entries.len(), valid_len = offset, "log scan complete");
        Ok(Recovered {
            entries,
            valid_len: offset,
        })
    }
}

#[async_trait]
impl EventLog for WalEventLog {
    fn source(&self) -> &SourceAddress {
        &self.shared.source
    }

    async fn append(
        &self,
        target_id: &str,
        event: StorageUpdateEvent,
    ) -> StreamResult<EventStreamEntry> {
        let shared = Arc::clone(&self.shared);
        let target_id = target_id.to_string();
        let mode = self.config.sync_mode.clone();
        let (entry, offset) =
            tokio::task::spawn_blocking(move || shared.append(target_id, event, &mode))
                .await
                .map_err(io::Error::from)??;
        debug!(
            entry = %entry.id,
            target = %entry.target_id,
            kind = %entry.event.kind(),
            offset,
            "appended to local log"
        );
        Ok(entry)
    }

    async fn entries(&self) -> StreamResult<Vec<EventStreamEntry>> {
        Ok(self.shared.stream.read().expect("lock poisoned").entries().to_vec())
    }

    async fn head(&self) -> StreamResult<Option<EventStreamEntry>> {
        Ok(self.shared.stream.read().expect("lock poisoned").head().cloned())
    }

    fn witness(&self, timestamp: &Timestamp) {
        self.shared.clock.witness(timestamp);
    }

    async fn snapshot(&self) -> StreamResult<EventStream> {
        Ok(self.shared.stream.read().expect("lock poisoned").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn source() -> SourceAddress {
        SourceAddress::from_key_name("local")
    }

    fn create(name: &str) -> StorageUpdateEvent {
        StorageUpdateEvent::create_file("root", format!("root/{name}"), name, false)
    }

    #[tokio::test]
    async fn append_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.wal");

        let written = {
            let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
            let mut written = Vec::new();
            for name in ["a", "b", "c"] {
                written.push(log.append("root", create(name)).await.unwrap());
            }
            written
        };

        let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
        assert_eq!(log.entries().await.unwrap(), written);
        assert_eq!(log.recover().unwrap(), written);

        // The clock resumes after the recovered head.
        let next = log.append("root", create("d")).await.unwrap();
        assert!(next.timestamp > written[2].timestamp);
    }

    #[tokio::test]
    async fn recover_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = WalEventLog::open(&dir.path().join("empty.wal"), source(), WalConfig::default())
            .unwrap();
        assert!(log.recover().unwrap().is_empty());
        assert_eq!(log.head().await.unwrap(), None);
        assert_eq!(log.offset(), 0);
    }

    #[tokio::test]
    async fn crc_mismatch_skips_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wal");
        let second = {
            let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
            log.append("root", create("a")).await.unwrap();
            log.append("root", create("b")).await.unwrap()
        };

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
        assert_eq!(log.entries().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn torn_tail_is_truncated_and_appends_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wal");
        let (first, total_len) = {
            let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
            let first = log.append("root", create("a")).await.unwrap();
            log.append("root", create("b")).await.unwrap();
            (first, log.offset())
        };

        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 4).unwrap();
        }

        let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
        assert_eq!(log.entries().await.unwrap(), vec![first.clone()]);
        assert_eq!(log.offset(), fs::metadata(&path).unwrap().len());

        let third = log.append("root", create("c")).await.unwrap();
        drop(log);

        let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
        assert_eq!(log.entries().await.unwrap(), vec![first, third]);
    }

    #[tokio::test]
    async fn every_write_sync_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
            ..WalConfig::default()
        };
        let log = WalEventLog::open(&dir.path().join("sync.wal"), source(), config).unwrap();
        log.append("root", create("a")).await.unwrap();
        assert_eq!(log.recover().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn periodic_sync_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::Periodic(Duration::from_millis(0)),
            ..WalConfig::default()
        };
        let log = WalEventLog::open(&dir.path().join("periodic.wal"), source(), config).unwrap();
        log.append("root", create("a")).await.unwrap();
        log.append("root", create("b")).await.unwrap();
        assert_eq!(log.recover().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_timestamp_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concurrent.wal");
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
            ..WalConfig::default()
        };
        let log = Arc::new(WalEventLog::open(&path, source(), config).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let log = Arc::clone(&log);
                tokio::spawn(async move { log.append("root", create(&format!("f{i}"))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 16);
        assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(log.recover().unwrap(), entries);
    }

    #[tokio::test]
    async fn foreign_entries_are_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.wal");
        {
            let log = WalEventLog::open(&path, source(), WalConfig::default()).unwrap();
            log.append("root", create("a")).await.unwrap();
        }
        let other = SourceAddress::from_key_name("other");
        let log = WalEventLog::open(&path, other, WalConfig::default()).unwrap();
        assert!(log.entries().await.unwrap().is_empty());
        assert_eq!(log.recover().unwrap().len(), 1);
    }
}
