//! Runtime audit telemetry.
//!
//! Every security-relevant action in the kernel (TEMPEST transitions, policy
//! denials, captures) lands in a bounded in-memory ring and, at the host
//! loop's convenience, gets flushed to a sink as a digest-chained chunk.
//! The ring never blocks an emitter: when full it drops the oldest event and
//! counts the drop. Chunk signing is a hardware seam; the in-tree signer is
//! an explicit stub.

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

pub const DEFAULT_RING_CAPACITY: usize = 4096;

/// Instrumentation profile, in increasing verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    Off,
    #[default]
    Ops,
    Exercise,
    Forensic,
}

impl Profile {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "ops" => Ok(Self::Ops),
            "exercise" => Ok(Self::Exercise),
            "forensic" => Ok(Self::Forensic),
            other => Err(Error::InvalidArgument(format!(
                "unknown telemetry profile '{}'; expected off|ops|exercise|forensic",
                other
            ))),
        }
    }

    fn admits(self, severity: Severity) -> bool {
        match self {
            Self::Off => false,
            Self::Ops => severity >= Severity::Info,
            Self::Exercise | Self::Forensic => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Medium | Self::High => log::Level::Warn,
            Self::Critical => log::Level::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    DeviceOpen,
    DeviceClose,
    CaptureStart,
    CaptureStop,
    FrameAcquired,
    FrameDropped,
    TempestTransition,
    TempestQuery,
    TempestLockdown,
    MetaRead,
    FusedCapture,
    PolicyViolation,
    Error,
}

/// One audit record. `aux` is event-specific (for TEMPEST transitions it
/// packs `old << 16 | new`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts_ns: u64,
    pub dev_id: u32,
    pub event_type: EventType,
    pub severity: Severity,
    pub aux: u32,
    pub layer: u32,
    pub role: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RingStats {
    pub emitted: u64,
    pub dropped: u64,
    pub flushed: u64,
    pub usage: usize,
    pub capacity: usize,
}

/// Bounded drop-oldest ring.
pub struct EventRing {
    events: VecDeque<AuditEvent>,
    capacity: usize,
    emitted: u64,
    dropped: u64,
    flushed: u64,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_RING_CAPACITY)),
            capacity: capacity.max(1),
            emitted: 0,
            dropped: 0,
            flushed: 0,
        }
    }

    pub fn push(&mut self, event: AuditEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
        self.emitted += 1;
    }

    pub fn drain(&mut self) -> Vec<AuditEvent> {
        self.events.drain(..).collect()
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            emitted: self.emitted,
            dropped: self.dropped,
            flushed: self.flushed,
            usage: self.events.len(),
            capacity: self.capacity,
        }
    }
}

/// Shared emission handle. Cheap to clone; one per process is typical, with
/// every device controller holding a clone.
#[derive(Clone)]
pub struct EventLog {
    ring: Arc<Mutex<EventRing>>,
    profile: Profile,
}

impl EventLog {
    pub fn new(capacity: usize, profile: Profile) -> Self {
        Self {
            ring: Arc::new(Mutex::new(EventRing::new(capacity))),
            profile,
        }
    }

    pub fn emit(&self, event: AuditEvent) {
        if !self.profile.admits(event.severity) {
            return;
        }
        log::log!(
            event.severity.log_level(),
            "audit dev={} layer={} role={} {:?} aux={:#x}",
            event.dev_id,
            event.layer,
            event.role,
            event.event_type,
            event.aux
        );
        if let Ok(mut ring) = self.ring.lock() {
            ring.push(event);
        }
    }

    pub fn emit_simple(
        &self,
        dev_id: u32,
        event_type: EventType,
        severity: Severity,
        aux: u32,
    ) {
        self.emit(AuditEvent {
            ts_ns: now_ns(),
            dev_id,
            event_type,
            severity,
            aux,
            layer: 0,
            role: String::new(),
        });
    }

    pub fn drain(&self) -> Vec<AuditEvent> {
        self.ring.lock().map(|mut r| r.drain()).unwrap_or_default()
    }

    pub fn stats(&self) -> RingStats {
        self.ring.lock().map(|r| r.stats()).unwrap_or_default()
    }

    fn add_flushed(&self, count: u64) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.flushed += count;
        }
    }

    /// Put drained events back at the front after a failed flush, preserving
    /// order. Events that no longer fit (the ring refilled meanwhile) are
    /// the oldest and fall off, as they would have anyway.
    fn restore(&self, events: Vec<AuditEvent>) {
        if let Ok(mut ring) = self.ring.lock() {
            for event in events.into_iter().rev() {
                if ring.events.len() >= ring.capacity {
                    ring.dropped += 1;
                    continue;
                }
                ring.events.push_front(event);
            }
        }
    }
}

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// -------------------- Flush chunks --------------------

/// A flushed batch of events. `digest` chains over the previous chunk's
/// digest, so a sink's chunk sequence is tamper-evident end to end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventChunk {
    pub chunk_id: u64,
    pub ts_ns: u64,
    pub prev_digest: [u8; 32],
    pub digest: [u8; 32],
    pub events: Vec<AuditEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

/// Hashes a chunk payload with the previous chain digest.
pub fn hash_chunk(prev_digest: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_digest);
    hasher.update(payload);
    hasher.finalize().into()
}

/// Hardware signing seam for forensic chunk export. Real deployments back
/// this with a TPM key; the kernel itself never holds key material.
pub trait ChunkSigner {
    fn sign(&mut self, digest: &[u8; 32]) -> Result<Vec<u8>>;
}

/// In-tree stand-in for the platform signer.
pub struct StubChunkSigner;

impl ChunkSigner for StubChunkSigner {
    fn sign(&mut self, _digest: &[u8; 32]) -> Result<Vec<u8>> {
        Err(Error::NotSupported(
            "chunk signing requires a platform hardware key".to_string(),
        ))
    }
}

pub trait EventSink {
    fn write_chunk(&mut self, chunk: &EventChunk) -> AnyResult<()>;
}

/// Drains the event log into digest-chained chunks and hands them to a sink.
pub struct ChunkWriter {
    prev_digest: [u8; 32],
    next_chunk_id: u64,
    signer: Option<Box<dyn ChunkSigner + Send>>,
}

impl ChunkWriter {
    pub fn new(signer: Option<Box<dyn ChunkSigner + Send>>) -> Self {
        Self {
            prev_digest: [0u8; 32],
            next_chunk_id: 0,
            signer,
        }
    }

    /// Flush pending events as one chunk. Returns the number of events
    /// flushed; zero pending events writes nothing. On a signer or sink
    /// failure the drained events go back into the ring — a broken sink must
    /// not eat the audit trail.
    pub fn flush(&mut self, log: &EventLog, sink: &mut dyn EventSink) -> AnyResult<usize> {
        let events = log.drain();
        if events.is_empty() {
            return Ok(0);
        }

        let payload = match serde_json::to_vec(&events) {
            Ok(payload) => payload,
            Err(err) => {
                log.restore(events);
                return Err(err.into());
            }
        };
        let digest = hash_chunk(&self.prev_digest, &payload);
        let signature = match self.signer.as_mut() {
            Some(signer) => match signer.sign(&digest) {
                Ok(signature) => Some(signature),
                Err(err) => {
                    log.restore(events);
                    return Err(err.into());
                }
            },
            None => None,
        };

        let chunk = EventChunk {
            chunk_id: self.next_chunk_id,
            ts_ns: now_ns(),
            prev_digest: self.prev_digest,
            digest,
            events,
            signature,
        };
        if let Err(err) = sink.write_chunk(&chunk) {
            log.restore(chunk.events);
            return Err(err);
        }

        let count = chunk.events.len();
        self.prev_digest = digest;
        self.next_chunk_id += 1;
        log.add_flushed(count as u64);
        Ok(count)
    }
}

impl fmt::Debug for ChunkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkWriter")
            .field("next_chunk_id", &self.next_chunk_id)
            .field("prev_digest", &hex::encode(self.prev_digest))
            .finish()
    }
}

// -------------------- Sinks --------------------

/// JSON-lines file sink, one chunk per line.
pub struct FileSink {
    file: std::fs::File,
}

impl FileSink {
    pub fn open(path: &Path) -> AnyResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl EventSink for FileSink {
    fn write_chunk(&mut self, chunk: &EventChunk) -> AnyResult<()> {
        let mut line = serde_json::to_vec(chunk)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// SQLite sink for durable audit storage.
pub struct SqliteSink {
    conn: rusqlite::Connection,
}

impl SqliteSink {
    pub fn open(db_path: &str) -> AnyResult<Self> {
        let conn = rusqlite::Connection::open(db_path)?;
        let mut sink = Self { conn };
        sink.ensure_schema()?;
        Ok(sink)
    }

    pub fn open_in_memory() -> AnyResult<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let mut sink = Self { conn };
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn ensure_schema(&mut self) -> AnyResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS audit_chunks (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              chunk_id INTEGER NOT NULL,
              payload_json TEXT NOT NULL,
              prev_digest BLOB NOT NULL,
              digest BLOB NOT NULL,
              signature BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_audit_chunks_created ON audit_chunks(created_at);
            "#,
        )?;
        Ok(())
    }

    pub fn chunk_count(&self) -> AnyResult<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM audit_chunks", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl EventSink for SqliteSink {
    fn write_chunk(&mut self, chunk: &EventChunk) -> AnyResult<()> {
        let payload_json = serde_json::to_string(&chunk.events)?;
        self.conn.execute(
            r#"
            INSERT INTO audit_chunks(created_at, chunk_id, payload_json, prev_digest, digest, signature)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                (chunk.ts_ns / 1_000_000_000) as i64,
                chunk.chunk_id as i64,
                payload_json,
                chunk.prev_digest.to_vec(),
                chunk.digest.to_vec(),
                chunk.signature.as_deref(),
            ],
        )?;
        Ok(())
    }
}
