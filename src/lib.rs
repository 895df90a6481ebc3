//! TEMPEST Capture Kernel (TCK)
//!
//! This crate implements the metadata plane and policy gate for secure
//! video capture: KLV metadata decoding, TEMPEST state management, capture
//! authorization, and frame/metadata timestamp fusion.
//!
//! # Architecture
//!
//! The kernel enforces four invariants by construction:
//!
//! 1. **No capture without a check**: frames can only be constructed from a
//!    `CaptureToken`, and tokens are only minted by a TEMPEST policy check
//!    performed in the same logical operation as the state read.
//! 2. **Lockdown is absolute**: `Lockdown` denies frame delivery regardless
//!    of caller identity, role, or clearance.
//! 3. **No silent truncation**: malformed or truncated KLV input is a parse
//!    error, never a shortened item list; parsed items borrow from their
//!    buffer and cannot outlive it.
//! 4. **Transitions are auditable**: every TEMPEST transition emits an
//!    audit event carrying the old and new state, even when the hardware
//!    write is a stub.
//!
//! # Module Structure
//!
//! - `klv`: KLV (Key-Length-Value) codec for MISB-style metadata
//! - `tempest`: per-device TEMPEST state machine and hardware control seam
//! - `policy`: THREATCON mapping, layer policies, clearance checks
//! - `fusion`: frame/metadata timestamp synchronization
//! - `ir`: IR radiometric decoding
//! - `capture`: secret-frame containment and token-gated capture
//! - `telemetry`: audit event ring and sinks
//! - `config`: TOML + environment configuration

pub mod capture;
pub mod config;
pub mod error;
pub mod fusion;
pub mod ir;
pub mod klv;
pub mod policy;
pub mod telemetry;
pub mod tempest;

pub use capture::{
    capture_frame, fused_capture, FrameSource, FusedCapture, RawCapture, SecretFrame,
    StubFrameSource,
};
pub use config::{KernelConfig, SinkKind, TelemetrySettings};
pub use error::{Error, ParseError, Result};
pub use fusion::{
    sync_metadata, MetadataBuffer, MetadataFormat, MetadataPayload, TelemetrySample, TimingMark,
    DEFAULT_SYNC_TOLERANCE_NS,
};
pub use ir::{decode_ir_radiometric, IrCalibration, IrFrame};
pub use klv::{
    find_item, parse_klv, KlvBuffer, KlvItem, KlvKey, KLV_KEY_LEN, KLV_SENSOR_ALTITUDE,
    KLV_SENSOR_LATITUDE, KLV_SENSOR_LONGITUDE, KLV_UAS_DATALINK_LS,
};
pub use policy::{
    clearance_from_classification, role_minimum_clearance, tempest_for_threatcon, CaptureToken,
    Clearance, Decision, LayerPolicy, PolicyGate, ThreatCon, MAX_LAYER,
};
pub use telemetry::{
    AuditEvent, ChunkSigner, ChunkWriter, EventChunk, EventLog, EventRing, EventSink, EventType,
    FileSink, Profile, RingStats, Severity, SqliteSink, StubChunkSigner, DEFAULT_RING_CAPACITY,
};
pub use tempest::{
    DeviceIdentity, LoopbackControl, TempestControl, TempestController, TempestState,
};
