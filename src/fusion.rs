//! Frame/metadata timestamp fusion.
//!
//! Capture produces video frames and metadata packets on separate streams;
//! fusion pairs a frame with the metadata packet whose timestamp is nearest,
//! within a bounded tolerance. The matcher is a pure function over
//! timestamps — payload kind never influences the result.

use serde::{Deserialize, Serialize};

use crate::ir::IrFrame;
use crate::klv::KlvBuffer;

/// Default pairing tolerance: 50 ms.
pub const DEFAULT_SYNC_TOLERANCE_NS: u64 = 50_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataFormat {
    Klv,
    IrRadiometric,
    Telemetry,
    Timing,
}

/// Platform attitude/position sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Degrees, WGS84.
    pub latitude: f64,
    /// Degrees, WGS84.
    pub longitude: f64,
    /// Meters above MSL.
    pub altitude: f32,
    /// Degrees true north.
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    /// m/s (x, y, z).
    pub velocity: [f32; 3],
    pub timestamp_ns: u64,
}

/// Out-of-band timing reference for streams that carry no other metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingMark {
    pub frame_timestamp_ns: u64,
    pub sync_token: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MetadataPayload {
    Klv(KlvBuffer),
    IrRadiometric(IrFrame),
    Telemetry(TelemetrySample),
    Timing(TimingMark),
}

/// Uniform container the synchronizer works over. Only `timestamp_ns` is
/// consulted during matching; the payload rides along untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataBuffer {
    pub timestamp_ns: u64,
    pub sequence: u32,
    pub payload: MetadataPayload,
}

impl MetadataBuffer {
    pub fn new(timestamp_ns: u64, sequence: u32, payload: MetadataPayload) -> Self {
        Self {
            timestamp_ns,
            sequence,
            payload,
        }
    }

    pub fn format(&self) -> MetadataFormat {
        match &self.payload {
            MetadataPayload::Klv(_) => MetadataFormat::Klv,
            MetadataPayload::IrRadiometric(_) => MetadataFormat::IrRadiometric,
            MetadataPayload::Telemetry(_) => MetadataFormat::Telemetry,
            MetadataPayload::Timing(_) => MetadataFormat::Timing,
        }
    }
}

/// Index of the candidate closest to `frame_ts`, provided the winning delta
/// is within `tolerance_ns`; `None` otherwise (a nearest-but-too-far
/// candidate is not a match). Equal deltas resolve to the earliest index.
/// Empty input is an immediate no-match.
pub fn sync_metadata(
    frame_ts: u64,
    candidates: &[MetadataBuffer],
    tolerance_ns: u64,
) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (idx, meta) in candidates.iter().enumerate() {
        let delta = frame_ts.abs_diff(meta.timestamp_ns);
        // Strict < keeps the earliest candidate on a tie.
        if best.map_or(true, |(_, best_delta)| delta < best_delta) {
            best = Some((idx, delta));
        }
    }
    best.filter(|&(_, delta)| delta <= tolerance_ns)
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing_buffer(timestamp_ns: u64, sequence: u32) -> MetadataBuffer {
        MetadataBuffer::new(
            timestamp_ns,
            sequence,
            MetadataPayload::Timing(TimingMark {
                frame_timestamp_ns: timestamp_ns,
                sync_token: sequence as u64,
            }),
        )
    }

    fn second_grid() -> Vec<MetadataBuffer> {
        // 1.0s .. 1.4s in 100ms steps.
        (0..5)
            .map(|i| timing_buffer(1_000_000_000 + i * 100_000_000, i as u32))
            .collect()
    }

    #[test]
    fn exact_match_wins() {
        let candidates = second_grid();
        assert_eq!(
            sync_metadata(1_200_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(2)
        );
    }

    #[test]
    fn near_match_within_tolerance() {
        let candidates = second_grid();
        // 10ms past 1.2s.
        assert_eq!(
            sync_metadata(1_210_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(2)
        );
        // 1.14s: 40ms from 1.1s, 60ms from 1.2s.
        assert_eq!(
            sync_metadata(1_140_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(1)
        );
    }

    #[test]
    fn beyond_tolerance_is_no_match() {
        let candidates = second_grid();
        // Nearest is 1.0s at 500ms delta: too far, not "closest anyway".
        assert_eq!(
            sync_metadata(500_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            None
        );
    }

    #[test]
    fn boundary_delta_equal_to_tolerance_matches() {
        let candidates = vec![timing_buffer(1_050_000_000, 0)];
        assert_eq!(
            sync_metadata(1_000_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(0)
        );
        assert_eq!(
            sync_metadata(999_999_999, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            None
        );
    }

    #[test]
    fn ties_resolve_to_earliest_index() {
        let candidates = vec![
            timing_buffer(1_000_000_000, 0),
            timing_buffer(1_020_000_000, 1),
        ];
        // 1.01s is 10ms from both.
        assert_eq!(
            sync_metadata(1_010_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(0)
        );
    }

    #[test]
    fn empty_candidates_is_no_match() {
        assert_eq!(sync_metadata(1, &[], DEFAULT_SYNC_TOLERANCE_NS), None);
    }

    #[test]
    fn payload_kind_never_influences_matching() {
        let klv = MetadataBuffer::new(
            2_000_000_000,
            0,
            MetadataPayload::Klv(KlvBuffer::new(vec![0u8; 4], 2_000_000_000, 0)),
        );
        let telemetry = MetadataBuffer::new(
            2_010_000_000,
            1,
            MetadataPayload::Telemetry(TelemetrySample {
                latitude: 0.0,
                longitude: 0.0,
                altitude: 0.0,
                heading: 0.0,
                pitch: 0.0,
                roll: 0.0,
                velocity: [0.0; 3],
                timestamp_ns: 2_010_000_000,
            }),
        );
        let candidates = vec![klv, telemetry];
        assert_eq!(candidates[0].format(), MetadataFormat::Klv);
        assert_eq!(candidates[1].format(), MetadataFormat::Telemetry);
        assert_eq!(
            sync_metadata(2_009_000_000, &candidates, DEFAULT_SYNC_TOLERANCE_NS),
            Some(1)
        );
    }
}
