//! Capture-side secret containment.
//!
//! Frames from classified sensors are opaque: bytes are private, there is no
//! `Clone`, no serialization, and `Debug` redacts. The only byte-escape path
//! is [`SecretFrame::declassify`], which re-checks the session clearance and
//! consumes the frame. Construction requires a [`CaptureToken`], so a
//! capture that skipped the TEMPEST policy check does not compile.

use std::fmt;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::fusion::{sync_metadata, MetadataBuffer};
use crate::policy::{CaptureToken, Decision, PolicyGate};

/// One raw frame as handed over by a device source: bytes plus capture
/// metadata. Short-lived; immediately wrapped into a [`SecretFrame`].
pub struct RawCapture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

/// Device frame source seam. The real V4L2/ioctl layer lives outside this
/// crate and implements this trait.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RawCapture>;
}

/// Deterministic test-pattern source for demos and tests.
pub struct StubFrameSource {
    width: u32,
    height: u32,
    sequence: u32,
}

impl StubFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
        }
    }
}

impl FrameSource for StubFrameSource {
    fn next_frame(&mut self) -> Result<RawCapture> {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let len = (self.width as usize) * (self.height as usize);
        let data = (0..len).map(|i| (i as u32 ^ sequence) as u8).collect();
        Ok(RawCapture {
            data,
            width: self.width,
            height: self.height,
            timestamp_ns: u64::from(sequence) * 100_000_000,
            sequence,
        })
    }
}

/// Classified capture payload.
///
/// Bytes are private and zeroized on drop. No `Clone`, no `Serialize`, no
/// `AsRef<[u8]>` — enforced by simply not writing those impls.
///
/// Frame bytes stay inside the kernel boundary:
///
/// ```compile_fail
/// use tempest_kernel::{SecretFrame, StubFrameSource, FrameSource};
/// fn leak(frame: SecretFrame) -> Vec<u8> {
///     frame.data // private field
/// }
/// ```
///
/// and construction without a policy check does not compile:
///
/// ```compile_fail
/// use tempest_kernel::{RawCapture, SecretFrame};
/// let raw = RawCapture { data: vec![0u8; 4], width: 2, height: 2, timestamp_ns: 0, sequence: 0 };
/// let frame = SecretFrame::from_capture((), raw, "SECRET"); // () is not a CaptureToken
/// ```
pub struct SecretFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ns: u64,
    pub sequence: u32,
    classification: String,
}

impl SecretFrame {
    /// The only constructor. Consuming the token ties every frame to a
    /// policy check performed in the same logical operation.
    pub fn from_capture(token: CaptureToken, raw: RawCapture, classification: &str) -> Self {
        // Token intentionally dropped here: one check, one frame.
        let _ = token;
        Self {
            data: raw.data,
            width: raw.width,
            height: raw.height,
            timestamp_ns: raw.timestamp_ns,
            sequence: raw.sequence,
            classification: classification.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn classification(&self) -> &str {
        &self.classification
    }

    /// Explicit declassification gate: the session clearance must cover the
    /// frame's classification (and the role's minimum). Consumes the frame;
    /// on denial the bytes are destroyed with it.
    pub fn declassify(mut self, gate: &PolicyGate, role: &str) -> Result<Vec<u8>> {
        match gate.check_clearance(role, &self.classification) {
            Decision::Allow => Ok(std::mem::take(&mut self.data)),
            Decision::Deny => Err(Error::PolicyDenied {
                context: role.to_string(),
                reason: format!(
                    "session clearance {} below {}",
                    gate.clearance(),
                    self.classification
                ),
            }),
        }
    }
}

impl fmt::Debug for SecretFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretFrame")
            .field("len", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("classification", &self.classification)
            .field("data", &"<redacted>")
            .finish()
    }
}

impl Drop for SecretFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Pull one frame from a source under an authorization token.
pub fn capture_frame(
    source: &mut dyn FrameSource,
    token: CaptureToken,
    classification: &str,
) -> Result<SecretFrame> {
    let raw = source.next_frame()?;
    Ok(SecretFrame::from_capture(token, raw, classification))
}

/// A frame paired with the index of its matching metadata packet, if any.
pub struct FusedCapture {
    pub frame: SecretFrame,
    pub metadata_index: Option<usize>,
}

/// Capture a frame and pair it with the nearest metadata candidate.
///
/// Metadata that fails to pair is not an error — the frame is still
/// delivered, with `metadata_index: None`.
pub fn fused_capture(
    source: &mut dyn FrameSource,
    token: CaptureToken,
    classification: &str,
    candidates: &[MetadataBuffer],
    tolerance_ns: u64,
) -> Result<FusedCapture> {
    let frame = capture_frame(source, token, classification)?;
    let metadata_index = sync_metadata(frame.timestamp_ns, candidates, tolerance_ns);
    Ok(FusedCapture {
        frame,
        metadata_index,
    })
}
