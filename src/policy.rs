//! Policy gate: THREATCON mapping, layer policies, and clearance checks.
//!
//! The gate is an explicit context object — current threat condition and the
//! session clearance live here and nowhere else, so tests construct one per
//! case instead of fighting process-wide state. Capture paths never see the
//! gate directly; they receive a [`CaptureToken`] minted by a passed check.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::tempest::TempestState;

/// External threat condition, totally ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatCon {
    Normal,
    Alpha,
    Bravo,
    Charlie,
    Delta,
    Emergency,
}

impl ThreatCon {
    pub const ALL: [ThreatCon; 6] = [
        ThreatCon::Normal,
        ThreatCon::Alpha,
        ThreatCon::Bravo,
        ThreatCon::Charlie,
        ThreatCon::Delta,
        ThreatCon::Emergency,
    ];

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "alpha" => Ok(Self::Alpha),
            "bravo" => Ok(Self::Bravo),
            "charlie" => Ok(Self::Charlie),
            "delta" => Ok(Self::Delta),
            "emergency" => Ok(Self::Emergency),
            other => Err(Error::InvalidArgument(format!(
                "unknown THREATCON level '{}'; expected normal|alpha|bravo|charlie|delta|emergency",
                other
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Alpha => "ALPHA",
            Self::Bravo => "BRAVO",
            Self::Charlie => "CHARLIE",
            Self::Delta => "DELTA",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for ThreatCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session clearance, totally ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Clearance {
    None,
    Unclassified,
    Confidential,
    Secret,
    TopSecret,
}

impl Clearance {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Unclassified => "UNCLASSIFIED",
            Self::Confidential => "CONFIDENTIAL",
            Self::Secret => "SECRET",
            Self::TopSecret => "TOP_SECRET",
        }
    }
}

impl fmt::Display for Clearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a classification marking to a clearance tier by substring.
///
/// Checks run most-restrictive-first, so a string carrying several markings
/// ("SECRET//SECRET_BIOMETRIC", "TOP SECRET rel SECRET") resolves to the
/// highest tier it names.
pub fn clearance_from_classification(classification: &str) -> Clearance {
    if classification.contains("TOP_SECRET") || classification.contains("TOP SECRET") {
        return Clearance::TopSecret;
    }
    if classification.contains("SECRET") {
        return Clearance::Secret;
    }
    if classification.contains("CONFIDENTIAL") {
        return Clearance::Confidential;
    }
    if classification.contains("UNCLASSIFIED") {
        return Clearance::Unclassified;
    }
    Clearance::None
}

/// Minimum clearance required to operate a device role. Unknown roles
/// default to `Unclassified`.
pub fn role_minimum_clearance(role: &str) -> Clearance {
    const ROLE_CLEARANCE: &[(&str, Clearance)] = &[
        ("generic_webcam", Clearance::Unclassified),
        ("ir_sensor", Clearance::Confidential),
        ("iris_scanner", Clearance::Secret),
        ("tempest_cam", Clearance::TopSecret),
    ];
    ROLE_CLEARANCE
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, min)| *min)
        .unwrap_or(Clearance::Unclassified)
}

/// Per-layer capture policy record.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct LayerPolicy {
    pub layer: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub min_tempest: TempestState,
}

pub const MAX_LAYER: u32 = 8;

static LAYER_POLICIES: [LayerPolicy; 9] = [
    // L0: hardware - no direct access
    LayerPolicy { layer: 0, max_width: 0, max_height: 0, min_tempest: TempestState::Disabled },
    // L1: drivers - no direct access
    LayerPolicy { layer: 1, max_width: 0, max_height: 0, min_tempest: TempestState::Disabled },
    // L2: HAL - limited resolution
    LayerPolicy { layer: 2, max_width: 640, max_height: 480, min_tempest: TempestState::Disabled },
    // L3: sensors
    LayerPolicy { layer: 3, max_width: 1280, max_height: 720, min_tempest: TempestState::Disabled },
    // L4: application
    LayerPolicy { layer: 4, max_width: 1920, max_height: 1080, min_tempest: TempestState::Low },
    // L5: policy
    LayerPolicy { layer: 5, max_width: 1920, max_height: 1080, min_tempest: TempestState::Low },
    // L6: data fusion
    LayerPolicy { layer: 6, max_width: 1920, max_height: 1080, min_tempest: TempestState::Low },
    // L7: accelerator offload
    LayerPolicy { layer: 7, max_width: 3840, max_height: 2160, min_tempest: TempestState::High },
    // L8: AI orchestration
    LayerPolicy { layer: 8, max_width: 3840, max_height: 2160, min_tempest: TempestState::High },
];

/// Fixed THREATCON-to-TEMPEST mapping. Non-decreasing in restrictiveness,
/// terminating at Lockdown.
pub fn tempest_for_threatcon(level: ThreatCon) -> TempestState {
    match level {
        ThreatCon::Normal => TempestState::Disabled,
        ThreatCon::Alpha | ThreatCon::Bravo => TempestState::Low,
        ThreatCon::Charlie | ThreatCon::Delta => TempestState::High,
        ThreatCon::Emergency => TempestState::Lockdown,
    }
}

/// Outcome of a policy check. A `Deny` is routine control flow, not a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Proof that a capture path passed the TEMPEST policy check.
///
/// Not `Clone`, no public constructor: the only mint is
/// `TempestController::authorize_capture`, which snapshots the device state
/// and decides in one operation, and the token is consumed by the capture
/// call it authorizes. Code that captures without a token does not compile:
///
/// ```compile_fail
/// use tempest_kernel::{CaptureToken, TempestState};
/// let forged = CaptureToken {
///     state: TempestState::Disabled, // private fields
///     context: String::new(),
/// };
/// ```
#[derive(Debug)]
pub struct CaptureToken {
    state: TempestState,
    context: String,
}

impl CaptureToken {
    pub(crate) fn mint(state: TempestState, context: &str) -> Self {
        Self {
            state,
            context: context.to_string(),
        }
    }

    /// TEMPEST state snapshotted at authorization time.
    pub fn state(&self) -> TempestState {
        self.state
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Process-wide policy context.
pub struct PolicyGate {
    threatcon: ThreatCon,
    /// Session clearance, read once at construction and cached.
    clearance: Clearance,
}

impl PolicyGate {
    pub fn new(clearance: Clearance, threatcon: ThreatCon) -> Self {
        Self {
            threatcon,
            clearance,
        }
    }

    /// Build a gate from a session classification string (e.g. the value of
    /// the `TCK_CLEARANCE` environment variable). Absent string defaults to
    /// `Unclassified`.
    pub fn from_session(classification: Option<&str>, threatcon: ThreatCon) -> Self {
        let clearance = match classification {
            Some(raw) => clearance_from_classification(raw),
            None => Clearance::Unclassified,
        };
        Self::new(clearance, threatcon)
    }

    pub fn clearance(&self) -> Clearance {
        self.clearance
    }

    pub fn threatcon(&self) -> ThreatCon {
        self.threatcon
    }

    pub fn set_threatcon(&mut self, level: ThreatCon) {
        self.threatcon = level;
    }

    /// The mandatory gate before every capture: Lockdown denies, every other
    /// state allows. Pure; callers must pass a state fetched in the same
    /// logical operation (see `TempestController::authorize_capture`).
    pub fn policy_check(&self, state: TempestState) -> Decision {
        if state == TempestState::Lockdown {
            Decision::Deny
        } else {
            Decision::Allow
        }
    }

    /// `policy_check` that mints the capture token on success. Crate-internal:
    /// callers go through `TempestController::authorize_capture`, which pins
    /// the state snapshot and the decision into one operation.
    pub(crate) fn authorize(&self, state: TempestState, context: &str) -> Result<CaptureToken> {
        match self.policy_check(state) {
            Decision::Allow => Ok(CaptureToken::mint(state, context)),
            Decision::Deny => Err(Error::PolicyDenied {
                context: context.to_string(),
                reason: format!("TEMPEST state {} forbids capture", state),
            }),
        }
    }

    /// Session clearance vs. `max(classification tier, role minimum)`.
    pub fn check_clearance(&self, role: &str, classification: &str) -> Decision {
        let required =
            clearance_from_classification(classification).max(role_minimum_clearance(role));
        if self.clearance < required {
            Decision::Deny
        } else {
            Decision::Allow
        }
    }

    /// TEMPEST state mandated by the current threat condition.
    pub fn apply_threat_condition(&self) -> TempestState {
        tempest_for_threatcon(self.threatcon)
    }

    /// Layer policy lookup. Layers outside 0-8 are an error, never a
    /// default record.
    pub fn layer_policy(&self, layer: u32) -> Result<&'static LayerPolicy> {
        LAYER_POLICIES
            .get(layer as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("layer {} out of range 0-8", layer)))
    }

    /// Combined capture gate for a device layer: Lockdown denies, as does a
    /// state below the layer's minimum TEMPEST requirement.
    pub fn check_capture_allowed(&self, layer: u32, state: TempestState) -> Result<Decision> {
        if self.policy_check(state) == Decision::Deny {
            return Ok(Decision::Deny);
        }
        let policy = self.layer_policy(layer)?;
        if state < policy.min_tempest {
            return Ok(Decision::Deny);
        }
        Ok(Decision::Allow)
    }
}
