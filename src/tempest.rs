//! TEMPEST state management.
//!
//! Each capture device carries an electromagnetic-security state, cached
//! here and backed by a hardware control behind the [`TempestControl`]
//! seam. Transitions are auditable events; the transition record is emitted
//! even when the underlying control write is a no-op stub, because the audit
//! trail is the security-relevant side effect.
//!
//! All sixteen `(state, target)` pairs are legal transitions — restriction
//! is the policy gate's job, not the transition graph's.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::policy::{CaptureToken, PolicyGate};
use crate::telemetry::{AuditEvent, EventLog, EventType, Severity, now_ns};

/// Electromagnetic shielding state, ordered by increasing restrictiveness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TempestState {
    Disabled,
    Low,
    High,
    Lockdown,
}

impl TempestState {
    /// Decode a hardware control register value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Disabled),
            1 => Some(Self::Low),
            2 => Some(Self::High),
            3 => Some(Self::Lockdown),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Lockdown => "LOCKDOWN",
        }
    }
}

impl fmt::Display for TempestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware control seam. The real implementation wraps the platform's
/// control-register mechanism; it is an external collaborator to this crate.
pub trait TempestControl {
    fn read_state(&mut self) -> Result<TempestState>;
    fn write_state(&mut self, state: TempestState) -> Result<()>;
}

/// In-memory control for tests, demos, and devices whose shielding is
/// managed out-of-band. Reads and writes always succeed.
pub struct LoopbackControl {
    state: TempestState,
}

impl LoopbackControl {
    pub fn new(state: TempestState) -> Self {
        Self { state }
    }
}

impl Default for LoopbackControl {
    fn default() -> Self {
        Self::new(TempestState::Disabled)
    }
}

impl TempestControl for LoopbackControl {
    fn read_state(&mut self) -> Result<TempestState> {
        Ok(self.state)
    }

    fn write_state(&mut self, state: TempestState) -> Result<()> {
        self.state = state;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    pub dev_id: u32,
    pub role: String,
    pub layer: u32,
}

/// Per-device TEMPEST state machine.
///
/// Shared-use note: every method takes `&mut self`, so the read-state /
/// policy-decide pair inside [`authorize_capture`](Self::authorize_capture)
/// is one exclusive critical section. Callers spanning threads wrap the
/// controller in a `Mutex` and hold the guard across the authorize call; a
/// `set_state` from another thread cannot land between the snapshot and the
/// decision.
pub struct TempestController {
    identity: DeviceIdentity,
    control: Option<Box<dyn TempestControl + Send>>,
    cached: TempestState,
    events: EventLog,
}

impl TempestController {
    pub fn new(
        identity: DeviceIdentity,
        control: Option<Box<dyn TempestControl + Send>>,
        events: EventLog,
    ) -> Self {
        Self {
            identity,
            control,
            cached: TempestState::Disabled,
            events,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Current state. Devices without a control read as `Disabled`. A failed
    /// hardware read falls back to the last cached value — reads fail open,
    /// capture authorization never does.
    pub fn state(&mut self) -> TempestState {
        let Some(control) = self.control.as_mut() else {
            return TempestState::Disabled;
        };
        match control.read_state() {
            Ok(state) => {
                self.cached = state;
                self.events.emit_simple(
                    self.identity.dev_id,
                    EventType::TempestQuery,
                    Severity::Debug,
                    state.as_raw(),
                );
                state
            }
            Err(_) => self.cached,
        }
    }

    /// Transition to `target`. Emits the transition audit record after the
    /// control write succeeds — including when the control is a loopback
    /// stub and the write changed nothing physical.
    pub fn set_state(&mut self, target: TempestState) -> Result<()> {
        let old = self.state();
        let Some(control) = self.control.as_mut() else {
            return Err(Error::NotSupported(format!(
                "device {} has no TEMPEST control",
                self.identity.dev_id
            )));
        };
        control.write_state(target)?;
        self.cached = target;

        self.events.emit(AuditEvent {
            ts_ns: now_ns(),
            dev_id: self.identity.dev_id,
            event_type: EventType::TempestTransition,
            severity: Severity::Critical,
            aux: (old.as_raw() << 16) | target.as_raw(),
            layer: self.identity.layer,
            role: self.identity.role.clone(),
        });

        if target == TempestState::Lockdown {
            self.events.emit_simple(
                self.identity.dev_id,
                EventType::TempestLockdown,
                Severity::Critical,
                0,
            );
        }

        Ok(())
    }

    /// Snapshot the state and run the policy check as one operation.
    ///
    /// This is the only way to obtain a [`CaptureToken`]; there is no
    /// query-then-act pair that would let a stale state authorize a capture.
    pub fn authorize_capture(
        &mut self,
        gate: &PolicyGate,
        context: &str,
    ) -> Result<CaptureToken> {
        let state = self.state();
        match gate.authorize(state, context) {
            Ok(token) => Ok(token),
            Err(err) => {
                self.events.emit_simple(
                    self.identity.dev_id,
                    EventType::PolicyViolation,
                    Severity::Critical,
                    state.as_raw(),
                );
                Err(err)
            }
        }
    }

    /// Drive this device to the state mandated by the gate's current threat
    /// condition.
    pub fn apply_threatcon(&mut self, gate: &PolicyGate) -> Result<()> {
        self.set_state(gate.apply_threat_condition())
    }
}
