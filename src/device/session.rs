//! DeviceSession - enumerated outputs and the bound output handle

use super::{Capability, MidiPlatform, OutputDescriptor, OutputEnumerator, OutputPort};
use crate::error::DeviceError;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time allowed for the platform to grant MIDI access
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Device state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No MIDI capability (not initialized, denied, or timed out)
    Unavailable,
    /// Capability granted but no output ports present
    NoOutputs,
    /// Outputs available, none bound
    Unbound,
    /// Sending to this output
    Bound { id: String, name: String },
}

impl SessionStatus {
    /// True when sends are simulated instead of reaching hardware
    pub fn is_degraded(&self) -> bool {
        !matches!(self, SessionStatus::Bound { .. })
    }
}

struct BoundOutput {
    descriptor: OutputDescriptor,
    port: Box<dyn OutputPort>,
}

#[derive(Default)]
struct SessionInner {
    enumerator: Option<Box<dyn OutputEnumerator>>,
    /// Snapshot taken at the last `initialize`
    devices: Vec<OutputDescriptor>,
    bound: Option<BoundOutput>,
}

/// At most one bound output plus the last enumerated device list
///
/// The device list is only refreshed by `initialize`; hot-plug is not
/// tracked.
#[derive(Default)]
pub struct DeviceSession {
    inner: Mutex<SessionInner>,
}

impl DeviceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the platform for MIDI access and enumerate outputs
    ///
    /// Returns whether capability was granted. Denial, errors and timeouts
    /// all leave the session cleanly `Unavailable`.
    pub async fn initialize(&self, platform: &dyn MidiPlatform, timeout: Duration) -> bool {
        info!("Requesting MIDI access from {} platform...", platform.name());

        let capability = match tokio::time::timeout(timeout, platform.request_access()).await {
            Ok(Ok(capability)) => capability,
            Ok(Err(e)) => Capability::Denied(DeviceError::Backend(format!("{:#}", e)).to_string()),
            Err(_) => Capability::Denied(format!("no answer within {:?}", timeout)),
        };

        let mut inner = self.inner.lock();
        match capability {
            Capability::Granted(enumerator) => {
                let devices = enumerator.outputs();
                info!("✅ MIDI access granted, {} output(s) found", devices.len());
                for device in &devices {
                    debug!("  output '{}' ({}) {:?}", device.name, device.id, device.state);
                }

                // Keep the current binding only if its port is still listed
                let vanished = inner
                    .bound
                    .as_ref()
                    .is_some_and(|b| !devices.iter().any(|d| d.id == b.descriptor.id));
                if vanished {
                    if let Some(bound) = inner.bound.take() {
                        warn!("Bound output '{}' disappeared, unbinding", bound.descriptor.name);
                    }
                }

                inner.devices = devices;
                inner.enumerator = Some(enumerator);
                true
            }
            Capability::Denied(reason) => {
                warn!("MIDI unavailable ({}), sends will be simulated", reason);
                *inner = SessionInner::default();
                false
            }
        }
    }

    /// Output ports found by the last `initialize`
    pub fn list_outputs(&self) -> Vec<OutputDescriptor> {
        self.inner.lock().devices.clone()
    }

    /// Bind the output with `id`, or unbind with `None`
    ///
    /// An id that was not listed, or a port that fails to open, leaves the
    /// session unbound without reporting an error.
    pub fn bind(&self, id: Option<&str>) {
        let mut inner = self.inner.lock();

        // Release the previous port before opening a new one
        if let Some(previous) = inner.bound.take() {
            debug!("Released output '{}'", previous.descriptor.name);
        }

        let Some(id) = id else {
            info!("MIDI output unbound");
            return;
        };

        let Some(descriptor) = inner.devices.iter().find(|d| d.id == id).cloned() else {
            debug!("{}, session unbound", DeviceError::UnknownOutput(id.to_string()));
            return;
        };

        let Some(enumerator) = inner.enumerator.as_ref() else {
            return;
        };

        match enumerator.open(id) {
            Ok(port) => {
                info!("🎛️  MIDI output bound: {}", descriptor.name);
                inner.bound = Some(BoundOutput { descriptor, port });
            }
            Err(e) => {
                let err = DeviceError::Open {
                    id: id.to_string(),
                    reason: format!("{:#}", e),
                };
                warn!("{}, session unbound", err);
            }
        }
    }

    /// Bind the first listed output whose name contains `pattern`
    /// (case-insensitive). Returns the bound descriptor.
    pub fn bind_by_name(&self, pattern: &str) -> Option<OutputDescriptor> {
        let needle = pattern.to_lowercase();
        let candidate = self
            .list_outputs()
            .into_iter()
            .find(|d| d.name.to_lowercase().contains(&needle))?;

        debug!("Found port '{}' matching pattern '{}'", candidate.name, pattern);
        self.bind(Some(&candidate.id));
        self.bound_output().filter(|d| d.id == candidate.id)
    }

    /// Bind the first listed output, the default when nothing is configured
    pub fn bind_first(&self) -> Option<OutputDescriptor> {
        let first = self.list_outputs().into_iter().next()?;
        self.bind(Some(&first.id));
        self.bound_output().filter(|d| d.id == first.id)
    }

    /// Startup binding: the output matching `pattern`, or the first one
    /// listed when no pattern is configured
    pub fn auto_bind(&self, pattern: Option<&str>) -> Option<OutputDescriptor> {
        match pattern {
            Some(pattern) => self.bind_by_name(pattern),
            None => self.bind_first(),
        }
    }

    /// Descriptor of the bound output, if any
    pub fn bound_output(&self) -> Option<OutputDescriptor> {
        self.inner.lock().bound.as_ref().map(|b| b.descriptor.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().bound.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.lock();
        match (&inner.enumerator, &inner.bound) {
            (_, Some(bound)) => SessionStatus::Bound {
                id: bound.descriptor.id.clone(),
                name: bound.descriptor.name.clone(),
            },
            (None, None) => SessionStatus::Unavailable,
            (Some(_), None) if inner.devices.is_empty() => SessionStatus::NoOutputs,
            (Some(_), None) => SessionStatus::Unbound,
        }
    }

    /// Run `f` against the bound port while holding the session lock
    ///
    /// Returns `None` when unbound. Everything `f` sends is contiguous on
    /// the wire with respect to other callers.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut dyn OutputPort) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let bound = inner.bound.as_mut()?;
        Some(f(bound.port.as_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualPlatform;

    async fn ready_session(platform: &VirtualPlatform) -> DeviceSession {
        let session = DeviceSession::new();
        assert!(session.initialize(platform, DEFAULT_INIT_TIMEOUT).await);
        session
    }

    #[test]
    fn test_new_session_is_unavailable() {
        let session = DeviceSession::new();
        assert_eq!(session.status(), SessionStatus::Unavailable);
        assert!(session.list_outputs().is_empty());
        assert!(session.with_output(|_| ()).is_none());

        // Binding before initialize is a silent no-op
        session.bind(Some("bb"));
        assert!(!session.is_bound());
    }

    #[tokio::test]
    async fn test_initialize_lists_outputs() {
        let platform = VirtualPlatform::new()
            .with_device("bb", "BeatBuddy MIDI 1")
            .with_device("loop", "loopMIDI Port");
        let session = ready_session(&platform).await;

        let names: Vec<_> = session.list_outputs().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["BeatBuddy MIDI 1", "loopMIDI Port"]);
        assert_eq!(session.status(), SessionStatus::Unbound);
    }

    #[tokio::test]
    async fn test_denied_platform() {
        let platform = VirtualPlatform::denied();
        let session = DeviceSession::new();

        assert!(!session.initialize(&platform, DEFAULT_INIT_TIMEOUT).await);
        assert_eq!(session.status(), SessionStatus::Unavailable);
        assert!(session.status().is_degraded());
    }

    #[tokio::test]
    async fn test_no_outputs() {
        let session = ready_session(&VirtualPlatform::new()).await;
        assert_eq!(session.status(), SessionStatus::NoOutputs);
    }

    #[tokio::test]
    async fn test_initialize_timeout_resolves_unavailable() {
        let platform = VirtualPlatform::new()
            .with_device("bb", "BeatBuddy")
            .with_grant_delay(Duration::from_millis(500));
        let session = DeviceSession::new();

        assert!(!session.initialize(&platform, Duration::from_millis(20)).await);
        assert_eq!(session.status(), SessionStatus::Unavailable);
        assert!(session.list_outputs().is_empty());
    }

    #[tokio::test]
    async fn test_bind_unbind_and_unknown() {
        let platform = VirtualPlatform::new().with_device("bb", "BeatBuddy");
        let session = ready_session(&platform).await;

        session.bind(Some("bb"));
        assert_eq!(
            session.status(),
            SessionStatus::Bound { id: "bb".to_string(), name: "BeatBuddy".to_string() }
        );

        session.bind(Some("ghost"));
        assert!(!session.is_bound());

        session.bind(Some("bb"));
        session.bind(None);
        assert_eq!(session.status(), SessionStatus::Unbound);
    }

    #[tokio::test]
    async fn test_bind_open_failure_stays_unbound() {
        let platform = VirtualPlatform::new()
            .with_device("bb", "BeatBuddy")
            .failing_open("bb");
        let session = ready_session(&platform).await;

        session.bind(Some("bb"));
        assert!(!session.is_bound());
    }

    #[tokio::test]
    async fn test_bind_by_name() {
        let platform = VirtualPlatform::new()
            .with_device("a", "IAC Driver Bus 1")
            .with_device("b", "BeatBuddy MIDI");
        let session = ready_session(&platform).await;

        let bound = session.bind_by_name("beatbuddy").unwrap();
        assert_eq!(bound.id, "b");
        assert!(session.bind_by_name("nothing").is_none());
        // Failed lookup leaves the previous binding alone
        assert_eq!(session.bound_output().map(|d| d.id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_bind_first_default() {
        let platform = VirtualPlatform::new()
            .with_device("bb", "BeatBuddy MIDI")
            .with_device("iac", "IAC Driver Bus 1");
        let session = ready_session(&platform).await;

        assert_eq!(session.bind_first().map(|d| d.id), Some("bb".to_string()));
        assert!(matches!(session.status(), SessionStatus::Bound { ref id, .. } if id == "bb"));

        let empty = ready_session(&VirtualPlatform::new()).await;
        assert!(empty.bind_first().is_none());
        assert!(DeviceSession::new().bind_first().is_none());

        let busy = VirtualPlatform::new().with_device("bb", "BeatBuddy").failing_open("bb");
        assert!(ready_session(&busy).await.bind_first().is_none());
    }

    #[tokio::test]
    async fn test_auto_bind_pattern_or_first() {
        let platform = VirtualPlatform::new()
            .with_device("iac", "IAC Driver Bus 1")
            .with_device("bb", "BeatBuddy MIDI");

        let session = ready_session(&platform).await;
        assert_eq!(session.auto_bind(None).map(|d| d.id), Some("iac".to_string()));

        let session = ready_session(&platform).await;
        assert_eq!(session.auto_bind(Some("beatbuddy")).map(|d| d.id), Some("bb".to_string()));

        // A configured pattern that matches nothing does not fall back
        let session = ready_session(&platform).await;
        assert!(session.auto_bind(Some("roland")).is_none());
        assert!(!session.is_bound());
    }

    #[tokio::test]
    async fn test_with_output_writes_to_bound_port() {
        let platform = VirtualPlatform::new().with_device("bb", "BeatBuddy");
        let session = ready_session(&platform).await;
        session.bind(Some("bb"));

        session.with_output(|port| port.send(&[0xFA], Some(10)));

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_id, "bb");
        assert_eq!(sent[0].bytes, vec![0xFA]);
        assert_eq!(sent[0].timestamp, Some(10));
    }

    #[tokio::test]
    async fn test_reinitialize_drops_vanished_binding() {
        let platform = VirtualPlatform::new().with_device("bb", "BeatBuddy");
        let session = ready_session(&platform).await;
        session.bind(Some("bb"));

        platform.remove_device("bb");
        assert!(session.is_bound(), "no hot-plug tracking between initializations");

        assert!(session.initialize(&platform, DEFAULT_INIT_TIMEOUT).await);
        assert!(!session.is_bound());
        assert_eq!(session.status(), SessionStatus::NoOutputs);
    }
}
