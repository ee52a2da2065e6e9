//! Virtual MIDI platform
//!
//! Devices exist only in memory and every byte "sent" is recorded. Used by
//! the test suite and by `--virtual-device` for rehearsing without hardware.

use super::{Capability, ConnectionState, MidiPlatform, OutputDescriptor, OutputEnumerator, OutputPort};
use crate::error::DeviceError;
use crate::midi::{format_hex, MidiMessage};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A message captured by a virtual output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub device_id: String,
    pub bytes: Vec<u8>,
    pub timestamp: Option<u64>,
}

#[derive(Default)]
struct VirtualState {
    devices: RwLock<Vec<OutputDescriptor>>,
    failing: RwLock<HashSet<String>>,
    sent: Mutex<Vec<SentMessage>>,
}

/// In-memory platform; clones share the same devices and capture log
#[derive(Clone, Default)]
pub struct VirtualPlatform {
    state: Arc<VirtualState>,
    denied: bool,
    grant_delay: Option<Duration>,
}

impl VirtualPlatform {
    /// Platform that grants access with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform without MIDI support
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::default()
        }
    }

    pub fn with_device(self, id: &str, name: &str) -> Self {
        self.state.devices.write().push(OutputDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            state: ConnectionState::Connected,
        });
        self
    }

    /// Delay the access grant (to exercise initialization timeouts)
    pub fn with_grant_delay(mut self, delay: Duration) -> Self {
        self.grant_delay = Some(delay);
        self
    }

    /// Make opening `id` fail
    pub fn failing_open(self, id: &str) -> Self {
        self.state.failing.write().insert(id.to_string());
        self
    }

    /// Unplug a device; visible at the next enumeration
    pub fn remove_device(&self, id: &str) {
        self.state.devices.write().retain(|d| d.id != id);
    }

    /// Everything sent so far, in send order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.sent.lock().clone()
    }

    /// Raw bytes of everything sent so far
    pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().iter().map(|m| m.bytes.clone()).collect()
    }

    /// Everything sent so far, decoded; undecodable bytes are skipped
    pub fn sent_messages(&self) -> Vec<MidiMessage> {
        self.state
            .sent
            .lock()
            .iter()
            .filter_map(|m| MidiMessage::parse(&m.bytes))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.sent.lock().clear();
    }
}

#[async_trait]
impl MidiPlatform for VirtualPlatform {
    fn name(&self) -> &str {
        "virtual"
    }

    async fn request_access(&self) -> Result<Capability> {
        if let Some(delay) = self.grant_delay {
            tokio::time::sleep(delay).await;
        }

        if self.denied {
            return Ok(Capability::Denied("virtual platform has no MIDI support".to_string()));
        }

        Ok(Capability::Granted(Box::new(VirtualEnumerator {
            state: self.state.clone(),
        })))
    }
}

struct VirtualEnumerator {
    state: Arc<VirtualState>,
}

impl OutputEnumerator for VirtualEnumerator {
    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.state.devices.read().clone()
    }

    fn open(&self, id: &str) -> Result<Box<dyn OutputPort>> {
        if !self.state.devices.read().iter().any(|d| d.id == id) {
            return Err(DeviceError::UnknownOutput(id.to_string()).into());
        }
        if self.state.failing.read().contains(id) {
            return Err(DeviceError::Open {
                id: id.to_string(),
                reason: "port busy".to_string(),
            }
            .into());
        }

        Ok(Box::new(VirtualPort {
            device_id: id.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct VirtualPort {
    device_id: String,
    state: Arc<VirtualState>,
}

impl OutputPort for VirtualPort {
    fn send(&mut self, data: &[u8], timestamp: Option<u64>) {
        match MidiMessage::parse(data) {
            Some(message) => debug!("[virtual:{}] {} ({})", self.device_id, format_hex(data), message),
            None => debug!("[virtual:{}] {}", self.device_id, format_hex(data)),
        }
        self.state.sent.lock().push(SentMessage {
            device_id: self.device_id.clone(),
            bytes: data.to_vec(),
            timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_granted_enumerator() {
        let platform = VirtualPlatform::new().with_device("bb", "BeatBuddy");
        let Capability::Granted(enumerator) = platform.request_access().await.unwrap() else {
            panic!("expected grant");
        };

        assert_eq!(enumerator.outputs().len(), 1);
        let mut port = enumerator.open("bb").unwrap();
        port.send(&[0xFC], None);
        port.send(&[0xF8], None);
        assert_eq!(platform.sent_bytes(), vec![vec![0xFC], vec![0xF8]]);
        assert_eq!(platform.sent_messages(), vec![MidiMessage::Stop]);

        platform.clear_sent();
        assert!(platform.sent().is_empty());
        assert!(enumerator.open("nope").is_err());
    }

    #[tokio::test]
    async fn test_denied() {
        let capability = VirtualPlatform::denied().request_access().await.unwrap();
        assert!(matches!(capability, Capability::Denied(_)));
    }
}
