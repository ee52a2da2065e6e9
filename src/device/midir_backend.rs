//! midir-backed MIDI platform for real hardware
//!
//! midir clients are cheap and `connect` consumes them, so a fresh client is
//! created for each enumeration and each opened port.

use super::{Capability, ConnectionState, MidiPlatform, OutputDescriptor, OutputEnumerator, OutputPort};
use crate::error::DeviceError;
use crate::midi::format_hex;
use anyhow::{Context, Result};
use async_trait::async_trait;
use midir::MidiOutput;
use tracing::{debug, trace, warn};

/// Cross-platform hardware access through midir
pub struct MidirPlatform {
    client_name: String,
}

impl MidirPlatform {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

#[async_trait]
impl MidiPlatform for MidirPlatform {
    fn name(&self) -> &str {
        "midir"
    }

    async fn request_access(&self) -> Result<Capability> {
        let client_name = self.client_name.clone();

        // Backend setup may block (ALSA sequencer, CoreMIDI client creation)
        let check = tokio::task::spawn_blocking(move || MidiOutput::new(&client_name).map(|_| ()))
            .await
            .context("MIDI backend check task failed")?;

        match check {
            Ok(()) => Ok(Capability::Granted(Box::new(MidirEnumerator {
                client_name: self.client_name.clone(),
            }))),
            Err(e) => Ok(Capability::Denied(format!("MIDI backend init failed: {}", e))),
        }
    }
}

struct MidirEnumerator {
    client_name: String,
}

impl MidirEnumerator {
    fn client(&self) -> Result<MidiOutput> {
        MidiOutput::new(&self.client_name)
            .map_err(|e| DeviceError::Backend(e.to_string()).into())
    }
}

impl OutputEnumerator for MidirEnumerator {
    fn outputs(&self) -> Vec<OutputDescriptor> {
        let midi_out = match self.client() {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to enumerate MIDI outputs: {:#}", e);
                return Vec::new();
            }
        };

        let mut outputs = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                outputs.push(OutputDescriptor {
                    id: port.id(),
                    name,
                    state: ConnectionState::Connected,
                });
            }
        }

        debug!("Found {} MIDI output ports", outputs.len());
        outputs
    }

    fn open(&self, id: &str) -> Result<Box<dyn OutputPort>> {
        let midi_out = self.client()?;
        let port = midi_out
            .find_port_by_id(id.to_string())
            .ok_or_else(|| DeviceError::UnknownOutput(id.to_string()))?;

        let connection = midi_out
            .connect(&port, &format!("{}-out", self.client_name))
            .map_err(|e| DeviceError::Open {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirPort {
            id: id.to_string(),
            connection,
        }))
    }
}

struct MidirPort {
    id: String,
    connection: midir::MidiOutputConnection,
}

impl OutputPort for MidirPort {
    fn send(&mut self, data: &[u8], timestamp: Option<u64>) {
        // midir sends immediately; timestamps are not scheduled
        if let Some(ts) = timestamp {
            trace!("Ignoring timestamp {} on midir output", ts);
        }
        if let Err(e) = self.connection.send(data) {
            warn!("Failed to send {} to '{}': {}", format_hex(data), self.id, e);
        }
    }
}
