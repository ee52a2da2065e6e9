//! Device layer - MIDI capability negotiation and output binding
//!
//! A `MidiPlatform` is asked once for access. It answers with a
//! `Capability`: either an enumerator of output ports or a denial. The
//! `DeviceSession` keeps the enumerated snapshot and at most one bound
//! output handle.

mod midir_backend;
mod session;
mod virtual_backend;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use midir_backend::MidirPlatform;
pub use session::{DeviceSession, SessionStatus, DEFAULT_INIT_TIMEOUT};
pub use virtual_backend::{SentMessage, VirtualPlatform};

/// Connection state reported for an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Description of an available output port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDescriptor {
    /// Backend-stable port identifier
    pub id: String,
    /// Human-readable port name
    pub name: String,
    pub state: ConnectionState,
}

/// Result of asking the host platform for MIDI access
pub enum Capability {
    Granted(Box<dyn OutputEnumerator>),
    Denied(String),
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Granted(_) => write!(f, "Granted"),
            Capability::Denied(reason) => write!(f, "Denied({})", reason),
        }
    }
}

/// Host MIDI platform (real hardware or virtual)
#[async_trait]
pub trait MidiPlatform: Send + Sync {
    /// Platform name for logs (e.g. "midir", "virtual")
    fn name(&self) -> &str;

    /// Negotiate access; may suspend while the host grants permission
    ///
    /// Lack of MIDI support is `Ok(Capability::Denied)`, not an error.
    async fn request_access(&self) -> Result<Capability>;
}

/// Granted access: lists outputs and opens them
pub trait OutputEnumerator: Send + Sync {
    fn outputs(&self) -> Vec<OutputDescriptor>;

    fn open(&self, id: &str) -> Result<Box<dyn OutputPort>>;
}

/// An open output port
pub trait OutputPort: Send {
    /// Send raw bytes, optionally at a timestamp (microseconds)
    ///
    /// There is no delivery acknowledgment; backends log failures.
    fn send(&mut self, data: &[u8], timestamp: Option<u64>);
}
