//! MIDI message types used to drive the accompaniment unit
//!
//! Provides encoding, parsing (for logs and tests), 7-bit range clamping and
//! hex formatting of the few message kinds this crate emits.

use std::fmt;

/// Controller numbers used by the bank-select sequence
pub mod cc {
    /// Bank Select MSB (coarse)
    pub const BANK_SELECT_MSB: u8 = 0;
    /// Bank Select LSB (fine), carries the song folder
    pub const BANK_SELECT_LSB: u8 = 32;
}

/// Status bytes
pub mod status {
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;

    // System Real-Time
    pub const START: u8 = 0xFA;
    pub const STOP: u8 = 0xFC;
}

/// MIDI message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Start
    Start,

    /// Stop
    Stop,
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Only the message kinds above are recognized; anything else is `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // Running status is not supported
        if status < 0x80 {
            return None;
        }

        if status < 0xF0 {
            let channel = status & 0x0F;
            match status & 0xF0 {
                status::CONTROL_CHANGE => {
                    if rest.len() < 2 { return None; }
                    Some(MidiMessage::ControlChange {
                        channel,
                        cc: rest[0] & 0x7F,
                        value: rest[1] & 0x7F,
                    })
                }
                status::PROGRAM_CHANGE => {
                    let program = *rest.first()? & 0x7F;
                    Some(MidiMessage::ProgramChange { channel, program })
                }
                _ => None,
            }
        } else {
            match status {
                status::START => Some(MidiMessage::Start),
                status::STOP => Some(MidiMessage::Stop),
                _ => None,
            }
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![status::CONTROL_CHANGE | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![status::PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::Start => vec![status::START],
            MidiMessage::Stop => vec![status::STOP],
        }
    }

    /// Get the channel for channel messages (0-15), None for system messages
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

/// Clamp an arbitrary integer into the 7-bit data range (0-127)
///
/// Out-of-range input is not an error: it is pinned to the nearest bound.
pub fn clamp_7bit(value: i64) -> u8 {
    value.clamp(0, 127) as u8
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
