//! MIDI controller - song select and transport commands
//!
//! Translates a song's routing fields into the bank-select sequence a
//! BeatBuddy-style unit expects:
//!
//! 1. `CC 0 = 0`       Bank Select MSB (always 0, only the LSB dimension is used)
//! 2. `CC 32 = folder` Bank Select LSB
//! 3. `PC program`     Program Change
//!
//! The order is fixed; the unit resolves the bank before it interprets the
//! program change. Everything goes out on channel 1 (0 on the wire).
//!
//! Tempo is carried along for logging only. Driving the unit's tempo would
//! need a continuous clock stream, which is not generated here.

use crate::catalog::Song;
use crate::device::DeviceSession;
use crate::midi::{cc, clamp_7bit, format_hex, MidiMessage};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Channel every message is sent on (0-based)
pub const CHANNEL: u8 = 0;

/// What happened to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the bound output
    Sent(Vec<MidiMessage>),
    /// No output bound; these are the messages that would have been sent
    Simulated(Vec<MidiMessage>),
}

impl SendOutcome {
    pub fn messages(&self) -> &[MidiMessage] {
        match self {
            SendOutcome::Sent(m) | SendOutcome::Simulated(m) => m,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SendOutcome::Simulated(_))
    }
}

/// Transport state as last commanded (the unit does not report back)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// The three-message song select sequence, after clamping
pub fn song_select_sequence(folder: i64, program: i64) -> [MidiMessage; 3] {
    [
        MidiMessage::ControlChange {
            channel: CHANNEL,
            cc: cc::BANK_SELECT_MSB,
            value: 0,
        },
        MidiMessage::ControlChange {
            channel: CHANNEL,
            cc: cc::BANK_SELECT_LSB,
            value: clamp_7bit(folder),
        },
        MidiMessage::ProgramChange {
            channel: CHANNEL,
            program: clamp_7bit(program),
        },
    ]
}

/// Sends song selects and transport commands through a `DeviceSession`
pub struct MidiController {
    session: Arc<DeviceSession>,
    transport: Mutex<TransportState>,
}

impl MidiController {
    pub fn new(session: Arc<DeviceSession>) -> Self {
        Self {
            session,
            transport: Mutex::new(TransportState::Stopped),
        }
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// Select `program` in `folder` on the unit
    ///
    /// Out-of-range values are clamped to 0-127. Every call emits the full
    /// sequence, identical arguments included.
    pub fn send_song_select(&self, folder: i64, program: i64, bpm: i64) -> SendOutcome {
        let messages = song_select_sequence(folder, program).to_vec();
        let outcome = self.emit(messages);

        let (safe_folder, safe_program) = (clamp_7bit(folder), clamp_7bit(program));
        if outcome.is_simulated() {
            warn!(
                "No MIDI output selected. Simulating command: folder {}, song {}, bpm {}",
                safe_folder, safe_program, bpm
            );
        } else {
            info!("MIDI sent: folder {}, song {}, bpm {}", safe_folder, safe_program, bpm);
        }
        outcome
    }

    /// Song select using a catalog record's routing fields
    pub fn send_song(&self, song: &Song) -> SendOutcome {
        debug!("Song select for '{}' ({})", song.title, song.id);
        self.send_song_select(song.folder, song.program, song.bpm)
    }

    /// MIDI Start (0xFA)
    pub fn start(&self) -> SendOutcome {
        let outcome = self.emit(vec![MidiMessage::Start]);
        *self.transport.lock() = TransportState::Playing;
        self.log_transport("start", &outcome);
        outcome
    }

    /// MIDI Stop (0xFC)
    pub fn stop(&self) -> SendOutcome {
        let outcome = self.emit(vec![MidiMessage::Stop]);
        *self.transport.lock() = TransportState::Stopped;
        self.log_transport("stop", &outcome);
        outcome
    }

    /// Stop when playing, start otherwise; returns the new state
    pub fn toggle_transport(&self) -> (TransportState, SendOutcome) {
        let outcome = match self.transport_state() {
            TransportState::Playing => self.stop(),
            TransportState::Stopped => self.start(),
        };
        (self.transport_state(), outcome)
    }

    pub fn transport_state(&self) -> TransportState {
        *self.transport.lock()
    }

    /// Write `messages` back to back on the bound output
    ///
    /// The session lock is held for the whole batch, so a concurrent
    /// transport command can never land between them.
    fn emit(&self, messages: Vec<MidiMessage>) -> SendOutcome {
        let written = self.session.with_output(|port| {
            for message in &messages {
                let bytes = message.encode();
                debug!("📤 MIDI out: {} ({})", format_hex(&bytes), message);
                port.send(&bytes, None);
            }
        });

        match written {
            Some(()) => SendOutcome::Sent(messages),
            None => SendOutcome::Simulated(messages),
        }
    }

    fn log_transport(&self, command: &str, outcome: &SendOutcome) {
        if outcome.is_simulated() {
            debug!("No MIDI output selected. Simulating transport {}", command);
        } else {
            info!("MIDI transport {}", command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{VirtualPlatform, DEFAULT_INIT_TIMEOUT};
    use proptest::prelude::*;

    async fn bound_controller() -> (MidiController, VirtualPlatform) {
        let platform = VirtualPlatform::new().with_device("bb", "BeatBuddy");
        let session = Arc::new(DeviceSession::new());
        assert!(session.initialize(&platform, DEFAULT_INIT_TIMEOUT).await);
        session.bind(Some("bb"));
        (MidiController::new(session), platform)
    }

    fn unbound_controller() -> MidiController {
        MidiController::new(Arc::new(DeviceSession::new()))
    }

    #[tokio::test]
    async fn test_song_select_bytes() {
        let (controller, platform) = bound_controller().await;

        let outcome = controller.send_song_select(2, 9, 100);

        assert!(!outcome.is_simulated());
        assert_eq!(
            platform.sent_bytes(),
            vec![vec![0xB0, 0, 0], vec![0xB0, 32, 2], vec![0xC0, 9]]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_clamps() {
        let (controller, platform) = bound_controller().await;

        let outcome = controller.send_song_select(-5, 200, 120);

        assert_eq!(
            outcome.messages(),
            &[
                MidiMessage::ControlChange { channel: 0, cc: 0, value: 0 },
                MidiMessage::ControlChange { channel: 0, cc: 32, value: 0 },
                MidiMessage::ProgramChange { channel: 0, program: 127 },
            ]
        );
        assert_eq!(
            platform.sent_bytes(),
            vec![vec![0xB0, 0, 0], vec![0xB0, 32, 0], vec![0xC0, 127]]
        );
    }

    #[tokio::test]
    async fn test_repeat_select_is_not_deduplicated() {
        let (controller, platform) = bound_controller().await;

        controller.send_song_select(1, 5, 115);
        controller.send_song_select(1, 5, 115);

        let sent = platform.sent_bytes();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[..3], sent[3..]);
    }

    #[tokio::test]
    async fn test_bpm_is_not_transmitted() {
        let (controller, platform) = bound_controller().await;

        controller.send_song_select(0, 1, 98);
        controller.send_song_select(0, 1, 240);

        let sent = platform.sent_bytes();
        assert_eq!(sent[..3], sent[3..]);
        assert!(sent.iter().flatten().all(|b| *b != 0xF8));
    }

    #[test]
    fn test_unbound_sends_are_simulated() {
        let controller = unbound_controller();

        let select = controller.send_song_select(3, 4, 90);
        assert!(select.is_simulated());
        assert_eq!(select.messages().len(), 3);

        assert_eq!(controller.start(), SendOutcome::Simulated(vec![MidiMessage::Start]));
        assert_eq!(controller.stop(), SendOutcome::Simulated(vec![MidiMessage::Stop]));
    }

    #[tokio::test]
    async fn test_transport_bytes_and_repeats() {
        let (controller, platform) = bound_controller().await;

        controller.start();
        controller.start();
        controller.stop();

        assert_eq!(platform.sent_bytes(), vec![vec![0xFA], vec![0xFA], vec![0xFC]]);
    }

    #[tokio::test]
    async fn test_toggle_transport() {
        let (controller, platform) = bound_controller().await;
        assert_eq!(controller.transport_state(), TransportState::Stopped);

        let (state, _) = controller.toggle_transport();
        assert_eq!(state, TransportState::Playing);
        let (state, _) = controller.toggle_transport();
        assert_eq!(state, TransportState::Stopped);

        assert_eq!(platform.sent_bytes(), vec![vec![0xFA], vec![0xFC]]);
    }

    #[tokio::test]
    async fn test_send_song_uses_routing_fields() {
        let (controller, platform) = bound_controller().await;
        let song = crate::catalog::SongDraft::new("Uptown Funk")
            .routing(1, 5)
            .bpm(115)
            .into_song(0)
            .unwrap();

        controller.send_song(&song);
        assert_eq!(
            platform.sent_bytes(),
            vec![vec![0xB0, 0, 0], vec![0xB0, 32, 1], vec![0xC0, 5]]
        );
    }

    #[tokio::test]
    async fn test_concurrent_transport_never_interleaves() {
        let (controller, platform) = bound_controller().await;
        let controller = Arc::new(controller);

        let selector = {
            let controller = controller.clone();
            std::thread::spawn(move || {
                for n in 0..200 {
                    controller.send_song_select(n % 128, (n * 7) % 128, 120);
                }
            })
        };
        let transport = {
            let controller = controller.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    controller.toggle_transport();
                }
            })
        };
        selector.join().unwrap();
        transport.join().unwrap();

        let sent = platform.sent_bytes();
        assert_eq!(sent.len(), 200 * 3 + 200);

        let mut i = 0;
        while i < sent.len() {
            if sent[i][0] == 0xB0 {
                assert_eq!(sent[i][1], 0, "bank MSB must lead");
                assert_eq!(sent[i + 1][..2], [0xB0u8, 32]);
                assert_eq!(sent[i + 2][0], 0xC0);
                i += 3;
            } else {
                assert!(sent[i] == [0xFAu8] || sent[i] == [0xFCu8]);
                i += 1;
            }
        }
    }

    proptest! {
        #[test]
        fn sequence_order_is_fixed(folder in any::<i64>(), program in any::<i64>()) {
            let [msb, lsb, pc] = song_select_sequence(folder, program);
            prop_assert_eq!(msb, MidiMessage::ControlChange { channel: 0, cc: 0, value: 0 });
            prop_assert_eq!(lsb, MidiMessage::ControlChange { channel: 0, cc: 32, value: clamp_7bit(folder) });
            prop_assert_eq!(pc, MidiMessage::ProgramChange { channel: 0, program: clamp_7bit(program) });
        }
    }
}
