//! Setlist Sync library
//!
//! Song catalog, multi-client change bus, and MIDI control of a
//! BeatBuddy-style drum machine. `main.rs` wires these into a REPL; the
//! same pieces can sit behind any other presentation layer.

pub mod bus;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod midi;
pub mod orchestrator;
pub mod paths;

pub use bus::ChangeBus;
pub use catalog::{CatalogStore, Song, SongDraft};
pub use controller::MidiController;
pub use device::DeviceSession;
pub use error::{CatalogError, ValidationError};
pub use orchestrator::Orchestrator;
