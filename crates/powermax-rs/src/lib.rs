#![cfg_attr(not(feature = "std"), no_std)]

//! Platform-agnostic driver core for Visonic PowerMax / PowerMaster alarm
//! panels, speaking the PowerLink accessory protocol over a serial line.
//!
//! The host supplies the serial transport and clock through
//! [`SerialInterface`], feeds inbound bytes to [`PowerMaxEngine::feed_bytes`]
//! and calls [`PowerMaxEngine::tick`] at least every 200 ms. The engine
//! enrolls with the panel, downloads and parses its EEPROM image, then
//! mirrors zones, arming mode and troubles while accepting control commands.

// 'alloc' is used for the sparse EEPROM image and JSON rendering.
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod hal;

// --- Wire Protocol ---
pub mod frame;
pub mod commands;

// --- State ---
pub mod mmap;
pub mod model;
pub mod session;

// --- Engine & Host-Facing Surfaces ---
pub mod engine;
pub mod output;

// --- Top-level Exports ---
pub use commands::PmaxCommand;
pub use engine::{EngineOptions, PowerMaxEngine};
pub use frame::PlinkPacket;
pub use frame::codec::{FrameAssembler, encode_frame, is_buffer_ok};
pub use hal::{PmaxError, SerialInterface};
pub use model::{PanelConfig, StatusFlags, SystemStatus, Zone, ZoneEvent};
pub use output::Output;
pub use session::SessionState;
