// crates/powermax-rs/src/types.rs

// --- Buffer limits (PowerLink wire protocol) ---

/// Maximum size of a deframed PowerLink packet (opcode + parameters).
pub const MAX_BUFFER_SIZE: usize = 250;

/// Maximum size of an outbound command payload.
pub const MAX_SEND_BUFFER_SIZE: usize = 15;

/// Depth of the outbound send queue.
pub const MAX_SEND_QUEUE_DEPTH: usize = 15;

/// Default per-packet reply timeout in milliseconds.
pub const PACKET_TIMEOUT_MS: u32 = 2000;

/// Zone slots. Index 0 is the panel itself and is never surfaced to users.
pub const MAX_ZONE_COUNT: usize = 31;

/// Number of user PIN slots in the panel EEPROM.
pub const MAX_USER_PIN_COUNT: usize = 48;

/// Number of phone-number slots in the panel EEPROM.
pub const MAX_PHONE_COUNT: usize = 4;

/// Temporary PIN used to enrol as a PowerLink accessory. Does not have to
/// match any user or installer code.
///
/// Note the encoding: this is the BCD image of the digits "3622", not a hex
/// quantity. A PIN of "1234" would be written here as 0x1234. The two bytes
/// go big-endian into the enroll template.
pub const POWERLINK_PIN: u16 = 0x3622;

// --- Framing bytes ---

/// Every frame starts with this byte.
pub const PM_PREAMBLE: u8 = 0x0D;
/// Every frame ends with this byte.
pub const PM_TRAILER: u8 = 0x0A;
/// Escape marker for preamble/trailer/escape bytes inside the payload.
pub const PM_ESCAPE: u8 = 0x1D;
/// An escaped byte is transmitted as `PM_ESCAPE, byte ^ PM_ESCAPE_XOR`.
pub const PM_ESCAPE_XOR: u8 = 0x20;

/// Inbound message-type opcodes (first byte of a deframed packet).
pub mod opcode {
    /// Acknowledge.
    pub const ACK: u8 = 0x02;
    /// Panel-side timeout (sent when we are too slow during download).
    pub const TIMEOUT: u8 = 0x06;
    /// Access denied (wrong PIN, or panel wants a PowerLink enroll first).
    pub const ACCESS_DENIED: u8 = 0x08;
    /// Panel-initiated end of session.
    pub const STOP: u8 = 0x0B;
    /// Panel acknowledges download mode and declares the EEPROM geometry.
    pub const DOWNLOAD_INFO: u8 = 0x25;
    /// Fixed-size (8 byte) EEPROM settings chunk.
    pub const DOWNLOAD_SETTINGS: u8 = 0x33;
    /// Panel type / model announcement.
    pub const PANEL_INFO: u8 = 0x3C;
    /// Variable-length EEPROM settings block.
    pub const DOWNLOAD_BLOCK: u8 = 0x3F;
    /// Event log record.
    pub const EVENT_LOG: u8 = 0xA0;
    /// Periodic status update (zone bitmaps, panel state).
    pub const STATUS_UPDATE: u8 = 0xA5;
    /// Panel status change notification (logged events).
    pub const STATUS_CHANGE: u8 = 0xA7;
    /// PowerLink family (keep-alive ping, enroll).
    pub const POWERLINK: u8 = 0xAB;
    /// PowerMaster extension traffic.
    pub const POWERMASTER: u8 = 0xB0;
}

/// Sub-opcodes of the PowerLink (0xAB) message family.
pub mod powerlink_sub {
    pub const PING: u8 = 0x03;
    pub const ENROLL: u8 = 0x0A;
}

/// The two acknowledgement framings the panel expects, depending on the
/// inbound message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckType {
    /// Short ACK: `02`.
    #[default]
    Ack1,
    /// Long ACK: `02 43`, required by the PowerLink message family.
    Ack2,
}
