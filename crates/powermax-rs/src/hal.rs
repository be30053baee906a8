// crates/powermax-rs/src/hal.rs

use core::fmt;

/// Defines a portable, descriptive Error type for the PowerMax driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmaxError {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// A payload exceeds the maximum frame or command size.
    FrameTooLarge,
    /// A frame had a bad preamble/trailer/escape sequence.
    Framing,
    /// A frame arrived with an invalid checksum.
    Checksum { expected: u8, got: u8 },
    /// An inbound message type the command table does not know.
    UnknownOpcode(u8),
    /// A value in a frame is not a valid SystemStatus code.
    InvalidSystemStatus(u8),
    /// The send queue is at capacity.
    QueueFull,
    /// The in-flight command's deadline expired.
    Timeout,
    /// The panel stopped talking to us (repeated timeouts or explicit stop).
    CommsFailure,
    /// A settings commit was attempted with EEPROM pages still missing.
    DownloadIncomplete { page: u8, offset: u8 },
    /// The command is not user-initiable in the current session state.
    NotPermitted,
    /// An underlying I/O error occurred on the serial line.
    IoError,
}

impl fmt::Display for PmaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer is too short"),
            Self::FrameTooLarge => write!(f, "Payload exceeds maximum frame size"),
            Self::Framing => write!(f, "Invalid frame (bad preamble/trailer/escape)"),
            Self::Checksum { expected, got } => {
                write!(f, "Checksum mismatch: expected {:#04x}, got {:#04x}", expected, got)
            }
            Self::UnknownOpcode(v) => write!(f, "Unknown message opcode: {:#04x}", v),
            Self::InvalidSystemStatus(v) => write!(f, "Invalid system status code: {:#04x}", v),
            Self::QueueFull => write!(f, "Send queue is full"),
            Self::Timeout => write!(f, "In-flight command timed out"),
            Self::CommsFailure => write!(f, "Communication with the panel failed"),
            Self::DownloadIncomplete { page, offset } => {
                write!(f, "EEPROM download incomplete at page {:#04x} offset {:#04x}", page, offset)
            }
            Self::NotPermitted => write!(f, "Command not permitted in the current state"),
            Self::IoError => write!(f, "Underlying serial I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PmaxError {}

/// Hardware Abstraction Layer (HAL) for the serial line and the host clock.
///
/// This trait abstracts the physical serial port plus the wall clock and the
/// host's packet-timeout configuration, enabling the core protocol logic to
/// remain platform-agnostic (no_std). The engine owns the serial line
/// exclusively; reads are performed by whoever drives `feed_bytes`, so a
/// typical host implements `read` on the same object it hands to the engine.
pub trait SerialInterface {
    /// Opens the serial port. Called by the host before handing the
    /// interface to the engine; provided here so one object can own the
    /// whole port lifecycle.
    fn open(&mut self, port_name: &str) -> Result<(), PmaxError>;

    /// Attempts to read pending bytes into the provided buffer.
    /// Non-blocking or short-blocking; returns the number of bytes read.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PmaxError>;

    /// Writes raw frame bytes to the panel. Returns the number written.
    fn write(&mut self, data: &[u8]) -> Result<usize, PmaxError>;

    /// Closes the serial port.
    fn close(&mut self);

    /// Short busy-wait, used to pace back-to-back frame writes.
    fn sleep_us(&mut self, microseconds: u32);

    /// Monotonic seconds since an arbitrary epoch.
    fn current_time_sec(&self) -> u64;

    /// Per-packet reply timeout in milliseconds.
    fn packet_timeout_ms(&self) -> u32 {
        crate::types::PACKET_TIMEOUT_MS
    }
}
