// crates/powermax-rs/src/model/mod.rs
//! Live mirror of panel state: zones, arming mode, flags and the
//! configuration downloaded from panel EEPROM.

use crate::hal::PmaxError;
use crate::output::Output;
use crate::types::{MAX_PHONE_COUNT, MAX_USER_PIN_COUNT};
use heapless::String;

/// Last event recorded for a zone (or for the panel itself on index 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneEvent {
    #[default]
    None,
    TamperAlarm,
    TamperRestore,
    Open,
    Closed,
    Violated,
    PanicAlarm,
    RfJamming,
    TamperOpen,
    CommunicationFailure,
    LineFailure,
    Fuse,
    NotActive,
    LowBattery,
    AcFailure,
    FireAlarm,
    Emergency,
    SirenTamper,
    SirenTamperRestore,
    SirenLowBattery,
    SirenAcFail,
}

impl ZoneEvent {
    /// The panel's wire code for zone events follows the declaration order
    /// of this enum; codes outside the table map to `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::None,
            0x01 => Self::TamperAlarm,
            0x02 => Self::TamperRestore,
            0x03 => Self::Open,
            0x04 => Self::Closed,
            0x05 => Self::Violated,
            0x06 => Self::PanicAlarm,
            0x07 => Self::RfJamming,
            0x08 => Self::TamperOpen,
            0x09 => Self::CommunicationFailure,
            0x0A => Self::LineFailure,
            0x0B => Self::Fuse,
            0x0C => Self::NotActive,
            0x0D => Self::LowBattery,
            0x0E => Self::AcFailure,
            0x0F => Self::FireAlarm,
            0x10 => Self::Emergency,
            0x11 => Self::SirenTamper,
            0x12 => Self::SirenTamperRestore,
            0x13 => Self::SirenLowBattery,
            0x14 => Self::SirenAcFail,
            _ => return None,
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::TamperAlarm => "Tamper Alarm",
            Self::TamperRestore => "Tamper Restore",
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Violated => "Violated (Motion)",
            Self::PanicAlarm => "Panic Alarm",
            Self::RfJamming => "RF Jamming",
            Self::TamperOpen => "Tamper Open",
            Self::CommunicationFailure => "Communication Failure",
            Self::LineFailure => "Line Failure",
            Self::Fuse => "Fuse",
            Self::NotActive => "Not Active",
            Self::LowBattery => "Low Battery",
            Self::AcFailure => "AC Failure",
            Self::FireAlarm => "Fire Alarm",
            Self::Emergency => "Emergency",
            Self::SirenTamper => "Siren Tamper",
            Self::SirenTamperRestore => "Siren Tamper Restore",
            Self::SirenLowBattery => "Siren Low Battery",
            Self::SirenAcFail => "Siren AC Fail",
        }
    }
}

/// Overall system status, with the panel's wire-level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SystemStatus {
    #[default]
    Disarm = 0x00,
    ExitDelay = 0x01,
    ExitDelay2 = 0x02,
    EntryDelay = 0x03,
    ArmedHome = 0x04,
    ArmedAway = 0x05,
    UserTest = 0x06,
    Downloading = 0x07,
    Programming = 0x08,
    Installer = 0x09,
    HomeBypass = 0x0A,
    AwayBypass = 0x0B,
    Ready = 0x0C,
    NotReady = 0x0D,
}

impl TryFrom<u8> for SystemStatus {
    type Error = PmaxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Disarm,
            0x01 => Self::ExitDelay,
            0x02 => Self::ExitDelay2,
            0x03 => Self::EntryDelay,
            0x04 => Self::ArmedHome,
            0x05 => Self::ArmedAway,
            0x06 => Self::UserTest,
            0x07 => Self::Downloading,
            0x08 => Self::Programming,
            0x09 => Self::Installer,
            0x0A => Self::HomeBypass,
            0x0B => Self::AwayBypass,
            0x0C => Self::Ready,
            0x0D => Self::NotReady,
            other => return Err(PmaxError::InvalidSystemStatus(other)),
        })
    }
}

impl SystemStatus {
    pub fn description(self) -> &'static str {
        match self {
            Self::Disarm => "Disarmed",
            Self::ExitDelay => "Exit Delay",
            Self::ExitDelay2 => "Exit Delay 2",
            Self::EntryDelay => "Entry Delay",
            Self::ArmedHome => "Armed Home",
            Self::ArmedAway => "Armed Away",
            Self::UserTest => "User Test",
            Self::Downloading => "Downloading",
            Self::Programming => "Programming",
            Self::Installer => "Installer",
            Self::HomeBypass => "Home Bypass",
            Self::AwayBypass => "Away Bypass",
            Self::Ready => "Ready",
            Self::NotReady => "Not Ready",
        }
    }
}

/// The panel's 8-bit status bitfield as a type-safe bitmask.
///
/// Bits 4..6 are one-shot notifications of the last event; the panel clears
/// them in its next status frame. The engine stores whatever the panel sent
/// and exposes predicates plus explicit consume operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    /// System is ready to arm.
    pub const READY: Self = Self(1 << 0);
    /// Alert in memory.
    pub const ALERT_IN_MEMORY: Self = Self(1 << 1);
    /// Trouble condition present.
    pub const TROUBLE: Self = Self(1 << 2);
    /// At least one zone is bypassed.
    pub const BYPASS_ON: Self = Self(1 << 3);
    /// One-shot: last 10 seconds of entry or exit delay.
    pub const LAST_10_SECONDS: Self = Self(1 << 4);
    /// One-shot: a zone event occurred.
    pub const ZONE_EVENT: Self = Self(1 << 5);
    /// One-shot: an arm or disarm event occurred.
    pub const ARM_DISARM_EVENT: Self = Self(1 << 6);
    /// Alarm event.
    pub const ALARM_EVENT: Self = Self(1 << 7);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn empty() -> Self {
        Self(0)
    }

    /// Checks if all of the specified flags are set.
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Reads and clears a one-shot flag in a single operation, so callers do
    /// not have to rely on the panel's ambient clearing behaviour.
    pub fn take(&mut self, other: Self) -> bool {
        let set = self.contains(other);
        self.remove(other);
        set
    }
}

/// Basic state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneState {
    /// Battery needs replacing.
    pub low_battery: bool,
    /// Someone tampered with the device.
    pub tamper: bool,
    /// Door is open (either intrusion or not ready to arm).
    pub door_open: bool,
    /// User temporarily disabled this zone.
    pub bypassed: bool,
    /// Communication with the device is OK.
    pub active: bool,
}

/// A sensor input on the panel. Valid zone numbers are 1..30; index 0 is
/// the panel itself.
#[derive(Debug, Clone, Default)]
pub struct Zone {
    /// The panel knows about this zone (it is configured).
    pub enrolled: bool,
    /// Downloaded from panel EEPROM.
    pub name: String<16>,
    pub zone_type: u8,
    pub sensor_id: u8,
    pub sensor_type: &'static str,
    pub auto_create: &'static str,
    pub stat: ZoneState,
    pub last_event: ZoneEvent,
    /// Seconds timestamp of `last_event`.
    pub last_event_time: u64,
}

impl Zone {
    pub fn record_event(&mut self, event: ZoneEvent, now: u64) {
        self.last_event = event;
        self.last_event_time = now;
    }

    pub fn dump_to_json(&self, zone_id: usize, out: &mut dyn Output) {
        out.write("{");
        out.write_json_tag_int("zone", zone_id as i64, true);
        out.write_json_tag_str("name", self.name.as_str(), true);
        out.write_json_tag_int("zoneType", self.zone_type as i64, true);
        out.write_json_tag_int("sensorId", self.sensor_id as i64, true);
        out.write_json_tag_str("sensorType", self.sensor_type, true);
        out.write_json_tag_str("autoCreate", self.auto_create, true);
        out.write_json_tag_bool("lowBattery", self.stat.low_battery, true);
        out.write_json_tag_bool("tamper", self.stat.tamper, true);
        out.write_json_tag_bool("doorOpen", self.stat.door_open, true);
        out.write_json_tag_bool("bypassed", self.stat.bypassed, true);
        out.write_json_tag_bool("active", self.stat.active, true);
        out.write_json_tag_str("lastEvent", self.last_event.description(), true);
        out.write_json_tag_int("lastEventTime", self.last_event_time as i64, false);
        out.write("}");
    }
}

/// Configuration downloaded from the panel EEPROM.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// A full download has been assimilated.
    pub parsed_ok: bool,

    pub installer_pin: String<4>,
    pub master_installer_pin: String<4>,
    pub powerlink_pin: String<4>,
    pub user_pins: [String<4>; MAX_USER_PIN_COUNT],

    /// Telephone numbers to call, max 14 digits each.
    pub phone: [String<14>; MAX_PHONE_COUNT],

    pub serial_number: String<14>,
    pub eprom: String<16>,
    pub software: String<16>,

    pub partition_cnt: u8,

    // Panel maximum capabilities (not actual counts in use).
    pub max_zone_cnt: u8,
    pub max_custom_cnt: u8,
    pub max_user_cnt: u8,
    pub max_partition_cnt: u8,
    pub max_siren_cnt: u8,
    pub max_keypad1_cnt: u8,
    pub max_keypad2_cnt: u8,
    pub max_keyfob_cnt: u8,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            parsed_ok: false,
            installer_pin: String::new(),
            master_installer_pin: String::new(),
            powerlink_pin: String::new(),
            user_pins: core::array::from_fn(|_| String::new()),
            phone: core::array::from_fn(|_| String::new()),
            serial_number: String::new(),
            eprom: String::new(),
            software: String::new(),
            partition_cnt: 0,
            max_zone_cnt: 0,
            max_custom_cnt: 0,
            max_user_cnt: 0,
            max_partition_cnt: 0,
            max_siren_cnt: 0,
            max_keypad1_cnt: 0,
            max_keypad2_cnt: 0,
            max_keyfob_cnt: 0,
        }
    }
}

impl PanelConfig {
    /// The installer PIN packed as two BCD bytes, big-endian, for patching
    /// into command templates. `None` until a download provided it.
    pub fn installer_pin_bcd(&self) -> Option<[u8; 2]> {
        pin_to_bcd(self.installer_pin.as_str())
    }

    /// PINs and phone numbers are deliberately not exported.
    pub fn dump_to_json(&self, out: &mut dyn Output) {
        out.write("{");
        out.write_json_tag_bool("parsedOk", self.parsed_ok, true);
        out.write_json_tag_str("serialNumber", self.serial_number.as_str(), true);
        out.write_json_tag_str("eprom", self.eprom.as_str(), true);
        out.write_json_tag_str("software", self.software.as_str(), true);
        out.write_json_tag_int("partitionCnt", self.partition_cnt as i64, true);
        out.write_json_tag_int("maxZoneCnt", self.max_zone_cnt as i64, true);
        out.write_json_tag_int("maxCustomCnt", self.max_custom_cnt as i64, true);
        out.write_json_tag_int("maxUserCnt", self.max_user_cnt as i64, true);
        out.write_json_tag_int("maxPartitionCnt", self.max_partition_cnt as i64, true);
        out.write_json_tag_int("maxSirenCnt", self.max_siren_cnt as i64, true);
        out.write_json_tag_int("maxKeypad1Cnt", self.max_keypad1_cnt as i64, true);
        out.write_json_tag_int("maxKeypad2Cnt", self.max_keypad2_cnt as i64, true);
        out.write_json_tag_int("maxKeyfobCnt", self.max_keyfob_cnt as i64, false);
        out.write("}");
    }
}

/// Marketing name for the panel type byte announced in the panel-info
/// message. Types 7 and up are the PowerMaster family.
pub fn panel_type_name(panel_type: u8) -> &'static str {
    match panel_type {
        0 => "PowerMax",
        1 => "PowerMax+",
        2 => "PowerMax Pro",
        3 => "PowerMax Complete",
        4 => "PowerMax Pro Part",
        5 => "PowerMax Complete Part",
        6 => "PowerMax Express",
        7 => "PowerMaster 10",
        8 => "PowerMaster 30",
        _ => "Unknown panel",
    }
}

/// Packs a 4-digit PIN string into two BCD bytes, big-endian: "1234"
/// becomes `[0x12, 0x34]`.
pub fn pin_to_bcd(pin: &str) -> Option<[u8; 2]> {
    let bytes = pin.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let d = |i: usize| bytes[i] - b'0';
    Some([(d(0) << 4) | d(1), (d(2) << 4) | d(3)])
}
