// crates/powermax-rs/src/engine/settings.rs
//! Extracts the panel configuration from the downloaded EEPROM image.
//!
//! Offsets below come from wire captures of PowerMax Pro class panels; the
//! download phase requests exactly the regions this parser consumes.

use crate::hal::PmaxError;
use crate::mmap::MemoryMap;
use crate::model::{PanelConfig, Zone};
use crate::types::{MAX_PHONE_COUNT, MAX_USER_PIN_COUNT, MAX_ZONE_COUNT};
use heapless::String;
use log::debug;

/// EEPROM regions consumed by the settings parser.
pub(crate) mod layout {
    /// Firmware/identity strings live in page 0.
    pub const STRINGS_PAGE: u8 = 0x00;
    /// EEPROM revision, 16 bytes, NUL terminated.
    pub const EPROM_REV: u8 = 0xC0;
    /// Software revision, 16 bytes, NUL terminated.
    pub const SOFTWARE_REV: u8 = 0xD0;
    /// Serial number, 14 bytes, NUL terminated.
    pub const SERIAL_NUMBER: u8 = 0xE0;

    /// PINs, phone numbers, capacities and zone definitions live in page 1.
    pub const CODES_PAGE: u8 = 0x01;
    pub const INSTALLER_PIN: u8 = 0x00;
    pub const MASTER_INSTALLER_PIN: u8 = 0x02;
    pub const POWERLINK_PIN: u8 = 0x04;
    /// 48 user PINs, 2 BCD bytes each.
    pub const USER_PINS: u8 = 0x08;
    /// 4 phone numbers, 8 packed-BCD bytes each.
    pub const PHONE_NUMBERS: u8 = 0x68;
    /// Partition count followed by the eight per-resource maxima.
    pub const CAPACITIES: u8 = 0x88;
    /// 30 zone definitions, (zone type, sensor id) pairs.
    pub const ZONE_DEFS: u8 = 0x98;

    /// Zone names start at page 2 offset 0; 16 bytes per zone, zones 1..30,
    /// running into page 3.
    pub const ZONE_NAMES_PAGE: u8 = 0x02;
    pub const ZONE_NAME_LEN: usize = 0x10;
}

/// Populates `cfg` and the zone table from the image. Fails with the first
/// missing region and leaves `parsed_ok` false so the caller can re-request.
pub(crate) fn process_settings(
    map: &MemoryMap,
    cfg: &mut PanelConfig,
    zones: &mut [Zone; MAX_ZONE_COUNT],
) -> Result<(), PmaxError> {
    *cfg = PanelConfig::default();

    // --- Identity strings ---
    let mut buf = [0u8; 16];
    read_required(map, layout::STRINGS_PAGE, layout::EPROM_REV, &mut buf)?;
    cfg.eprom = cstr(&buf);
    read_required(map, layout::STRINGS_PAGE, layout::SOFTWARE_REV, &mut buf)?;
    cfg.software = cstr(&buf);
    let mut serial = [0u8; 14];
    read_required(map, layout::STRINGS_PAGE, layout::SERIAL_NUMBER, &mut serial)?;
    cfg.serial_number = cstr(&serial);

    // --- PIN codes (4-digit BCD) ---
    let mut pins = [0u8; 6];
    read_required(map, layout::CODES_PAGE, layout::INSTALLER_PIN, &mut pins)?;
    cfg.installer_pin = bcd_pin(&pins[0..2]);
    cfg.master_installer_pin = bcd_pin(&pins[2..4]);
    cfg.powerlink_pin = bcd_pin(&pins[4..6]);

    let mut user_pins = [0u8; MAX_USER_PIN_COUNT * 2];
    read_required(map, layout::CODES_PAGE, layout::USER_PINS, &mut user_pins)?;
    for (i, chunk) in user_pins.chunks_exact(2).enumerate() {
        cfg.user_pins[i] = bcd_pin(chunk);
    }

    // --- Phone numbers (packed BCD, 0xF nibble terminates) ---
    let mut phones = [0u8; MAX_PHONE_COUNT * 8];
    read_required(map, layout::CODES_PAGE, layout::PHONE_NUMBERS, &mut phones)?;
    for (i, chunk) in phones.chunks_exact(8).enumerate() {
        cfg.phone[i] = packed_bcd(chunk);
    }

    // --- Capacities ---
    let mut caps = [0u8; 9];
    read_required(map, layout::CODES_PAGE, layout::CAPACITIES, &mut caps)?;
    cfg.partition_cnt = caps[0];
    cfg.max_zone_cnt = caps[1];
    cfg.max_custom_cnt = caps[2];
    cfg.max_user_cnt = caps[3];
    cfg.max_partition_cnt = caps[4];
    cfg.max_siren_cnt = caps[5];
    cfg.max_keypad1_cnt = caps[6];
    cfg.max_keypad2_cnt = caps[7];
    cfg.max_keyfob_cnt = caps[8];

    // --- Zone definitions and names ---
    let mut defs = [0u8; (MAX_ZONE_COUNT - 1) * 2];
    read_required(map, layout::CODES_PAGE, layout::ZONE_DEFS, &mut defs)?;

    let mut name = [0u8; layout::ZONE_NAME_LEN];
    for zone_id in 1..MAX_ZONE_COUNT {
        let linear = (zone_id - 1) * layout::ZONE_NAME_LEN;
        let page = layout::ZONE_NAMES_PAGE + (linear / 256) as u8;
        let offset = (linear % 256) as u8;
        read_required(map, page, offset, &mut name)?;

        let zone = &mut zones[zone_id];
        // 0x00 / 0xFF in the first byte marks an unprogrammed slot.
        if name[0] == 0x00 || name[0] == 0xFF {
            zone.enrolled = false;
            zone.name = String::new();
            continue;
        }
        zone.enrolled = true;
        zone.name = cstr(&name);
        zone.zone_type = defs[(zone_id - 1) * 2];
        zone.sensor_id = defs[(zone_id - 1) * 2 + 1];
        zone.sensor_type = sensor_type_name(zone.sensor_id);
        zone.auto_create = auto_create_hint(zone.sensor_id);
        zone.stat.active = true;
        debug!(
            "Zone {} '{}' type {} sensor {:#04x} ({})",
            zone_id, zone.name, zone.zone_type, zone.sensor_id, zone.sensor_type
        );
    }

    cfg.parsed_ok = true;
    Ok(())
}

fn read_required(
    map: &MemoryMap,
    page: u8,
    offset: u8,
    out: &mut [u8],
) -> Result<(), PmaxError> {
    let r = map.read(page, offset, out);
    if r.complete {
        Ok(())
    } else {
        Err(PmaxError::DownloadIncomplete { page, offset })
    }
}

/// Decodes a 4-digit BCD PIN. Unprogrammed slots (any nibble above 9) come
/// back as the empty string.
fn bcd_pin<const N: usize>(bytes: &[u8]) -> String<N> {
    let mut out = String::new();
    for &b in bytes {
        for nibble in [b >> 4, b & 0x0F] {
            if nibble > 9 {
                return String::new();
            }
            let _ = out.push((b'0' + nibble) as char);
        }
    }
    out
}

/// Decodes a packed-BCD phone number; a 0xF nibble terminates.
fn packed_bcd<const N: usize>(bytes: &[u8]) -> String<N> {
    let mut out = String::new();
    for &b in bytes {
        for nibble in [b >> 4, b & 0x0F] {
            if nibble > 9 {
                return out;
            }
            if out.push((b'0' + nibble) as char).is_err() {
                return out;
            }
        }
    }
    out
}

/// Copies a NUL-terminated ASCII field, dropping trailing padding.
fn cstr<const N: usize>(bytes: &[u8]) -> String<N> {
    let mut out = String::new();
    for &b in bytes {
        if b == 0 || b == 0xFF || !(0x20..0x7F).contains(&b) {
            break;
        }
        if out.push(b as char).is_err() {
            break;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Sensor family as reported in the zone definition's sensor id byte.
fn sensor_type_name(sensor_id: u8) -> &'static str {
    match sensor_id >> 4 {
        0x0 => "Magnet",
        0x1 => "Motion",
        0x2 => "Smoke",
        0x3 => "Gas",
        0x4 => "Flood",
        0x5 => "Temperature",
        _ => "Unknown",
    }
}

/// Default entity class a host should create for this sensor.
fn auto_create_hint(sensor_id: u8) -> &'static str {
    match sensor_id >> 4 {
        0x0 => "door",
        0x1 => "motion",
        0x2 | 0x3 => "smoke",
        0x4 => "moisture",
        0x5 => "temperature",
        _ => "generic",
    }
}
