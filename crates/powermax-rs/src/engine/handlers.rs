// crates/powermax-rs/src/engine/handlers.rs
//! Per-message-type handlers. Each takes the engine and the decoded packet,
//! mutates the zone/system mirror and drives the session machine.

use super::PowerMaxEngine;
use super::download::DownloadTracker;
use crate::commands::PmaxCommand;
use crate::frame::PlinkPacket;
use crate::hal::SerialInterface;
use crate::model::{StatusFlags, SystemStatus, ZoneEvent, panel_type_name};
use crate::session::{SessionEvent, SessionState};
use crate::types::{MAX_ZONE_COUNT, opcode, powerlink_sub};
use log::{debug, info, warn};

/// Routes a validated packet to its handler. The mapping is exhaustive;
/// message types outside the captured set are logged and ACKed.
pub(super) fn dispatch<S: SerialInterface>(engine: &mut PowerMaxEngine<S>, packet: &PlinkPacket) {
    match packet.opcode() {
        opcode::ACK => engine.handle_ack(packet),
        opcode::TIMEOUT => engine.handle_timeout(packet),
        opcode::ACCESS_DENIED => engine.handle_access_denied(packet),
        opcode::STOP => engine.handle_stop(packet),
        opcode::DOWNLOAD_INFO => engine.handle_download_info(packet),
        opcode::DOWNLOAD_SETTINGS | opcode::DOWNLOAD_BLOCK => {
            engine.handle_download_settings(packet)
        }
        opcode::PANEL_INFO => engine.handle_panel_info(packet),
        opcode::EVENT_LOG => engine.handle_event_log(packet),
        opcode::STATUS_UPDATE => engine.handle_status_update(packet),
        opcode::STATUS_CHANGE => engine.handle_status_change(packet),
        opcode::POWERLINK => engine.handle_powerlink(packet),
        opcode::POWERMASTER => engine.handle_powermaster(packet),
        other => engine.handle_unknown(other),
    }
}

impl<S: SerialInterface> PowerMaxEngine<S> {
    fn handle_ack(&mut self, _packet: &PlinkPacket) {
        match &self.in_flight {
            Some(inflight)
                if inflight.command.expected_reply == 0
                    || inflight.command.expected_reply == opcode::ACK =>
            {
                debug!("'{}' acknowledged", inflight.command.description);
                self.in_flight = None;
            }
            // A command awaiting a specific reply stays in flight; the panel
            // acks first and answers afterwards.
            Some(_) => {}
            None => debug!("Stray ack"),
        }
    }

    /// The panel got bored waiting for us (it times download sessions out
    /// aggressively). Check for gaps and keep the download moving.
    fn handle_timeout(&mut self, _packet: &PlinkPacket) {
        self.send_ack();
        if self.download_mode {
            debug!("Panel timeout during download, checking for missing ranges");
            self.request_missing_ranges();
        } else {
            debug!("Panel timeout message outside download");
        }
    }

    fn handle_access_denied(&mut self, _packet: &PlinkPacket) {
        self.send_ack();
        match self.session.current_state() {
            // During enrolment a denial means: prove yourself with the
            // PowerLink PIN. Re-send the enroll reply, never advance.
            SessionState::Idle | SessionState::Enrolling => {
                info!("Access denied during enrolment, re-sending enroll reply");
                self.in_flight = None;
                self.last_enroll_attempt = self.serial.current_time_sec();
                self.session.process_event(SessionEvent::AccessDenied);
                let _ = self.queue_template(PmaxCommand::EnrollReply);
            }
            _ => {
                if let Some(inflight) = self.in_flight.take() {
                    warn!(
                        "Access denied for '{}', dropping it",
                        inflight.command.description
                    );
                } else {
                    warn!("Unsolicited access denied");
                }
            }
        }
    }

    fn handle_stop(&mut self, _packet: &PlinkPacket) {
        self.send_ack();
        info!("Panel ended the session");
        self.send_queue.clear();
        self.in_flight = None;
        self.download_mode = false;
        self.session.process_event(SessionEvent::PanelStop);
    }

    fn handle_panel_info(&mut self, packet: &PlinkPacket) {
        self.model_type = packet.byte(1).unwrap_or(0);
        self.panel_type = packet.byte(7).unwrap_or(0);
        self.powermaster = self.panel_type >= 7;
        info!(
            "Panel: {} (type {}, model {:#04x})",
            panel_type_name(self.panel_type),
            self.panel_type,
            self.model_type
        );
        self.send_ack();
        self.session.process_event(SessionEvent::PanelInfo);
        let _ = self.queue_template(PmaxCommand::DownloadStart);
    }

    /// The panel accepted download mode. Request everything the settings
    /// parser needs: the named regions plus the generic page tiling.
    fn handle_download_info(&mut self, packet: &PlinkPacket) {
        let last_page = packet.byte(2).unwrap_or(0);
        info!(
            "Panel entered download mode (declares {} main pages)",
            last_page as u16 + 1
        );
        self.download_mode = true;
        self.download.clear();
        self.send_ack();

        for cmd in [
            PmaxCommand::DownloadPanelFw,
            PmaxCommand::DownloadSerial,
            PmaxCommand::DownloadZoneStr,
        ] {
            let t = cmd.template();
            let len = u16::from_le_bytes([t.bytes[3], t.bytes[4]]);
            self.download.request(t.bytes[2], t.bytes[1], len);
            let _ = self.queue_template(cmd);
        }
        for tile in DownloadTracker::main_tiles(last_page) {
            self.download.request(tile.page, tile.offset, tile.len);
            let _ = self.queue_dl_get(tile.page, tile.offset, tile.len);
        }

        self.session.process_event(SessionEvent::DownloadInfo);
    }

    /// An EEPROM run from the panel, either the fixed 8-byte form (0x33) or
    /// the variable-length block form (0x3F). Commit it to the image and
    /// finish the download once nothing is missing.
    fn handle_download_settings(&mut self, packet: &PlinkPacket) {
        let (Some(offset), Some(page)) = (packet.byte(1), packet.byte(2)) else {
            warn!("Short download-settings packet");
            return;
        };
        let data = &packet.as_slice()[3..];
        if data.is_empty() {
            warn!("Empty download-settings packet for page {:#04x}", page);
            return;
        }

        debug!(
            "EEPROM {} bytes at page {:#04x} offset {:#04x}",
            data.len(),
            page,
            offset
        );
        if page >= 0x80 {
            // PowerMaster extended image.
            self.map_extended.write(page - 0x80, offset, data);
        } else {
            self.map_main.write(page, offset, data);
        }
        self.send_ack();

        if self.download_mode && self.download.is_complete(&self.map_main) {
            self.finish_download();
        }
    }

    fn handle_event_log(&mut self, packet: &PlinkPacket) {
        self.send_ack();
        let total = packet.byte(1).unwrap_or(0);
        let index = packet.byte(2).unwrap_or(0);
        let second = packet.byte(4).unwrap_or(0);
        let minute = packet.byte(5).unwrap_or(0);
        let hour = packet.byte(6).unwrap_or(0);
        let day = packet.byte(7).unwrap_or(0);
        let month = packet.byte(8).unwrap_or(0);
        let year = packet.byte(9).unwrap_or(0);
        let zone = packet.byte(10).unwrap_or(0);
        let event = packet.byte(11).unwrap_or(0);
        info!(
            "Event log {}/{}: 20{:02}-{:02}-{:02} {:02}:{:02}:{:02} zone {} event {:#04x}",
            index, total, year, month, day, hour, minute, second, zone, event
        );
    }

    fn handle_status_update(&mut self, packet: &PlinkPacket) {
        self.send_ack();
        match packet.byte(2) {
            Some(0x01) => {
                if let Some(bits) = packet.u32_le(3) {
                    self.update_zone_battery(bits);
                }
            }
            Some(0x02) => {
                if let Some(bits) = packet.u32_le(3) {
                    self.update_zone_open(bits);
                }
            }
            Some(0x03) => {
                if let Some(bits) = packet.u32_le(3) {
                    self.update_zone_tamper(bits);
                }
            }
            Some(0x04) => self.status_update_panel(packet),
            Some(0x06) => {
                if let Some(bits) = packet.u32_le(3) {
                    self.update_zone_bypass(bits);
                }
            }
            Some(other) => debug!("Unhandled status-update subtype {:#04x}", other),
            None => warn!("Short status update"),
        }

        // The first status reply after settings parsing opens monitoring.
        if self.session.current_state() == SessionState::SettingsParsed {
            self.session.process_event(SessionEvent::StatusReply);
        }
    }

    /// System status + flags byte, with the one-shot zone event detail.
    fn status_update_panel(&mut self, packet: &PlinkPacket) {
        let Some(code) = packet.byte(3) else {
            warn!("Short panel status update");
            return;
        };
        match SystemStatus::try_from(code) {
            Ok(stat) => {
                if stat != self.stat {
                    info!("System status: {}", stat.description());
                }
                self.stat = stat;
            }
            Err(e) => warn!("{}", e),
        }
        if let Some(bits) = packet.byte(4) {
            self.flags = StatusFlags::from_bits(bits);
        }

        if self.flags.contains(StatusFlags::ZONE_EVENT) {
            if let (Some(zone_id), Some(event_code)) = (packet.byte(5), packet.byte(6)) {
                self.record_zone_event(zone_id, ZoneEvent::from_code(event_code));
            }
        }
        if self.flags.contains(StatusFlags::ARM_DISARM_EVENT) {
            info!("Arm/disarm event, system now {}", self.stat.description());
        }
        if self.flags.contains(StatusFlags::ALARM_EVENT) {
            warn!("Alarm event, system {}", self.stat.description());
        }
    }

    fn record_zone_event(&mut self, zone_id: u8, event: Option<ZoneEvent>) {
        let Some(event) = event else { return };
        let now = self.serial.current_time_sec();
        if (zone_id as usize) < MAX_ZONE_COUNT && zone_id > 0 {
            let zone = &mut self.zones[zone_id as usize];
            zone.record_event(event, now);
            match event {
                ZoneEvent::Open => zone.stat.door_open = true,
                ZoneEvent::Closed => zone.stat.door_open = false,
                ZoneEvent::LowBattery => zone.stat.low_battery = true,
                ZoneEvent::TamperAlarm | ZoneEvent::TamperOpen => zone.stat.tamper = true,
                ZoneEvent::TamperRestore => zone.stat.tamper = false,
                _ => {}
            }
            info!("Zone {} event: {}", zone_id, event.description());
        }
    }

    fn update_zone_open(&mut self, bits: u32) {
        let now = self.serial.current_time_sec();
        for zone_id in 1..MAX_ZONE_COUNT {
            let open = bits & (1 << zone_id) != 0;
            let zone = &mut self.zones[zone_id];
            if !zone.enrolled || zone.stat.door_open == open {
                continue;
            }
            zone.stat.door_open = open;
            zone.record_event(if open { ZoneEvent::Open } else { ZoneEvent::Closed }, now);
            info!("Zone {} {}", zone_id, if open { "open" } else { "closed" });
        }
    }

    fn update_zone_battery(&mut self, bits: u32) {
        let now = self.serial.current_time_sec();
        for zone_id in 1..MAX_ZONE_COUNT {
            let low = bits & (1 << zone_id) != 0;
            let zone = &mut self.zones[zone_id];
            if !zone.enrolled || zone.stat.low_battery == low {
                continue;
            }
            zone.stat.low_battery = low;
            if low {
                zone.record_event(ZoneEvent::LowBattery, now);
                warn!("Zone {} battery low", zone_id);
            }
        }
    }

    fn update_zone_tamper(&mut self, bits: u32) {
        let now = self.serial.current_time_sec();
        for zone_id in 1..MAX_ZONE_COUNT {
            let tamper = bits & (1 << zone_id) != 0;
            let zone = &mut self.zones[zone_id];
            if !zone.enrolled || zone.stat.tamper == tamper {
                continue;
            }
            zone.stat.tamper = tamper;
            zone.record_event(
                if tamper { ZoneEvent::TamperAlarm } else { ZoneEvent::TamperRestore },
                now,
            );
            warn!("Zone {} tamper {}", zone_id, if tamper { "alarm" } else { "restore" });
        }
    }

    fn update_zone_bypass(&mut self, bits: u32) {
        for zone_id in 1..MAX_ZONE_COUNT {
            let bypassed = bits & (1 << zone_id) != 0;
            let zone = &mut self.zones[zone_id];
            if zone.enrolled && zone.stat.bypassed != bypassed {
                zone.stat.bypassed = bypassed;
                info!("Zone {} bypass {}", zone_id, if bypassed { "on" } else { "off" });
            }
        }
    }

    /// Logged panel events: `A7 <count> .. (zone, event-code) pairs`.
    fn handle_status_change(&mut self, packet: &PlinkPacket) {
        self.send_ack();
        let count = packet.byte(1).unwrap_or(0).min(4) as usize;
        for i in 0..count {
            let (Some(zone_id), Some(code)) = (packet.byte(3 + i * 2), packet.byte(4 + i * 2))
            else {
                break;
            };
            self.apply_log_event(zone_id, code);
        }
    }

    fn apply_log_event(&mut self, zone_id: u8, code: u8) {
        match code {
            // Arm/disarm family mirrors into the system status.
            0x51 | 0x53 => {
                self.stat = SystemStatus::ArmedHome;
                self.flags.insert(StatusFlags::ARM_DISARM_EVENT);
                info!("Panel log: armed home");
            }
            0x52 | 0x54 => {
                self.stat = SystemStatus::ArmedAway;
                self.flags.insert(StatusFlags::ARM_DISARM_EVENT);
                info!("Panel log: armed away");
            }
            0x55 => {
                self.stat = SystemStatus::Disarm;
                self.flags.insert(StatusFlags::ARM_DISARM_EVENT);
                info!("Panel log: disarmed");
            }
            _ => match zone_event_from_log_code(code) {
                Some(event) if zone_id == 0 => {
                    // The panel reports its own troubles on zone 0.
                    let now = self.serial.current_time_sec();
                    self.zones[0].record_event(event, now);
                    warn!("Panel event: {}", event.description());
                }
                Some(event) => self.record_zone_event(zone_id, Some(event)),
                None => debug!("Unmapped log event {:#04x} for zone {}", code, zone_id),
            },
        }
    }

    fn handle_powerlink(&mut self, packet: &PlinkPacket) {
        match packet.byte(1) {
            Some(powerlink_sub::PING) => {
                debug!("Panel keep-alive ping");
                self.send_ack();
            }
            Some(powerlink_sub::ENROLL) => {
                // Enrolment confirmed; the panel-info announcement that
                // follows drives the session forward.
                info!("PowerLink enrolment confirmed by panel");
                self.send_ack();
            }
            other => {
                debug!("Unhandled PowerLink sub-message {:?}", other);
                self.send_ack();
            }
        }
    }

    fn handle_powermaster(&mut self, _packet: &PlinkPacket) {
        debug!("PowerMaster extension message");
        self.send_ack();
    }

    fn handle_unknown(&mut self, op: u8) {
        info!("ACKing unknown message type {:#04x}", op);
        self.send_ack();
    }
}

/// Maps the panel's logged event codes onto zone events. Codes outside the
/// captured set are reported unmapped and skipped.
fn zone_event_from_log_code(code: u8) -> Option<ZoneEvent> {
    Some(match code {
        0x01 | 0x02 | 0x03 => ZoneEvent::Violated,
        0x04 | 0x05 | 0x0B => ZoneEvent::PanicAlarm,
        0x06 | 0x08 => ZoneEvent::TamperAlarm,
        0x07 => ZoneEvent::TamperOpen,
        0x09 => ZoneEvent::TamperRestore,
        0x0A => ZoneEvent::CommunicationFailure,
        0x0C => ZoneEvent::RfJamming,
        0x0D => ZoneEvent::LowBattery,
        0x0E => ZoneEvent::AcFailure,
        0x10 => ZoneEvent::FireAlarm,
        0x11 => ZoneEvent::Emergency,
        0x12 => ZoneEvent::SirenTamper,
        0x13 => ZoneEvent::SirenTamperRestore,
        0x14 => ZoneEvent::SirenLowBattery,
        0x15 => ZoneEvent::SirenAcFail,
        0x16 => ZoneEvent::LineFailure,
        0x17 => ZoneEvent::Fuse,
        0x18 => ZoneEvent::NotActive,
        _ => return None,
    })
}
