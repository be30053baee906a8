// crates/powermax-rs/src/engine/mod.rs
//! The protocol engine: send queue, retransmission timer, enrolment and
//! download orchestration, and the public facade the host drives.

mod download;
mod handlers;
mod settings;

use crate::commands::{PmaxCommand, QueuedCommand};
use crate::frame::codec::{self, FrameAssembler};
use crate::frame::PlinkPacket;
use crate::hal::{PmaxError, SerialInterface};
use crate::mmap::MemoryMap;
use crate::model::{PanelConfig, StatusFlags, SystemStatus, Zone, ZoneEvent};
use crate::output::Output;
use crate::session::{SessionEvent, SessionState, SessionStateMachine};
use crate::types::{AckType, MAX_SEND_QUEUE_DEPTH, MAX_ZONE_COUNT, POWERLINK_PIN};
use download::DownloadTracker;
use heapless::Deque;
use log::{debug, error, info, trace, warn};

/// Host-tunable knobs. The per-packet timeout itself comes from
/// [`SerialInterface::packet_timeout_ms`].
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Idle time after which a RESTORE + status request is sent.
    pub keepalive_interval_sec: u64,
    /// Silence after which the session is declared dead.
    pub comms_timeout_sec: u64,
    /// Pacing of enrolment attempts while Idle.
    pub enroll_retry_sec: u64,
    /// Retransmissions of a timed-out command before giving up on it.
    pub max_retries: u8,
    /// Disables the panel's checksum-off-by-one tolerance.
    pub strict_checksum: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            keepalive_interval_sec: 20,
            comms_timeout_sec: 65,
            enroll_retry_sec: 10,
            max_retries: 3,
            strict_checksum: false,
        }
    }
}

/// The command currently awaiting its reply or ACK. At most one exists.
#[derive(Debug, Clone)]
struct InFlightCommand {
    command: QueuedCommand,
    sent_at: u64,
    retries: u8,
}

/// Driver engine for one PowerMax panel. Owns the serial line exclusively;
/// both entry points (`feed_bytes` and `tick`) must be called from one
/// thread or behind one mutex.
pub struct PowerMaxEngine<S: SerialInterface> {
    serial: S,
    options: EngineOptions,
    assembler: FrameAssembler,

    // --- Mirrored panel state ---
    flags: StatusFlags,
    stat: SystemStatus,
    zones: [Zone; MAX_ZONE_COUNT],
    cfg: PanelConfig,

    // --- Send queue ---
    send_queue: Deque<QueuedCommand, MAX_SEND_QUEUE_DEPTH>,
    in_flight: Option<InFlightCommand>,

    // --- Session ---
    session: SessionStateMachine,
    enroll_completed: bool,
    download_mode: bool,
    panel_type: u8,
    model_type: u8,
    powermaster: bool,
    ack_type_for_last_msg: AckType,

    // --- EEPROM download ---
    map_main: MemoryMap,
    map_extended: MemoryMap,
    download: DownloadTracker,

    // --- Timers ---
    last_io_time: u64,
    last_ping_time: u64,
    last_enroll_attempt: u64,
    /// Consecutive commands dropped after exhausting their retries.
    comm_failures: u8,
}

impl<S: SerialInterface> PowerMaxEngine<S> {
    pub fn new(serial: S) -> Self {
        Self::with_options(serial, EngineOptions::default())
    }

    pub fn with_options(serial: S, options: EngineOptions) -> Self {
        let mut engine = Self {
            assembler: FrameAssembler::new(options.strict_checksum),
            serial,
            options,
            flags: StatusFlags::empty(),
            stat: SystemStatus::Disarm,
            zones: core::array::from_fn(|_| Zone::default()),
            cfg: PanelConfig::default(),
            send_queue: Deque::new(),
            in_flight: None,
            session: SessionStateMachine::new(),
            enroll_completed: false,
            download_mode: false,
            panel_type: 0,
            model_type: 0,
            powermaster: false,
            ack_type_for_last_msg: AckType::Ack1,
            map_main: MemoryMap::new(),
            map_extended: MemoryMap::new(),
            download: DownloadTracker::new(),
            last_io_time: 0,
            last_ping_time: 0,
            last_enroll_attempt: 0,
            comm_failures: 0,
        };
        engine.init();
        engine
    }

    /// Zeroes the model, clears the queue and resets the state machine.
    pub fn init(&mut self) {
        self.assembler.reset();
        self.flags = StatusFlags::empty();
        self.stat = SystemStatus::Disarm;
        self.zones = core::array::from_fn(|_| Zone::default());
        self.cfg = PanelConfig::default();
        self.send_queue.clear();
        self.in_flight = None;
        self.session.reset();
        self.enroll_completed = false;
        self.download_mode = false;
        self.panel_type = 0;
        self.model_type = 0;
        self.powermaster = false;
        self.ack_type_for_last_msg = AckType::Ack1;
        self.map_main.clear();
        self.map_extended.clear();
        self.download.clear();
        self.last_io_time = self.serial.current_time_sec();
        self.last_ping_time = 0;
        self.last_enroll_attempt = 0;
        self.comm_failures = 0;
    }

    // --- Facade ---

    /// Runs raw serial bytes through the frame assembler and dispatches
    /// every completed packet.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if let Some(packet) = self.assembler.push(b) {
                self.handle_packet(&packet);
            }
        }
    }

    /// Drains whatever the serial line has pending into the engine.
    pub fn poll_serial(&mut self) -> Result<(), PmaxError> {
        let mut buf = [0u8; 64];
        loop {
            let n = self.serial.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            for &b in &buf[..n] {
                if let Some(packet) = self.assembler.push(b) {
                    self.handle_packet(&packet);
                }
            }
        }
    }

    /// Accepts one deframed packet: stamps liveness, resolves the expected
    /// reply, dispatches to the message handler, then lets the queue drain.
    pub fn handle_packet(&mut self, packet: &PlinkPacket) {
        self.last_io_time = self.serial.current_time_sec();
        self.comm_failures = 0;
        self.ack_type_for_last_msg = codec::calculate_ack_type(packet.as_slice());
        trace!("RX {:02X?}", packet.as_slice());

        if let Some(inflight) = &self.in_flight {
            if inflight.command.expected_reply != 0
                && inflight.command.expected_reply == packet.opcode()
            {
                debug!("'{}' resolved by reply {:#04x}", inflight.command.description, packet.opcode());
                self.in_flight = None;
            }
        }

        handlers::dispatch(self, packet);
        self.send_next_command();
    }

    /// Enqueues a user-initiated command. Refuses when the queue is full or
    /// the command does not fit the current session state.
    pub fn send_command(&mut self, cmd: PmaxCommand) -> Result<(), PmaxError> {
        let user_cmd = matches!(
            cmd,
            PmaxCommand::Disarm
                | PmaxCommand::ArmHome
                | PmaxCommand::ArmAway
                | PmaxCommand::ArmAwayInstant
                | PmaxCommand::GetEventLog
        );
        // Arm/disarm and log retrieval need the downloaded installer PIN
        // and must not interleave with an EEPROM download.
        if user_cmd && (self.download_mode || !self.enroll_completed) {
            return Err(PmaxError::NotPermitted);
        }
        self.queue_template(cmd)
    }

    /// Called at least every 200 ms; drives the send/retransmit timer, the
    /// comms watchdog, enrolment pacing and the keep-alive.
    pub fn tick(&mut self) {
        let now = self.serial.current_time_sec();

        // Watchdog: protracted silence kills the session.
        if self.session.current_state() != SessionState::Idle
            && now.saturating_sub(self.last_io_time) > self.options.comms_timeout_sec
        {
            warn!(
                "No panel traffic for {} seconds",
                now.saturating_sub(self.last_io_time)
            );
            self.comms_failure();
        }

        // Re-enrol from Idle, paced so a dead line is not spammed.
        if self.session.current_state() == SessionState::Idle
            && (self.last_enroll_attempt == 0
                || now.saturating_sub(self.last_enroll_attempt) >= self.options.enroll_retry_sec)
        {
            self.start_enrollment();
        }

        // Keep-alive: on a quiet line, re-establish and ask for status.
        if self.session.current_state() == SessionState::Monitoring
            && now.saturating_sub(self.last_io_time) >= self.options.keepalive_interval_sec
            && now.saturating_sub(self.last_ping_time) >= self.options.keepalive_interval_sec
            && self.send_queue.is_empty()
            && self.in_flight.is_none()
        {
            debug!("Keep-alive: queueing RESTORE + status request");
            self.last_ping_time = now;
            let _ = self.queue_template(PmaxCommand::Restore);
            let _ = self.queue_template(PmaxCommand::ReqStatus);
        }

        self.send_next_command();
    }

    // --- Accessors ---

    pub fn seconds_from_last_comm(&self) -> u64 {
        self.serial.current_time_sec().saturating_sub(self.last_io_time)
    }

    /// Zones the panel has configured. Index 0 (the panel itself) is never
    /// counted.
    pub fn enrolled_zone_count(&self) -> usize {
        self.zones[1..].iter().filter(|z| z.enrolled).count()
    }

    pub fn zone_name(&self, zone_id: usize) -> Option<&str> {
        match self.zones.get(zone_id) {
            Some(zone) if zone_id > 0 && zone.enrolled => Some(zone.name.as_str()),
            _ => None,
        }
    }

    pub fn zone(&self, zone_id: usize) -> Option<&Zone> {
        if zone_id == 0 {
            return None;
        }
        self.zones.get(zone_id)
    }

    pub fn system_status(&self) -> SystemStatus {
        self.stat
    }

    pub fn status_flags(&self) -> StatusFlags {
        self.flags
    }

    pub fn is_alarm_event(&self) -> bool {
        self.flags.contains(StatusFlags::ALARM_EVENT)
    }

    pub fn is_zone_event(&self) -> bool {
        self.flags.contains(StatusFlags::ZONE_EVENT)
    }

    pub fn is_arm_event(&self) -> bool {
        self.flags.contains(StatusFlags::ARM_DISARM_EVENT)
    }

    /// Consumes the one-shot arm/disarm notification.
    pub fn take_arm_event(&mut self) -> bool {
        self.flags.take(StatusFlags::ARM_DISARM_EVENT)
    }

    /// Consumes the one-shot zone notification.
    pub fn take_zone_event(&mut self) -> bool {
        self.flags.take(StatusFlags::ZONE_EVENT)
    }

    pub fn panel_config(&self) -> &PanelConfig {
        &self.cfg
    }

    pub fn session_state(&self) -> SessionState {
        self.session.current_state()
    }

    pub fn enroll_completed(&self) -> bool {
        self.enroll_completed
    }

    pub fn is_download_mode(&self) -> bool {
        self.download_mode
    }

    pub fn is_powermaster(&self) -> bool {
        self.powermaster
    }

    pub fn panel_type(&self) -> u8 {
        self.panel_type
    }

    pub fn model_type(&self) -> u8 {
        self.model_type
    }

    pub fn clear_queue(&mut self) {
        self.send_queue.clear();
    }

    /// Mediated, copying read of the downloaded main EEPROM image.
    pub fn eeprom_read(&self, page: u8, offset: u8, out: &mut [u8]) -> crate::mmap::MapRead {
        self.map_main.read(page, offset, out)
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// The host reads inbound bytes through this (the engine owns the line).
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Dumps the mirrored state as a JSON document.
    pub fn dump_to_json(&self, out: &mut dyn Output) {
        out.write("{");
        out.write_json_tag_int("flags", self.flags.0 as i64, true);
        out.write_json_tag_int("stat", self.stat as u8 as i64, true);
        out.write_json_tag_str("statStr", self.stat.description(), true);
        out.write_json_tag_int(
            "secondsFromLastComm",
            self.seconds_from_last_comm() as i64,
            true,
        );
        out.write_json_tag_bool("enrolCompleted", self.enroll_completed, true);
        out.write_json_tag_bool("downloadMode", self.download_mode, true);
        out.write_json_tag_int("panelType", self.panel_type as i64, true);
        out.write_json_tag_int("modelType", self.model_type as i64, true);
        out.write_json_tag_bool("powerMaster", self.powermaster, true);

        out.write("\"zones\":[");
        let mut first = true;
        for (id, zone) in self.zones.iter().enumerate().skip(1) {
            if !zone.enrolled {
                continue;
            }
            if !first {
                out.write(",");
            }
            first = false;
            zone.dump_to_json(id, out);
        }
        out.write("],");

        out.write("\"cfg\":");
        self.cfg.dump_to_json(out);
        out.write("}");
    }

    // --- Send queue & timer ---

    /// Copies a catalog command into the queue.
    fn queue_template(&mut self, cmd: PmaxCommand) -> Result<(), PmaxError> {
        self.queue_command(QueuedCommand::from_template(&cmd.template()))
    }

    /// Enqueues a prepared command and lets the queue drain immediately if
    /// nothing is in flight.
    fn queue_command(&mut self, cmd: QueuedCommand) -> Result<(), PmaxError> {
        trace!("Queueing '{}'", cmd.description);
        self.send_queue.push_back(cmd).map_err(|_| {
            warn!("Send queue full");
            PmaxError::QueueFull
        })?;
        self.send_next_command();
        Ok(())
    }

    /// Transmit pacing: respects the single in-flight slot, retransmits on
    /// deadline expiry, then moves the head of the queue onto the wire.
    fn send_next_command(&mut self) {
        let now = self.serial.current_time_sec();
        let timeout_sec = ((self.serial.packet_timeout_ms() as u64).div_ceil(1000)).max(1);

        if let Some(inflight) = &self.in_flight {
            if now < inflight.sent_at.saturating_add(timeout_sec) {
                return;
            }
            if inflight.retries < self.options.max_retries {
                let data = inflight.command.bytes.clone();
                let description = inflight.command.description;
                let retries = inflight.retries + 1;
                warn!(
                    "'{}' timed out, retransmitting ({}/{})",
                    description, retries, self.options.max_retries
                );
                if let Some(inflight) = &mut self.in_flight {
                    inflight.retries = retries;
                    inflight.sent_at = now;
                }
                let _ = self.send_buffer(&data);
                return;
            }
            error!(
                "Communication failure: '{}' got no reply after {} retransmissions",
                inflight.command.description, self.options.max_retries
            );
            self.in_flight = None;
            self.comm_failures += 1;
            if self.comm_failures >= 2 {
                self.comms_failure();
                return;
            }
        }

        let Some(mut cmd) = self.send_queue.pop_front() else {
            return;
        };

        // PIN slots are zeroed in the catalog; patch them on the way out.
        if cmd.options.contains("pin") {
            let pin = self.select_pin(cmd.options.contains("master"));
            if cmd.bytes.len() >= 6 {
                cmd.bytes[4] = pin[0];
                cmd.bytes[5] = pin[1];
            }
        }

        debug!("TX '{}'", cmd.description);
        if self.send_buffer(&cmd.bytes).is_err() {
            warn!("Serial write failed for '{}'", cmd.description);
        }
        self.in_flight = Some(InFlightCommand { command: cmd, sent_at: now, retries: 0 });
    }

    /// Installer PIN once a download provided it, otherwise the fixed
    /// PowerLink PIN (big-endian BCD).
    fn select_pin(&self, use_master: bool) -> [u8; 2] {
        if use_master {
            if let Some(pin) = self.cfg.installer_pin_bcd() {
                return pin;
            }
        }
        POWERLINK_PIN.to_be_bytes()
    }

    /// Frames a payload and writes it to the serial line.
    fn send_buffer(&mut self, payload: &[u8]) -> Result<(), PmaxError> {
        let frame = codec::encode_frame(payload)?;
        trace!("TX {:02X?}", &frame[..]);
        let written = self.serial.write(&frame)?;
        if written != frame.len() {
            return Err(PmaxError::IoError);
        }
        // Give the panel's UART a moment between back-to-back frames.
        self.serial.sleep_us(1000);
        Ok(())
    }

    /// Acknowledges the last received message with the framing it expects.
    fn send_ack(&mut self) {
        let payload: &[u8] = match self.ack_type_for_last_msg {
            AckType::Ack1 => &[0x02],
            AckType::Ack2 => &[0x02, 0x43],
        };
        let _ = self.send_buffer(payload);
    }

    // --- Session orchestration ---

    /// Opens (or re-opens) the enrolment handshake.
    fn start_enrollment(&mut self) {
        info!("Starting PowerLink enrolment");
        self.last_enroll_attempt = self.serial.current_time_sec();
        let _ = self.queue_template(PmaxCommand::Init);
        let _ = self.queue_template(PmaxCommand::EnrollReply);
        self.session.process_event(SessionEvent::EnrollSent);
    }

    /// Queues a DL_GET for an arbitrary EEPROM range.
    fn queue_dl_get(&mut self, page: u8, offset: u8, len: u16) -> Result<(), PmaxError> {
        let mut cmd = QueuedCommand::from_template(&PmaxCommand::DownloadGet.template());
        cmd.bytes[1] = offset;
        cmd.bytes[2] = page;
        cmd.bytes[3] = len as u8;
        cmd.bytes[4] = (len >> 8) as u8;
        self.queue_command(cmd)
    }

    /// Re-requests the first range the panel has not delivered yet, or
    /// finishes the download when nothing is missing anymore.
    fn request_missing_ranges(&mut self) {
        if self.download.is_complete(&self.map_main) {
            self.finish_download();
            return;
        }
        if let Some(missing) = self.download.first_missing(&self.map_main) {
            info!(
                "Re-requesting EEPROM page {:#04x} offset {:#04x}",
                missing.page, missing.offset
            );
            let _ = self.queue_dl_get(missing.page, missing.offset, missing.len);
        }
    }

    /// All requested ranges are present: leave download mode, parse the
    /// image and move to steady-state monitoring.
    fn finish_download(&mut self) {
        let _ = self.queue_template(PmaxCommand::DownloadExit);
        match settings::process_settings(&self.map_main, &mut self.cfg, &mut self.zones) {
            Ok(()) => {
                info!(
                    "Panel settings parsed: serial '{}', software '{}', {} zones enrolled",
                    self.cfg.serial_number,
                    self.cfg.software,
                    self.enrolled_zone_count()
                );
                self.enroll_completed = true;
                self.download_mode = false;
                self.session.process_event(SessionEvent::DownloadComplete);
                let _ = self.queue_template(PmaxCommand::ReqStatus);
            }
            Err(PmaxError::DownloadIncomplete { page, offset }) => {
                warn!(
                    "Settings commit found a gap at page {:#04x} offset {:#04x}",
                    page, offset
                );
                self.request_missing_ranges();
            }
            Err(e) => warn!("Settings parse failed: {}", e),
        }
    }

    /// Repeated timeouts or protracted silence: surface the failure on the
    /// panel zone, drop everything and fall back to Idle. Enrolment restarts
    /// on a later tick.
    fn comms_failure(&mut self) {
        error!("Communication with the panel lost, re-enrolling");
        let now = self.serial.current_time_sec();
        self.zones[0].record_event(ZoneEvent::CommunicationFailure, now);
        self.send_queue.clear();
        self.in_flight = None;
        self.download_mode = false;
        self.enroll_completed = false;
        self.cfg.parsed_ok = false;
        self.download.clear();
        self.comm_failures = 0;
        self.last_enroll_attempt = 0;
        self.session.process_event(SessionEvent::CommsFailure);
    }
}
