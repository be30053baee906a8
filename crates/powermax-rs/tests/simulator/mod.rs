// crates/powermax-rs/tests/simulator/mod.rs
//! Shared test double: a serial port with a hand-driven clock, plus a
//! scripted panel that answers the engine the way a PowerMax Pro does.

use powermax_rs::frame::codec::{decode_frame, encode_frame};
use powermax_rs::{PmaxError, PowerMaxEngine, SerialInterface};
use std::cell::RefCell;
use std::rc::Rc;

pub struct PortState {
    pub now_sec: u64,
    /// Raw frames the engine wrote, in order.
    pub written: Vec<Vec<u8>>,
}

/// Cloneable handle over the port state; the engine owns one clone, the
/// test (and the scripted panel) another.
#[derive(Clone)]
pub struct SimulatedPort(Rc<RefCell<PortState>>);

impl SimulatedPort {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(PortState { now_sec: 1_000, written: Vec::new() })))
    }

    pub fn advance(&self, secs: u64) {
        self.0.borrow_mut().now_sec += secs;
    }

    pub fn now(&self) -> u64 {
        self.0.borrow().now_sec
    }

    /// Everything the engine has transmitted so far, deframed.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.0
            .borrow()
            .written
            .iter()
            .map(|f| {
                decode_frame(f, true)
                    .expect("engine wrote an invalid frame")
                    .as_slice()
                    .to_vec()
            })
            .collect()
    }
}

impl SerialInterface for SimulatedPort {
    fn open(&mut self, _port_name: &str) -> Result<(), PmaxError> {
        Ok(())
    }

    fn read(&mut self, _buffer: &mut [u8]) -> Result<usize, PmaxError> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PmaxError> {
        self.0.borrow_mut().written.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&mut self) {}

    fn sleep_us(&mut self, _microseconds: u32) {}

    fn current_time_sec(&self) -> u64 {
        self.0.borrow().now_sec
    }
}

/// A scripted panel with a 4-page EEPROM image. It consumes the engine's
/// transmissions and produces the replies a real panel would send.
pub struct VirtualPanel {
    port: SimulatedPort,
    cursor: usize,
    pub eeprom: Vec<[u8; 256]>,
    pub panel_type: u8,
    pub model_type: u8,
}

impl VirtualPanel {
    pub fn new(port: SimulatedPort) -> Self {
        Self {
            port,
            cursor: 0,
            eeprom: vec![[0u8; 256]; 4],
            panel_type: 0x02, // PowerMax Pro
            model_type: 0x0B,
        }
    }

    pub fn eeprom_write(&mut self, page: usize, offset: usize, data: &[u8]) {
        let mut lin = page * 256 + offset;
        for &b in data {
            self.eeprom[lin / 256][lin % 256] = b;
            lin += 1;
        }
    }

    /// Consumes any new engine transmissions and returns the panel replies
    /// (deframed payloads) they elicit.
    pub fn respond(&mut self) -> Vec<Vec<u8>> {
        let sent = self.port.sent_payloads();
        let mut replies = Vec::new();
        while self.cursor < sent.len() {
            let cmd = &sent[self.cursor];
            self.cursor += 1;
            match cmd[0] {
                // Engine-side acks are not answered.
                0x02 => {}
                // PowerLink family.
                0xAB => match (cmd.get(1).copied(), cmd.get(3).copied()) {
                    // Enroll reply: the panel accepts and announces itself.
                    (Some(0x0A), Some(0x00)) => {
                        replies.push(vec![
                            0x3C,
                            self.model_type,
                            0x20,
                            0x00,
                            0x00,
                            0x00,
                            0x00,
                            self.panel_type,
                            0x00,
                        ]);
                    }
                    // Init, restore, ping: plain ack.
                    _ => replies.push(vec![0x02]),
                },
                // Download start: acknowledge download mode, declare 3 main
                // pages (0..=2).
                0x24 => replies.push(vec![0x25, 0x00, 0x02, 0x00, 0x00]),
                // EEPROM block request.
                0x3E => {
                    let offset = cmd[1] as usize;
                    let page = cmd[2] as usize;
                    let len = u16::from_le_bytes([cmd[3], cmd[4]]) as usize;
                    let mut lin = page * 256 + offset;
                    let mut remaining = len;
                    while remaining > 0 {
                        let span = remaining.min(0x80);
                        let mut block = vec![0x3F, (lin % 256) as u8, (lin / 256) as u8];
                        for i in 0..span {
                            let a = lin + i;
                            block.push(self.eeprom[a / 256][a % 256]);
                        }
                        replies.push(block);
                        lin += span;
                        remaining -= span;
                    }
                }
                // Exit download.
                0x0F => replies.push(vec![0x02]),
                // Status request: disarmed, ready.
                0xA2 => replies.push(vec![0xA5, 0x00, 0x04, 0x00, 0x01, 0x00, 0x00]),
                // Arm/disarm, event log request: plain ack.
                0xA1 | 0xA0 => replies.push(vec![0x02]),
                other => panic!("virtual panel got unexpected command {:#04x}", other),
            }
        }
        replies
    }
}

/// Seeds the EEPROM regions the settings parser consumes: identity strings,
/// PIN codes, capacities and three named zones (1, 3 and 5).
pub fn seed_default_image(panel: &mut VirtualPanel) {
    panel.eeprom_write(0, 0xC0, b"JS702");
    panel.eeprom_write(0, 0xD0, b"2.13.503");
    panel.eeprom_write(0, 0xE0, b"5004T90");

    panel.eeprom_write(1, 0x00, &[0x12, 0x34]); // installer
    panel.eeprom_write(1, 0x02, &[0x56, 0x78]); // master installer
    panel.eeprom_write(1, 0x04, &[0x36, 0x22]); // powerlink
    panel.eeprom_write(1, 0x88, &[1, 30, 5, 8, 1, 2, 2, 2, 8]); // capacities
    // Zone definitions: (type, sensor id) per zone.
    panel.eeprom_write(1, 0x98, &[4, 0x01]); // zone 1: magnet
    panel.eeprom_write(1, 0x98 + 4, &[5, 0x14]); // zone 3: motion
    panel.eeprom_write(1, 0x98 + 8, &[4, 0x02]); // zone 5: magnet

    panel.eeprom_write(2, 0x00, b"Front Door");
    panel.eeprom_write(2, 2 * 0x10, b"Kitchen");
    panel.eeprom_write(2, 4 * 0x10, b"Garage");
}

/// Feeds a deframed payload to the engine through the real wire codec.
pub fn feed(engine: &mut PowerMaxEngine<SimulatedPort>, payload: &[u8]) {
    let frame = encode_frame(payload).unwrap();
    engine.feed_bytes(&frame);
}

/// Drives ticks and scripted replies until the engine reaches steady-state
/// monitoring. Panics if it does not converge.
pub fn run_to_monitoring(engine: &mut PowerMaxEngine<SimulatedPort>, panel: &mut VirtualPanel) {
    use powermax_rs::SessionState;
    for _ in 0..200 {
        engine.tick();
        let replies = panel.respond();
        if replies.is_empty() && engine.session_state() == SessionState::Monitoring {
            return;
        }
        for reply in replies {
            feed(engine, &reply);
        }
    }
    panic!(
        "engine never reached Monitoring (stuck in {:?})",
        engine.session_state()
    );
}
