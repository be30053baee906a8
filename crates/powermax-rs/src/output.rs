// crates/powermax-rs/src/output.rs
//! Sink abstraction used by the JSON dump API. Lets the host redirect the
//! dump to a file, console or HTTP response body.

use alloc::string::{String, ToString};

/// Receives chunks of JSON text. The provided helpers take care of quoting
/// and escaping so dump code stays readable.
pub trait Output {
    fn write(&mut self, s: &str);

    /// Writes `s` as a JSON string literal, escaping quotes, backslashes and
    /// control characters.
    fn write_quoted_str(&mut self, s: &str) {
        self.write("\"");
        for c in s.chars() {
            match c {
                '"' => self.write("\\\""),
                '\\' => self.write("\\\\"),
                '\n' => self.write("\\n"),
                '\r' => self.write("\\r"),
                '\t' => self.write("\\t"),
                c if (c as u32) < 0x20 => {
                    let mut buf = [0u8; 6];
                    buf[0] = b'\\';
                    buf[1] = b'u';
                    buf[2] = b'0';
                    buf[3] = b'0';
                    let hex = b"0123456789abcdef";
                    buf[4] = hex[((c as u32) >> 4) as usize];
                    buf[5] = hex[((c as u32) & 0xF) as usize];
                    // Always valid ASCII.
                    if let Ok(esc) = core::str::from_utf8(&buf) {
                        self.write(esc);
                    }
                }
                c => {
                    let mut buf = [0u8; 4];
                    self.write(c.encode_utf8(&mut buf));
                }
            }
        }
        self.write("\"");
    }

    fn write_json_tag_bool(&mut self, name: &str, value: bool, comma: bool) {
        self.write("\"");
        self.write(name);
        self.write("\":");
        self.write(if value { "true" } else { "false" });
        if comma {
            self.write(",");
        }
    }

    fn write_json_tag_int(&mut self, name: &str, value: i64, comma: bool) {
        self.write("\"");
        self.write(name);
        self.write("\":");
        self.write(&value.to_string());
        if comma {
            self.write(",");
        }
    }

    fn write_json_tag_str(&mut self, name: &str, value: &str, comma: bool) {
        self.write("\"");
        self.write(name);
        self.write("\":");
        self.write_quoted_str(value);
        if comma {
            self.write(",");
        }
    }
}

/// Collects the dump into an owned string; handy for tests and for hosts
/// that buffer the whole document.
impl Output for String {
    fn write(&mut self, s: &str) {
        self.push_str(s);
    }
}

/// Writes the dump to standard output.
#[cfg(feature = "std")]
#[derive(Default)]
pub struct ConsoleOutput;

#[cfg(feature = "std")]
impl Output for ConsoleOutput {
    fn write(&mut self, s: &str) {
        print!("{}", s);
    }
}
