//! # format: rendering journal entries
//!
//! The [`Formatter`] trait is the single capability the recorder needs from
//! an output: take one entry, append it to a sink. Implementations:
//!
//! - [`ShortWriter`]: syslog-style `Mon DD HH:MM:SS.uuuuuu ident[pid]: message`
//!   lines, the way operators read a journal on a terminal.
//! - [`ExportWriter`]: passthrough that re-encodes entries in export format.
//! - [`JsonWriter`]: one JSON object per entry, `journalctl -o json` style.
//!
//! Each call writes a complete record before returning; nothing is held back
//! between calls.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, Utc};
use mockall::automock;
use serde::Deserialize;

use crate::entry::{
    Entry, FIELD_BOOT_ID, FIELD_MESSAGE, FIELD_PID, FIELD_SYSLOG_IDENTIFIER, FIELD_SYSLOG_PID,
};
use crate::export::write_export;

/// Time zone used to render timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Zone {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl Zone {
    fn format(&self, ts: DateTime<Utc>, fmt: &str) -> String {
        match self {
            Zone::Local => ts.with_timezone(&Local).format(fmt).to_string(),
            Zone::Utc => ts.format(fmt).to_string(),
            Zone::Fixed(offset) => ts.with_timezone(offset).format(fmt).to_string(),
        }
    }
}

impl FromStr for Zone {
    type Err = String;

    /// Accepts `local`, `utc` or a fixed offset such as `+02:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Zone::Local),
            "utc" | "z" => Ok(Zone::Utc),
            _ => s
                .parse::<FixedOffset>()
                .map(Zone::Fixed)
                .map_err(|e| format!("invalid time zone {s:?}: {e}")),
        }
    }
}

impl TryFrom<String> for Zone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which [`Formatter`] to build for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Short,
    Export,
    Json,
}

impl OutputFormat {
    pub fn formatter<W>(self, w: W) -> Box<dyn Formatter>
    where
        W: Write + Send + 'static,
    {
        match self {
            OutputFormat::Short => Box::new(ShortWriter::new(w)),
            OutputFormat::Export => Box::new(ExportWriter::new(w)),
            OutputFormat::Json => Box::new(JsonWriter::new(w)),
        }
    }
}

/// Renders entries onto a text sink.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Formatter: Send {
    /// Time zone for rendered timestamps. Formats without timestamps ignore it.
    fn set_timezone(&mut self, zone: Zone);

    /// Append one entry. Entries a format cannot render are skipped silently.
    fn write_entry(&mut self, entry: &Entry) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: Formatter + ?Sized> Formatter for Box<F> {
    fn set_timezone(&mut self, zone: Zone) {
        (**self).set_timezone(zone)
    }

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        (**self).write_entry(entry)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

const SHORT_TIMESTAMP: &str = "%b %d %H:%M:%S%.6f";
const REBOOT_MARKER: &str = "-- Reboot --\n";
const TAB: &str = "        ";

/// Short-precise journal format, without the hostname.
///
/// Entries without a usable timestamp or without `MESSAGE` are skipped.
/// Continuation lines of multi-line messages are indented by one space per
/// character of the `timestamp ident[pid]: ` prefix, so they line up with the
/// first line of the message. A `-- Reboot --` line is written when the
/// boot id changes between two rendered entries.
pub struct ShortWriter<W> {
    w: W,
    zone: Zone,
    boot_id: Option<Vec<u8>>,
}

impl<W: Write> ShortWriter<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            zone: Zone::Local,
            boot_id: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    fn is_reboot(&mut self, entry: &Entry) -> bool {
        let boot_id = match entry.get(FIELD_BOOT_ID) {
            Some(id) if !id.is_empty() => id,
            _ => return false,
        };

        match &self.boot_id {
            Some(previous) if previous.as_slice() == boot_id => false,
            Some(_) => {
                self.boot_id = Some(boot_id.to_vec());
                true
            }
            None => {
                self.boot_id = Some(boot_id.to_vec());
                false
            }
        }
    }
}

impl<W: Write + Send> Formatter for ShortWriter<W> {
    fn set_timezone(&mut self, zone: Zone) {
        self.zone = zone;
    }

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        let (realtime, message) = match (entry.realtime(), entry.get(FIELD_MESSAGE)) {
            (Some(realtime), Some(message)) => (realtime, message),
            _ => return Ok(()),
        };

        let mut buf = String::new();
        if self.is_reboot(entry) {
            buf.push_str(REBOOT_MARKER);
        }
        let line_start = buf.len();

        buf.push_str(&self.zone.format(realtime, SHORT_TIMESTAMP));
        buf.push(' ');
        match entry.get(FIELD_SYSLOG_IDENTIFIER) {
            Some(ident) => buf.push_str(&String::from_utf8_lossy(ident)),
            None => buf.push_str("unknown"),
        }
        if let Some(pid) = entry.get(FIELD_SYSLOG_PID).or_else(|| entry.get(FIELD_PID)) {
            buf.push('[');
            buf.push_str(&String::from_utf8_lossy(pid));
            buf.push(']');
        }
        buf.push_str(": ");

        let indent = buf[line_start..].chars().count();
        let mut lines = message.split(|&b| b == b'\n');
        if let Some(first) = lines.next() {
            write_escaped(&mut buf, first);
        }
        for line in lines {
            buf.push('\n');
            buf.extend(std::iter::repeat(' ').take(indent));
            write_escaped(&mut buf, line);
        }
        buf.push('\n');

        self.w.write_all(buf.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control() && (c == ' ' || !c.is_whitespace())
}

/// Append `line`, expanding tabs and escaping what a terminal should not see.
fn write_escaped(buf: &mut String, mut line: &[u8]) {
    while !line.is_empty() {
        let (valid, invalid) = match std::str::from_utf8(line) {
            Ok(s) => (s, 0),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                let bad = e.error_len().unwrap_or(line.len() - valid_up_to);
                // The prefix up to `valid_up_to` is valid UTF-8.
                let s = std::str::from_utf8(&line[..valid_up_to]).unwrap_or_default();
                (s, bad)
            }
        };

        for c in valid.chars() {
            match c {
                '\t' => buf.push_str(TAB),
                c if is_printable(c) => buf.push(c),
                c => {
                    let _ = write!(buf, "\\u{:04x}", c as u32);
                }
            }
        }

        let consumed = valid.len();
        for b in &line[consumed..consumed + invalid] {
            let _ = write!(buf, "\\x{b:02x}");
        }
        line = &line[consumed + invalid..];
    }
}

/// Passthrough that writes entries back out in export format.
pub struct ExportWriter<W> {
    w: W,
}

impl<W: Write> ExportWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write + Send> Formatter for ExportWriter<W> {
    fn set_timezone(&mut self, _zone: Zone) {}

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        write_export(entry, &mut self.w)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// One JSON object per line. Values that are not valid UTF-8 become arrays
/// of byte values.
pub struct JsonWriter<W> {
    w: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write + Send> Formatter for JsonWriter<W> {
    fn set_timezone(&mut self, _zone: Zone) {}

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        let object: serde_json::Map<String, serde_json::Value> = entry
            .iter()
            .map(|(name, value)| {
                let value = match std::str::from_utf8(value) {
                    Ok(s) => serde_json::Value::from(s),
                    Err(_) => serde_json::Value::from(value.to_vec()),
                };
                (name.to_owned(), value)
            })
            .collect();

        let mut line = serde_json::to_vec(&object)?;
        line.push(b'\n');
        self.w.write_all(&line)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}
