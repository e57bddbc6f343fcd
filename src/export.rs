//! # export: the journal export wire format
//!
//! `journalctl --output=export` writes one entry as a run of fields followed
//! by an empty line. A field is either a text line `NAME=value` or, when the
//! value may contain newlines or other binary data, a line holding only
//! `NAME` followed by a little-endian `u64` length, the raw value bytes and a
//! terminating newline:
//!
//! ```text
//! FIELD1=value1
//! BINARY_FIELD
//! <8-byte LE u64 length><raw bytes>\n
//!
//! ```
//!
//! [`ExportReader`] parses that stream incrementally; [`write_export`]
//! produces it.

use std::io::{self, Write};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::entry::Entry;

/// Framing errors while reading an export stream.
///
/// All of them end the stream: the reader does not try to resynchronise.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The stream ended in the middle of a line or an entry.
    #[error("unexpected end of export stream")]
    UnexpectedEof,

    #[error("empty field name")]
    EmptyFieldName,

    /// Fewer value bytes were available than the length prefix announced.
    #[error("binary field {name} truncated: expected {expected} bytes, got {got}")]
    TruncatedField {
        name: String,
        expected: u64,
        got: u64,
    },

    #[error("binary field missing terminating newline")]
    MissingFieldTerminator,

    #[error("i/o error reading export stream: {0}")]
    Io(#[from] io::Error),
}

/// Streaming parser for the export format.
pub struct ExportReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R> ExportReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next entry.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between entries. Blank
    /// lines before an entry are skipped.
    pub async fn read_entry(&mut self) -> Result<Option<Entry>, ExportError> {
        let mut entry = Entry::new();

        loop {
            if !self.read_line().await? {
                if entry.is_empty() {
                    return Ok(None);
                }
                return Err(ExportError::UnexpectedEof);
            }

            if self.line.is_empty() {
                if entry.is_empty() {
                    continue;
                }
                return Ok(Some(entry));
            }

            match self.line.iter().position(|&b| b == b'=') {
                Some(0) => return Err(ExportError::EmptyFieldName),
                Some(eq) => {
                    let name = String::from_utf8_lossy(&self.line[..eq]).into_owned();
                    let value = self.line[eq + 1..].to_vec();
                    entry.insert(name, value);
                }
                None => {
                    let name = String::from_utf8_lossy(&self.line).into_owned();
                    let value = self.read_binary(&name).await?;
                    entry.insert(name, value);
                }
            }
        }
    }

    /// Fill `self.line` with the next line, newline stripped.
    ///
    /// Returns false at a clean end of stream.
    async fn read_line(&mut self) -> Result<bool, ExportError> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line).await?;
        if n == 0 {
            return Ok(false);
        }
        if self.line.pop() != Some(b'\n') {
            return Err(ExportError::UnexpectedEof);
        }
        Ok(true)
    }

    async fn read_binary(&mut self, name: &str) -> Result<Vec<u8>, ExportError> {
        let expected = match self.reader.read_u64_le().await {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ExportError::UnexpectedEof)
            }
            Err(e) => return Err(e.into()),
        };

        // Read through `take` so a bogus length cannot force a huge allocation.
        let mut value = Vec::new();
        let got = (&mut self.reader).take(expected).read_to_end(&mut value).await? as u64;
        if got != expected {
            return Err(ExportError::TruncatedField {
                name: name.to_owned(),
                expected,
                got,
            });
        }

        let mut terminator = [0u8; 1];
        match self.reader.read(&mut terminator).await? {
            1 if terminator[0] == b'\n' => Ok(value),
            _ => Err(ExportError::MissingFieldTerminator),
        }
    }
}

/// Whether `value` has to use the length-prefixed binary framing.
fn needs_binary(value: &[u8]) -> bool {
    match std::str::from_utf8(value) {
        Ok(s) => s.chars().any(|c| c.is_control() && c != '\t'),
        Err(_) => true,
    }
}

/// Serialise `entry` in export format, including the blank line that ends it.
pub fn write_export<W: Write>(entry: &Entry, w: &mut W) -> io::Result<()> {
    let mut buf = Vec::new();
    for (name, value) in entry.iter() {
        buf.extend_from_slice(name.as_bytes());
        if needs_binary(value) {
            buf.push(b'\n');
            buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
            buf.extend_from_slice(value);
        } else {
            buf.push(b'=');
            buf.extend_from_slice(value);
        }
        buf.push(b'\n');
    }
    buf.push(b'\n');
    w.write_all(&buf)
}
