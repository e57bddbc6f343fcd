#![doc = "journal-recorder: read, render and record systemd journal export streams."]

//! This crate parses the journal "export" wire format produced by
//! `journalctl --output=export`, renders entries in syslog-style short form
//! (or re-encodes them), and records a live journal from a local
//! `journalctl` process or a remote one over SSH with cursor-based resumption.
//!
//! # Usage
//! - [`export::ExportReader`] turns a byte stream into [`entry::Entry`] values.
//! - [`format::ShortWriter`] and friends implement [`format::Formatter`].
//! - [`record::Recorder`] drives a follower process and feeds both.
//! - [`journal::Journal`] manages the output files of one machine.

pub mod config;
pub mod entry;
pub mod export;
pub mod format;
pub mod journal;
pub mod record;
pub mod tee;
pub mod transport;

pub use config::{RecorderConfig, SshConfig};
pub use entry::Entry;
pub use export::{ExportError, ExportReader};
pub use format::{ExportWriter, Formatter, JsonWriter, OutputFormat, ShortWriter, Zone};
pub use journal::{Journal, JournalError};
pub use record::{RecordError, Recorder};
pub use transport::{SessionTransport, SshTransport, TransportError};
