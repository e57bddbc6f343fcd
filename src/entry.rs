//! Journal entries and the well-known journal field names.
//!
//! Field names follow
//! <https://www.freedesktop.org/software/systemd/man/systemd.journal-fields.html>.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

// User journal fields
pub const FIELD_MESSAGE: &str = "MESSAGE";
pub const FIELD_MESSAGE_ID: &str = "MESSAGE_ID";
pub const FIELD_PRIORITY: &str = "PRIORITY";
pub const FIELD_CODE_FILE: &str = "CODE_FILE";
pub const FIELD_CODE_LINE: &str = "CODE_LINE";
pub const FIELD_CODE_FUNC: &str = "CODE_FUNC";
pub const FIELD_ERRNO: &str = "ERRNO";
pub const FIELD_SYSLOG_FACILITY: &str = "SYSLOG_FACILITY";
pub const FIELD_SYSLOG_IDENTIFIER: &str = "SYSLOG_IDENTIFIER";
pub const FIELD_SYSLOG_PID: &str = "SYSLOG_PID";

// Trusted journal fields
pub const FIELD_PID: &str = "_PID";
pub const FIELD_UID: &str = "_UID";
pub const FIELD_GID: &str = "_GID";
pub const FIELD_COMM: &str = "_COMM";
pub const FIELD_EXE: &str = "_EXE";
pub const FIELD_CMDLINE: &str = "_CMDLINE";
pub const FIELD_CAP_EFFECTIVE: &str = "_CAP_EFFECTIVE";
pub const FIELD_AUDIT_SESSION: &str = "_AUDIT_SESSION";
pub const FIELD_AUDIT_LOGINUID: &str = "_AUDIT_LOGINUID";
pub const FIELD_SYSTEMD_CGROUP: &str = "_SYSTEMD_CGROUP";
pub const FIELD_SYSTEMD_SESSION: &str = "_SYSTEMD_SESSION";
pub const FIELD_SYSTEMD_UNIT: &str = "_SYSTEMD_UNIT";
pub const FIELD_SYSTEMD_USER_UNIT: &str = "_SYSTEMD_USER_UNIT";
pub const FIELD_SYSTEMD_OWNER_UID: &str = "_SYSTEMD_OWNER_UID";
pub const FIELD_SYSTEMD_SLICE: &str = "_SYSTEMD_SLICE";
pub const FIELD_SELINUX_CONTEXT: &str = "_SELINUX_CONTEXT";
pub const FIELD_SOURCE_REALTIME_TIMESTAMP: &str = "_SOURCE_REALTIME_TIMESTAMP";
pub const FIELD_BOOT_ID: &str = "_BOOT_ID";
pub const FIELD_MACHINE_ID: &str = "_MACHINE_ID";
pub const FIELD_HOSTNAME: &str = "_HOSTNAME";
pub const FIELD_TRANSPORT: &str = "_TRANSPORT";

// Kernel journal fields
pub const FIELD_KERNEL_DEVICE: &str = "_KERNEL_DEVICE";
pub const FIELD_KERNEL_SUBSYSTEM: &str = "_KERNEL_SUBSYSTEM";
pub const FIELD_UDEV_SYSNAME: &str = "_UDEV_SYSNAME";
pub const FIELD_UDEV_DEVNODE: &str = "_UDEV_DEVNODE";
pub const FIELD_UDEV_DEVLINK: &str = "_UDEV_DEVLINK";

// Fields logged on behalf of a different program
pub const FIELD_COREDUMP_UNIT: &str = "COREDUMP_UNIT";
pub const FIELD_COREDUMP_USER_UNIT: &str = "COREDUMP_USER_UNIT";
pub const FIELD_OBJECT_PID: &str = "OBJECT_PID";
pub const FIELD_OBJECT_UID: &str = "OBJECT_UID";
pub const FIELD_OBJECT_GID: &str = "OBJECT_GID";
pub const FIELD_OBJECT_COMM: &str = "OBJECT_COMM";
pub const FIELD_OBJECT_EXE: &str = "OBJECT_EXE";
pub const FIELD_OBJECT_CMDLINE: &str = "OBJECT_CMDLINE";
pub const FIELD_OBJECT_AUDIT_SESSION: &str = "OBJECT_AUDIT_SESSION";
pub const FIELD_OBJECT_AUDIT_LOGINUID: &str = "OBJECT_AUDIT_LOGINUID";
pub const FIELD_OBJECT_SYSTEMD_CGROUP: &str = "OBJECT_SYSTEMD_CGROUP";
pub const FIELD_OBJECT_SYSTEMD_SESSION: &str = "OBJECT_SYSTEMD_SESSION";
pub const FIELD_OBJECT_SYSTEMD_UNIT: &str = "OBJECT_SYSTEMD_UNIT";
pub const FIELD_OBJECT_SYSTEMD_USER_UNIT: &str = "OBJECT_SYSTEMD_USER_UNIT";
pub const FIELD_OBJECT_SYSTEMD_OWNER_UID: &str = "OBJECT_SYSTEMD_OWNER_UID";

// Address fields
pub const FIELD_CURSOR: &str = "__CURSOR";
pub const FIELD_REALTIME_TIMESTAMP: &str = "__REALTIME_TIMESTAMP";
pub const FIELD_MONOTONIC_TIMESTAMP: &str = "__MONOTONIC_TIMESTAMP";

/// Timestamps below one second past the epoch are treated as unset.
const MIN_REALTIME_USEC: u64 = 1_000_000;

/// A single journal entry: field names mapped to raw field values.
///
/// Values are bytes because the export format allows arbitrary binary data.
/// Names are unique; inserting an existing name replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    fields: BTreeMap<String, Vec<u8>>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// The value of `name` when it is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The opaque `__CURSOR` position of this entry.
    pub fn cursor(&self) -> Option<&str> {
        self.get_str(FIELD_CURSOR)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Wall clock time of the entry.
    ///
    /// `_SOURCE_REALTIME_TIMESTAMP` is preferred over `__REALTIME_TIMESTAMP`.
    /// The chosen field must hold a base-10 microsecond count of at least one
    /// second; otherwise the time is unknown and `None` is returned. A malformed
    /// preferred field does not fall back to the secondary one.
    pub fn realtime(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .get(FIELD_SOURCE_REALTIME_TIMESTAMP)
            .or_else(|| self.get(FIELD_REALTIME_TIMESTAMP))?;

        // `parse` alone would also accept a leading `+`.
        if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let usec: u64 = std::str::from_utf8(raw).ok()?.parse().ok()?;
        if usec < MIN_REALTIME_USEC {
            return None;
        }

        let secs = usec / 1_000_000;
        let nsecs = (usec - secs * 1_000_000) * 1000;
        DateTime::from_timestamp(i64::try_from(secs).ok()?, nsecs as u32)
    }
}

impl<K, V> FromIterator<(K, V)> for Entry
where
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entry = Entry::new();
        for (name, value) in iter {
            entry.insert(name, value);
        }
        entry
    }
}
