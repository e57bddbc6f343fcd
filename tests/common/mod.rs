// Shared export-stream fixtures for the integration tests.
#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use journal_recorder::format::Zone;
use journal_recorder::{Entry, Formatter};

/// Two syslog entries from the same boot, in text-only export format.
pub const EXPORT_TEXT: &str = concat!(
    "__CURSOR=s=739ad463348b4ceca5a9e69c95a3c93f;i=4ece7;b=6c7c6013a26343b29e964691ff25d04c;m=4fc72436e;t=4c508a72423d9;x=d3e5610681098c10;p=system.journal\n",
    "__REALTIME_TIMESTAMP=1342540861416409\n",
    "__MONOTONIC_TIMESTAMP=21415215982\n",
    "_BOOT_ID=6c7c6013a26343b29e964691ff25d04c\n",
    "_TRANSPORT=syslog\n",
    "PRIORITY=4\n",
    "SYSLOG_FACILITY=3\n",
    "SYSLOG_IDENTIFIER=gdm-password]\n",
    "SYSLOG_PID=587\n",
    "MESSAGE=AccountsService-DEBUG(+): ActUserManager: ignoring unspecified session '8' since it's not graphical: Success\n",
    "_PID=587\n",
    "_UID=0\n",
    "_GID=500\n",
    "_COMM=gdm-session-wor\n",
    "_EXE=/usr/libexec/gdm-session-worker\n",
    "_CMDLINE=gdm-session-worker [pam/gdm-password]\n",
    "_AUDIT_SESSION=2\n",
    "_AUDIT_LOGINUID=500\n",
    "_SYSTEMD_CGROUP=/user/lennart/2\n",
    "_SYSTEMD_SESSION=2\n",
    "_SELINUX_CONTEXT=system_u:system_r:xdm_t:s0-s0:c0.c1023\n",
    "_SOURCE_REALTIME_TIMESTAMP=1342540861413961\n",
    "_MACHINE_ID=a91663387a90b89f185d4e860000001a\n",
    "_HOSTNAME=epsilon\n",
    "\n",
    "__CURSOR=s=739ad463348b4ceca5a9e69c95a3c93f;i=4ece8;b=6c7c6013a26343b29e964691ff25d04c;m=4fc72572f;t=4c508a7243799;x=68597058a89b7246;p=system.journal\n",
    "__REALTIME_TIMESTAMP=1342540861421465\n",
    "__MONOTONIC_TIMESTAMP=21415221039\n",
    "_BOOT_ID=6c7c6013a26343b29e964691ff25d04c\n",
    "_TRANSPORT=syslog\n",
    "PRIORITY=6\n",
    "SYSLOG_FACILITY=9\n",
    "SYSLOG_IDENTIFIER=/USR/SBIN/CROND\n",
    "SYSLOG_PID=8278\n",
    "MESSAGE=(root) CMD (run-parts /etc/cron.hourly)\n",
    "_PID=8278\n",
    "_UID=0\n",
    "_GID=0\n",
    "_COMM=run-parts\n",
    "_EXE=/usr/bin/bash\n",
    "_CMDLINE=/bin/bash /bin/run-parts /etc/cron.hourly\n",
    "_AUDIT_SESSION=8\n",
    "_AUDIT_LOGINUID=0\n",
    "_SYSTEMD_CGROUP=/user/root/8\n",
    "_SYSTEMD_SESSION=8\n",
    "_SELINUX_CONTEXT=system_u:system_r:crond_t:s0-s0:c0.c1023\n",
    "_SOURCE_REALTIME_TIMESTAMP=1342540861416351\n",
    "_MACHINE_ID=a91663387a90b89f185d4e860000001a\n",
    "_HOSTNAME=epsilon\n",
    "\n",
);

/// One entry from a later boot whose message is binary-encoded.
pub const EXPORT_BINARY: &str = concat!(
    "\n",
    "__CURSOR=s=bcce4fb8ffcb40e9a6e05eee8b7831bf;i=5ef603;b=ec25d6795f0645619ddac9afdef453ee;m=545242e7049;t=50f1202\n",
    "__REALTIME_TIMESTAMP=1423944916375353\n",
    "__MONOTONIC_TIMESTAMP=5794517905481\n",
    "_BOOT_ID=ec25d6795f0645619ddac9afdef453ee\n",
    "_TRANSPORT=journal\n",
    "_UID=1001\n",
    "_GID=1001\n",
    "_CAP_EFFECTIVE=0\n",
    "_SYSTEMD_OWNER_UID=1001\n",
    "_SYSTEMD_SLICE=user-1001.slice\n",
    "_MACHINE_ID=5833158886a8445e801d437313d25eff\n",
    "_HOSTNAME=bupkis\n",
    "_AUDIT_LOGINUID=1001\n",
    "_SELINUX_CONTEXT=unconfined_u:unconfined_r:unconfined_t:s0-s0:c0.c1023\n",
    "CODE_LINE=1\n",
    "CODE_FUNC=<module>\n",
    "SYSLOG_IDENTIFIER=python3\n",
    "_COMM=python3\n",
    "_EXE=/usr/bin/python3.4\n",
    "_AUDIT_SESSION=35898\n",
    "_SYSTEMD_CGROUP=/user.slice/user-1001.slice/session-35898.scope\n",
    "_SYSTEMD_SESSION=35898\n",
    "_SYSTEMD_UNIT=session-35898.scope\n",
    "MESSAGE\n",
    "\x07\x00\x00\x00\x00\x00\x00\x00foo\nbar\n",
    "CODE_FILE=<string>\n",
    "_PID=16853\n",
    "_CMDLINE=python3 -c from systemd import journal; journal.send(\"foo\\nbar\")\n",
    "_SOURCE_REALTIME_TIMESTAMP=1423944916372858\n",
    "\n",
);

/// Cursor of the last entry in [`EXPORT_TEXT`].
pub const CURSOR_TEXT: &str = "s=739ad463348b4ceca5a9e69c95a3c93f;i=4ece8;b=6c7c6013a26343b29e964691ff25d04c;m=4fc72572f;t=4c508a7243799;x=68597058a89b7246;p=system.journal";

/// Cursor of the entry in [`EXPORT_BINARY`].
pub const CURSOR_BINARY: &str = "s=bcce4fb8ffcb40e9a6e05eee8b7831bf;i=5ef603;b=ec25d6795f0645619ddac9afdef453ee;m=545242e7049;t=50f1202";

pub const JOURNAL_BOOT: &str = "journalctl --output=export --follow --lines=all --boot";

/// Remote command resuming after `cursor`, with `;` escaped for the shell.
pub fn journal_after(cursor: &str) -> String {
    format!(
        "journalctl --output=export --follow --lines=all --after-cursor {}",
        cursor.replace(';', "\\;")
    )
}

/// Both fixtures rendered by `ShortWriter` in UTC.
pub fn short_fixtures_utc() -> String {
    [
        "Jul 17 16:01:01.413961 gdm-password][587]: AccountsService-DEBUG(+): ActUserManager: ignoring unspecified session '8' since it's not graphical: Success\n",
        "Jul 17 16:01:01.416351 /USR/SBIN/CROND[8278]: (root) CMD (run-parts /etc/cron.hourly)\n",
        "-- Reboot --\n",
        "Feb 14 20:15:16.372858 python3[16853]: foo\n",
        "                                       bar\n",
    ]
    .concat()
}

/// Formatter that keeps every entry it is given.
#[derive(Clone, Default)]
pub struct Collect {
    pub entries: Arc<Mutex<Vec<Entry>>>,
}

impl Collect {
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.get_str("MESSAGE").unwrap_or_default().to_owned())
            .collect()
    }

    pub fn cursors(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.cursor().unwrap_or_default().to_owned())
            .collect()
    }
}

impl Formatter for Collect {
    fn set_timezone(&mut self, _zone: Zone) {}

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Shared in-memory raw capture.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
