//! Syslog output for `-syslog`.
//!
//! Each formatted log line is sent as one RFC 3164 datagram to the local
//! syslog socket. Only available on unix.

use tracing::Level;

/// Local syslog socket.
pub const SYSLOG_SOCKET: &str = "/dev/log";

/// `daemon` facility.
const FACILITY: u8 = 3;

fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Render one syslog record.
pub fn format_record(level: &Level, ident: &str, pid: u32, line: &str) -> String {
    let priority = FACILITY * 8 + severity(level);
    format!("<{priority}>{ident}[{pid}]: {}", line.trim_end())
}

#[cfg(unix)]
pub use unix::{SyslogLine, SyslogWriter};

#[cfg(unix)]
mod unix {
    use std::io::{self, Write};
    use std::os::unix::net::UnixDatagram;
    use std::sync::Arc;

    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;

    use super::{format_record, SYSLOG_SOCKET};

    /// `MakeWriter` that sends lines to the syslog socket.
    #[derive(Clone)]
    pub struct SyslogWriter {
        socket: Arc<UnixDatagram>,
        ident: Arc<str>,
        pid: u32,
    }

    impl SyslogWriter {
        pub fn connect(ident: &str) -> io::Result<Self> {
            let socket = UnixDatagram::unbound()?;
            socket.connect(SYSLOG_SOCKET)?;
            Ok(Self {
                socket: Arc::new(socket),
                ident: Arc::from(ident),
                pid: std::process::id(),
            })
        }

        fn line(&self, level: Level) -> SyslogLine<'_> {
            SyslogLine {
                writer: self,
                level,
                buf: Vec::new(),
            }
        }
    }

    impl<'a> MakeWriter<'a> for SyslogWriter {
        type Writer = SyslogLine<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            self.line(Level::INFO)
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            self.line(*meta.level())
        }
    }

    /// Buffers one formatted event and sends it on drop.
    pub struct SyslogLine<'a> {
        writer: &'a SyslogWriter,
        level: Level,
        buf: Vec<u8>,
    }

    impl Write for SyslogLine<'_> {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for SyslogLine<'_> {
        fn drop(&mut self) {
            if self.buf.is_empty() {
                return;
            }
            let line = String::from_utf8_lossy(&self.buf);
            let record = format_record(&self.level, &self.writer.ident, self.writer.pid, &line);
            // Nowhere to report a failed log write.
            let _ = self.writer.socket.send(record.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_record() {
        assert_eq!(
            format_record(&Level::ERROR, "yagpdb", 42, "Failed initializing\n"),
            "<27>yagpdb[42]: Failed initializing"
        );
        assert_eq!(
            format_record(&Level::INFO, "yagpdb", 1, "ready"),
            "<30>yagpdb[1]: ready"
        );
    }
}
