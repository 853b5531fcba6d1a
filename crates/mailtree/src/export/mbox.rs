//! mboxrd output for exported mail

use std::io::{self, Write};

use chrono::{DateTime, Utc};

use super::ExportedMessage;
use crate::mime::MessagePart;

/// Writes messages as an mboxrd stream.
///
/// Each message gets a `From ` separator line dated with its receive time.
/// Body lines matching `>*From ` gain one more `>`, so readers can undo the
/// quoting exactly.
pub struct MboxWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> MboxWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write_exported(&mut self, exported: &ExportedMessage) -> io::Result<()> {
        self.write_message(exported.email.received_at, &exported.message)
    }

    pub fn write_message(
        &mut self,
        received_at: DateTime<Utc>,
        message: &MessagePart,
    ) -> io::Result<()> {
        // Serialized messages use CRLF; the framing lines match them
        write!(
            self.inner,
            "From MAILER-DAEMON {}\r\n",
            received_at.format("%a %b %e %H:%M:%S %Y")
        )?;

        let bytes = message.to_bytes();
        let mut ends_with_newline = true;
        for line in bytes.split_inclusive(|&b| b == b'\n') {
            let unquoted = line.iter().position(|&b| b != b'>').unwrap_or(line.len());
            if line[unquoted..].starts_with(b"From ") {
                self.inner.write_all(b">")?;
            }
            self.inner.write_all(line)?;
            ends_with_newline = line.ends_with(b"\n");
        }
        if !ends_with_newline {
            self.inner.write_all(b"\r\n")?;
        }
        self.inner.write_all(b"\r\n")?;

        self.written += 1;
        Ok(())
    }

    /// Messages written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
