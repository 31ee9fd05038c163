//! Line splitting for child process output
//!
//! Transcoder and retrieval tools print progress lines ending in `\r` and may
//! emit bytes that are not valid UTF-8. [`OutputLines`] treats both `\r` and
//! `\n` as terminators, decodes lossily and caps line length, so a reader can
//! keep draining a pipe for the whole life of the process.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Longest line returned before it is split
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Lossy `\r`/`\n` line reader over a byte stream
pub struct OutputLines<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Next non-empty line, or `None` at end of stream
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let available = self.reader.fill_buf().await?;

            if available.is_empty() {
                return Ok((!self.pending.is_empty()).then(|| self.take()));
            }

            match available.iter().position(|b| matches!(b, b'\n' | b'\r')) {
                Some(end) => {
                    self.pending.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    if !self.pending.is_empty() {
                        return Ok(Some(self.take()));
                    }
                }
                None => {
                    let len = available.len();
                    self.pending.extend_from_slice(available);
                    self.reader.consume(len);
                    if self.pending.len() >= MAX_LINE_BYTES {
                        return Ok(Some(self.take()));
                    }
                }
            }
        }
    }

    /// Read to end of stream, handing each line to `on_line`
    ///
    /// Interrupted reads are retried; any other read error ends the drain.
    pub async fn for_each(mut self, mut on_line: impl FnMut(String)) {
        loop {
            match self.next_line().await {
                Ok(Some(line)) => on_line(line),
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "Output stream error");
                    break;
                }
            }
        }
    }

    fn take(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}
