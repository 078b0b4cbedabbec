// crates/server/src/transcript_cursor.rs
//! Byte-offset cursor over an append-only transcript log.
//!
//! Each read returns only the complete lines appended since the last one,
//! so the reconciler can tail a live log without re-reading it. A trailing
//! line without its newline is deferred to the next read; a shrunken file
//! means the log was truncated and the cursor restarts from zero.

use std::path::PathBuf;
use tokio::io::{self, AsyncReadExt, AsyncSeekExt};

pub struct TranscriptCursor {
    path: PathBuf,
    /// Byte offset of the first unread byte.
    offset: u64,
}

impl TranscriptCursor {
    /// Cursor at the start of the log; the first read returns everything.
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Cursor resumed from a previously observed offset, e.g. after a
    /// server restart. An offset beyond the current file length is treated
    /// as truncation on the next read.
    pub fn resume(path: PathBuf, offset: u64) -> Self {
        Self { path, offset }
    }

    /// Cursor at the current end of the log; only future appends are seen.
    pub async fn at_end(path: PathBuf) -> io::Result<Self> {
        let len = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, offset: len })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read all complete lines appended since the last call.
    pub async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if len < self.offset {
            tracing::debug!(path = %self.path.display(), "transcript truncated; cursor reset");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut buf).await?;

        Ok(self.consume(&buf))
    }

    /// Split complete lines out of `bytes`, advancing the offset past them.
    /// Bytes after the last newline stay unconsumed.
    fn consume(&mut self, bytes: &[u8]) -> Vec<String> {
        let Some(last_newline) = bytes.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete = &bytes[..=last_newline];
        self.offset += complete.len() as u64;

        complete
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }
}
