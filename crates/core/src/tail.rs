// crates/core/src/tail.rs
//! Backward-chunked tail over a transcript file.
//!
//! Used for best-effort recovery of the originating user instruction when a
//! task is created through the inferred path: only the last few transcript
//! lines matter, so the file is read backwards from EOF instead of front to
//! back.

use std::io;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Chunk size for backward reads.
const CHUNK_SIZE: u64 = 8 * 1024;

/// Read the last `n` lines of `path` without loading the whole file.
///
/// Lines come back in chronological order (oldest first). A trailing
/// newline at EOF does not produce an empty last line; files with fewer
/// than `n` lines return everything; lines longer than the chunk size are
/// assembled across chunk boundaries.
pub async fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = tokio::fs::File::open(path).await?;
    let file_len = file.metadata().await?.len();
    if file_len == 0 {
        return Ok(Vec::new());
    }

    // Walk chunks from EOF toward BOF until enough newlines have been seen
    // to delimit n lines. n+1 newlines guarantees the start boundary of the
    // oldest wanted line even when the file ends with a newline.
    let target_newlines = n + 1;
    let mut collected: Vec<u8> = Vec::new();
    let mut newline_count = 0usize;
    let mut remaining = file_len;

    while remaining > 0 {
        let chunk_len = remaining.min(CHUNK_SIZE);
        let offset = remaining - chunk_len;

        file.seek(io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; chunk_len as usize];
        file.read_exact(&mut buf).await?;

        newline_count += buf.iter().filter(|&&b| b == b'\n').count();

        buf.append(&mut collected);
        collected = buf;
        remaining = offset;

        if newline_count >= target_newlines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&collected);
    let text = text.strip_suffix('\n').unwrap_or(text.as_ref());
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let all: Vec<&str> = text.split('\n').collect();
    let start = all.len().saturating_sub(n);
    Ok(all[start..].iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn tail_zero_returns_empty() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line1").unwrap();
        f.flush().unwrap();
        assert!(tail_lines(f.path(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tail_empty_file_returns_empty() {
        let f = NamedTempFile::new().unwrap();
        assert!(tail_lines(f.path(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tail_fewer_lines_than_requested() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "alpha").unwrap();
        writeln!(f, "beta").unwrap();
        f.flush().unwrap();
        assert_eq!(tail_lines(f.path(), 50).await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn tail_last_three_of_many() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 0..500 {
            writeln!(f, "entry{i}").unwrap();
        }
        f.flush().unwrap();
        assert_eq!(
            tail_lines(f.path(), 3).await.unwrap(),
            vec!["entry497", "entry498", "entry499"]
        );
    }

    #[tokio::test]
    async fn tail_lines_longer_than_chunk() {
        let mut f = NamedTempFile::new().unwrap();
        let a = "A".repeat(10_000);
        let b = "B".repeat(12_000);
        writeln!(f, "{a}").unwrap();
        writeln!(f, "{b}").unwrap();
        f.flush().unwrap();
        let result = tail_lines(f.path(), 1).await.unwrap();
        assert_eq!(result, vec![b]);
    }

    #[tokio::test]
    async fn tail_no_trailing_newline() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "one\ntwo\nthree").unwrap();
        f.flush().unwrap();
        assert_eq!(tail_lines(f.path(), 2).await.unwrap(), vec!["two", "three"]);
    }
}
