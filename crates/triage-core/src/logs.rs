//! Tail sampling of the development log.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;

pub const LOGS_UNAVAILABLE: &str = "Logs not available";

const CHUNK_BYTES: u64 = 8 * 1024;

/// Reads the last `max_lines` lines of one log file. Never fails: read
/// problems are reported inside the returned text.
#[derive(Debug, Clone)]
pub struct LogSampler {
    path: PathBuf,
    max_lines: usize,
}

impl LogSampler {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.log_path(), cfg.log_lines as usize)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking; callers on an async runtime should use `spawn_blocking`.
    pub fn sample(&self) -> String {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target: "triage::logs", path = %self.path.display(), "log file missing");
                return LOGS_UNAVAILABLE.to_string();
            }
            Err(err) => return read_failure(&self.path, &err),
        };
        match tail_lines(file, self.max_lines, CHUNK_BYTES) {
            Ok(text) => text,
            Err(err) => read_failure(&self.path, &err),
        }
    }
}

fn read_failure(path: &Path, err: &io::Error) -> String {
    debug!(target: "triage::logs", path = %path.display(), error = %err, "log read failed");
    format!("Error reading logs: {err}")
}

/// Walk backwards from the end in `chunk`-sized reads until `max_lines`
/// complete lines are buffered (or the start of the input is reached).
fn tail_lines<R: Read + Seek>(mut reader: R, max_lines: usize, chunk: u64) -> io::Result<String> {
    if max_lines == 0 {
        return Ok(String::new());
    }
    let mut pos = reader.seek(SeekFrom::End(0))?;
    let mut buf: Vec<u8> = Vec::new();
    loop {
        if let Some(start) = start_of_last_lines(&buf, max_lines) {
            buf.drain(..start);
            break;
        }
        if pos == 0 {
            break;
        }
        let step = chunk.max(1).min(pos);
        pos -= step;
        reader.seek(SeekFrom::Start(pos))?;
        let mut block = vec![0u8; step as usize];
        reader.read_exact(&mut block)?;
        block.extend_from_slice(&buf);
        buf = block;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn start_of_last_lines(buf: &[u8], max_lines: usize) -> Option<usize> {
    // A trailing newline closes the last line; it does not open a new one.
    let end = match buf.last() {
        Some(b'\n') => buf.len() - 1,
        _ => buf.len(),
    };
    let mut seen = 0;
    for (idx, byte) in buf[..end].iter().enumerate().rev() {
        if *byte == b'\n' {
            seen += 1;
            if seen == max_lines {
                return Some(idx + 1);
            }
        }
    }
    None
}
