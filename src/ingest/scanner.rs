use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;

use crate::error::{CronscanError, Result};
use super::filter::is_eligible;
use super::tokenizer::tokenize;

/// One eligible crontab line, split into fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    /// 1-based position in the source file
    pub line_number: usize,
    pub fields: Vec<String>,
}

/// Read a crontab end to end and tokenize every eligible line, in file order.
///
/// Empty lines are skipped, then the comment policy is applied. Bytes that are not
/// valid UTF-8 are replaced rather than failing the file. Only regular files are
/// read: symlinks, FIFOs, devices and directories are refused before opening, since
/// an open on a FIFO blocks until a writer shows up. Any failure aborts this file only
/// and is reported as [`CronscanError::FileAccess`]; the handle is released on every
/// path when the reader is dropped.
pub fn scan_file(path: &Path, include_commented: bool) -> Result<Vec<TokenizedLine>> {
    let access_error = |source: std::io::Error| CronscanError::FileAccess {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::symlink_metadata(path).map_err(access_error)?;
    if !metadata.is_file() {
        return Err(access_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a regular file ({:?})", metadata.file_type()),
        )));
    }

    let file = File::open(path).map_err(access_error)?;
    let mut reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(access_error)?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let text = String::from_utf8_lossy(&buf);
        let text: &str = &text;
        let line = text.strip_suffix('\n').unwrap_or(text);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            continue;
        }

        if !is_eligible(line, include_commented) {
            log::trace!("{}:{} commented out, skipped", path.display(), line_number);
            continue;
        }

        lines.push(TokenizedLine {
            line_number,
            fields: tokenize(line),
        });
    }

    log::debug!("Scanned {}: {} eligible line(s)", path.display(), lines.len());
    Ok(lines)
}

/// Run [`scan_file`] on the blocking pool, optionally bounded by a read timeout.
///
/// A timed-out read is reported as `FileAccess` with `ErrorKind::TimedOut`. The
/// blocking thread cannot be interrupted and finishes on its own; the binary shuts its
/// runtime down with a bounded wait so such a thread never keeps the process alive.
pub async fn scan_file_with_timeout(
    path: PathBuf,
    include_commented: bool,
    timeout: Option<Duration>,
) -> Result<Vec<TokenizedLine>> {
    let task_path = path.clone();
    run_bounded(path, timeout, move || scan_file(&task_path, include_commented)).await
}

async fn run_bounded<T, F>(path: PathBuf, timeout: Option<Duration>, read: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = task::spawn_blocking(read);

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(CronscanError::FileAccess {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("read did not finish within {:?}", limit),
                    ),
                });
            }
        },
        None => handle.await,
    };

    joined.map_err(|e| CronscanError::Join(e.to_string()))?
}
