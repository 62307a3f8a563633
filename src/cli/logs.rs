use colored::Colorize;
use macros_rs::{crashln, string};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use gopm2::helpers;
use gopm2::socket::{SocketRequest, SocketResponse};

const FOLLOW_POLL: Duration = Duration::from_millis(100);

/// `logs <name|id> [-n lines] [-f] [-e]`: the daemon resolves the
/// target to its log paths, the tailing happens entirely client-side.
pub fn logs(target: &str, lines: usize, follow: bool, errors: bool) {
    let detail = match super::request(&SocketRequest::Describe(string!(target))) {
        SocketResponse::Detail(detail) => detail,
        SocketResponse::Error(message) => crashln!("{} ERROR: {message}", *helpers::FAIL),
        other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
    };

    let path = if errors {
        &detail.error_log_file
    } else {
        &detail.log_file
    };

    if !path.exists() {
        println!("{} Log file does not exist: {}", *helpers::WARN, path.display());
        if !follow {
            return;
        }
    }

    if lines > 0 && path.exists() {
        match tail_file(path, lines) {
            Ok(tail) => {
                for line in tail {
                    println!("{line}");
                }
            }
            Err(err) => crashln!("{} ERROR: failed to read log: {err}", *helpers::FAIL),
        }
    }

    if follow {
        println!(
            "\n{}",
            format!("==> following {} (press Ctrl+C to exit)", path.display()).white()
        );
        follow_file(path);
    }
}

/// Last `count` lines of a file, reading backwards in blocks so large
/// logs are not slurped whole.
pub fn tail_file(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size == 0 || count == 0 {
        return Ok(vec![]);
    }

    const BLOCK: u64 = 8192;
    let mut position = size;
    let mut buffer = Vec::new();
    let mut newlines = 0;

    while position > 0 && newlines <= count {
        let read_size = BLOCK.min(position);
        position -= read_size;
        file.seek(SeekFrom::Start(position))?;

        let mut block = vec![0u8; read_size as usize];
        file.read_exact(&mut block)?;
        newlines += block.iter().filter(|b| **b == b'\n').count();
        block.extend_from_slice(&buffer);
        buffer = block;
    }

    let text = String::from_utf8_lossy(&buffer);
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    if lines.len() > count {
        lines = lines.split_off(lines.len() - count);
    }
    Ok(lines)
}

/// Poll the file for growth, printing new content as it appears. A
/// shrinking file (rotated or flushed) restarts from the top.
fn follow_file(path: &Path) {
    let mut offset = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    loop {
        std::thread::sleep(FOLLOW_POLL);

        let Ok(meta) = std::fs::metadata(path) else {
            continue;
        };
        let size = meta.len();

        if size < offset {
            offset = 0;
        }
        if size == offset {
            continue;
        }

        let Ok(mut file) = File::open(path) else {
            continue;
        };
        if file.seek(SeekFrom::Start(offset)).is_err() {
            continue;
        }

        let mut chunk = String::new();
        if file.read_to_string(&mut chunk).is_ok() {
            print!("{chunk}");
            offset = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(dir: &TempDir, count: usize) -> std::path::PathBuf {
        let path = dir.path().join("test.log");
        let mut file = File::create(&path).unwrap();
        for i in 0..count {
            writeln!(file, "line {i}").unwrap();
        }
        path
    }

    #[test]
    fn test_tail_last_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, 100);

        let tail = tail_file(&path, 3).unwrap();
        assert_eq!(tail, vec!["line 97", "line 98", "line 99"]);
    }

    #[test]
    fn test_tail_more_than_available() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, 2);

        let tail = tail_file(&path, 50).unwrap();
        assert_eq!(tail, vec!["line 0", "line 1"]);
    }

    #[test]
    fn test_tail_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log");
        File::create(&path).unwrap();

        assert!(tail_file(&path, 10).unwrap().is_empty());
    }
}
