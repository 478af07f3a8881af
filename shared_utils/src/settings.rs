//! Plain-text settings files that operators edit while a process is running.

use std::path::Path;

use tracing::warn;

/// Reads a positive integer (minutes) from a plain-text file.
///
/// Any failure (missing file, unparsable content, zero) is logged and
/// `default` is returned instead, so callers can re-read the file on every
/// cycle without handling errors.
pub fn read_minutes(path: impl AsRef<Path>, default: u64) -> u64 {
    let path = path.as_ref();
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| s.trim().parse::<u64>().map_err(|e| e.to_string()));

    match parsed {
        Ok(minutes) if minutes > 0 => minutes,
        Ok(_) => {
            warn!(path = %path.display(), default, "interval must be positive, using default");
            default
        }
        Err(reason) => {
            warn!(path = %path.display(), default, %reason, "could not read interval, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_trimmed_integer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " 30 ").unwrap();
        assert_eq!(read_minutes(file.path(), 15), 30);
    }

    #[test]
    fn falls_back_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_minutes(dir.path().join("timeframe.txt"), 15), 15);
    }

    #[test]
    fn falls_back_on_garbage_and_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "soon").unwrap();
        assert_eq!(read_minutes(file.path(), 15), 15);

        let mut zero = tempfile::NamedTempFile::new().unwrap();
        write!(zero, "0").unwrap();
        assert_eq!(read_minutes(zero.path(), 15), 15);
    }
}
