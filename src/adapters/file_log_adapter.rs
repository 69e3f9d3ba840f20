//! Filesystem log source.

use std::fs;
use std::path::Path;

use crate::domain::error::TradelogError;
use crate::ports::log_port::LogPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct FileLogAdapter;

impl LogPort for FileLogAdapter {
    fn read_log(&self, path: &Path) -> Result<Vec<u8>, TradelogError> {
        fs::read(path).map_err(|source| TradelogError::LogUnreadable {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn reads_raw_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xFF, 0xFE, b'A', 0x00]).unwrap();
        let bytes = FileLogAdapter.read_log(file.path()).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFE, b'A', 0x00]);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = FileLogAdapter
            .read_log(Path::new("/nonexistent/tester/20240101.log"))
            .unwrap_err();
        assert!(matches!(err, TradelogError::LogUnreadable { .. }));
        assert!(err.to_string().contains("20240101.log"));
    }

    #[test]
    fn directory_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = FileLogAdapter.read_log(dir.path()).unwrap_err();
        assert!(matches!(err, TradelogError::LogUnreadable { .. }));
    }
}
