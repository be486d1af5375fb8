use crate::{Error, Result, DEFAULT_UPLOAD_SPEED_MBPS};
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct SizeEstimate {
    pub total_bytes: u64,
    pub human_size: String,
    pub estimated_time: String,
}

/// Measures `path` at the default upload speed.
pub fn measure<P: AsRef<Path>>(path: P) -> Result<SizeEstimate> {
    measure_with_speed(path, DEFAULT_UPLOAD_SPEED_MBPS)
}

pub fn measure_with_speed<P: AsRef<Path>>(path: P, upload_speed_mbps: f64) -> Result<SizeEstimate> {
    let total_bytes = total_size(path.as_ref())?;
    Ok(SizeEstimate {
        total_bytes,
        human_size: human_readable_size(total_bytes),
        estimated_time: estimated_upload_time(total_bytes, upload_speed_mbps),
    })
}

/// Byte length of a file, or the sum of regular files below a directory.
/// Symbolic links inside a directory are not counted.
pub fn total_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::invalid_path(path, e.to_string()))?;

    if metadata.is_file() {
        return Ok(metadata.len());
    }
    if !metadata.is_dir() {
        return Err(Error::invalid_path(path, "neither a file nor a directory"));
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(|e| Error::Io(e.into()))?.len();
        }
    }
    Ok(total)
}

pub fn human_readable_size(size_bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let size = size_bytes as f64;

    if size_bytes < 1024 {
        format!("{} bytes", size_bytes)
    } else if size < KB * KB {
        format!("{:.1} KB", size / KB)
    } else if size < KB.powi(3) {
        format!("{:.1} MB", size / KB.powi(2))
    } else if size < KB.powi(4) {
        format!("{:.1} GB", size / KB.powi(3))
    } else {
        format!("{:.1} TB", size / KB.powi(4))
    }
}

/// Time to push `size_bytes` at `upload_speed_mbps` (1 Mb = 1,000,000 bits),
/// rendered as `2h 15m 30.0s` without leading zero units.
pub fn estimated_upload_time(size_bytes: u64, upload_speed_mbps: f64) -> String {
    let total_bits = size_bytes as f64 * 8.0;
    let speed_bps = upload_speed_mbps * 1_000_000.0;
    let total_seconds = if speed_bps > 0.0 { total_bits / speed_bps } else { 0.0 };

    let hours = (total_seconds / 3600.0).floor() as u64;
    let minutes = ((total_seconds % 3600.0) / 60.0).floor() as u64;
    let seconds = total_seconds % 60.0;

    if hours > 0 {
        format!("{}h {}m {:.1}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:.1}s", minutes, seconds)
    } else {
        format!("{:.1}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_human_readable_size_boundaries() {
        assert_eq!(human_readable_size(0), "0 bytes");
        assert_eq!(human_readable_size(1023), "1023 bytes");
        assert_eq!(human_readable_size(1024), "1.0 KB");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(1048576), "1.0 MB");
        assert_eq!(human_readable_size(1024 * 1024 * 1024), "1.0 GB");
        assert_eq!(human_readable_size(5 * 1024u64.pow(4)), "5.0 TB");
    }

    #[test]
    fn test_estimated_upload_time() {
        assert_eq!(estimated_upload_time(0, 1.5), "0.0s");
        // 90 s at 1.5 Mb/s = 135,000,000 bits.
        assert_eq!(estimated_upload_time(16_875_000, 1.5), "1m 30.0s");
        // 3661 s.
        assert_eq!(estimated_upload_time(686_437_500, 1.5), "1h 1m 1.0s");
        // Exactly one hour keeps the zero minute.
        assert_eq!(estimated_upload_time(675_000_000, 1.5), "1h 0m 0.0s");
    }

    #[test]
    fn test_measure_directory_skips_symlinks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 1000]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.bin"), vec![0u8; 24]).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.path().join("a.bin"), dir.path().join("link.bin")).unwrap();

        let estimate = measure(dir.path()).unwrap();
        assert_eq!(estimate.total_bytes, 1024);
        assert_eq!(estimate.human_size, "1.0 KB");
        assert_eq!(estimate.estimated_time, "0.0s");
    }

    #[test]
    fn test_measure_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        std::fs::write(&file, vec![1u8; 1023]).unwrap();
        assert_eq!(measure(&file).unwrap().human_size, "1023 bytes");
    }

    #[test]
    fn test_measure_missing_path_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = measure(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_measure_broken_symlink_is_invalid() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("missing"), &link).unwrap();
        assert!(matches!(measure(&link), Err(Error::InvalidPath { .. })));
    }
}
