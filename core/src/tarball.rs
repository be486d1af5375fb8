use crate::archive::{archive_base, discover_parts, part_path, Archiver};
use crate::{Error, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// In-process archiver writing a gzip-compressed tar stream split into
/// numbered volumes. Needs no external tool.
#[derive(Debug, Clone, Default)]
pub struct TarballArchiver {
    level: Option<u32>,
}

impl TarballArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Some(level.min(9)),
        }
    }

    fn compression(&self) -> Compression {
        self.level.map(Compression::new).unwrap_or_default()
    }
}

#[async_trait]
impl Archiver for TarballArchiver {
    async fn compress(
        &self,
        source: &Path,
        base: &Path,
        volume_size: u64,
        threads: usize,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            source = %source.display(),
            base = %base.display(),
            volume_size,
            threads,
            "Writing tarball volumes (single-threaded)"
        );

        let source = source.to_path_buf();
        let base = base.to_path_buf();
        let compression = self.compression();

        tokio::task::spawn_blocking(move || {
            write_volumes(&source, &base, volume_size, compression)
                .map_err(|e| Error::archiver(&source, e.to_string()))
        })
        .await
        .map_err(|e| Error::Other(format!("Archiver task failed: {}", e)))?
    }

    async fn extract(&self, first_part: &Path, destination: &Path) -> Result<()> {
        let base = archive_base(first_part)
            .ok_or_else(|| Error::archiver(first_part, "not a first archive part"))?;
        let parts = discover_parts(&base).await?;

        for (expected, (index, _)) in (1..).zip(&parts) {
            if *index != expected {
                return Err(Error::archiver(
                    first_part,
                    format!("missing volume {:03}", expected),
                ));
            }
        }

        let paths: VecDeque<PathBuf> = parts.into_iter().map(|(_, path)| path).collect();
        let destination = destination.to_path_buf();
        let subject = first_part.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let reader = VolumeReader::new(paths);
            let mut archive = tar::Archive::new(GzDecoder::new(reader));
            archive
                .unpack(&destination)
                .map_err(|e| Error::archiver(&subject, e.to_string()))
        })
        .await
        .map_err(|e| Error::Other(format!("Archiver task failed: {}", e)))?
    }

    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    fn name(&self) -> &'static str {
        "tarball"
    }
}

fn write_volumes(
    source: &Path,
    base: &Path,
    volume_size: u64,
    compression: Compression,
) -> io::Result<Vec<PathBuf>> {
    if let Some(parent) = base.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?
        .to_owned();

    let volumes = VolumeWriter::new(base.to_path_buf(), volume_size);
    let mut builder = tar::Builder::new(GzEncoder::new(volumes, compression));
    builder.follow_symlinks(false);

    if source.is_dir() {
        builder.append_dir_all(&name, source)?;
    } else {
        builder.append_path_with_name(source, &name)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.finish()
}

/// Spreads a byte stream over `{base}.001`, `{base}.002`, ... each holding at
/// most `volume_size` bytes.
struct VolumeWriter {
    base: PathBuf,
    volume_size: u64,
    current: Option<BufWriter<File>>,
    written: u64,
    parts: Vec<PathBuf>,
}

impl VolumeWriter {
    fn new(base: PathBuf, volume_size: u64) -> Self {
        Self {
            base,
            volume_size: volume_size.max(1),
            current: None,
            written: 0,
            parts: Vec::new(),
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut done) = self.current.take() {
            done.flush()?;
        }
        let path = part_path(&self.base, self.parts.len() + 1);
        let file = File::create(&path)?;
        self.parts.push(path);
        self.written = 0;
        self.current = Some(BufWriter::new(file));
        Ok(())
    }

    fn finish(mut self) -> io::Result<Vec<PathBuf>> {
        if self.parts.is_empty() {
            self.roll()?;
        }
        if let Some(mut last) = self.current.take() {
            last.flush()?;
        }
        Ok(self.parts)
    }
}

impl Write for VolumeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.current.is_none() || self.written >= self.volume_size {
            self.roll()?;
        }

        let n = (self.volume_size - self.written).min(buf.len() as u64) as usize;
        match self.current.as_mut() {
            Some(writer) => writer.write_all(&buf[..n])?,
            None => return Err(io::Error::other("no open volume")),
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Reads volumes back to back as one stream.
struct VolumeReader {
    pending: VecDeque<PathBuf>,
    current: Option<File>,
}

impl VolumeReader {
    fn new(pending: VecDeque<PathBuf>) -> Self {
        Self {
            pending,
            current: None,
        }
    }
}

impl Read for VolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                match self.pending.pop_front() {
                    Some(path) => self.current = Some(File::open(path)?),
                    None => return Ok(0),
                }
            }

            let n = match self.current.as_mut() {
                Some(file) => file.read(buf)?,
                None => 0,
            };
            if n > 0 {
                return Ok(n);
            }
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use tempfile::TempDir;

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[tokio::test]
    async fn test_roundtrip_directory_over_many_volumes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("project");
        std::fs::create_dir_all(source.join("nested").join("empty")).unwrap();
        let big = random_bytes(40_000);
        std::fs::write(source.join("big.bin"), &big).unwrap();
        std::fs::write(source.join("nested").join("note.txt"), b"hello").unwrap();

        let base = dir.path().join("stage").join("project.tar.gz");
        let archiver = TarballArchiver::new();
        let parts = archiver.compress(&source, &base, 8 * 1024, 2).await.unwrap();

        assert!(parts.len() >= 5);
        assert_eq!(parts[0], part_path(&base, 1));
        for part in &parts {
            assert!(std::fs::metadata(part).unwrap().len() <= 8 * 1024);
        }

        let restore = dir.path().join("restore");
        std::fs::create_dir_all(&restore).unwrap();
        archiver.extract(&parts[0], &restore).await.unwrap();

        let restored = restore.join("project");
        assert_eq!(std::fs::read(restored.join("big.bin")).unwrap(), big);
        assert_eq!(
            std::fs::read(restored.join("nested").join("note.txt")).unwrap(),
            b"hello"
        );
        assert!(restored.join("nested").join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_small_file_still_gets_first_volume() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("tiny.txt");
        std::fs::write(&source, b"x").unwrap();

        let base = dir.path().join("tiny.txt.tar.gz");
        let parts = TarballArchiver::new()
            .compress(&source, &base, 1024 * 1024, 1)
            .await
            .unwrap();
        assert_eq!(parts, vec![part_path(&base, 1)]);
    }

    #[tokio::test]
    async fn test_extract_with_missing_volume_fails() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("data.bin");
        std::fs::write(&source, random_bytes(10_000)).unwrap();

        let base = dir.path().join("data.bin.tar.gz");
        let archiver = TarballArchiver::with_level(1);
        let parts = archiver.compress(&source, &base, 2048, 1).await.unwrap();
        std::fs::remove_file(&parts[1]).unwrap();

        let out = dir.path().join("out");
        let err = archiver.extract(&parts[0], &out).await.unwrap_err();
        assert!(matches!(err, Error::Archiver { .. }));
    }
}
