//! File splitting into on-disk parts
//!
//! A part is a contiguous byte range of the source file materialized as its
//! own file; parts in ordinal order concatenate back to the original
//! byte-for-byte. Part files carry a SHA-256 hash computed while writing so
//! the uploader can verify integrity before posting.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PostError, Result};

/// Copy buffer for streaming a part from source to part file
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// One on-disk slice of the source file
#[derive(Debug, Clone)]
pub struct FilePart {
    /// 1-based part ordinal
    pub ordinal: u32,
    /// Name of the logical file this part belongs to (the source base name)
    pub file_name: String,
    /// Part length in bytes
    pub len: u64,
    /// Path of the materialized part file
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the part contents
    pub sha256: String,
}

/// Deterministic file-to-parts splitter
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    max_part_size: u64,
}

impl Splitter {
    /// Create a splitter producing parts of at most `max_part_size` bytes
    ///
    /// # Errors
    ///
    /// [`PostError::InvalidSize`] when `max_part_size` is zero.
    pub fn new(max_part_size: u64) -> Result<Self> {
        if max_part_size == 0 {
            return Err(PostError::InvalidSize(max_part_size as i64));
        }
        Ok(Self { max_part_size })
    }

    /// Split `source` into numbered part files under `dest_dir`
    ///
    /// Part `i` (1-based) holds bytes `[(i-1)*mps, min(i*mps, size))`. With
    /// exactly one part the original file name is kept; otherwise parts are
    /// named `<stem>.partNN<.ext>`. When the single-part destination is the
    /// source itself (re-splitting an artifact already sitting in
    /// `dest_dir`) nothing is copied, only hashed.
    pub fn split_file(&self, source: &Path, dest_dir: &Path) -> Result<Vec<FilePart>> {
        let metadata = std::fs::metadata(source)?;
        let file_size = metadata.len();
        let base_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PostError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "source has no file name",
                ))
            })?
            .to_string();

        let total_parts = file_size.div_ceil(self.max_part_size).max(1) as u32;
        debug!(
            file = %source.display(),
            size = file_size,
            parts = total_parts,
            "Splitting file"
        );

        let mut input = File::open(source)?;
        let mut parts = Vec::with_capacity(total_parts as usize);
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

        for ordinal in 1..=total_parts {
            let part_name = part_file_name(&base_name, ordinal, total_parts);
            let part_path = dest_dir.join(&part_name);
            let part_len = if ordinal == total_parts {
                file_size - u64::from(ordinal - 1) * self.max_part_size
            } else {
                self.max_part_size
            };

            let in_place = part_path == source;
            let mut output = if in_place { None } else { Some(File::create(&part_path)?) };
            let mut hasher = Sha256::new();
            let mut remaining = part_len;

            while remaining > 0 {
                let want = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
                let n = input.read(&mut buffer[..want])?;
                if n == 0 {
                    return Err(PostError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "source file shrank while splitting",
                    )));
                }
                hasher.update(&buffer[..n]);
                if let Some(out) = output.as_mut() {
                    out.write_all(&buffer[..n])?;
                }
                remaining -= n as u64;
            }

            if let Some(mut out) = output.take() {
                out.flush()?;
            }

            parts.push(FilePart {
                ordinal,
                file_name: base_name.clone(),
                len: part_len,
                path: part_path,
                sha256: hex_digest(&hasher.finalize()),
            });
        }

        Ok(parts)
    }

    /// Remove part files created by [`split_file`](Self::split_file)
    ///
    /// The source file is never touched. Removal failures are logged and
    /// skipped; cleanup is best-effort.
    pub fn cleanup(&self, parts: &[FilePart]) {
        for part in parts {
            if let Err(e) = std::fs::remove_file(&part.path) {
                warn!(path = %part.path.display(), "Failed to remove part file: {}", e);
            }
        }
    }
}

/// Part file name: `<stem>.partNN<.ext>`, original name for a single part
fn part_file_name(original: &str, part: u32, total_parts: u32) -> String {
    if total_parts <= 1 {
        return original.to_string();
    }

    match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{}.part{:02}.{}", stem, part, ext)
        }
        _ => format!("{}.part{:02}", original, part),
    }
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// SHA-256 a file on disk, streaming
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_invalid_part_size() {
        assert!(matches!(Splitter::new(0), Err(PostError::InvalidSize(0))));
    }

    #[test]
    fn test_part_file_name() {
        assert_eq!(part_file_name("archive.rar", 1, 1), "archive.rar");
        assert_eq!(part_file_name("archive.rar", 3, 12), "archive.part03.rar");
        assert_eq!(part_file_name("archive.tar.gz", 1, 2), "archive.tar.part01.gz");
        assert_eq!(part_file_name("noext", 2, 2), "noext.part02");
        assert_eq!(part_file_name(".hidden", 1, 2), ".hidden.part01");
    }

    #[test]
    fn test_part_numbers_grow_past_two_digits() {
        assert_eq!(part_file_name("a.bin", 101, 150), "a.part101.bin");
    }

    #[test]
    fn test_split_sizes_and_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.bin");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &data).unwrap();

        let splitter = Splitter::new(1024).unwrap();
        let parts = splitter.split_file(&source, dir.path()).unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len, 1024);
        assert_eq!(parts[1].len, 1024);
        assert_eq!(parts[2].len, 452);
        assert_eq!(parts.iter().map(|p| p.len).sum::<u64>(), 2500);

        let mut rejoined = Vec::new();
        for part in &parts {
            rejoined.extend_from_slice(&fs::read(&part.path).unwrap());
        }
        assert_eq!(rejoined, data);

        // Source still intact
        assert_eq!(fs::read(&source).unwrap(), data);
    }

    #[test]
    fn test_split_exact_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.bin");
        fs::write(&source, vec![7u8; 2048]).unwrap();

        let splitter = Splitter::new(1024).unwrap();
        let parts = splitter.split_file(&source, dir.path()).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len, 1024);
        assert_eq!(parts[1].len, 1024);
        assert!(parts[0].path.ends_with("data.part01.bin"));
        assert!(parts[1].path.ends_with("data.part02.bin"));
    }

    #[test]
    fn test_single_part_keeps_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir(&src_dir).unwrap();
        let source = src_dir.join("small.txt");
        fs::write(&source, b"hello world").unwrap();

        let splitter = Splitter::new(1_000_000).unwrap();
        let parts = splitter.split_file(&source, dir.path()).unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len, 11);
        assert!(parts[0].path.ends_with("small.txt"));
        assert_eq!(fs::read(&parts[0].path).unwrap(), b"hello world");
    }

    #[test]
    fn test_single_part_in_place_is_not_truncated() {
        // Re-splitting an artifact already in the destination directory
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("artifact.par2");
        fs::write(&source, vec![3u8; 4096]).unwrap();

        let splitter = Splitter::new(1_000_000).unwrap();
        let parts = splitter.split_file(&source, dir.path()).unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].path, source);
        assert_eq!(fs::read(&source).unwrap().len(), 4096);
    }

    #[test]
    fn test_sha256_matches_rehash() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.bin");
        fs::write(&source, vec![9u8; 3000]).unwrap();

        let splitter = Splitter::new(1024).unwrap();
        let parts = splitter.split_file(&source, dir.path()).unwrap();

        for part in &parts {
            assert_eq!(part.sha256, sha256_file(&part.path).unwrap());
        }
    }

    #[test]
    fn test_sha256_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("abc.txt");
        fs::write(&source, b"abc").unwrap();
        assert_eq!(
            sha256_file(&source).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_cleanup_removes_parts_not_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.bin");
        fs::write(&source, vec![1u8; 2048]).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let splitter = Splitter::new(1024).unwrap();
        let parts = splitter.split_file(&source, &out).unwrap();
        assert_eq!(parts.len(), 2);

        splitter.cleanup(&parts);
        for part in &parts {
            assert!(!part.path.exists());
        }
        assert!(source.exists());
    }
}
