//! SFV checksum file generation
//!
//! One line per input file: `<basename> <CRC32>` with the CRC in uppercase
//! hex, IEEE polynomial, computed over the file contents.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tracing::debug;

use crate::error::Result;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// SFV checksum file generator
#[derive(Debug, Clone)]
pub struct SfvGenerator {
    output_dir: PathBuf,
}

impl SfvGenerator {
    /// Create a generator writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `<file_name>` listing the CRC32 of every path in `paths`
    pub fn create_sfv(&self, paths: &[PathBuf], file_name: &str) -> Result<PathBuf> {
        let mut contents = String::new();

        for path in paths {
            let crc = crc32_file(path)?;
            let base = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            contents.push_str(&format!("{} {:08X}\n", base, crc));
        }

        let out_path = self.output_dir.join(file_name);
        std::fs::write(&out_path, contents)?;
        debug!(path = %out_path.display(), files = paths.len(), "Wrote SFV file");
        Ok(out_path)
    }
}

/// IEEE CRC32 of a file, streaming
pub fn crc32_file(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}
