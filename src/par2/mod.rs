//! PAR2 recovery set generation
//!
//! Produces a PAR2 2.0 recovery set over the ordered list of file parts:
//! an index file `<base>.par2` with main, file-description, slice-checksum
//! and creator packets, plus volume files `<base>.volSSS+NN.par2` carrying
//! the Reed-Solomon recovery slices. Volume block counts double
//! (1, 1, 2, 4, 8, ...) with the last volume truncated.
//!
//! Data slices are taken from the concatenation of all parts in ordinal
//! order, the final slice zero-padded to `slice_size`.

mod encoder;
mod packets;

pub use encoder::ParityEncoder;
pub use packets::{FileEntry, PacketType, PAR2_MAGIC};

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crc32fast::Hasher as Crc32;
use tracing::{debug, info};

use crate::error::{PostError, Result};
use crate::splitter::FilePart;

/// Sources at or below this size are encoded in memory with batch-level
/// parallelism; larger sources stream slice by slice
const IN_MEMORY_THRESHOLD: u64 = 10 * 1024 * 1024;

/// First 16 KiB of a file feed the short hash in the file description
const HASH_16K: usize = 16 * 1024;

/// Recovery set: the index file plus volume files
#[derive(Debug, Clone)]
pub struct RecoverySet {
    /// Index file path (`<base>.par2`)
    pub index: PathBuf,
    /// Volume file paths in emission order
    pub volumes: Vec<PathBuf>,
    /// Slice size used for the set
    pub slice_size: usize,
    /// Number of data slices
    pub data_slices: usize,
    /// Number of recovery slices
    pub recovery_slices: usize,
}

impl RecoverySet {
    /// All files of the set, index first
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.index.clone()];
        files.extend(self.volumes.iter().cloned());
        files
    }
}

/// PAR2 recovery file generator
#[derive(Debug, Clone)]
pub struct Par2Generator {
    output_dir: PathBuf,
    redundancy: u32,
}

impl Par2Generator {
    /// Create a generator writing into `output_dir` with the given
    /// redundancy percentage
    pub fn new(output_dir: impl Into<PathBuf>, redundancy: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            redundancy,
        }
    }

    /// Build the recovery set for `parts` (in ordinal order)
    ///
    /// `base_name` is the posted file's name; it prefixes every emitted
    /// file. Returns `None` when there is no data to protect.
    ///
    /// # Errors
    ///
    /// - [`PostError::InvalidRedundancy`] - redundancy outside 1..=100
    /// - [`PostError::EncoderFailure`] - shard counts incompatible with the
    ///   GF(2^8) field
    /// - [`PostError::Io`] - reading parts or writing the set failed
    pub fn create_for_parts(
        &self,
        parts: &[FilePart],
        base_name: &str,
    ) -> Result<Option<RecoverySet>> {
        if self.redundancy == 0 || self.redundancy > 100 {
            return Err(PostError::InvalidRedundancy(self.redundancy));
        }

        let total_size: u64 = parts.iter().map(|p| p.len).sum();
        if total_size == 0 {
            return Ok(None);
        }

        let slice_size = slice_size_for(total_size);
        let data_slices = total_size.div_ceil(slice_size as u64) as usize;
        let recovery_slices =
            ((data_slices as u64 * u64::from(self.redundancy)) / 100).max(1) as usize;

        info!(
            size = total_size,
            slice_size,
            data_slices,
            recovery_slices,
            "Generating PAR2 recovery set"
        );

        let parity = self.compute_parity(parts, total_size, slice_size, recovery_slices)?;

        // Per-input-file metadata packets
        let mut entries = Vec::with_capacity(parts.len());
        for part in parts {
            entries.push(file_entry(part, slice_size)?);
        }

        let file_ids: Vec<[u8; 16]> = entries.iter().map(|e| e.file_id).collect();
        let main_body = packets::main_packet_body(slice_size as u64, &file_ids);
        let set_id = packets::compute_set_id(&main_body);

        // Index file: main + per-file metadata + creator
        let index_path = self.output_dir.join(format!("{}.par2", base_name));
        let mut index = Vec::new();
        packets::write_packet(&mut index, &set_id, PacketType::Main, &main_body);
        for entry in &entries {
            packets::write_packet(
                &mut index,
                &set_id,
                PacketType::FileDescription,
                &packets::file_description_body(entry),
            );
            packets::write_packet(
                &mut index,
                &set_id,
                PacketType::Ifsc,
                &packets::ifsc_body(entry),
            );
        }
        packets::write_packet(&mut index, &set_id, PacketType::Creator, &packets::creator_body());
        std::fs::write(&index_path, &index)?;

        // Volume files with doubling block counts
        let mut volumes = Vec::new();
        let mut start = 0usize;
        for count in volume_plan(recovery_slices) {
            let volume_path = self
                .output_dir
                .join(format!("{}.vol{:03}+{:02}.par2", base_name, start, count));

            let mut volume = Vec::new();
            for exponent in start..start + count {
                packets::write_packet(
                    &mut volume,
                    &set_id,
                    PacketType::RecoverySlice,
                    &packets::recovery_slice_body(exponent as u32, &parity[exponent]),
                );
            }
            std::fs::write(&volume_path, &volume)?;

            debug!(volume = %volume_path.display(), blocks = count, "Wrote recovery volume");
            volumes.push(volume_path);
            start += count;
        }

        Ok(Some(RecoverySet {
            index: index_path,
            volumes,
            slice_size,
            data_slices,
            recovery_slices,
        }))
    }

    fn compute_parity(
        &self,
        parts: &[FilePart],
        total_size: u64,
        slice_size: usize,
        recovery_slices: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut reader = SliceReader::new(parts, slice_size);

        if total_size <= IN_MEMORY_THRESHOLD {
            let mut slices = Vec::new();
            while let Some(slice) = reader.next_slice()? {
                slices.push(slice);
            }
            encoder::encode_parallel(slices, slice_size, recovery_slices)
        } else {
            let mut enc = ParityEncoder::new(slice_size, recovery_slices)?;
            while let Some(slice) = reader.next_slice()? {
                enc.add_slice(slice)?;
            }
            enc.finish()
        }
    }
}

/// Slice size as a deterministic function of the total source size
pub fn slice_size_for(total_size: u64) -> usize {
    match total_size {
        s if s < 1024 * 1024 => 4 * 1024,
        s if s < 100 * 1024 * 1024 => 64 * 1024,
        s if s < 1024 * 1024 * 1024 => 256 * 1024,
        _ => 512 * 1024,
    }
}

/// Blocks per volume: 1, 1, 2, 4, 8, ... until `total` is covered
fn volume_plan(total: usize) -> Vec<usize> {
    let mut plan = Vec::new();
    let mut remaining = total;
    let mut count = 1usize;
    let mut first = true;
    while remaining > 0 {
        let take = count.min(remaining);
        plan.push(take);
        remaining -= take;
        if first {
            first = false;
        } else {
            count *= 2;
        }
    }
    plan
}

/// Reads `slice_size`-byte slices off the concatenation of the parts,
/// zero-padding the final slice
struct SliceReader<'a> {
    parts: &'a [FilePart],
    index: usize,
    current: Option<File>,
    slice_size: usize,
}

impl<'a> SliceReader<'a> {
    fn new(parts: &'a [FilePart], slice_size: usize) -> Self {
        Self {
            parts,
            index: 0,
            current: None,
            slice_size,
        }
    }

    fn next_slice(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.slice_size];
        let mut filled = 0;

        while filled < self.slice_size {
            if self.current.is_none() {
                if self.index >= self.parts.len() {
                    break;
                }
                self.current = Some(File::open(&self.parts[self.index].path)?);
                self.index += 1;
            }
            let n = self
                .current
                .as_mut()
                .expect("current file present")
                .read(&mut buf[filled..])?;
            if n == 0 {
                self.current = None;
            } else {
                filled += n;
            }
        }

        if filled == 0 {
            Ok(None)
        } else {
            Ok(Some(buf))
        }
    }
}

/// Hash one part file: full MD5, 16k MD5, and per-slice checksums
fn file_entry(part: &FilePart, slice_size: usize) -> Result<FileEntry> {
    let mut file = File::open(&part.path)?;
    let mut full = md5::Context::new();
    let mut first_16k = Vec::with_capacity(HASH_16K.min(part.len as usize));
    let mut slice_checksums = Vec::new();

    let mut buf = vec![0u8; slice_size];
    loop {
        let mut filled = 0;
        while filled < slice_size {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }

        full.consume(&buf[..filled]);
        if first_16k.len() < HASH_16K {
            let want = (HASH_16K - first_16k.len()).min(filled);
            first_16k.extend_from_slice(&buf[..want]);
        }

        // Slice checksums cover the zero-padded slice
        buf[filled..].fill(0);
        let slice_md5 = md5::compute(&buf[..]).0;
        let mut crc = Crc32::new();
        crc.update(&buf[..]);
        slice_checksums.push((slice_md5, crc.finalize()));

        if filled < slice_size {
            break;
        }
    }

    let hash = full.compute().0;
    let hash_16k = md5::compute(&first_16k).0;
    let name = part
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&part.file_name)
        .to_string();
    let file_id = FileEntry::compute_file_id(&hash_16k, part.len, &name);

    Ok(FileEntry {
        file_id,
        hash,
        hash_16k,
        length: part.len,
        name,
        slice_checksums,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::Splitter;
    use std::fs;
    use std::path::Path;

    fn make_parts(dir: &Path, len: usize, part_size: u64) -> Vec<FilePart> {
        let source = dir.join("source.bin");
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        fs::write(&source, &data).unwrap();
        Splitter::new(part_size).unwrap().split_file(&source, dir).unwrap()
    }

    #[test]
    fn test_slice_size_tiers() {
        assert_eq!(slice_size_for(100), 4 * 1024);
        assert_eq!(slice_size_for(1024 * 1024 - 1), 4 * 1024);
        assert_eq!(slice_size_for(1024 * 1024), 64 * 1024);
        assert_eq!(slice_size_for(50 * 1024 * 1024), 64 * 1024);
        assert_eq!(slice_size_for(100 * 1024 * 1024), 256 * 1024);
        assert_eq!(slice_size_for(2 * 1024 * 1024 * 1024), 512 * 1024);
    }

    #[test]
    fn test_volume_plan_doubles() {
        assert_eq!(volume_plan(1), vec![1]);
        assert_eq!(volume_plan(2), vec![1, 1]);
        assert_eq!(volume_plan(5), vec![1, 1, 2, 1]);
        assert_eq!(volume_plan(80), vec![1, 1, 2, 4, 8, 16, 32, 16]);
    }

    #[test]
    fn test_recovery_counts_for_50mib_at_10_percent() {
        // 50 MiB at 10% redundancy lands on the 64 KiB slice tier
        let total: u64 = 50 * 1024 * 1024;
        let slice = slice_size_for(total);
        assert_eq!(slice, 65536);
        let k = total.div_ceil(slice as u64);
        assert_eq!(k, 800);
        let p = (k * 10 / 100).max(1);
        assert_eq!(p, 80);
        assert_eq!(volume_plan(p as usize), vec![1, 1, 2, 4, 8, 16, 32, 16]);
    }

    #[test]
    fn test_invalid_redundancy() {
        let dir = tempfile::tempdir().unwrap();
        let parts = make_parts(dir.path(), 1000, 512);

        let gen = Par2Generator::new(dir.path(), 0);
        assert!(matches!(
            gen.create_for_parts(&parts, "source.bin"),
            Err(PostError::InvalidRedundancy(0))
        ));

        let gen = Par2Generator::new(dir.path(), 101);
        assert!(gen.create_for_parts(&parts, "source.bin").is_err());
    }

    #[test]
    fn test_index_begins_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let parts = make_parts(dir.path(), 9000, 4096);

        let gen = Par2Generator::new(dir.path(), 10);
        let set = gen.create_for_parts(&parts, "source.bin").unwrap().unwrap();

        let index = fs::read(&set.index).unwrap();
        assert!(index.starts_with(PAR2_MAGIC));
        assert!(set.index.ends_with("source.bin.par2"));
    }

    #[test]
    fn test_parity_count_follows_redundancy() {
        let dir = tempfile::tempdir().unwrap();
        // 40000 bytes -> slice 4096 -> k = 10
        let parts = make_parts(dir.path(), 40000, 8192);

        let gen = Par2Generator::new(dir.path(), 25);
        let set = gen.create_for_parts(&parts, "source.bin").unwrap().unwrap();

        assert_eq!(set.data_slices, 10);
        assert_eq!(set.recovery_slices, 2); // floor(10 * 25 / 100)
        assert_eq!(set.volumes.len(), 2); // plan [1, 1]
    }

    #[test]
    fn test_minimum_one_recovery_slice() {
        let dir = tempfile::tempdir().unwrap();
        let parts = make_parts(dir.path(), 100, 512);

        let gen = Par2Generator::new(dir.path(), 1);
        let set = gen.create_for_parts(&parts, "source.bin").unwrap().unwrap();
        assert_eq!(set.recovery_slices, 1);
        assert_eq!(set.volumes.len(), 1);
    }

    #[test]
    fn test_volume_names_carry_start_and_count() {
        let dir = tempfile::tempdir().unwrap();
        // 200000 bytes -> slice 4096 -> k = 49, p at 10% = 4 -> plan [1,1,2]
        let parts = make_parts(dir.path(), 200_000, 65536);

        let gen = Par2Generator::new(dir.path(), 10);
        let set = gen.create_for_parts(&parts, "source.bin").unwrap().unwrap();

        assert_eq!(set.recovery_slices, 4);
        let names: Vec<String> = set
            .volumes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "source.bin.vol000+01.par2",
                "source.bin.vol001+01.par2",
                "source.bin.vol002+02.par2",
            ]
        );
    }

    #[test]
    fn test_volume_packets_have_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let parts = make_parts(dir.path(), 9000, 4096);

        let gen = Par2Generator::new(dir.path(), 50);
        let set = gen.create_for_parts(&parts, "source.bin").unwrap().unwrap();

        // k = 3, p = 1: one volume with one recovery packet
        assert_eq!(set.data_slices, 3);
        assert_eq!(set.recovery_slices, 1);
        let volume = fs::read(&set.volumes[0]).unwrap();
        assert!(volume.starts_with(PAR2_MAGIC));
        // header(64) + exponent(4) + slice data
        assert_eq!(volume.len(), 64 + 4 + set.slice_size);
    }

    #[test]
    fn test_empty_parts_produce_no_set() {
        let dir = tempfile::tempdir().unwrap();
        let gen = Par2Generator::new(dir.path(), 10);
        assert!(gen.create_for_parts(&[], "x").unwrap().is_none());
    }

    #[test]
    fn test_slice_reader_pads_final_slice() {
        let dir = tempfile::tempdir().unwrap();
        let parts = make_parts(dir.path(), 1000, 512);

        let mut reader = SliceReader::new(&parts, 384);
        let mut slices = Vec::new();
        while let Some(slice) = reader.next_slice().unwrap() {
            assert_eq!(slice.len(), 384);
            slices.push(slice);
        }
        // 1000 bytes in 384-byte slices: 3 slices, last padded with 152 zeros
        assert_eq!(slices.len(), 3);
        assert!(slices[2][232..].iter().all(|&b| b == 0));

        // Concatenation minus padding equals the source
        let joined: Vec<u8> = slices.concat();
        let source = fs::read(dir.path().join("source.bin")).unwrap();
        assert_eq!(&joined[..1000], &source[..]);
    }

    #[test]
    fn test_file_entry_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data = vec![0x5Au8; 5000];
        fs::write(&path, &data).unwrap();

        let part = FilePart {
            ordinal: 1,
            file_name: "data.bin".to_string(),
            len: 5000,
            path: path.clone(),
            sha256: String::new(),
        };

        let entry = file_entry(&part, 4096).unwrap();
        assert_eq!(entry.hash, md5::compute(&data).0);
        assert_eq!(entry.hash_16k, md5::compute(&data).0); // shorter than 16k
        assert_eq!(entry.length, 5000);
        assert_eq!(entry.name, "data.bin");
        assert_eq!(entry.slice_checksums.len(), 2);

        // Second slice checksum is over the zero-padded remainder
        let mut padded = vec![0x5Au8; 5000 - 4096];
        padded.resize(4096, 0);
        assert_eq!(entry.slice_checksums[1].0, md5::compute(&padded).0);
    }
}
