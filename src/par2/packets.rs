//! PAR2 2.0 packet serialization
//!
//! Every packet is a 64-byte header (magic, length, MD5 packet hash,
//! recovery set ID, type) followed by a body padded to a multiple of four
//! bytes. The packet hash covers everything past the first 32 bytes; the
//! recovery set ID is the MD5 of the main packet body.
//!
//! Reference: [Parity Volume Set Specification 2.0](https://parchive.sourceforge.net/docs/specifications/parity-volume-spec/article-spec.html)

/// PAR2 packet magic bytes: "PAR2\0PKT"
pub const PAR2_MAGIC: &[u8; 8] = b"PAR2\0PKT";

/// PAR2 packet types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketType {
    /// Main packet
    Main,
    /// File Description packet
    FileDescription,
    /// Input File Slice Checksum packet
    Ifsc,
    /// Recovery Slice packet
    RecoverySlice,
    /// Creator packet
    Creator,
}

impl PacketType {
    /// Get the 16-byte type identifier
    pub fn to_bytes(&self) -> [u8; 16] {
        match self {
            PacketType::Main => *b"PAR 2.0\0Main\0\0\0\0",
            PacketType::FileDescription => *b"PAR 2.0\0FileDesc",
            PacketType::Ifsc => *b"PAR 2.0\0IFSC\0\0\0\0",
            PacketType::RecoverySlice => *b"PAR 2.0\0RecvSlic",
            PacketType::Creator => *b"PAR 2.0\0Creator\0",
        }
    }
}

/// Metadata of one input file in the recovery set
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File ID: MD5(hash_16k, length, name)
    pub file_id: [u8; 16],
    /// MD5 of the whole file
    pub hash: [u8; 16],
    /// MD5 of the first 16 KiB
    pub hash_16k: [u8; 16],
    /// File length in bytes
    pub length: u64,
    /// File name as posted
    pub name: String,
    /// Per-slice (MD5, CRC32) pairs over slice_size-aligned file slices,
    /// last slice zero-padded
    pub slice_checksums: Vec<([u8; 16], u32)>,
}

impl FileEntry {
    /// Compute the PAR2 file ID from the 16k hash, length and name
    pub fn compute_file_id(hash_16k: &[u8; 16], length: u64, name: &str) -> [u8; 16] {
        let mut ctx = md5::Context::new();
        ctx.consume(hash_16k);
        ctx.consume(length.to_le_bytes());
        ctx.consume(name.as_bytes());
        ctx.compute().0
    }
}

/// Serialize one packet: header + body, hash computed over set_id/type/body
pub fn write_packet(out: &mut Vec<u8>, set_id: &[u8; 16], packet_type: PacketType, body: &[u8]) {
    debug_assert_eq!(body.len() % 4, 0, "packet body must be 4-byte aligned");

    let type_bytes = packet_type.to_bytes();
    let length = (64 + body.len()) as u64;

    let mut ctx = md5::Context::new();
    ctx.consume(set_id);
    ctx.consume(type_bytes);
    ctx.consume(body);
    let hash = ctx.compute().0;

    out.extend_from_slice(PAR2_MAGIC);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&hash);
    out.extend_from_slice(set_id);
    out.extend_from_slice(&type_bytes);
    out.extend_from_slice(body);
}

/// Main packet body: slice size, recoverable file count, file IDs
///
/// The recovery set ID is defined as the MD5 of exactly these bytes.
pub fn main_packet_body(slice_size: u64, file_ids: &[[u8; 16]]) -> Vec<u8> {
    let mut body = Vec::with_capacity(12 + file_ids.len() * 16);
    body.extend_from_slice(&slice_size.to_le_bytes());
    body.extend_from_slice(&(file_ids.len() as u32).to_le_bytes());
    for id in file_ids {
        body.extend_from_slice(id);
    }
    // No non-recoverable files in a posting set
    body
}

/// File Description packet body
pub fn file_description_body(entry: &FileEntry) -> Vec<u8> {
    let mut body = Vec::with_capacity(56 + entry.name.len() + 4);
    body.extend_from_slice(&entry.file_id);
    body.extend_from_slice(&entry.hash);
    body.extend_from_slice(&entry.hash_16k);
    body.extend_from_slice(&entry.length.to_le_bytes());
    body.extend_from_slice(entry.name.as_bytes());
    while body.len() % 4 != 0 {
        body.push(0);
    }
    body
}

/// Input File Slice Checksum packet body
pub fn ifsc_body(entry: &FileEntry) -> Vec<u8> {
    let mut body = Vec::with_capacity(16 + entry.slice_checksums.len() * 20);
    body.extend_from_slice(&entry.file_id);
    for (md5, crc) in &entry.slice_checksums {
        body.extend_from_slice(md5);
        body.extend_from_slice(&crc.to_le_bytes());
    }
    body
}

/// Recovery Slice packet body: exponent + parity bytes
pub fn recovery_slice_body(exponent: u32, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + data.len());
    body.extend_from_slice(&exponent.to_le_bytes());
    body.extend_from_slice(data);
    body
}

/// Creator packet body: client identification, null-padded to 4 bytes
pub fn creator_body() -> Vec<u8> {
    let mut body = format!("ypost {}", env!("CARGO_PKG_VERSION")).into_bytes();
    while body.len() % 4 != 0 {
        body.push(0);
    }
    body
}

/// Recovery set ID: MD5 of the main packet body
pub fn compute_set_id(main_body: &[u8]) -> [u8; 16] {
    md5::compute(main_body).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_identifiers() {
        assert_eq!(&PacketType::Main.to_bytes(), b"PAR 2.0\0Main\0\0\0\0");
        assert_eq!(&PacketType::FileDescription.to_bytes(), b"PAR 2.0\0FileDesc");
        assert_eq!(&PacketType::Ifsc.to_bytes(), b"PAR 2.0\0IFSC\0\0\0\0");
        assert_eq!(&PacketType::RecoverySlice.to_bytes(), b"PAR 2.0\0RecvSlic");
        assert_eq!(&PacketType::Creator.to_bytes(), b"PAR 2.0\0Creator\0");
    }

    #[test]
    fn test_packet_layout() {
        let set_id = [7u8; 16];
        let body = vec![1, 2, 3, 4];
        let mut out = Vec::new();
        write_packet(&mut out, &set_id, PacketType::Creator, &body);

        assert_eq!(out.len(), 68);
        assert_eq!(&out[0..8], PAR2_MAGIC);
        assert_eq!(u64::from_le_bytes(out[8..16].try_into().unwrap()), 68);
        assert_eq!(&out[32..48], &set_id);
        assert_eq!(&out[48..64], b"PAR 2.0\0Creator\0");
        assert_eq!(&out[64..], &body[..]);
    }

    #[test]
    fn test_packet_hash_covers_tail() {
        let set_id = [7u8; 16];
        let body = vec![1, 2, 3, 4];
        let mut out = Vec::new();
        write_packet(&mut out, &set_id, PacketType::Creator, &body);

        let expected = md5::compute(&out[32..]).0;
        assert_eq!(&out[16..32], &expected);
    }

    #[test]
    fn test_main_packet_body_layout() {
        let ids = [[1u8; 16], [2u8; 16]];
        let body = main_packet_body(65536, &ids);

        assert_eq!(body.len(), 8 + 4 + 32);
        assert_eq!(u64::from_le_bytes(body[0..8].try_into().unwrap()), 65536);
        assert_eq!(u32::from_le_bytes(body[8..12].try_into().unwrap()), 2);
        assert_eq!(&body[12..28], &[1u8; 16]);
        assert_eq!(&body[28..44], &[2u8; 16]);
    }

    #[test]
    fn test_set_id_is_deterministic() {
        let body = main_packet_body(4096, &[[9u8; 16]]);
        assert_eq!(compute_set_id(&body), compute_set_id(&body));

        let other = main_packet_body(8192, &[[9u8; 16]]);
        assert_ne!(compute_set_id(&body), compute_set_id(&other));
    }

    #[test]
    fn test_file_description_padding() {
        let entry = FileEntry {
            file_id: [1; 16],
            hash: [2; 16],
            hash_16k: [3; 16],
            length: 100,
            name: "abc".to_string(), // 3 bytes, padded to 4
            slice_checksums: vec![],
        };
        let body = file_description_body(&entry);
        assert_eq!(body.len() % 4, 0);
        assert_eq!(body.len(), 56 + 4);
        assert_eq!(&body[56..59], b"abc");
        assert_eq!(body[59], 0);
    }

    #[test]
    fn test_file_id_changes_with_inputs() {
        let a = FileEntry::compute_file_id(&[0; 16], 100, "a.bin");
        let b = FileEntry::compute_file_id(&[0; 16], 100, "b.bin");
        let c = FileEntry::compute_file_id(&[0; 16], 101, "a.bin");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ifsc_body_layout() {
        let entry = FileEntry {
            file_id: [5; 16],
            hash: [0; 16],
            hash_16k: [0; 16],
            length: 0,
            name: String::new(),
            slice_checksums: vec![([0xAA; 16], 0x11223344), ([0xBB; 16], 0x55667788)],
        };
        let body = ifsc_body(&entry);
        assert_eq!(body.len(), 16 + 2 * 20);
        assert_eq!(&body[0..16], &[5u8; 16]);
        assert_eq!(&body[16..32], &[0xAA; 16]);
        assert_eq!(u32::from_le_bytes(body[32..36].try_into().unwrap()), 0x11223344);
    }

    #[test]
    fn test_recovery_slice_body() {
        let body = recovery_slice_body(42, &[9, 9, 9, 9]);
        assert_eq!(u32::from_le_bytes(body[0..4].try_into().unwrap()), 42);
        assert_eq!(&body[4..], &[9, 9, 9, 9]);
    }

    #[test]
    fn test_creator_body_aligned() {
        let body = creator_body();
        assert_eq!(body.len() % 4, 0);
        assert!(body.starts_with(b"ypost "));
    }
}
