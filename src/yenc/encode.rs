//! yEnc encoding

use crate::error::{PostError, Result};
use crc32fast::Hasher;

/// Bytes that must always be escaped in the encoded stream
fn is_critical_byte(byte: u8) -> bool {
    matches!(
        byte,
        0x00 |  // NUL
        0x09 |  // TAB
        0x0A |  // LF
        0x0D |  // CR
        0x3D // '='
    )
}

/// Encode binary data to yEnc format
///
/// # Arguments
/// * `data` - payload for one article
/// * `filename` - original filename for the `name=` field
/// * `part` - 1-based part ordinal of the owning file part
/// * `total` - total number of file parts; `part=`/`total=` fields are only
///   emitted when this is greater than 1
/// * `line_length` - encoded line width (default 128, max 997)
///
/// # Returns
/// The complete ASCII block: `=ybegin` header, CRLF-terminated data lines of
/// exactly `line_length` bytes (final line may be shorter), and the `=yend`
/// trailer carrying the uppercase CRC32 of the raw input.
///
/// The line split happens after escaping, so an escape pair may straddle a
/// line boundary; the decoder treats the content as a continuous stream.
pub fn encode(
    data: &[u8],
    filename: &str,
    part: u32,
    total: u32,
    line_length: usize,
) -> Result<Vec<u8>> {
    if line_length == 0 || line_length > 997 {
        return Err(PostError::InvalidConfig(format!(
            "invalid yEnc line length: {} (must be 1-997)",
            line_length
        )));
    }

    let mut output = Vec::with_capacity(data.len() + data.len() / 32 + 128);

    if total > 1 {
        output.extend_from_slice(
            format!(
                "=ybegin part={} total={} line={} size={} name={}\r\n",
                part,
                total,
                line_length,
                data.len(),
                filename
            )
            .as_bytes(),
        );
    } else {
        output.extend_from_slice(
            format!(
                "=ybegin line={} size={} name={}\r\n",
                line_length,
                data.len(),
                filename
            )
            .as_bytes(),
        );
    }

    // Escape pass over the whole payload, then fixed-width line split
    let mut encoded = Vec::with_capacity(data.len() + data.len() / 32);
    for &byte in data {
        let c = byte.wrapping_add(42);
        if is_critical_byte(c) {
            encoded.push(b'=');
            encoded.push(c.wrapping_add(64));
        } else {
            encoded.push(c);
        }
    }

    for line in encoded.chunks(line_length) {
        output.extend_from_slice(line);
        output.extend_from_slice(b"\r\n");
    }

    let mut hasher = Hasher::new();
    hasher.update(data);
    let crc32 = hasher.finalize();

    output.extend_from_slice(
        format!("=yend size={} crc32={:08X}\r\n", data.len(), crc32).as_bytes(),
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yenc::decode::decode;

    #[test]
    fn test_encode_simple() {
        let data = b"Test";
        let encoded = encode(data, "test.txt", 1, 1, 128).unwrap();

        assert!(encoded.starts_with(b"=ybegin line=128 size=4 name=test.txt\r\n"));

        let encoded_str = String::from_utf8_lossy(&encoded);
        assert!(encoded_str.contains("=yend size=4 crc32="));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn test_single_part_header_omits_part_fields() {
        let encoded = encode(b"abc", "a.bin", 1, 1, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(!text.contains("part="));
        assert!(!text.contains("total="));
    }

    #[test]
    fn test_multipart_header() {
        let encoded = encode(b"abc", "a.bin", 2, 5, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.starts_with("=ybegin part=2 total=5 line=128 size=3 name=a.bin\r\n"));
    }

    #[test]
    fn test_zero_byte_encodes_to_asterisk() {
        // 0x00 + 42 = 0x2A = '*'
        let encoded = encode(&[0u8], "z.bin", 1, 1, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        let body_line = text.lines().nth(1).unwrap();
        assert_eq!(body_line, "*");
    }

    #[test]
    fn test_crc32_of_hello_world() {
        let encoded = encode(b"hello world", "hello.txt", 1, 1, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("=yend size=11 crc32=0D4A1185"));
    }

    #[test]
    fn test_crc32_of_512_zero_bytes() {
        let encoded = encode(&[0u8; 512], "zeros.bin", 1, 1, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("crc32=AD5D8AC3"));
    }

    #[test]
    fn test_line_lengths_are_exact() {
        // 1000 bytes of 0x41 encode without escapes to 1000 bytes: lines of
        // 128 plus a shorter final line
        let data = vec![0x41u8; 1000];
        let encoded = encode(&data, "a.bin", 1, 1, 128).unwrap();
        let text = String::from_utf8_lossy(&encoded);

        let content_lines: Vec<&str> = text
            .lines()
            .filter(|l| !l.starts_with("=ybegin") && !l.starts_with("=yend"))
            .collect();
        assert_eq!(content_lines.len(), 8);
        for line in &content_lines[..7] {
            assert_eq!(line.len(), 128);
        }
        assert_eq!(content_lines[7].len(), 1000 - 7 * 128);
    }

    #[test]
    fn test_escape_bytes_are_valid() {
        // Every '=' in the unsplit encoded stream must be followed by one of
        // the five escape values
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let encoded = encode(&data, "all.bin", 1, 1, 997).unwrap();

        // Strip header/trailer lines, rejoin content without CRLF
        let text: Vec<&[u8]> = encoded
            .split(|&b| b == b'\n')
            .filter(|l| !l.starts_with(b"=ybegin") && !l.starts_with(b"=yend"))
            .collect();
        let mut stream = Vec::new();
        for line in text {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            stream.extend_from_slice(line);
        }

        let mut i = 0;
        while i < stream.len() {
            if stream[i] == 0x3D {
                assert!(i + 1 < stream.len(), "dangling escape at end of stream");
                assert!(
                    matches!(stream[i + 1], 0x40 | 0x49 | 0x4A | 0x4D | 0x7D),
                    "invalid escape byte {:#04x}",
                    stream[i + 1]
                );
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn test_encode_invalid_line_length() {
        assert!(encode(b"test", "t.bin", 1, 1, 0).is_err());
        assert!(encode(b"test", "t.bin", 1, 1, 1000).is_err());
    }

    #[test]
    fn test_encode_empty() {
        let encoded = encode(b"", "empty.bin", 1, 1, 128).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.data.len(), 0);
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let data: Vec<u8> = (0..=255).collect();
        let encoded = encode(&data, "allbytes.bin", 1, 1, 128).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn test_round_trip_escape_pair_straddles_line_boundary() {
        // Byte 0xD3 encodes to 0xFD... no; craft data so an escape lands at
        // the split point: 127 plain bytes then one byte that needs escaping
        let mut data = vec![0x41u8; 127];
        data.push(0xD6); // 0xD6 + 42 = 0x00, escaped to "=@"
        data.extend_from_slice(&[0x42u8; 64]);

        let encoded = encode(&data, "straddle.bin", 1, 1, 128).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn test_round_trip_random_patterns() {
        let patterns: Vec<Vec<u8>> = vec![
            b"Hello, World!".to_vec(),
            b"\x00\x01\x02\x03\x04\x05".to_vec(),
            b"Line\nBreak\rTest\r\n".to_vec(),
            b"Equals=Sign=Test".to_vec(),
            vec![0xDE, 0xAD, 0xBE, 0xEF],
            (0..255).collect(),
            vec![0xD6; 1024], // every byte escaped
        ];

        for data in patterns {
            let encoded = encode(&data, "test.bin", 1, 1, 128).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded.data, data, "round-trip failed for {:?}", &data[..data.len().min(8)]);
        }
    }

    #[test]
    fn test_is_critical_byte() {
        assert!(is_critical_byte(0x00));
        assert!(is_critical_byte(0x09));
        assert!(is_critical_byte(0x0A));
        assert!(is_critical_byte(0x0D));
        assert!(is_critical_byte(0x3D));

        assert!(!is_critical_byte(0x20));
        assert!(!is_critical_byte(b'A'));
    }
}
