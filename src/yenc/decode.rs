//! yEnc decoding

use crate::error::{PostError, Result};
use crate::yenc::types::{YencDecoded, YencEnd, YencHeader};
use crc32fast::Hasher;

/// Decode a yEnc block
///
/// Locates the first `=ybegin` line and the first subsequent `=yend` line,
/// then decodes the content lines between them as one continuous stream:
/// escape pairs split across a line boundary (the encoder's fixed-width line
/// split can do that) decode correctly. CR LF and bare LF terminators are
/// both tolerated.
///
/// # Errors
///
/// - [`PostError::MalformedArticle`] - missing framing, or the content ends
///   with a lone `=`
/// - [`PostError::ChecksumMismatch`] - trailer carries a CRC32 that does not
///   match the decoded data
pub fn decode(input: &[u8]) -> Result<YencDecoded> {
    let lines: Vec<&[u8]> = split_lines(input);

    let begin_idx = lines
        .iter()
        .position(|line| line.starts_with(b"=ybegin "))
        .ok_or_else(|| PostError::MalformedArticle("missing =ybegin header".to_string()))?;

    let end_idx = lines
        .iter()
        .enumerate()
        .skip(begin_idx + 1)
        .find(|(_, line)| line.starts_with(b"=yend"))
        .map(|(i, _)| i)
        .ok_or_else(|| PostError::MalformedArticle("missing =yend trailer".to_string()))?;

    let header = parse_ybegin(as_ascii(lines[begin_idx])?)?;
    let trailer = parse_yend(as_ascii(lines[end_idx])?)?;

    let mut data = Vec::with_capacity(trailer.size as usize);
    let mut escape = false;

    for line in &lines[begin_idx + 1..end_idx] {
        for &byte in *line {
            if escape {
                data.push(byte.wrapping_sub(64).wrapping_sub(42));
                escape = false;
            } else if byte == b'=' {
                escape = true;
            } else {
                data.push(byte.wrapping_sub(42));
            }
        }
    }

    if escape {
        return Err(PostError::MalformedArticle(
            "content ends with a lone escape byte".to_string(),
        ));
    }

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let calculated_crc32 = hasher.finalize();

    if let Some(expected) = trailer.crc32 {
        if expected != calculated_crc32 {
            return Err(PostError::ChecksumMismatch(format!(
                "yEnc trailer says {:08X}, decoded data is {:08X}",
                expected, calculated_crc32
            )));
        }
    }

    Ok(YencDecoded {
        header,
        trailer,
        data,
        calculated_crc32,
    })
}

/// Split on LF, stripping the optional trailing CR from each line
fn split_lines(input: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &byte) in input.iter().enumerate() {
        if byte == b'\n' {
            let line = &input[start..i];
            lines.push(line.strip_suffix(b"\r").unwrap_or(line));
            start = i + 1;
        }
    }
    if start < input.len() {
        let line = &input[start..];
        lines.push(line.strip_suffix(b"\r").unwrap_or(line));
    }
    lines
}

fn as_ascii(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line)
        .map_err(|_| PostError::MalformedArticle("non-ASCII framing line".to_string()))
}

/// Parse `=ybegin [part=P total=T] line=L size=S name=F`
fn parse_ybegin(line: &str) -> Result<YencHeader> {
    let mut part = None;
    let mut total = None;
    let mut line_length = None;
    let mut size = None;
    let mut name = None;

    let rest = line
        .strip_prefix("=ybegin ")
        .ok_or_else(|| PostError::MalformedArticle("bad =ybegin line".to_string()))?;

    // name= is last and may contain spaces, so split it off first
    let (params, name_value) = match rest.split_once("name=") {
        Some((params, value)) => (params, Some(value.trim_end())),
        None => (rest, None),
    };
    if let Some(value) = name_value {
        name = Some(value.to_string());
    }

    for token in params.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "part" => part = value.parse().ok(),
            "total" => total = value.parse().ok(),
            "line" => line_length = value.parse().ok(),
            "size" => size = value.parse().ok(),
            _ => {}
        }
    }

    Ok(YencHeader {
        line: line_length
            .ok_or_else(|| PostError::MalformedArticle("=ybegin missing line=".to_string()))?,
        size: size
            .ok_or_else(|| PostError::MalformedArticle("=ybegin missing size=".to_string()))?,
        name: name
            .ok_or_else(|| PostError::MalformedArticle("=ybegin missing name=".to_string()))?,
        part,
        total,
    })
}

/// Parse `=yend size=S [crc32=XXXXXXXX]`
fn parse_yend(line: &str) -> Result<YencEnd> {
    let mut size = None;
    let mut crc32 = None;

    let rest = line
        .strip_prefix("=yend")
        .ok_or_else(|| PostError::MalformedArticle("bad =yend line".to_string()))?;

    for token in rest.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "size" => size = value.parse().ok(),
            "crc32" => crc32 = u32::from_str_radix(value, 16).ok(),
            _ => {}
        }
    }

    Ok(YencEnd {
        size: size
            .ok_or_else(|| PostError::MalformedArticle("=yend missing size=".to_string()))?,
        crc32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        // "Test": T(84)+42=126 '~', e(101)+42=143, s(115)+42=157, t(116)+42=158
        let mut input = Vec::new();
        input.extend_from_slice(b"=ybegin line=128 size=4 name=test.txt\r\n");
        input.extend_from_slice(&[126, 143, 157, 158]);
        input.extend_from_slice(b"\r\n");
        input.extend_from_slice(b"=yend size=4 crc32=0E7E1273\r\n");

        let result = decode(&input).unwrap();
        assert_eq!(result.data, b"Test");
        assert_eq!(result.header.name, "test.txt");
        assert_eq!(result.header.size, 4);
        assert_eq!(result.trailer.size, 4);
        assert_eq!(result.trailer.crc32, Some(0x0E7E1273));
    }

    #[test]
    fn test_decode_with_escape() {
        // 0xD6 + 42 wraps to 0x00, escaped as "=@"
        let input = b"=ybegin line=128 size=1 name=test.bin\n=@\n=yend size=1\n";
        let result = decode(input).unwrap();
        assert_eq!(result.data, b"\xd6");
    }

    #[test]
    fn test_decode_tolerates_bare_lf() {
        let input = b"=ybegin line=128 size=2 name=t\nst\n=yend size=2\n";
        let result = decode(input).unwrap();
        assert_eq!(result.data.len(), 2);
    }

    #[test]
    fn test_decode_escape_across_line_boundary() {
        // '=' ends the first content line, its partner opens the second
        let input = b"=ybegin line=4 size=3 name=x\nkk=\nJkk\n=yend size=3\n";
        let result = decode(input).unwrap();
        // 'k' = 0x6B -> 0x41 'A'; "=J" -> 0x4A - 64 - 42 = 0xE0
        assert_eq!(result.data[0], 0x41);
        assert_eq!(result.data[1], 0xE0);
        assert_eq!(result.data[2], 0x41);
    }

    #[test]
    fn test_decode_lone_trailing_escape_is_malformed() {
        let input = b"=ybegin line=128 size=1 name=x\nkk=\n=yend size=1\n";
        match decode(input) {
            Err(PostError::MalformedArticle(_)) => {}
            other => panic!("expected MalformedArticle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_missing_header() {
        assert!(matches!(
            decode(b"no framing here\n"),
            Err(PostError::MalformedArticle(_))
        ));
    }

    #[test]
    fn test_decode_missing_trailer() {
        assert!(matches!(
            decode(b"=ybegin line=128 size=1 name=x\nkk\n"),
            Err(PostError::MalformedArticle(_))
        ));
    }

    #[test]
    fn test_decode_crc_mismatch() {
        let input = b"=ybegin line=128 size=1 name=x\nk\n=yend size=1 crc32=DEADBEEF\n";
        match decode(input) {
            Err(PostError::ChecksumMismatch(_)) => {}
            other => panic!("expected ChecksumMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_multipart_header_fields() {
        let input =
            b"=ybegin part=2 total=3 line=128 size=1 name=file with spaces.rar\nk\n=yend size=1\n";
        let result = decode(input).unwrap();
        assert_eq!(result.header.part, Some(2));
        assert_eq!(result.header.total, Some(3));
        assert_eq!(result.header.name, "file with spaces.rar");
    }

    #[test]
    fn test_decode_lowercase_crc_accepted() {
        // Encoders differ in hex case; accept both
        let input = b"=ybegin line=128 size=1 name=x\nk\n=yend size=1 crc32=d3d99e8b\n";
        let result = decode(input).unwrap();
        assert_eq!(result.data, b"A");
        assert_eq!(result.trailer.crc32, Some(0xD3D99E8B));
    }
}
