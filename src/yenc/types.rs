//! yEnc header and trailer types

/// yEnc header from the `=ybegin` line
#[derive(Debug, Clone, PartialEq)]
pub struct YencHeader {
    /// Line length (typically 128, max 997)
    pub line: usize,
    /// Declared size of the encoded payload in bytes
    pub size: u64,
    /// Original filename
    pub name: String,
    /// Part number (for multi-part files)
    pub part: Option<u32>,
    /// Total number of parts (for multi-part files)
    pub total: Option<u32>,
}

impl YencHeader {
    /// Check if this header describes a multi-part file
    pub fn is_multipart(&self) -> bool {
        self.part.is_some() && self.total.is_some()
    }
}

/// yEnc trailer from the `=yend` line
#[derive(Debug, Clone, PartialEq)]
pub struct YencEnd {
    /// Size of the decoded data in bytes
    pub size: u64,
    /// CRC32 of the decoded data, when the trailer carried one
    pub crc32: Option<u32>,
}

/// Complete yEnc decode result
#[derive(Debug, Clone)]
pub struct YencDecoded {
    /// Parsed header information
    pub header: YencHeader,
    /// Trailer information
    pub trailer: YencEnd,
    /// Decoded binary data
    pub data: Vec<u8>,
    /// Calculated CRC32 of the decoded data
    pub calculated_crc32: u32,
}
