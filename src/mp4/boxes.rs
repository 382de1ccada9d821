use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' }).collect()
    }

    /// Box types this walker accepts: lowercase letters, digits and space.
    pub fn is_valid_type(&self) -> bool {
        self.0.iter().all(|&c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b' ')
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub start: u64,         // file offset of header start
    pub size: u64,          // total size including header, resolved when the stored size is 0
    pub typ: FourCC,
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,   // 8, 16, 24 or 32
}

impl BoxHeader {
    pub fn data_offset(&self) -> u64 {
        self.start + self.header_size
    }

    pub fn data_len(&self) -> u64 {
        self.size - self.header_size
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}
