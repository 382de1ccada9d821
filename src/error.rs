#[derive(thiserror::Error, Debug)]
pub enum MetaError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated {what} at offset {offset}")]
    Truncated { what: &'static str, offset: u64 },
    #[error("corrupt structure: {0}")]
    Corrupt(String),
    #[error("invalid box type {typ:?} at offset {offset}")]
    InvalidBoxType { typ: String, offset: u64 },
    #[error("invalid box size {size} at offset {offset}")]
    InvalidBoxSize { size: u64, offset: u64 },
    #[error("invalid variable-size integer at offset {offset}")]
    InvalidVint { offset: u64 },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, MetaError>;

/// Bounds-checked slice of `buf[start..end]`, reporting `what` on overrun.
pub fn slice<'a>(buf: &'a [u8], start: usize, end: usize, what: &'static str) -> Result<&'a [u8]> {
    if start > end || end > buf.len() {
        return Err(MetaError::Truncated { what, offset: start as u64 });
    }
    Ok(&buf[start..end])
}
