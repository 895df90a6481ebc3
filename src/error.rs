use thiserror::Error;

/// Errors raised while decoding a KLV metadata buffer.
///
/// Every variant is recoverable: the buffer is rejected and the capture loop
/// keeps running. None of these abort the process.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// BER long-form length declared an unsupported count of length bytes.
    /// Counts of 1-4 are accepted; 0 (indefinite form) and 5+ are rejected.
    #[error("BER long-form length with {count} length bytes (1-4 supported)")]
    MalformedLength { count: u8 },

    /// The BER length field itself runs past the end of the buffer.
    #[error("length field truncated at offset {offset}: {needed} bytes declared, {available} remain")]
    TruncatedLength {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// An item's value would extend past the end of the buffer.
    #[error("value of {length} bytes at offset {offset} exceeds {available}-byte buffer")]
    TruncatedValue {
        offset: usize,
        length: u32,
        available: usize,
    },

    /// Trailing bytes too short to form a key plus length byte.
    #[error("{remaining} trailing bytes at offset {offset} cannot form a KLV item")]
    TrailingBytes { offset: usize, remaining: usize },
}

/// Kernel error taxonomy.
///
/// `PolicyDenied` is an expected, routine outcome (every capture attempt in
/// Lockdown produces one) and callers are expected to match on it rather
/// than treat it as a fault.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed KLV metadata: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("policy denied ({context}): {reason}")]
    PolicyDenied { context: String, reason: String },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("hardware control i/o: {0}")]
    HardwareIo(String),
}

impl Error {
    pub fn is_denial(&self) -> bool {
        matches!(self, Error::PolicyDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
