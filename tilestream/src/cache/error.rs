//! Cache error types.

use thiserror::Error;

/// Errors raised by the disk tier.
///
/// The memory tier cannot fail; every variant here concerns persisted
/// entries.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while reading, writing, or scanning the cache directory.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile could not be encoded for storage.
    #[error("Failed to encode tile: {0}")]
    Encode(String),

    /// The entry is larger than the whole tier budget.
    #[error("Entry too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },
}

impl From<image::ImageError> for CacheError {
    fn from(e: image::ImageError) -> Self {
        CacheError::Encode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::TooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "Entry too large: 10 bytes (max: 5)");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CacheError = io.into();
        assert!(err.to_string().contains("denied"));
    }
}
