//! Human-readable size parsing.
//!
//! Sizes are written as a plain byte count (`"1024"`) or an integer followed
//! by one of the binary suffixes `KB`, `MB` or `GB` (`"10MB"`, `"500 kb"`).
//!
//! ```
//! use dirarchive::size::parse_size;
//!
//! assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
//! assert_eq!(parse_size("").unwrap(), 0);
//! ```

/// Errors produced while parsing a size string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeError {
    /// The numeric part is not a valid non-negative integer.
    #[error("invalid size format '{input}': expected a number optionally followed by KB, MB or GB")]
    InvalidSizeFormat { input: String },
    /// The size does not fit in 64 bits.
    #[error("size '{input}' is too large")]
    Overflow { input: String },
}

const SUFFIXES: [(&str, u64); 3] = [
    ("KB", 1024),
    ("MB", 1024 * 1024),
    ("GB", 1024 * 1024 * 1024),
];

/// Parses a size string into a byte count.
///
/// Empty input yields `0`, which callers treat as "no limit".
///
/// # Errors
///
/// Returns [`SizeError::InvalidSizeFormat`] when the text left after removing
/// a known suffix is not an integer, and [`SizeError::Overflow`] when the
/// resulting byte count exceeds `u64::MAX`.
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let normalized = input.trim().to_uppercase();
    if normalized.is_empty() {
        return Ok(0);
    }

    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            normalized
                .strip_suffix(*suffix)
                .map(|rest| (rest.trim(), *multiplier))
        })
        .unwrap_or((normalized.as_str(), 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| SizeError::InvalidSizeFormat {
            input: input.to_string(),
        })?;

    value.checked_mul(multiplier).ok_or_else(|| SizeError::Overflow {
        input: input.to_string(),
    })
}
