/// Longest accepted logical name, in characters.
pub const MAX_NAME_LEN: usize = 512;

/// Result of validating a logical file name.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    /// Name is empty or whitespace-only.
    Empty,
    /// Name is longer than [`MAX_NAME_LEN`].
    TooLong,
    /// Name contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Name is `.` or `..`.
    PathTraversal,
    /// Name contains null bytes.
    NullByte,
    /// Name contains control characters (CR, LF, etc.).
    ControlCharacter,
}

impl FilenameError {
    /// Returns a human-readable error message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "File name cannot be empty",
            Self::TooLong => "File name exceeds maximum length of 512 characters",
            Self::ContainsPathSeparator => "Invalid file name: path separators are not allowed",
            Self::PathTraversal => "Invalid file name: '.' and '..' are not allowed",
            Self::NullByte => "Invalid file name: null bytes are not allowed",
            Self::ControlCharacter => "Invalid file name: control characters are not allowed",
        }
    }
}

/// Validates a logical file name.
///
/// Names live in a flat per-owner namespace, so they carry no directory
/// components. They are stored exactly as given; nothing is trimmed.
pub fn validate_logical_name(name: &str) -> Result<&str, FilenameError> {
    if name.trim().is_empty() {
        return Err(FilenameError::Empty);
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(FilenameError::TooLong);
    }

    if name.contains('\0') {
        return Err(FilenameError::NullByte);
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }

    if name.contains('/') || name.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if name == "." || name == ".." {
        return Err(FilenameError::PathTraversal);
    }

    Ok(name)
}
