use std::fmt;

/// Errors raised while decoding a module.
///
/// Every error is fatal to the current decode: the first failure is reported and the
/// decode unwinds. There is no local recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte stream violates a structural rule: bad magic/version, a section whose
    /// declared size doesn't match the bytes actually consumed, LEB128 overflow, an
    /// unknown opcode, an illegal tag byte, a truncated input, and so on.
    Malformed(String),
    /// An initialization-time inconsistency detected while cooperating with the linker:
    /// resetting a mutable imported global, resetting a global whose initializer depends
    /// on a non-constant global, an unsupported `global.get` data offset, or a type
    /// mismatch between a `global.get` initializer and the declared value type.
    Linker(String),
}

impl DecodeError {
    pub fn malformed(message: impl Into<String>) -> DecodeError {
        DecodeError::Malformed(message.into())
    }

    pub fn linker(message: impl Into<String>) -> DecodeError {
        DecodeError::Linker(message.into())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(msg) => write!(f, "malformed module: {}", msg),
            DecodeError::Linker(msg) => write!(f, "linker error: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

pub type DecodeResult<T> = Result<T, DecodeError>;
