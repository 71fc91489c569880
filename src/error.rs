// error.rs
//!
//! Error taxonomy for the load pipeline. Every failure is detected
//! synchronously inside header/param/memmap/segment construction and
//! returned before the handoff call; nothing is silently corrected.

use std::fmt;
use std::io;

use crate::layout::{E820Type, SegmentKind};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug)]
pub enum BootError {
    /// Magic at 0x202 did not read "HdrS"; the buffer is not a bzImage.
    InvalidHeader { found: u32 },

    /// Buffer ends before the setup header does.
    InsufficientData { needed: usize, got: usize },

    /// Header protocol version predates what the param builder speaks.
    UnsupportedProtocol { version: u16, min: u16 },

    /// Command line plus terminator does not fit the zero-page buffer.
    CommandLineTooLong { len: usize, max: usize },

    /// Ramdisk address and size must be both zero or both nonzero.
    InvalidRamdisk { addr: u64, size: u64 },

    /// Merged memory map exceeds the target table capacity.
    TooManyEntries { count: usize, max: usize },

    /// Two ranges of different types claim the same physical bytes.
    OverlappingTypes {
        first: (u64, u64, E820Type),
        second: (u64, u64, E820Type),
    },

    /// Two planned segments intersect; named so the caller sees the pair.
    SegmentOverlap {
        first: (SegmentKind, u64, u64),
        second: (SegmentKind, u64, u64),
    },

    /// No candidate free range satisfies a segment's constraints.
    NoPlacement { kind: SegmentKind, size: u64 },

    /// Mutation attempted on a finalized parameter block.
    AlreadyFinalized,

    /// Byte source / range provider / handoff boundary failure.
    Io(io::Error),
}

// ============================================================================
// DISPLAY IMPLEMENTATION
// ============================================================================

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader { found } => {
                write!(f, "invalid kernel header magic: {:#010x} (not a bzImage)", found)
            }
            Self::InsufficientData { needed, got } => {
                write!(f, "image too short for setup header: need {} bytes, got {}", needed, got)
            }
            Self::UnsupportedProtocol { version, min } => write!(
                f,
                "boot protocol {}.{:02} unsupported (minimum {}.{:02})",
                version >> 8,
                version & 0xff,
                min >> 8,
                min & 0xff
            ),
            Self::CommandLineTooLong { len, max } => {
                write!(f, "command line of {} bytes exceeds buffer capacity {}", len, max)
            }
            Self::InvalidRamdisk { addr, size } => write!(
                f,
                "ramdisk address {:#x} and size {:#x} must be both zero or both nonzero",
                addr, size
            ),
            Self::TooManyEntries { count, max } => {
                write!(f, "memory map has {} entries, table holds {}", count, max)
            }
            Self::OverlappingTypes { first, second } => write!(
                f,
                "memory ranges of different types overlap: {} [{:#x}, {:#x}) vs {} [{:#x}, {:#x})",
                first.2.name(),
                first.0,
                first.0.saturating_add(first.1),
                second.2.name(),
                second.0,
                second.0.saturating_add(second.1)
            ),
            Self::SegmentOverlap { first, second } => write!(
                f,
                "segment overlap: {} [{:#x}, {:#x}) intersects {} [{:#x}, {:#x})",
                first.0.name(),
                first.1,
                first.2,
                second.0.name(),
                second.1,
                second.2
            ),
            Self::NoPlacement { kind, size } => {
                write!(f, "no admissible placement for {} segment of {:#x} bytes", kind.name(), size)
            }
            Self::AlreadyFinalized => {
                write!(f, "boot parameter block is finalized and immutable")
            }
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BootError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// ============================================================================
// RESULT ALIAS
// ============================================================================

pub type BootResult<T> = Result<T, BootError>;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BootError::InvalidHeader { found: 0xdeadbeef };
        assert_eq!(
            err.to_string(),
            "invalid kernel header magic: 0xdeadbeef (not a bzImage)"
        );

        let err = BootError::UnsupportedProtocol { version: 0x01f0, min: 0x0200 };
        assert_eq!(err.to_string(), "boot protocol 1.240 unsupported (minimum 2.00)");
    }

    #[test]
    fn test_overlap_display_names_pair() {
        let err = BootError::SegmentOverlap {
            first: (SegmentKind::Kernel, 0x100, 0x10a),
            second: (SegmentKind::Ramdisk, 0x105, 0x10f),
        };
        let text = err.to_string();
        assert!(text.contains("kernel"));
        assert!(text.contains("ramdisk"));
        assert!(text.contains("0x105"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BootError = io_err.into();
        assert!(matches!(err, BootError::Io(_)));
    }
}
