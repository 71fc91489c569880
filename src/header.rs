// header.rs
//!
//! Header Inspector: read-only view over the setup header of a bzImage.
//! Parsing validates the "HdrS" magic; every field introduced after
//! protocol 2.00 is read through the version-gated table in layout.rs.

use crate::error::{BootError, BootResult};
use crate::layout::{self, HeaderField};

/// Immutable copy of the setup-header region of one kernel image. The
/// source buffer is not retained; the prefix is copied so the inspector
/// stays valid for the whole load without borrowing the byte source.
#[derive(Clone)]
pub struct KernelHeader {
    bytes: [u8; layout::SETUP_HEADER_END],
}

impl KernelHeader {
    /// Validates and captures the setup header of `image`.
    pub fn parse(image: &[u8]) -> BootResult<Self> {
        if image.len() < layout::SETUP_HEADER_END {
            return Err(BootError::InsufficientData {
                needed: layout::SETUP_HEADER_END,
                got: image.len(),
            });
        }

        let mut bytes = [0u8; layout::SETUP_HEADER_END];
        bytes.copy_from_slice(&image[..layout::SETUP_HEADER_END]);
        let header = Self { bytes };

        let magic = header.read_raw(layout::HEADER_MAGIC) as u32;
        if magic != layout::HDRS_MAGIC {
            return Err(BootError::InvalidHeader { found: magic });
        }

        Ok(header)
    }

    /// Whether `field` is defined for this header's protocol revision.
    /// Callers must consult this (directly or via `read`) before using
    /// any field introduced after the base protocol.
    pub fn field_valid(&self, field: HeaderField) -> bool {
        self.protocol_version() >= field.min_version
    }

    /// Version-gated read. Returns None when the header predates `field`.
    pub fn read(&self, field: HeaderField) -> Option<u64> {
        if self.field_valid(field) {
            Some(self.read_raw(field))
        } else {
            None
        }
    }

    /// Ungated little-endian read; used for the base-protocol fields and
    /// for magic/version during parsing.
    fn read_raw(&self, field: HeaderField) -> u64 {
        let mut value = 0u64;
        for (i, &byte) in self.bytes[field.offset..field.offset + field.width]
            .iter()
            .enumerate()
        {
            value |= (byte as u64) << (8 * i);
        }
        value
    }

    // ------------------------------------------------------------------
    // Typed getters
    // ------------------------------------------------------------------

    pub fn protocol_version(&self) -> u16 {
        self.read_raw(layout::PROTOCOL_VERSION) as u16
    }

    /// Setup sector count; 0 in the image means 4 by convention.
    pub fn setup_sects(&self) -> u8 {
        match self.read_raw(layout::SETUP_SECTS) as u8 {
            0 => layout::DEFAULT_SETUP_SECTS,
            n => n,
        }
    }

    /// Byte offset of the protected-mode payload within the image.
    pub fn payload_offset(&self) -> usize {
        (self.setup_sects() as usize + 1) * layout::SECTOR_SIZE
    }

    pub fn code32_start(&self) -> u32 {
        self.read_raw(layout::CODE32_START) as u32
    }

    pub fn loadflags(&self) -> u8 {
        self.read_raw(layout::LOADFLAGS) as u8
    }

    /// Whether the image may be placed at any aligned address (2.05+).
    pub fn relocatable(&self) -> bool {
        self.read(layout::RELOCATABLE_KERNEL).unwrap_or(0) != 0
    }

    /// Required placement alignment for a relocatable image.
    pub fn kernel_alignment(&self) -> u64 {
        match self.read(layout::KERNEL_ALIGNMENT) {
            Some(0) | None => layout::DEFAULT_KERNEL_ALIGN,
            Some(align) => align,
        }
    }

    /// Highest address the ramdisk may occupy. A declared 0 means the
    /// image never filled the field in; use the protocol default.
    pub fn initrd_addr_max(&self) -> u64 {
        match self.read(layout::INITRD_ADDR_MAX) {
            Some(0) | None => layout::DEFAULT_INITRD_ADDR_MAX as u64,
            Some(max) => max,
        }
    }

    /// Preferred load address for a non-relocatable image (2.10+);
    /// older fixed-address kernels load at the conventional 1 MiB.
    pub fn pref_address(&self) -> u64 {
        match self.read(layout::PREF_ADDRESS) {
            Some(0) | None => layout::KERNEL_START,
            Some(addr) => addr,
        }
    }

    /// Run-time memory footprint the kernel declares for itself (2.10+).
    pub fn init_size(&self) -> Option<u64> {
        self.read(layout::INIT_SIZE).filter(|&size| size != 0)
    }

    pub fn xloadflags(&self) -> Option<u16> {
        self.read(layout::XLOADFLAGS).map(|v| v as u16)
    }
}

impl std::fmt::Debug for KernelHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.protocol_version();
        f.debug_struct("KernelHeader")
            .field("protocol", &format_args!("{}.{:02}", version >> 8, version & 0xff))
            .field("setup_sects", &self.setup_sects())
            .field("relocatable", &self.relocatable())
            .field("kernel_alignment", &format_args!("{:#x}", self.kernel_alignment()))
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
