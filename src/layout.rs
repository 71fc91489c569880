// layout.rs
//!
//! x86 Linux boot protocol binary layout.
//! Fixed offsets, widths and magic values for the bzImage setup header and
//! the 4096-byte zero page, as published in Documentation/x86/boot.rst.
//! Everything here is encoded/decoded through explicit (offset, width)
//! fields; the wire format is never mirrored by a #[repr(C)] struct.

#![allow(dead_code)]

// ============================================================================
// MAGIC VALUES AND GLOBAL CONSTANTS
// ============================================================================

/// "HdrS", little-endian, at image offset 0x202
pub const HDRS_MAGIC: u32 = 0x5372_6448;

/// 0xAA55 boot sector flag at image offset 0x1fe
pub const BOOT_FLAG: u16 = 0xAA55;

/// Last byte of the setup header area we need to see before parsing
pub const SETUP_HEADER_END: usize = 0x268;

/// Size of one setup "sector" in the image
pub const SECTOR_SIZE: usize = 512;

/// setup_sects value assumed when the image reports 0 (pre-2.04 quirk)
pub const DEFAULT_SETUP_SECTS: u8 = 4;

/// Lowest protocol version apply_header accepts
pub const MIN_PROTOCOL: u16 = 0x0200;

/// Protocol revision that introduced the unified cmd_line_ptr field
pub const CMDLINE_PTR_PROTOCOL: u16 = 0x0202;

/// Conventional protected-mode load address and placement floor
pub const KERNEL_START: u64 = 0x10_0000;

/// initrd_addr_max assumed for headers older than 2.03
pub const DEFAULT_INITRD_ADDR_MAX: u32 = 0x37FF_FFFF;

/// kernel_alignment assumed when a relocatable header declares 0
pub const DEFAULT_KERNEL_ALIGN: u64 = 0x10_0000;

pub const PAGE_SIZE: u64 = 0x1000;

// ============================================================================
// ZERO PAGE GEOMETRY
// ============================================================================

/// The boot parameter block is exactly one page.
pub const BOOT_PARAMS_SIZE: usize = 4096;

/// Command-line buffer embedded in the zero page: offset and total
/// capacity including the NUL terminator.
pub const CMDLINE_OFFSET: usize = 0x800;
pub const CMDLINE_CAPACITY: usize = 256;

/// E820 table: offset, per-entry width, and the two table capacities.
/// The legacy table ends at 0x550 (32 entries); the extended layout lets
/// the table run to 128 entries.
pub const E820_TABLE_OFFSET: usize = 0x2d0;
pub const E820_ENTRY_SIZE: usize = 20;
pub const E820_MAX_LEGACY: usize = 32;
pub const E820_MAX: usize = 128;
pub const E820_COUNT_OFFSET: usize = 0x1e8;

/// Legacy command-line pointer pair, pre-2.02 protocol. The published
/// protocol puts CL_MAGIC = 0xA33F at 0x020; one historical reference
/// misquotes the magic as 0x7ff, the protocol document wins.
pub const CL_MAGIC_OFFSET: usize = 0x020;
pub const CL_MAGIC: u16 = 0xA33F;
pub const CL_OFFSET_OFFSET: usize = 0x022;

/// 64-bit extension words for ramdisk and cmdline addresses.
pub const BP_EXT_RAMDISK_IMAGE: usize = 0x0c0;
pub const BP_EXT_RAMDISK_SIZE: usize = 0x0c4;
pub const BP_EXT_CMD_LINE_PTR: usize = 0x0c8;

/// Setup-header mirror inside the zero page. The next kernel reads its
/// boot information from these, not from the image it came from.
pub const BP_SIGNATURE: usize = 0x202;
pub const BP_VERSION: usize = 0x206;
pub const BP_TYPE_OF_LOADER: usize = 0x210;
pub const BP_LOADFLAGS: usize = 0x211;
pub const BP_KERNEL_START: usize = 0x214;
pub const BP_RAMDISK_IMAGE: usize = 0x218;
pub const BP_RAMDISK_SIZE: usize = 0x21c;
pub const BP_CMD_LINE_PTR: usize = 0x228;
pub const BP_INITRD_ADDR_MAX: usize = 0x22c;
pub const BP_KERNEL_ALIGNMENT: usize = 0x230;
pub const BP_RELOCATABLE: usize = 0x234;
pub const BP_XLOADFLAGS: usize = 0x236;

// ============================================================================
// VERSION-GATED SETUP HEADER FIELDS
// ============================================================================

/// One setup-header field: where it lives, how wide it is, and the first
/// protocol revision that defines it. All header reads go through this
/// table so version gating lives in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    pub offset: usize,
    pub width: usize,
    pub min_version: u16,
}

const fn field(offset: usize, width: usize, min_version: u16) -> HeaderField {
    HeaderField { offset, width, min_version }
}

pub const SETUP_SECTS: HeaderField = field(0x1f1, 1, 0x0200);
pub const SYSSIZE: HeaderField = field(0x1f4, 4, 0x0204);
pub const BOOT_FLAG_FIELD: HeaderField = field(0x1fe, 2, 0x0200);
pub const HEADER_MAGIC: HeaderField = field(0x202, 4, 0x0200);
pub const PROTOCOL_VERSION: HeaderField = field(0x206, 2, 0x0200);
pub const TYPE_OF_LOADER: HeaderField = field(0x210, 1, 0x0200);
pub const LOADFLAGS: HeaderField = field(0x211, 1, 0x0200);
pub const CODE32_START: HeaderField = field(0x214, 4, 0x0200);
pub const RAMDISK_IMAGE: HeaderField = field(0x218, 4, 0x0200);
pub const RAMDISK_SIZE: HeaderField = field(0x21c, 4, 0x0200);
pub const HEAP_END_PTR: HeaderField = field(0x224, 2, 0x0201);
pub const CMD_LINE_PTR: HeaderField = field(0x228, 4, 0x0202);
pub const INITRD_ADDR_MAX: HeaderField = field(0x22c, 4, 0x0203);
pub const KERNEL_ALIGNMENT: HeaderField = field(0x230, 4, 0x0205);
pub const RELOCATABLE_KERNEL: HeaderField = field(0x234, 1, 0x0205);
pub const MIN_ALIGNMENT: HeaderField = field(0x235, 1, 0x020a);
pub const XLOADFLAGS: HeaderField = field(0x236, 2, 0x0205);
pub const CMDLINE_SIZE: HeaderField = field(0x238, 4, 0x0206);
pub const PAYLOAD_OFFSET: HeaderField = field(0x248, 4, 0x0208);
pub const PAYLOAD_LENGTH: HeaderField = field(0x24c, 4, 0x0208);
pub const PREF_ADDRESS: HeaderField = field(0x258, 8, 0x020a);
pub const INIT_SIZE: HeaderField = field(0x260, 4, 0x020a);

/// loadflags bit: protected-mode kernel loads high (bzImage)
pub const LOADED_HIGH: u8 = 0x01;
/// loadflags bit: the loader set heap_end_ptr
pub const CAN_USE_HEAP: u8 = 0x80;

// ============================================================================
// TYPE TAGS
// ============================================================================

/// E820 record types as the BIOS interface defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum E820Type {
    Ram = 1,
    Reserved = 2,
    Acpi = 3,
    Nvs = 4,
}

impl E820Type {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            E820Type::Ram => "RAM",
            E820Type::Reserved => "Reserved",
            E820Type::Acpi => "ACPI",
            E820Type::Nvs => "NVS",
        }
    }
}

/// Loader identity written into type_of_loader, informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderType {
    NotSet = 0,
    LoadLin = 1,
    BootSect = 2,
    SysLinux = 3,
    EtherBoot = 4,
    Kernel = 5,
}

impl LoaderType {
    pub fn name(self) -> &'static str {
        match self {
            LoaderType::NotSet => "not set",
            LoaderType::LoadLin => "loadlin",
            LoaderType::BootSect => "bootsector",
            LoaderType::SysLinux => "syslinux",
            LoaderType::EtherBoot => "etherboot",
            LoaderType::Kernel => "kernel (kexec)",
        }
    }
}

/// Role of one planned segment in target memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Kernel,
    Ramdisk,
    Cmdline,
    Params,
}

impl SegmentKind {
    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Kernel => "kernel",
            SegmentKind::Ramdisk => "ramdisk",
            SegmentKind::Cmdline => "cmdline",
            SegmentKind::Params => "params",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_table_offsets() {
        assert_eq!(HEADER_MAGIC.offset, 0x202);
        assert_eq!(PROTOCOL_VERSION.offset, 0x206);
        assert_eq!(PREF_ADDRESS.width, 8);
        assert!(SETUP_HEADER_END > INIT_SIZE.offset + INIT_SIZE.width - 1);
    }

    #[test]
    fn test_e820_table_fits_zero_page() {
        assert_eq!(E820_TABLE_OFFSET + E820_MAX_LEGACY * E820_ENTRY_SIZE, 0x550);
        assert!(E820_TABLE_OFFSET + E820_MAX * E820_ENTRY_SIZE <= BOOT_PARAMS_SIZE);
        assert!(CMDLINE_OFFSET + CMDLINE_CAPACITY <= BOOT_PARAMS_SIZE);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(E820Type::Ram.code(), 1);
        assert_eq!(E820Type::Nvs.name(), "NVS");
        assert_eq!(LoaderType::Kernel.name(), "kernel (kexec)");
        assert_eq!(SegmentKind::Params.name(), "params");
    }
}
