// params.rs
//!
//! Boot Param Builder: assembles the 4096-byte zero page the next kernel
//! reads at entry. The block is built fresh per load, mutated through the
//! builder stages below, and becomes immutable at finalize(). All writes
//! go through the (offset, width) constants in layout.rs; the in-memory
//! representation is just the wire bytes.

use tracing::debug;

use crate::error::{BootError, BootResult};
use crate::header::KernelHeader;
use crate::layout::{self, LoaderType};
use crate::memmap::E820Entry;

// ============================================================================
// BOOT PARAMETER BLOCK
// ============================================================================

pub struct BootParams {
    buf: Box<[u8; layout::BOOT_PARAMS_SIZE]>,
    /// Protocol version captured by apply_header; governs the legacy
    /// command-line dual-write.
    protocol: u16,
    finalized: bool,
}

impl BootParams {
    /// Zero page with the mandatory signature and version preset.
    pub fn new() -> Self {
        let mut params = Self {
            buf: Box::new([0u8; layout::BOOT_PARAMS_SIZE]),
            protocol: layout::MIN_PROTOCOL,
            finalized: false,
        };
        params.write_u32(layout::BP_SIGNATURE, layout::HDRS_MAGIC);
        params.write_u16(layout::BP_VERSION, layout::MIN_PROTOCOL);
        params
    }

    /// Copies the version-gated handoff fields out of a parsed header.
    pub fn apply_header(&mut self, header: &KernelHeader) -> BootResult<()> {
        self.ensure_mutable()?;

        let version = header.protocol_version();
        if version < layout::MIN_PROTOCOL {
            return Err(BootError::UnsupportedProtocol {
                version,
                min: layout::MIN_PROTOCOL,
            });
        }
        self.protocol = version;

        self.write_u16(layout::BP_VERSION, version);
        self.write_u8(layout::BP_LOADFLAGS, header.loadflags() | layout::CAN_USE_HEAP);
        self.write_u32(layout::BP_KERNEL_START, header.code32_start());
        self.write_u32(layout::BP_INITRD_ADDR_MAX, header.initrd_addr_max() as u32);
        if let Some(align) = header.read(layout::KERNEL_ALIGNMENT) {
            self.write_u32(layout::BP_KERNEL_ALIGNMENT, align as u32);
        }
        if let Some(reloc) = header.read(layout::RELOCATABLE_KERNEL) {
            self.write_u8(layout::BP_RELOCATABLE, reloc as u8);
        }
        if let Some(xlf) = header.xloadflags() {
            self.write_u16(layout::BP_XLOADFLAGS, xlf);
        }
        self.set_loader_type(LoaderType::Kernel);

        debug!(
            protocol = format_args!("{}.{:02}", version >> 8, version & 0xff),
            "header fields applied to boot params"
        );
        Ok(())
    }

    pub fn set_loader_type(&mut self, loader: LoaderType) {
        self.write_u8(layout::BP_TYPE_OF_LOADER, loader as u8);
    }

    /// Records the kernel's placed base address. Called by the planner
    /// for relocatable kernels placed away from code32_start.
    pub fn set_kernel_start(&mut self, base: u64) -> BootResult<()> {
        self.ensure_mutable()?;
        self.write_u32(layout::BP_KERNEL_START, base as u32);
        Ok(())
    }

    /// Writes a NUL-terminated command line into the embedded buffer.
    /// The overlong case always fails; the line is never truncated.
    pub fn set_command_line(&mut self, text: &str) -> BootResult<()> {
        self.ensure_mutable()?;

        let bytes = text.as_bytes();
        if bytes.len() + 1 > layout::CMDLINE_CAPACITY {
            return Err(BootError::CommandLineTooLong {
                len: bytes.len(),
                max: layout::CMDLINE_CAPACITY,
            });
        }

        let start = layout::CMDLINE_OFFSET;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.buf[start + bytes.len()] = 0;

        // Pre-2.02 kernels find the line through the magic/offset pair
        // instead of cmd_line_ptr; dual-write for those.
        if self.protocol < layout::CMDLINE_PTR_PROTOCOL {
            self.write_u16(layout::CL_MAGIC_OFFSET, layout::CL_MAGIC);
            self.write_u16(layout::CL_OFFSET_OFFSET, layout::CMDLINE_OFFSET as u16);
        }
        Ok(())
    }

    /// Records where the zero page will sit so cmd_line_ptr can point at
    /// the embedded buffer. Called by the planner once placement is known.
    pub fn set_cmdline_ptr(&mut self, params_base: u64) -> BootResult<()> {
        self.ensure_mutable()?;
        let ptr = params_base + layout::CMDLINE_OFFSET as u64;
        self.write_u32(layout::BP_CMD_LINE_PTR, ptr as u32);
        self.write_u32(layout::BP_EXT_CMD_LINE_PTR, (ptr >> 32) as u32);
        Ok(())
    }

    pub fn set_ramdisk(&mut self, addr: u64, size: u64) -> BootResult<()> {
        self.ensure_mutable()?;
        if (addr == 0) != (size == 0) {
            return Err(BootError::InvalidRamdisk { addr, size });
        }
        self.write_u32(layout::BP_RAMDISK_IMAGE, addr as u32);
        self.write_u32(layout::BP_RAMDISK_SIZE, size as u32);
        self.write_u32(layout::BP_EXT_RAMDISK_IMAGE, (addr >> 32) as u32);
        self.write_u32(layout::BP_EXT_RAMDISK_SIZE, (size >> 32) as u32);
        Ok(())
    }

    /// Embeds the canonical memory map. The embedded command line starts
    /// at 0x800, so the table in this layout holds the legacy 32 entries.
    pub fn attach_memory_map(&mut self, entries: &[E820Entry]) -> BootResult<()> {
        self.ensure_mutable()?;
        if entries.len() > layout::E820_MAX_LEGACY {
            return Err(BootError::TooManyEntries {
                count: entries.len(),
                max: layout::E820_MAX_LEGACY,
            });
        }

        self.write_u8(layout::E820_COUNT_OFFSET, entries.len() as u8);
        for (i, entry) in entries.iter().enumerate() {
            let at = layout::E820_TABLE_OFFSET + i * layout::E820_ENTRY_SIZE;
            self.write_u64(at, entry.addr);
            self.write_u64(at + 8, entry.size);
            self.write_u32(at + 16, entry.kind.code());
        }
        Ok(())
    }

    /// Seals the block and returns the immutable snapshot the handoff
    /// trusts. Every later mutation attempt, including a second
    /// finalize, fails.
    pub fn finalize(&mut self) -> BootResult<FinalizedParams> {
        self.ensure_mutable()?;
        self.finalized = true;
        Ok(FinalizedParams { buf: self.buf.clone() })
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn ensure_mutable(&self) -> BootResult<()> {
        if self.finalized {
            return Err(BootError::AlreadyFinalized);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Readers (valid before and after finalize; used by planner and logs)
    // ------------------------------------------------------------------

    pub fn e820_count(&self) -> u8 {
        self.buf[layout::E820_COUNT_OFFSET]
    }

    pub fn cmd_line_ptr(&self) -> u64 {
        let low = self.read_u32(layout::BP_CMD_LINE_PTR) as u64;
        let high = self.read_u32(layout::BP_EXT_CMD_LINE_PTR) as u64;
        high << 32 | low
    }

    pub fn ramdisk(&self) -> (u64, u64) {
        let addr = (self.read_u32(layout::BP_EXT_RAMDISK_IMAGE) as u64) << 32
            | self.read_u32(layout::BP_RAMDISK_IMAGE) as u64;
        let size = (self.read_u32(layout::BP_EXT_RAMDISK_SIZE) as u64) << 32
            | self.read_u32(layout::BP_RAMDISK_SIZE) as u64;
        (addr, size)
    }

    pub fn command_line(&self) -> &[u8] {
        let buf = &self.buf[layout::CMDLINE_OFFSET..layout::CMDLINE_OFFSET + layout::CMDLINE_CAPACITY];
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        &buf[..len]
    }

    // ------------------------------------------------------------------
    // Little-endian primitives over the wire buffer
    // ------------------------------------------------------------------

    fn write_u8(&mut self, offset: usize, val: u8) {
        self.buf[offset] = val;
    }

    fn write_u16(&mut self, offset: usize, val: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
    }

    fn write_u32(&mut self, offset: usize, val: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }

    fn write_u64(&mut self, offset: usize, val: u64) {
        self.buf[offset..offset + 8].copy_from_slice(&val.to_le_bytes());
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.buf[offset..offset + 4].try_into().unwrap())
    }
}

impl Default for BootParams {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FINALIZED SNAPSHOT
// ============================================================================

/// Sealed zero page. Later pipeline stages trust it without
/// re-validation; only readers exist.
pub struct FinalizedParams {
    buf: Box<[u8; layout::BOOT_PARAMS_SIZE]>,
}

impl FinalizedParams {
    pub fn as_bytes(&self) -> &[u8; layout::BOOT_PARAMS_SIZE] {
        &self.buf
    }

    pub fn e820_count(&self) -> u8 {
        self.buf[layout::E820_COUNT_OFFSET]
    }

    pub fn cmd_line_ptr(&self) -> u64 {
        let low =
            u32::from_le_bytes(self.buf[layout::BP_CMD_LINE_PTR..layout::BP_CMD_LINE_PTR + 4].try_into().unwrap());
        let high = u32::from_le_bytes(
            self.buf[layout::BP_EXT_CMD_LINE_PTR..layout::BP_EXT_CMD_LINE_PTR + 4].try_into().unwrap(),
        );
        (high as u64) << 32 | low as u64
    }

    pub fn command_line(&self) -> &[u8] {
        let buf = &self.buf[layout::CMDLINE_OFFSET..layout::CMDLINE_OFFSET + layout::CMDLINE_CAPACITY];
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        &buf[..len]
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::E820Type;
    use crate::testutil::TestImage;

    fn header(version: u16) -> KernelHeader {
        KernelHeader::parse(&TestImage::new(version).build()).unwrap()
    }

    #[test]
    fn test_new_presets_signature_and_version() {
        let params = BootParams::new();
        assert_eq!(params.read_u32(layout::BP_SIGNATURE), layout::HDRS_MAGIC);
        assert_eq!(params.buf[layout::BP_VERSION], 0x00);
        assert_eq!(params.buf[layout::BP_VERSION + 1], 0x02);
    }

    #[test]
    fn test_apply_header_rejects_old_protocol() {
        let mut params = BootParams::new();
        match params.apply_header(&header(0x01f0)) {
            Err(BootError::UnsupportedProtocol { version: 0x01f0, .. }) => {}
            other => panic!("expected UnsupportedProtocol, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_header_copies_gated_fields() {
        let image = TestImage::new(0x020c).relocatable(0x20_0000).build();
        let mut params = BootParams::new();
        params.apply_header(&KernelHeader::parse(&image).unwrap()).unwrap();
        assert_eq!(params.read_u32(layout::BP_KERNEL_ALIGNMENT), 0x20_0000);
        assert_eq!(params.buf[layout::BP_RELOCATABLE], 1);
        assert_eq!(params.buf[layout::BP_TYPE_OF_LOADER], LoaderType::Kernel as u8);
    }

    #[test]
    fn test_command_line_bounds() {
        let mut params = BootParams::new();
        params.set_command_line("").unwrap();
        assert_eq!(params.command_line(), b"");

        let exact_fit = "a".repeat(layout::CMDLINE_CAPACITY - 1);
        params.set_command_line(&exact_fit).unwrap();
        assert_eq!(params.command_line().len(), layout::CMDLINE_CAPACITY - 1);

        let too_long = "a".repeat(layout::CMDLINE_CAPACITY);
        match params.set_command_line(&too_long) {
            Err(BootError::CommandLineTooLong { len, max }) => {
                assert_eq!(len, layout::CMDLINE_CAPACITY);
                assert_eq!(max, layout::CMDLINE_CAPACITY);
            }
            other => panic!("expected CommandLineTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_dual_write_below_2_02() {
        let mut params = BootParams::new();
        params.apply_header(&header(0x0201)).unwrap();
        params.set_command_line("root=/dev/ram0").unwrap();
        assert_eq!(
            u16::from_le_bytes(params.buf[0x20..0x22].try_into().unwrap()),
            layout::CL_MAGIC
        );
        assert_eq!(
            u16::from_le_bytes(params.buf[0x22..0x24].try_into().unwrap()),
            layout::CMDLINE_OFFSET as u16
        );
    }

    #[test]
    fn test_no_legacy_write_at_2_02_and_later() {
        let mut params = BootParams::new();
        params.apply_header(&header(0x020c)).unwrap();
        params.set_command_line("quiet").unwrap();
        assert_eq!(params.buf[0x20], 0);
        assert_eq!(params.buf[0x21], 0);
    }

    #[test]
    fn test_cmdline_ptr_targets_embedded_buffer() {
        let mut params = BootParams::new();
        params.set_cmdline_ptr(0x1000).unwrap();
        assert_eq!(params.cmd_line_ptr(), 0x1000 + layout::CMDLINE_OFFSET as u64);
    }

    #[test]
    fn test_ramdisk_validation() {
        let mut params = BootParams::new();
        assert!(params.set_ramdisk(0, 0).is_ok());
        assert!(params.set_ramdisk(0x200_0000, 0x10_0000).is_ok());
        assert_eq!(params.ramdisk(), (0x200_0000, 0x10_0000));
        assert!(matches!(
            params.set_ramdisk(0x200_0000, 0),
            Err(BootError::InvalidRamdisk { .. })
        ));
        assert!(matches!(
            params.set_ramdisk(0, 0x10_0000),
            Err(BootError::InvalidRamdisk { .. })
        ));
    }

    #[test]
    fn test_attach_memory_map_encodes_table() {
        let mut params = BootParams::new();
        let entries = [
            E820Entry { addr: 0, size: 0x1000_0000, kind: E820Type::Ram },
            E820Entry { addr: 0x1000_0000, size: 0x1000, kind: E820Type::Reserved },
        ];
        params.attach_memory_map(&entries).unwrap();
        assert_eq!(params.e820_count(), 2);

        let at = layout::E820_TABLE_OFFSET + layout::E820_ENTRY_SIZE;
        assert_eq!(
            u64::from_le_bytes(params.buf[at..at + 8].try_into().unwrap()),
            0x1000_0000
        );
        assert_eq!(
            u32::from_le_bytes(params.buf[at + 16..at + 20].try_into().unwrap()),
            E820Type::Reserved.code()
        );
    }

    #[test]
    fn test_attach_memory_map_caps_at_table_size() {
        let mut params = BootParams::new();
        let entries: Vec<E820Entry> = (0..layout::E820_MAX_LEGACY as u64 + 1)
            .map(|i| E820Entry { addr: i * 0x2000, size: 0x1000, kind: E820Type::Ram })
            .collect();
        assert!(matches!(
            params.attach_memory_map(&entries),
            Err(BootError::TooManyEntries { .. })
        ));
    }

    #[test]
    fn test_finalize_is_single_shot() {
        let mut params = BootParams::new();
        params.finalize().unwrap();
        assert!(params.is_finalized());
        assert!(matches!(params.finalize(), Err(BootError::AlreadyFinalized)));
        assert!(matches!(
            params.set_command_line("late"),
            Err(BootError::AlreadyFinalized)
        ));
        assert!(matches!(params.set_ramdisk(0, 0), Err(BootError::AlreadyFinalized)));
    }
}
