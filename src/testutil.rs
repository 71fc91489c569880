// testutil.rs
//!
//! Synthetic bzImage builder for unit tests.

use crate::layout;

/// Builds a minimal image buffer whose setup header reads as a given
/// protocol revision. Field setters write straight at the published
/// offsets so tests stay independent of the parser under test.
pub struct TestImage {
    pub version: u16,
    pub setup_sects: u8,
    pub relocatable: bool,
    pub alignment: u32,
    pub pref_address: u64,
    pub code32_start: u32,
    pub len: usize,
}

impl TestImage {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            setup_sects: 4,
            relocatable: false,
            alignment: 0,
            pref_address: 0,
            code32_start: 0x10_0000,
            len: 0x2000,
        }
    }

    pub fn relocatable(mut self, alignment: u32) -> Self {
        self.relocatable = true;
        self.alignment = alignment;
        self
    }

    pub fn pref_address(mut self, addr: u64) -> Self {
        self.pref_address = addr;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; self.len];
        image[0x1f1] = self.setup_sects;
        image[0x1fe..0x200].copy_from_slice(&layout::BOOT_FLAG.to_le_bytes());
        image[0x202..0x206].copy_from_slice(&layout::HDRS_MAGIC.to_le_bytes());
        image[0x206..0x208].copy_from_slice(&self.version.to_le_bytes());
        image[0x211] = layout::LOADED_HIGH;
        image[0x214..0x218].copy_from_slice(&self.code32_start.to_le_bytes());
        image[0x230..0x234].copy_from_slice(&self.alignment.to_le_bytes());
        image[0x234] = self.relocatable as u8;
        image[0x258..0x260].copy_from_slice(&self.pref_address.to_le_bytes());
        image
    }
}
