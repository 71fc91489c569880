// memmap.rs
//!
//! Memory Map Builder: turns host physical-range observations into the
//! canonical E820 list embedded in the zero page. Construction is a pure
//! function over the input (sort, merge, cap); identical range sets
//! always produce identical tables regardless of input order.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{BootError, BootResult};
use crate::layout::E820Type;

// ============================================================================
// TYPES
// ============================================================================

/// One observed physical range, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub base: u64,
    pub size: u64,
    pub kind: E820Type,
}

impl AddressRange {
    pub fn new(base: u64, size: u64, kind: E820Type) -> Self {
        Self { base, size, kind }
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// One canonical E820 record. Plain value type; the zero-page encoding
/// happens through the offset table in params.rs, not through layout
/// tricks here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct E820Entry {
    pub addr: u64,
    pub size: u64,
    pub kind: E820Type,
}

impl E820Entry {
    pub fn end(&self) -> u64 {
        self.addr.saturating_add(self.size)
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Builds the canonical list: ascending by base, same-type adjacent or
/// overlapping ranges merged. Overlap between ranges of *different*
/// types is ambiguous and fails with OverlappingTypes instead of being
/// silently resolved.
pub fn from_ranges(ranges: &[AddressRange]) -> BootResult<Vec<E820Entry>> {
    // Zero-sized observations carry no information.
    let mut sorted: Vec<AddressRange> = ranges.iter().copied().filter(|r| r.size > 0).collect();

    // Tie-break by type ordinal so equal inputs in any order sort the same.
    sorted.sort_by_key(|r| (r.base, r.kind.code(), r.size));

    let mut merged: Vec<E820Entry> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.base < last.end() && range.kind != last.kind => {
                return Err(BootError::OverlappingTypes {
                    first: (last.addr, last.size, last.kind),
                    second: (range.base, range.size, range.kind),
                });
            }
            Some(last) if range.base <= last.end() && range.kind == last.kind => {
                let end = last.end().max(range.end());
                last.size = end - last.addr;
            }
            _ => merged.push(E820Entry {
                addr: range.base,
                size: range.size,
                kind: range.kind,
            }),
        }
    }

    Ok(merged)
}

/// Verifies the merged list fits the target table variant.
pub fn cap_entries(entries: Vec<E820Entry>, max: usize) -> BootResult<Vec<E820Entry>> {
    if entries.len() > max {
        return Err(BootError::TooManyEntries {
            count: entries.len(),
            max,
        });
    }
    Ok(entries)
}

// ============================================================================
// HOST RANGE PROVIDER
// ============================================================================

/// Point-in-time snapshot of the host's physical map from /proc/iomem.
/// Taken once per load; never re-queried mid-plan.
pub fn host_ranges() -> io::Result<Vec<AddressRange>> {
    let text = fs::read_to_string("/proc/iomem")?;
    let ranges = parse_iomem(&text);
    if ranges.iter().all(|r| r.end() <= 1) {
        // Addresses read as zero when the caller lacks CAP_SYS_ADMIN.
        warn!("all /proc/iomem addresses are zero; run with privileges for a usable map");
    }
    debug!(count = ranges.len(), "host memory snapshot taken");
    Ok(ranges)
}

/// Parses top-level /proc/iomem lines ("start-end : name"). Nested
/// resources (indented) subdivide their parent and are skipped.
fn parse_iomem(text: &str) -> Vec<AddressRange> {
    let mut ranges = Vec::new();
    for line in text.lines() {
        if line.starts_with(' ') {
            continue;
        }
        let Some((span, name)) = line.split_once(':') else {
            continue;
        };
        let Some((start, end)) = span.trim().split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            u64::from_str_radix(start.trim(), 16),
            u64::from_str_radix(end.trim(), 16),
        ) else {
            continue;
        };
        if end < start {
            continue;
        }
        ranges.push(AddressRange {
            base: start,
            size: end - start + 1,
            kind: kind_for_resource(name.trim()),
        });
    }
    ranges
}

fn kind_for_resource(name: &str) -> E820Type {
    match name {
        "System RAM" => E820Type::Ram,
        "ACPI Tables" => E820Type::Acpi,
        "ACPI Non-volatile Storage" => E820Type::Nvs,
        _ => E820Type::Reserved,
    }
}

/// Candidate free ranges for the planner: the RAM records of a map
/// snapshot, already canonicalized.
pub fn free_ranges(entries: &[E820Entry]) -> Vec<AddressRange> {
    entries
        .iter()
        .filter(|e| e.kind == E820Type::Ram)
        .map(|e| AddressRange::new(e.addr, e.size, e.kind))
        .collect()
}

/// Loads ranges from an iomem-format file, for inspecting a saved map.
pub fn ranges_from_file(path: &Path) -> io::Result<Vec<AddressRange>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_iomem(&text))
}

// ============================================================================
// TESTS
// ============================================================================
