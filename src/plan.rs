// plan.rs
//!
//! Segment Planner: places kernel, ramdisk and parameter block into
//! disjoint physical regions chosen from the host's free-range snapshot,
//! patches the placement-dependent zero-page fields, and seals the block.
//! The returned plan is the final handoff contract; the planner performs
//! no I/O and has no layout authority after it returns.

use tracing::{debug, info};

use crate::error::{BootError, BootResult};
use crate::header::KernelHeader;
use crate::layout::{self, E820Type, SegmentKind};
use crate::memmap::AddressRange;
use crate::params::{BootParams, FinalizedParams};

// ============================================================================
// SEGMENT
// ============================================================================

/// One placement in target memory. `buf` is the source bytes to copy in;
/// `size` is the reserved footprint and may exceed `buf.len()` (the
/// kernel declares extra run-time space through init_size).
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub base: u64,
    pub size: u64,
    pub buf: &'a [u8],
    pub kind: SegmentKind,
}

impl<'a> Segment<'a> {
    pub fn new(base: u64, size: u64, buf: &'a [u8], kind: SegmentKind) -> Self {
        Self { base, size, buf, kind }
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

// ============================================================================
// LOAD PLAN
// ============================================================================

/// The finished handoff contract for one load: placed segments, the
/// sealed parameter block, and the entry address.
pub struct LoadPlan<'a> {
    kernel: (u64, u64, &'a [u8]),
    ramdisk: Option<(u64, u64, &'a [u8])>,
    params_base: u64,
    params: FinalizedParams,
    entry: u64,
}

impl<'a> LoadPlan<'a> {
    /// Segment list ordered by base address.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let (kbase, ksize, kbuf) = self.kernel;
        let mut segments = vec![Segment::new(kbase, ksize, kbuf, SegmentKind::Kernel)];
        if let Some((base, size, buf)) = self.ramdisk {
            segments.push(Segment::new(base, size, buf, SegmentKind::Ramdisk));
        }
        segments.push(Segment::new(
            self.params_base,
            layout::BOOT_PARAMS_SIZE as u64,
            &self.params.as_bytes()[..],
            SegmentKind::Params,
        ));
        segments.sort_by_key(|s| s.base);
        segments
    }

    pub fn params(&self) -> &FinalizedParams {
        &self.params
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }
}

// ============================================================================
// PLANNING
// ============================================================================

/// Produces the non-overlapping plan for one load, consuming the
/// parameter block builder. `free` is the point-in-time candidate
/// snapshot; only its RAM ranges are eligible.
pub fn plan<'a>(
    header: &KernelHeader,
    kernel: &'a [u8],
    initrd: Option<&'a [u8]>,
    mut params: BootParams,
    free: &[AddressRange],
) -> BootResult<LoadPlan<'a>> {
    let payload_offset = header.payload_offset();
    if kernel.len() <= payload_offset {
        return Err(BootError::InsufficientData {
            needed: payload_offset + 1,
            got: kernel.len(),
        });
    }
    let payload = &kernel[payload_offset..];

    // The ramdisk address ceiling bounds every placement in this plan.
    let ceiling = header.initrd_addr_max() + 1;

    // A ramdisk pinned earlier via set_ramdisk keeps its address.
    // Validate it up front so the kernel is placed around it, not on
    // top of it; an unaligned pin would only fail later in the host
    // kernel, so reject it here.
    let pinned = match initrd {
        Some(bytes) => {
            let (addr, _) = params.ramdisk();
            if addr != 0 {
                let size = page_align(bytes.len() as u64);
                if addr % layout::PAGE_SIZE != 0 || !fits_free(free, addr, size, ceiling) {
                    return Err(BootError::NoPlacement { kind: SegmentKind::Ramdisk, size });
                }
                Some((addr, size))
            } else {
                None
            }
        }
        None => None,
    };
    let mut occupied: Vec<(u64, u64)> = pinned.iter().map(|&(b, s)| (b, b + s)).collect();

    let kernel_size = page_align(header.init_size().unwrap_or(0).max(payload.len() as u64));
    let kernel_base = place_kernel(header, kernel_size, ceiling, free, &occupied)?;
    occupied.push((kernel_base, kernel_base + kernel_size));
    debug!(base = format_args!("{:#x}", kernel_base), size = kernel_size, "kernel placed");

    let ramdisk = match initrd {
        Some(bytes) => {
            let (base, size) = match pinned {
                Some(p) => p,
                None => {
                    let size = page_align(bytes.len() as u64);
                    let base =
                        first_fit(free, size, layout::PAGE_SIZE, layout::KERNEL_START, ceiling, &occupied)
                            .ok_or(BootError::NoPlacement { kind: SegmentKind::Ramdisk, size })?;
                    params.set_ramdisk(base, bytes.len() as u64)?;
                    occupied.push((base, base + size));
                    (base, size)
                }
            };
            debug!(base = format_args!("{:#x}", base), size, "ramdisk placed");
            Some((base, size, bytes))
        }
        None => None,
    };

    let params_size = layout::BOOT_PARAMS_SIZE as u64;
    let params_base = first_fit(free, params_size, layout::PAGE_SIZE, layout::PAGE_SIZE, u64::MAX, &occupied)
        .ok_or(BootError::NoPlacement { kind: SegmentKind::Params, size: params_size })?;
    debug!(base = format_args!("{:#x}", params_base), "boot params placed");

    params.set_kernel_start(kernel_base)?;
    params.set_cmdline_ptr(params_base)?;

    let plan = LoadPlan {
        kernel: (kernel_base, kernel_size, payload),
        ramdisk,
        params_base,
        params: params.finalize()?,
        entry: entry_point(header, kernel_base),
    };

    validate_disjoint(&plan.segments())?;
    info!(
        segments = plan.segments().len(),
        entry = format_args!("{:#x}", plan.entry),
        "segment plan complete"
    );
    Ok(plan)
}

/// Entry point the handoff executor should jump to.
pub fn entry_point(header: &KernelHeader, kernel_base: u64) -> u64 {
    if header.relocatable() {
        kernel_base
    } else if header.code32_start() != 0 {
        header.code32_start() as u64
    } else {
        layout::KERNEL_START
    }
}

/// Rejects any intersecting pair; overlaps are never re-ordered or
/// shrunk. Accepts any segment list, sorted or not.
pub fn validate_disjoint(segments: &[Segment<'_>]) -> BootResult<()> {
    for (i, a) in segments.iter().enumerate() {
        for b in &segments[i + 1..] {
            if a.base < b.end() && b.base < a.end() {
                return Err(BootError::SegmentOverlap {
                    first: (a.kind, a.base, a.end()),
                    second: (b.kind, b.base, b.end()),
                });
            }
        }
    }
    Ok(())
}

// ============================================================================
// PLACEMENT HELPERS
// ============================================================================

fn place_kernel(
    header: &KernelHeader,
    size: u64,
    ceiling: u64,
    free: &[AddressRange],
    occupied: &[(u64, u64)],
) -> BootResult<u64> {
    if header.relocatable() {
        first_fit(free, size, header.kernel_alignment(), layout::KERNEL_START, ceiling, occupied)
            .ok_or(BootError::NoPlacement { kind: SegmentKind::Kernel, size })
    } else {
        // A fixed-address kernel sits exactly where it asks to; the only
        // question is whether that spot exists in the candidate set.
        let base = header.pref_address();
        if fits_free(free, base, size, ceiling) {
            Ok(base)
        } else {
            Err(BootError::NoPlacement { kind: SegmentKind::Kernel, size })
        }
    }
}

/// Lowest admissible aligned base within the candidate RAM ranges,
/// skipping already-occupied intervals.
fn first_fit(
    free: &[AddressRange],
    size: u64,
    align: u64,
    floor: u64,
    ceiling: u64,
    occupied: &[(u64, u64)],
) -> Option<u64> {
    let align = align.max(1);
    let mut ranges: Vec<&AddressRange> = free.iter().filter(|r| r.kind == E820Type::Ram).collect();
    ranges.sort_by_key(|r| r.base);

    for range in ranges {
        let limit = range.end().min(ceiling);
        let Some(mut candidate) = align_up(range.base.max(floor), align) else {
            continue;
        };
        while candidate.checked_add(size).is_some_and(|end| end <= limit) {
            match occupied
                .iter()
                .find(|&&(ob, oe)| candidate < oe && candidate + size > ob)
            {
                Some(&(_, oe)) => match align_up(oe, align) {
                    Some(next) => candidate = next,
                    None => break,
                },
                None => return Some(candidate),
            }
        }
    }
    None
}

/// Whether [base, base+size) lies inside one candidate RAM range and
/// under the ceiling.
fn fits_free(free: &[AddressRange], base: u64, size: u64, ceiling: u64) -> bool {
    let Some(end) = base.checked_add(size) else {
        return false;
    };
    end <= ceiling
        && free
            .iter()
            .any(|r| r.kind == E820Type::Ram && r.base <= base && end <= r.end())
}

fn align_up(value: u64, align: u64) -> Option<u64> {
    value.div_ceil(align).checked_mul(align)
}

fn page_align(value: u64) -> u64 {
    align_up(value, layout::PAGE_SIZE).unwrap_or(u64::MAX)
}

// ============================================================================
// TESTS
// ============================================================================
