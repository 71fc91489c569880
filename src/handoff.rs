// handoff.rs
//!
//! Handoff executor boundary. The pipeline hands a finished plan to an
//! executor and loses all layout authority; the reboot into the staged
//! kernel is the single irreversible step and must come last.

use std::io;

use libc::{c_ulong, c_void};
use tracing::info;

use crate::error::{BootError, BootResult};
use crate::plan::Segment;

/// kexec_load(2) accepts at most this many segments.
const KEXEC_SEGMENT_MAX: usize = 16;

const KEXEC_ARCH_DEFAULT: c_ulong = 0;

/// Accepts the finalized segment list and performs the control
/// transfer. The core never calls this itself.
pub trait HandoffExecutor {
    /// Stages the segments in the host kernel. Repeatable.
    fn load(&self, entry: u64, segments: &[Segment<'_>]) -> BootResult<()>;

    /// Jumps into the staged kernel. Does not return on success.
    fn execute(&self) -> BootResult<()>;
}

/// Mirror of struct kexec_segment from <linux/kexec.h>.
#[repr(C)]
struct KexecSegment {
    buf: *const c_void,
    bufsz: libc::size_t,
    mem: *const c_void,
    memsz: libc::size_t,
}

/// The real thing: kexec_load(2) plus reboot(LINUX_REBOOT_CMD_KEXEC).
pub struct KexecLoad;

impl HandoffExecutor for KexecLoad {
    fn load(&self, entry: u64, segments: &[Segment<'_>]) -> BootResult<()> {
        if segments.len() > KEXEC_SEGMENT_MAX {
            return Err(BootError::TooManyEntries {
                count: segments.len(),
                max: KEXEC_SEGMENT_MAX,
            });
        }

        let raw: Vec<KexecSegment> = segments
            .iter()
            .map(|s| KexecSegment {
                buf: s.buf.as_ptr() as *const c_void,
                bufsz: s.buf.len(),
                mem: s.base as *const c_void,
                memsz: s.size as libc::size_t,
            })
            .collect();

        // Irrevocable only at execute(); a failed or repeated load is safe.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_kexec_load,
                entry as c_ulong,
                raw.len() as c_ulong,
                raw.as_ptr(),
                KEXEC_ARCH_DEFAULT,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        info!(
            entry = format_args!("{:#x}", entry),
            segments = raw.len(),
            "kernel staged for kexec"
        );
        Ok(())
    }

    fn execute(&self) -> BootResult<()> {
        let rc = unsafe { libc::reboot(libc::LINUX_REBOOT_CMD_KEXEC) };
        // Only reachable when the reboot was refused.
        Err(if rc != 0 {
            io::Error::last_os_error().into()
        } else {
            io::Error::other("reboot(KEXEC) returned").into()
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SegmentKind;

    #[test]
    fn test_segment_count_limit() {
        let buf = [0u8; 1];
        let segments: Vec<Segment<'_>> = (0..KEXEC_SEGMENT_MAX as u64 + 1)
            .map(|i| Segment::new(i * 0x2000, 0x1000, &buf, SegmentKind::Ramdisk))
            .collect();
        assert!(matches!(
            KexecLoad.load(0, &segments),
            Err(BootError::TooManyEntries { .. })
        ));
    }
}
