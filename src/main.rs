mod config;
mod error;
mod handoff;
mod header;
mod layout;
mod memmap;
mod params;
mod plan;
#[cfg(test)]
mod testutil;

use std::fs;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoadConfig;
use crate::handoff::{HandoffExecutor, KexecLoad};
use crate::header::KernelHeader;
use crate::params::BootParams;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LoadConfig::parse();
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level()))
        .init();

    // Byte source: one read per image, nothing retained past this load.
    let kernel = fs::read(&config.kernel)?;
    let initrd = match &config.initrd {
        Some(path) => Some(fs::read(path)?),
        None => None,
    };

    let header = KernelHeader::parse(&kernel)?;
    let version = header.protocol_version();
    info!(
        protocol = format_args!("{}.{:02}", version >> 8, version & 0xff),
        relocatable = header.relocatable(),
        "kernel header valid"
    );

    // Memory snapshot: taken once, the whole plan sees one layout.
    let raw_ranges = match &config.iomem {
        Some(path) => memmap::ranges_from_file(path)?,
        None => memmap::host_ranges()?,
    };
    let entries = memmap::cap_entries(memmap::from_ranges(&raw_ranges)?, layout::E820_MAX_LEGACY)?;
    for entry in &entries {
        info!(
            "e820: [{:#012x}, {:#012x}) {}",
            entry.addr,
            entry.end(),
            entry.kind.name()
        );
    }

    let mut params = BootParams::new();
    params.apply_header(&header)?;
    params.set_command_line(&config.cmdline)?;
    if let (Some(base), Some(bytes)) = (config.initrd_base, initrd.as_ref()) {
        params.set_ramdisk(base, bytes.len() as u64)?;
    }
    params.attach_memory_map(&entries)?;

    let free = memmap::free_ranges(&entries);
    let plan = plan::plan(&header, &kernel, initrd.as_deref(), params, &free)?;

    println!("segment plan (entry {:#x}):", plan.entry());
    for segment in plan.segments() {
        println!(
            "  {:<8} [{:#012x}, {:#012x})  {} bytes from source",
            segment.kind.name(),
            segment.base,
            segment.end(),
            segment.buf.len()
        );
    }

    if config.load {
        let executor = KexecLoad;
        executor.load(plan.entry(), &plan.segments())?;
        if config.exec {
            // Point of no return; everything above already validated.
            warn!("rebooting into staged kernel");
            executor.execute()?;
        }
    } else {
        info!("dry run: pass --load to stage the kernel");
    }

    Ok(())
}
