use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "kexec-core")]
#[command(version = "0.2.0")]
#[command(about = "Stage a new kernel for in-place execution handoff", long_about = None)]
pub struct LoadConfig {
    /// Path to the kernel image (bzImage)
    #[arg(short, long)]
    pub kernel: PathBuf,

    /// Path to the initial ramdisk (optional)
    #[arg(short, long)]
    pub initrd: Option<PathBuf>,

    /// Command line for the next kernel
    #[arg(long, default_value = "console=ttyS0")]
    pub cmdline: String,

    /// Pin the ramdisk to a fixed physical address instead of letting
    /// the planner choose one
    #[arg(long, value_parser = parse_hex)]
    pub initrd_base: Option<u64>,

    /// Read the memory map from an iomem-format file instead of /proc/iomem
    #[arg(long)]
    pub iomem: Option<PathBuf>,

    /// Stage the plan in the host kernel via kexec_load(2)
    #[arg(long)]
    pub load: bool,

    /// Reboot into the staged kernel immediately after loading (irreversible)
    #[arg(long, requires = "load")]
    pub exec: bool,

    /// Increase verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_hex(text: &str) -> Result<u64, String> {
    let trimmed = text.trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16).map_err(|e| format!("invalid address '{}': {}", text, e))
}

impl LoadConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.kernel.exists() {
            return Err(format!("kernel image not found: {}", self.kernel.display()));
        }

        if let Some(ref initrd) = self.initrd {
            if !initrd.exists() {
                return Err(format!("initrd not found: {}", initrd.display()));
            }
        }

        if self.initrd_base.is_some() && self.initrd.is_none() {
            return Err("--initrd-base given without --initrd".to_string());
        }

        if let Some(ref iomem) = self.iomem {
            if !iomem.exists() {
                return Err(format!("iomem file not found: {}", iomem.display()));
            }
        }

        Ok(())
    }

    /// Get tracing log level based on verbosity
    pub fn log_level(&self) -> &str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(parse_hex("0x2000000").unwrap(), 0x200_0000);
        assert_eq!(parse_hex("2000000").unwrap(), 0x200_0000);
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn test_log_level_mapping() {
        let mut config = LoadConfig::parse_from(["kexec-core", "--kernel", "/dev/null"]);
        assert_eq!(config.log_level(), "warn");
        config.verbose = 2;
        assert_eq!(config.log_level(), "debug");
        config.verbose = 9;
        assert_eq!(config.log_level(), "trace");
    }

    #[test]
    fn test_initrd_base_requires_initrd() {
        let config = LoadConfig::parse_from([
            "kexec-core",
            "--kernel",
            "/dev/null",
            "--initrd-base",
            "0x2000000",
        ]);
        assert!(config.validate().is_err());
    }
}
