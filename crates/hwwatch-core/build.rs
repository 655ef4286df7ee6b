//! Build script for hwwatch-core
//!
//! This script checks build requirements before compilation:
//! - Minimum Rust version (1.70: `Option::is_some_and`, `OwnedFd`, let-else)
//! - Target platform (the perf backend only exists on Linux)
//! - Kernel version when building natively on Linux (best effort)

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // Check minimum Rust version
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!(
                "hwwatch-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // Build scripts run on the host, so ask cargo about the target instead of
    // using cfg!.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "linux" {
        check_linux_kernel();
    } else {
        println!("cargo:warning=hwwatch-core: no hardware backend for target_os={target_os}, only the simulated backend is available");
    }
}

fn check_linux_kernel()
{
    // perf_event_attr size VER5 (112 bytes) needs Linux 4.1+
    let min_kernel = (4, 1);

    let native = env::var("HOST").ok() == env::var("TARGET").ok();
    if !native {
        return;
    }

    match kernel_version() {
        Some(version) if version < min_kernel => println!(
            "cargo:warning=hwwatch-core: perf backend needs Linux {}.{}+, build host runs {}.{}",
            min_kernel.0, min_kernel.1, version.0, version.1
        ),
        Some(_) => {}
        // Containers sometimes hide /proc; not worth failing the build over.
        None => println!("cargo:warning=could not detect Linux kernel version"),
    }
}

fn kernel_version() -> Option<(u32, u32)>
{
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease").ok()?;

    // e.g. "6.8.0-45-generic"
    let mut parts = release.trim().split(|c: char| c == '.' || c == '-');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts.next()?.parse::<u32>().ok()?;

    Some((major, minor))
}
