//! Raw `perf_event_open` definitions.
//!
//! `libc` exposes the syscall number but not `struct perf_event_attr`, so the
//! layout (`PERF_ATTR_SIZE_VER5`, 112 bytes) lives here.

use std::os::fd::{FromRawFd, OwnedFd};

use libc::{c_int, c_ulong, pid_t};

use crate::error::BackendError;

pub const PERF_TYPE_BREAKPOINT: u32 = 5;

pub const HW_BREAKPOINT_R: u32 = 1;
pub const HW_BREAKPOINT_W: u32 = 2;

pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_TIME: u64 = 1 << 2;
pub const PERF_SAMPLE_ADDR: u64 = 1 << 3;
pub const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 5;
pub const PERF_SAMPLE_CPU: u64 = 1 << 7;

/// Sample layout the decoder expects. Changing this means changing `sample.rs`.
pub const SAMPLE_TYPE: u64 =
    PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_TIME | PERF_SAMPLE_ADDR | PERF_SAMPLE_CPU | PERF_SAMPLE_CALLCHAIN;

// perf_event_attr flag bits
pub const ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
pub const ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;

pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_SAMPLE: u32 = 9;

/// Call chain entries at or above this value are context markers
/// (`PERF_CONTEXT_KERNEL`, `PERF_CONTEXT_USER`, ...), not return addresses.
pub const PERF_CONTEXT_MAX: u64 = (-4095_i64) as u64;

pub const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

pub const PERF_EVENT_IOC_ENABLE: c_ulong = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: c_ulong = 0x2401;

/// Offsets of `data_head` / `data_tail` inside `struct perf_event_mmap_page`.
pub const MMAP_DATA_HEAD_OFFSET: usize = 1024;
pub const MMAP_DATA_TAIL_OFFSET: usize = 1032;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfEventAttr
{
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub bp_addr: u64,
    pub bp_len: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub reserved_2: u16,
}

const _: () = assert!(std::mem::size_of::<PerfEventAttr>() == 112);

/// Open one perf event. The returned descriptor is close-on-exec.
pub fn perf_event_open(attr: &PerfEventAttr, pid: pid_t, cpu: c_int) -> Result<OwnedFd, BackendError>
{
    let group_fd: c_int = -1;
    let fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const PerfEventAttr,
            pid,
            cpu,
            group_fd,
            PERF_FLAG_FD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(BackendError::last_os_error(format!("perf_event_open on cpu {cpu}")));
    }
    let fd = c_int::try_from(fd).map_err(|_| BackendError::new(libc::EBADF, "perf_event_open returned bad fd"))?;
    // SAFETY: the kernel just handed us this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Issue an argument-less perf ioctl (enable / disable).
pub fn perf_ioctl(fd: c_int, request: c_ulong) -> Result<(), BackendError>
{
    let rc = unsafe { libc::ioctl(fd, request as _, 0) };
    if rc < 0 {
        return Err(BackendError::last_os_error("perf ioctl"));
    }
    Ok(())
}

/// Non-blocking eventfd used to wake a poller thread.
pub fn eventfd() -> Result<OwnedFd, BackendError>
{
    let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if fd < 0 {
        return Err(BackendError::last_os_error("eventfd"));
    }
    // SAFETY: freshly created descriptor, owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bump an eventfd counter so `poll` reports it readable.
pub fn eventfd_signal(fd: c_int) -> Result<(), BackendError>
{
    let one: u64 = 1;
    let written = unsafe { libc::write(fd, (&one as *const u64).cast(), std::mem::size_of::<u64>()) };
    if written < 0 {
        return Err(BackendError::last_os_error("eventfd write"));
    }
    Ok(())
}
