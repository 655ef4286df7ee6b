//! The mmap'd sample ring of one perf event.
//!
//! Layout: one metadata page (`struct perf_event_mmap_page`) followed by a
//! power-of-two number of data pages. The kernel advances `data_head`; we
//! consume records and publish `data_tail`. Records are 8-byte aligned and
//! the data area is a multiple of 8, so a record header never wraps, but a
//! record body can: those are copied into a caller-provided scratch buffer.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use super::ffi::{MMAP_DATA_HEAD_OFFSET, MMAP_DATA_TAIL_OFFSET};
use crate::error::BackendError;

const RECORD_HEADER_LEN: usize = 8;

pub struct RingBuffer
{
    base: NonNull<u8>,
    map_len: usize,
    data_offset: usize,
    data_size: usize,
}

// SAFETY: the mapping is owned by this value and only touched through &mut self
// (drain) or on drop.
unsafe impl Send for RingBuffer {}

impl std::fmt::Debug for RingBuffer
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("RingBuffer").field("data_size", &self.data_size).finish()
    }
}

impl RingBuffer
{
    /// Map `pages` data pages (power of two) for the event behind `fd`.
    pub fn map(fd: BorrowedFd<'_>, pages: usize) -> Result<Self, BackendError>
    {
        if !pages.is_power_of_two() {
            return Err(BackendError::new(
                libc::EINVAL,
                format!("ring size must be a power of two pages, got {pages}"),
            ));
        }
        let page_size = usize::try_from(unsafe { libc::sysconf(libc::_SC_PAGESIZE) })
            .map_err(|_| BackendError::last_os_error("sysconf(_SC_PAGESIZE)"))?;
        let data_size = pages * page_size;
        let map_len = page_size + data_size;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BackendError::last_os_error("mmap perf ring"));
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| BackendError::new(libc::ENOMEM, "mmap returned null"))?;

        Ok(Self {
            base,
            map_len,
            data_offset: page_size,
            data_size,
        })
    }

    fn control(&self, offset: usize) -> &AtomicU64
    {
        // SAFETY: offset is inside the metadata page, 8-byte aligned, and the
        // kernel only ever accesses these words atomically.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU64>() }
    }

    fn data(&self) -> &[u8]
    {
        // SAFETY: the data area lies entirely inside the mapping.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(self.data_offset), self.data_size) }
    }

    /// Hand every complete record to `on_record`, then release the space.
    ///
    /// `scratch` is reused for records that wrap around the end of the ring;
    /// it only grows if a record is larger than anything seen before.
    pub fn drain<F>(&mut self, scratch: &mut Vec<u8>, on_record: F)
    where
        F: FnMut(&[u8]),
    {
        let head = self.control(MMAP_DATA_HEAD_OFFSET).load(Ordering::Acquire);
        let tail = self.control(MMAP_DATA_TAIL_OFFSET).load(Ordering::Relaxed);
        let tail = walk_records(self.data(), head, tail, scratch, on_record);

        self.control(MMAP_DATA_TAIL_OFFSET).store(tail, Ordering::Release);
    }
}

/// Hand every record between `tail` and `head` to `on_record` and return the
/// new tail. A corrupt header discards everything pending: the returned tail
/// is always `head` once the walk is done.
fn walk_records<F>(data: &[u8], head: u64, mut tail: u64, scratch: &mut Vec<u8>, mut on_record: F) -> u64
where
    F: FnMut(&[u8]),
{
    let size = data.len() as u64;

    while tail < head {
        let start = (tail % size) as usize;
        let header = &data[start..start + RECORD_HEADER_LEN];
        let record_len = usize::from(u16::from_ne_bytes([header[6], header[7]]));
        if record_len < RECORD_HEADER_LEN || record_len > data.len() {
            warn!(record_len, pending = head - tail, "corrupt perf record header, discarding ring contents");
            return head;
        }

        if start + record_len <= data.len() {
            on_record(&data[start..start + record_len]);
        } else {
            let first = data.len() - start;
            scratch.clear();
            scratch.extend_from_slice(&data[start..]);
            scratch.extend_from_slice(&data[..record_len - first]);
            on_record(scratch.as_slice());
        }
        tail += record_len as u64;
    }
    tail
}

impl Drop for RingBuffer
{
    fn drop(&mut self)
    {
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.map_len);
        }
    }
}
