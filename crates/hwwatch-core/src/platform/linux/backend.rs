//! [`InstallationBackend`] on top of perf hardware breakpoints.

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace, warn};

use super::cpus::online_cpus;
use super::ffi::{self, PerfEventAttr};
use super::ring::RingBuffer;
use super::sample::{decode_record, Record};
use crate::backend::{InstallationBackend, TriggerHandler};
use crate::error::{BackendError, HwWatchResult};
use crate::types::{AccessKind, WatchRequest};

/// Upper bound on how long a poller can miss a stop request if the eventfd
/// wakeup fails.
const POLL_TIMEOUT_MS: libc::c_int = 250;

/// Initial size of the buffer used for records that wrap the ring.
const SCRATCH_CAPACITY: usize = 4096;

/// Settings for [`PerfBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfConfig
{
    /// Only watch accesses made by this process. `None` watches every process.
    pub pid: Option<i32>,
    /// CPUs to install on. `None` means every online CPU.
    pub cpus: Option<Vec<u32>>,
    /// Data pages per sample ring (power of two).
    pub ring_pages: usize,
    /// Also trigger on accesses made in kernel mode.
    pub include_kernel: bool,
}

impl Default for PerfConfig
{
    fn default() -> Self
    {
        Self {
            pid: None,
            cpus: None,
            ring_pages: 8,
            include_kernel: true,
        }
    }
}

/// One CPU's event: the ring is unmapped before the descriptor is closed.
#[derive(Debug)]
struct PerfEvent
{
    ring: RingBuffer,
    fd: OwnedFd,
    cpu: u32,
}

/// Reservation of one watch resource on every configured CPU.
#[derive(Debug)]
pub struct PerfHandle
{
    request: WatchRequest,
    cpus: usize,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Vec<PerfEvent>>>,
    wake: OwnedFd,
}

impl PerfHandle
{
    /// What this reservation watches.
    pub const fn request(&self) -> WatchRequest
    {
        self.request
    }

    /// Number of per-CPU events behind this reservation.
    pub const fn cpu_count(&self) -> usize
    {
        self.cpus
    }

    /// Stop the poller, wait for it, then disable and close every event.
    fn shutdown(&mut self) -> Result<(), BackendError>
    {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::Release);
        if let Err(err) = ffi::eventfd_signal(self.wake.as_raw_fd()) {
            warn!(error = %err, "could not wake poller, waiting for its timeout");
        }

        let events = worker
            .join()
            .map_err(|_| BackendError::new(libc::EIO, "poller thread panicked"))?;
        for event in &events {
            if let Err(err) = ffi::perf_ioctl(event.fd.as_raw_fd(), ffi::PERF_EVENT_IOC_DISABLE) {
                debug!(cpu = event.cpu, error = %err, "disable before close failed");
            }
        }
        drop(events);
        debug!(kind = %self.request.kind, address = %self.request.address, cpus = self.cpus, "perf watch released");
        Ok(())
    }
}

impl Drop for PerfHandle
{
    fn drop(&mut self)
    {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "perf watch release on drop failed");
        }
    }
}

/// Hardware watchpoints through `perf_event_open`.
#[derive(Debug, Clone)]
pub struct PerfBackend
{
    config: PerfConfig,
    cpus: Vec<u32>,
}

impl PerfBackend
{
    /// Backend installing on `config.cpus` or every online CPU.
    ///
    /// ## Errors
    ///
    /// - `EINVAL` if `ring_pages` is not a power of two
    /// - I/O or parse errors reading the online CPU list
    pub fn new(config: PerfConfig) -> HwWatchResult<Self>
    {
        if !config.ring_pages.is_power_of_two() {
            return Err(BackendError::new(
                libc::EINVAL,
                format!("ring_pages must be a power of two, got {}", config.ring_pages),
            )
            .into());
        }
        let cpus = match &config.cpus {
            Some(cpus) if !cpus.is_empty() => cpus.clone(),
            _ => online_cpus()?,
        };
        debug!(cpus = cpus.len(), pid = ?config.pid, "perf backend ready");
        Ok(Self { config, cpus })
    }

    /// CPUs each watch resource is installed on.
    pub fn cpus(&self) -> &[u32]
    {
        &self.cpus
    }

    fn attr(&self, request: WatchRequest) -> PerfEventAttr
    {
        let mut flags = ffi::ATTR_FLAG_DISABLED | ffi::ATTR_FLAG_EXCLUDE_HV;
        if !self.config.include_kernel {
            flags |= ffi::ATTR_FLAG_EXCLUDE_KERNEL;
        }
        PerfEventAttr {
            type_: ffi::PERF_TYPE_BREAKPOINT,
            size: std::mem::size_of::<PerfEventAttr>() as u32,
            sample_period: 1,
            sample_type: ffi::SAMPLE_TYPE,
            flags,
            wakeup_events: 1,
            bp_type: match request.kind {
                AccessKind::Read => ffi::HW_BREAKPOINT_R,
                AccessKind::Write => ffi::HW_BREAKPOINT_W,
            },
            bp_addr: request.address.value(),
            bp_len: request.length as u64,
            ..PerfEventAttr::default()
        }
    }

    /// Open and map one event per CPU. Dropping the partial vector on error
    /// closes whatever was already opened.
    fn open_all(&self, attr: &PerfEventAttr) -> Result<Vec<PerfEvent>, BackendError>
    {
        let pid = self.config.pid.unwrap_or(-1);
        let mut events = Vec::with_capacity(self.cpus.len());
        for &cpu in &self.cpus {
            let cpu_arg = libc::c_int::try_from(cpu)
                .map_err(|_| BackendError::new(libc::EINVAL, format!("cpu {cpu} out of range")))?;
            let fd = ffi::perf_event_open(attr, pid, cpu_arg)?;
            let ring = RingBuffer::map(fd.as_fd(), self.config.ring_pages)?;
            events.push(PerfEvent { ring, fd, cpu });
        }
        Ok(events)
    }
}

impl InstallationBackend for PerfBackend
{
    type Handle = PerfHandle;

    fn name(&self) -> &'static str
    {
        "perf"
    }

    fn register(&self, request: WatchRequest, handler: Arc<dyn TriggerHandler>) -> Result<PerfHandle, BackendError>
    {
        let events = self.open_all(&self.attr(request))?;
        for event in &events {
            ffi::perf_ioctl(event.fd.as_raw_fd(), ffi::PERF_EVENT_IOC_ENABLE)?;
        }

        let wake = ffi::eventfd()?;
        let stop = Arc::new(AtomicBool::new(false));
        let cpus = events.len();
        let poller = Poller {
            events,
            wake: wake.as_raw_fd(),
            stop: Arc::clone(&stop),
            handler,
            request,
        };
        let worker = thread::Builder::new()
            .name(format!("hwwatch-{}", request.kind.as_str().to_lowercase()))
            .spawn(move || poller.run())
            .map_err(|err| BackendError::new(err.raw_os_error().unwrap_or(libc::EAGAIN), format!("spawn poller: {err}")))?;

        debug!(kind = %request.kind, address = %request.address, cpus, "perf watch installed");
        Ok(PerfHandle {
            request,
            cpus,
            stop,
            worker: Some(worker),
            wake,
        })
    }

    fn unregister_all(&self, mut handle: PerfHandle) -> Result<(), BackendError>
    {
        handle.shutdown()
    }
}

/// Trigger context: drains the sample rings and calls the handler.
struct Poller
{
    events: Vec<PerfEvent>,
    wake: RawFd,
    stop: Arc<AtomicBool>,
    handler: Arc<dyn TriggerHandler>,
    request: WatchRequest,
}

impl Poller
{
    fn run(self) -> Vec<PerfEvent>
    {
        let Self {
            mut events,
            wake,
            stop,
            handler,
            request,
        } = self;

        let mut pollfds: Vec<libc::pollfd> = events
            .iter()
            .map(|event| event.fd.as_raw_fd())
            .chain(std::iter::once(wake))
            .map(|fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        let mut scratch = Vec::with_capacity(SCRATCH_CAPACITY);
        let mut live = events.len();

        while !stop.load(Ordering::Acquire) {
            let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, POLL_TIMEOUT_MS) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(kind = %request.kind, error = %err, "poll failed, watch stops reporting");
                break;
            }
            if rc == 0 {
                continue;
            }
            if pollfds.last().is_some_and(|wake| wake.revents != 0) {
                break;
            }

            for (event, pollfd) in events.iter_mut().zip(pollfds.iter_mut()) {
                let readiness = settle(pollfd);
                if readiness == Readiness::Idle {
                    continue;
                }
                event.ring.drain(&mut scratch, |record| deliver(handler.as_ref(), record));
                if readiness == Readiness::HungUp {
                    warn!(kind = %request.kind, address = %request.address, cpu = event.cpu, "perf event hung up, cpu stops reporting");
                    live -= 1;
                    if live == 0 {
                        warn!(kind = %request.kind, address = %request.address, "every perf event hung up, waiting for release");
                    }
                }
            }
        }

        trace!(kind = %request.kind, address = %request.address, "poller exiting");
        events
    }
}

/// What one pollfd reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness
{
    Idle,
    Data,
    /// The event is gone (its target exited, or an error). Whatever is left in
    /// the ring is still delivered.
    HungUp,
}

/// Classify `pollfd.revents`. A hung-up descriptor is retired (`fd = -1`) so
/// `poll` stops reporting it; otherwise it would return immediately forever.
fn settle(pollfd: &mut libc::pollfd) -> Readiness
{
    if pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
        pollfd.fd = -1;
        Readiness::HungUp
    } else if pollfd.revents & libc::POLLIN != 0 {
        Readiness::Data
    } else {
        Readiness::Idle
    }
}

fn deliver(handler: &dyn TriggerHandler, record: &[u8])
{
    match decode_record(record) {
        Some(Record::Sample(access)) => handler.on_access(access),
        Some(Record::Lost(count)) => handler.on_lost(count),
        None => {}
    }
}

#[cfg(test)]
mod tests
{
    use std::os::fd::FromRawFd;

    use super::*;

    fn pollfd(fd: RawFd, revents: libc::c_short) -> libc::pollfd
    {
        libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents,
        }
    }

    fn pipe() -> (OwnedFd, OwnedFd)
    {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_settle_classifies_revents()
    {
        let mut idle = pollfd(7, 0);
        assert_eq!(settle(&mut idle), Readiness::Idle);
        assert_eq!(idle.fd, 7);

        let mut data = pollfd(7, libc::POLLIN);
        assert_eq!(settle(&mut data), Readiness::Data);
        assert_eq!(data.fd, 7);

        for revents in [libc::POLLHUP, libc::POLLERR, libc::POLLNVAL, libc::POLLIN | libc::POLLHUP] {
            let mut gone = pollfd(7, revents);
            assert_eq!(settle(&mut gone), Readiness::HungUp);
            assert_eq!(gone.fd, -1);
        }
    }

    #[test]
    fn test_hung_up_descriptor_stops_waking_poll()
    {
        let (read_end, write_end) = pipe();
        drop(write_end);
        let mut fds = [pollfd(read_end.as_raw_fd(), 0)];

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
        assert_eq!(rc, 1);
        assert_eq!(settle(&mut fds[0]), Readiness::HungUp);

        // Retired: poll now sleeps out its timeout instead of returning at once.
        fds[0].revents = 0;
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 20) };
        assert_eq!(rc, 0);
        assert_eq!(fds[0].revents, 0);
    }

    #[derive(Default)]
    struct Counting
    {
        accesses: std::sync::atomic::AtomicU64,
        lost: std::sync::atomic::AtomicU64,
    }

    impl TriggerHandler for Counting
    {
        fn on_access(&self, _access: crate::backend::RawAccess)
        {
            self.accesses.fetch_add(1, Ordering::Relaxed);
        }

        fn on_lost(&self, count: u64)
        {
            self.lost.fetch_add(count, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_deliver_forwards_lost_records()
    {
        let mut lost = Vec::new();
        lost.extend_from_slice(&ffi::PERF_RECORD_LOST.to_ne_bytes());
        lost.extend_from_slice(&0_u16.to_ne_bytes());
        lost.extend_from_slice(&24_u16.to_ne_bytes());
        lost.extend_from_slice(&1_u64.to_ne_bytes());
        lost.extend_from_slice(&9_u64.to_ne_bytes());

        let handler = Counting::default();
        deliver(&handler, &lost);
        assert_eq!(handler.lost.load(Ordering::Relaxed), 9);
        assert_eq!(handler.accesses.load(Ordering::Relaxed), 0);
    }
}
