use super::{FdPool, SyscallProvider, owned_fd};
use crate::provider::FdProvider;
use log::debug;
use rand_core::RngCore;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

const NR_EPOLL_FDS: usize = 10;
const NR_EVENTFDS: usize = 8;
const NR_TIMERFDS: usize = 4;
const NR_MEMFDS: usize = 4;
const NR_INOTIFY_FDS: usize = 4;
const NR_PERF_FDS: usize = 4;
const NR_USERFAULTFDS: usize = 2;
const NR_FANOTIFY_FDS: usize = 2;

const DRM_NODES: &[&str] = &[
    "/dev/dri/card0",
    "/dev/dri/card1",
    "/dev/dri/renderD128",
    "/dev/dri/renderD129",
];

/// Leading part of `struct perf_event_attr` (PERF_ATTR_SIZE_VER0).
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct PerfEventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
}

const PERF_TYPE_SOFTWARE: u32 = 1;
const PERF_COUNT_SW_CPU_CLOCK: u64 = 0;
const PERF_ATTR_FLAG_DISABLED: u64 = 1 << 0;
const PERF_ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const PERF_ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;

fn create_epoll() -> io::Result<OwnedFd> {
    owned_fd(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })
}

fn create_eventfd() -> io::Result<OwnedFd> {
    owned_fd(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) })
}

fn create_timerfd() -> io::Result<OwnedFd> {
    owned_fd(unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK) })
}

fn create_memfd() -> io::Result<OwnedFd> {
    let fd = owned_fd(unsafe { libc::memfd_create(c"fdpool-memfd".as_ptr(), libc::MFD_CLOEXEC) })?;
    // Give it a page so mmap and read have something to work with.
    if unsafe { libc::ftruncate(fd.as_raw_fd(), 4096) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

fn create_inotify() -> io::Result<OwnedFd> {
    owned_fd(unsafe { libc::inotify_init1(libc::IN_NONBLOCK) })
}

fn create_perf_event() -> io::Result<OwnedFd> {
    let attr = PerfEventAttr {
        type_: PERF_TYPE_SOFTWARE,
        size: std::mem::size_of::<PerfEventAttr>() as u32,
        config: PERF_COUNT_SW_CPU_CLOCK,
        flags: PERF_ATTR_FLAG_DISABLED | PERF_ATTR_FLAG_EXCLUDE_KERNEL | PERF_ATTR_FLAG_EXCLUDE_HV,
        ..Default::default()
    };
    let ret = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            &attr as *const PerfEventAttr,
            0 as libc::pid_t,
            -1 as libc::c_int,
            -1 as libc::c_int,
            0 as libc::c_ulong,
        )
    };
    owned_fd(ret as libc::c_int)
}

fn create_userfaultfd() -> io::Result<OwnedFd> {
    let ret = unsafe { libc::syscall(libc::SYS_userfaultfd, libc::O_CLOEXEC | libc::O_NONBLOCK) };
    owned_fd(ret as libc::c_int)
}

fn create_fanotify() -> io::Result<OwnedFd> {
    owned_fd(unsafe { libc::fanotify_init(libc::FAN_CLASS_NOTIF as _, libc::O_RDONLY as _) })
}

pub fn epoll_provider() -> SyscallProvider {
    SyscallProvider::new("epoll", NR_EPOLL_FDS, create_epoll)
}

pub fn eventfd_provider() -> SyscallProvider {
    SyscallProvider::new("eventfd", NR_EVENTFDS, create_eventfd)
}

pub fn timerfd_provider() -> SyscallProvider {
    SyscallProvider::new("timerfd", NR_TIMERFDS, create_timerfd)
}

pub fn memfd_provider() -> SyscallProvider {
    SyscallProvider::new("memfd", NR_MEMFDS, create_memfd)
}

pub fn inotify_provider() -> SyscallProvider {
    SyscallProvider::new("inotify", NR_INOTIFY_FDS, create_inotify)
}

/// Software counters only; fails where `perf_event_paranoid` forbids them.
pub fn perf_provider() -> SyscallProvider {
    SyscallProvider::new("perf", NR_PERF_FDS, create_perf_event)
}

/// Usually needs CAP_SYS_PTRACE or `vm.unprivileged_userfaultfd=1`.
pub fn userfaultfd_provider() -> SyscallProvider {
    SyscallProvider::new("userfaultfd", NR_USERFAULTFDS, create_userfaultfd)
}

/// Needs CAP_SYS_ADMIN.
pub fn fanotify_provider() -> SyscallProvider {
    SyscallProvider::new("fanotify", NR_FANOTIFY_FDS, create_fanotify)
}

/// Whatever DRM device nodes the machine has.
#[derive(Debug, Default)]
pub struct DrmProvider {
    pool: FdPool,
}

impl DrmProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FdProvider for DrmProvider {
    fn name(&self) -> &'static str {
        "drm"
    }

    fn open(&mut self) -> bool {
        for node in DRM_NODES {
            match OpenOptions::new().read(true).write(true).open(node) {
                Ok(file) => self.pool.push(file),
                Err(e) => debug!("drm: {node}: {e}"),
            }
        }
        !self.pool.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        self.pool.pick(rng)
    }
}
