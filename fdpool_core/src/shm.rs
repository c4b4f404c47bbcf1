//! The `(current_fd, fd_lifetime)` pair shared by the parent and every
//! worker process.

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedSlotError {
    #[error("failed to map shared fd slot: {0}")]
    Map(#[from] io::Error),
}

#[repr(C)]
struct FdSlot {
    current_fd: AtomicI32,
    fd_lifetime: AtomicU32,
}

/// A cell living in an anonymous `MAP_SHARED` mapping.
///
/// Create it before forking workers; every child then reads and writes the
/// same pair. Accesses are relaxed loads and stores with no lock, so two
/// workers can interleave a read-modify-write and lose an update. Callers
/// treat the pair as a reuse hint only and tolerate such lost updates.
pub struct SharedFdSlot {
    slot: NonNull<FdSlot>,
}

// The mapping outlives every reference handed out and is only touched through atomics.
unsafe impl Send for SharedFdSlot {}
unsafe impl Sync for SharedFdSlot {}

impl SharedFdSlot {
    /// Maps a fresh slot holding `(0, 0)`.
    pub fn new() -> Result<Self, SharedSlotError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mem::size_of::<FdSlot>(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let slot = NonNull::new(ptr as *mut FdSlot)
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        unsafe {
            slot.as_ptr().write(FdSlot {
                current_fd: AtomicI32::new(0),
                fd_lifetime: AtomicU32::new(0),
            });
        }
        Ok(Self { slot })
    }

    fn slot(&self) -> &FdSlot {
        unsafe { self.slot.as_ref() }
    }

    pub fn current_fd(&self) -> RawFd {
        self.slot().current_fd.load(Ordering::Relaxed)
    }

    pub fn set_current_fd(&self, fd: RawFd) {
        self.slot().current_fd.store(fd, Ordering::Relaxed);
    }

    pub fn fd_lifetime(&self) -> u32 {
        self.slot().fd_lifetime.load(Ordering::Relaxed)
    }

    pub fn set_fd_lifetime(&self, lifetime: u32) {
        self.slot().fd_lifetime.store(lifetime, Ordering::Relaxed);
    }

    /// Back to `(0, 0)`, forcing the next caller to select a new fd.
    pub fn reset(&self) {
        self.set_current_fd(0);
        self.set_fd_lifetime(0);
    }
}

impl fmt::Debug for SharedFdSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFdSlot")
            .field("current_fd", &self.current_fd())
            .field("fd_lifetime", &self.fd_lifetime())
            .finish()
    }
}

impl Drop for SharedFdSlot {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.slot.as_ptr() as *mut libc::c_void, mem::size_of::<FdSlot>());
        }
    }
}
