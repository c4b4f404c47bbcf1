//! The fd providers every run registers, in registration order.

mod files;
mod ipc;
mod kernel;

use crate::provider::FdProvider;
use crate::registry::{ProviderRegistry, RegistryError};
use log::debug;
use rand_core::RngCore;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub use files::{FilesProvider, TestfileProvider};
pub use ipc::{PipesProvider, SocketsProvider};
pub use kernel::{
    DrmProvider, epoll_provider, eventfd_provider, fanotify_provider, inotify_provider,
    memfd_provider, perf_provider, timerfd_provider, userfaultfd_provider,
};

/// Every built-in provider, in the order they are registered.
pub fn builtin_providers() -> Vec<Box<dyn FdProvider>> {
    let mut providers: Vec<Box<dyn FdProvider>> = Vec::new();
    providers.push(Box::new(FilesProvider::new()));
    providers.push(Box::new(SocketsProvider::new()));
    providers.push(Box::new(PipesProvider::new()));
    providers.push(Box::new(perf_provider()));
    providers.push(Box::new(epoll_provider()));
    providers.push(Box::new(eventfd_provider()));
    providers.push(Box::new(timerfd_provider()));
    providers.push(Box::new(TestfileProvider::new()));
    providers.push(Box::new(memfd_provider()));
    providers.push(Box::new(DrmProvider::new()));
    providers.push(Box::new(inotify_provider()));
    providers.push(Box::new(userfaultfd_provider()));
    providers.push(Box::new(fanotify_provider()));
    providers
}

pub fn builtin_registry() -> Result<ProviderRegistry, RegistryError> {
    ProviderRegistry::with_providers(builtin_providers())
}

/// Open handles a provider picks from at random.
#[derive(Debug, Default)]
pub struct FdPool {
    fds: Vec<OwnedFd>,
}

impl FdPool {
    pub fn push(&mut self, fd: impl Into<OwnedFd>) {
        self.fds.push(fd.into());
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// A random member of the pool. The pool must not be empty.
    pub fn pick(&self, rng: &mut dyn RngCore) -> RawFd {
        let index = rng.next_u64() as usize % self.fds.len();
        self.fds[index].as_raw_fd()
    }
}

/// Wraps the return value of an fd-creating libc call.
pub(crate) fn owned_fd(ret: libc::c_int) -> io::Result<OwnedFd> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(ret) })
}

/// Fills a pool by calling `create` up to `count` times.
///
/// Most kernel handle types only differ in the syscall that creates them, so
/// they share this provider and just supply the creator.
#[derive(Debug)]
pub struct SyscallProvider {
    name: &'static str,
    count: usize,
    create: fn() -> io::Result<OwnedFd>,
    pool: FdPool,
}

impl SyscallProvider {
    pub fn new(name: &'static str, count: usize, create: fn() -> io::Result<OwnedFd>) -> Self {
        Self {
            name,
            count,
            create,
            pool: FdPool::default(),
        }
    }
}

impl FdProvider for SyscallProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&mut self) -> bool {
        for _ in 0..self.count {
            match (self.create)() {
                Ok(fd) => self.pool.push(fd),
                Err(e) => {
                    debug!("{}: {}", self.name, e);
                    break;
                }
            }
        }
        !self.pool.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        self.pool.pick(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn builtin_names_are_unique_and_ordered() {
        let registry = builtin_registry().unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "files",
                "sockets",
                "pipes",
                "perf",
                "epoll",
                "eventfd",
                "timerfd",
                "testfile",
                "memfd",
                "drm",
                "inotify",
                "userfaultfd",
                "fanotify",
            ]
        );
        assert!(registry.records().iter().all(|r| r.enabled()));
    }

    #[test]
    fn pool_picks_only_its_own_fds() {
        let mut pool = FdPool::default();
        for _ in 0..3 {
            pool.push(owned_fd(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) }).unwrap());
        }
        let members: HashSet<RawFd> = pool.fds.iter().map(AsRawFd::as_raw_fd).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(20);

        for _ in 0..30 {
            assert!(members.contains(&pool.pick(&mut rng)));
        }
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn owned_fd_reports_errno() {
        let err = owned_fd(-1);
        assert!(err.is_err());
    }

    #[test]
    fn syscall_provider_fails_when_creator_fails() {
        fn refuse() -> io::Result<OwnedFd> {
            Err(io::Error::from_raw_os_error(libc::EPERM))
        }
        let mut provider = SyscallProvider::new("refused", 4, refuse);
        assert!(!provider.open());
    }

    #[test]
    fn syscall_provider_hands_out_opened_fds() {
        let mut provider = eventfd_provider();
        assert!(provider.open());
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let fd = provider.get(&mut rng);
        assert!(fd > 2);
        assert!(unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0);
    }
}
