//! Scripted providers for exercising the registry without touching the kernel.

use crate::provider::FdProvider;
use rand_core::RngCore;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Call counters shared between a [`ScriptedProvider`] and the test holding it.
#[derive(Debug, Default, Clone)]
pub struct CallCounts {
    opens: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
}

impl CallCounts {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

/// Records the order in which providers were opened.
#[derive(Debug, Default, Clone)]
pub struct OpenLog(Arc<Mutex<Vec<&'static str>>>);

impl OpenLog {
    pub fn names(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// A provider whose `open` result and handle values are fixed up front.
///
/// `get` cycles through `fds` in order, which keeps selection tests
/// independent of the provider's own randomness.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: &'static str,
    default_enabled: bool,
    open_result: bool,
    fds: Vec<RawFd>,
    next: usize,
    counts: CallCounts,
    open_log: Option<OpenLog>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, fd: RawFd) -> Self {
        Self {
            name,
            default_enabled: true,
            open_result: true,
            fds: vec![fd],
            next: 0,
            counts: CallCounts::default(),
            open_log: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.default_enabled = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.open_result = false;
        self
    }

    pub fn with_fds(mut self, fds: Vec<RawFd>) -> Self {
        assert!(!fds.is_empty(), "scripted provider needs at least one fd");
        self.fds = fds;
        self
    }

    pub fn with_open_log(mut self, log: OpenLog) -> Self {
        self.open_log = Some(log);
        self
    }

    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }
}

impl FdProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_enabled(&self) -> bool {
        self.default_enabled
    }

    fn open(&mut self) -> bool {
        self.counts.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.open_log {
            log.0.lock().unwrap().push(self.name);
        }
        self.open_result
    }

    fn get(&mut self, _rng: &mut dyn RngCore) -> RawFd {
        self.counts.gets.fetch_add(1, Ordering::SeqCst);
        let fd = self.fds[self.next % self.fds.len()];
        self.next += 1;
        fd
    }
}
