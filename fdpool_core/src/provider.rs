use rand_core::RngCore;
use std::os::fd::RawFd;

/// An `FdProvider` knows how to produce one class of kernel-backed handle.
///
/// Providers are registered once at startup with a [`crate::ProviderRegistry`].
/// The registry decides whether a provider is opened at all, and only asks
/// it for handles after `open` succeeded.
pub trait FdProvider: Send {
    /// Unique name used on the command line (`--enable-fds=pipes,...`).
    fn name(&self) -> &'static str;

    /// Whether the provider is active when no filter is applied.
    fn default_enabled(&self) -> bool {
        true
    }

    /// Acquires the provider's underlying resources.
    ///
    /// Returns `false` when the kernel refuses (missing privileges, missing
    /// device, unsupported syscall). A provider that failed to open is never
    /// asked again during the run.
    fn open(&mut self) -> bool;

    /// Returns one of the handles acquired by `open`.
    ///
    /// Only called after `open` returned `true`.
    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd;
}

/// Registry-side state for one provider.
pub struct ProviderRecord {
    pub(crate) enabled: bool,
    pub(crate) initialized: bool,
    pub(crate) provider: Box<dyn FdProvider>,
}

impl ProviderRecord {
    pub(crate) fn new(provider: Box<dyn FdProvider>) -> Self {
        Self {
            enabled: provider.default_enabled(),
            initialized: false,
            provider,
        }
    }

    pub fn name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Enabled and already opened, i.e. usable for selection.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.initialized
    }
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("name", &self.name())
            .field("enabled", &self.enabled)
            .field("initialized", &self.initialized)
            .finish()
    }
}
