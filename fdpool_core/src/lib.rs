pub mod builtin;
pub mod cache;
pub mod config;
pub mod filter;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod shm;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use builtin::{builtin_providers, builtin_registry};
pub use cache::{AmortizedFdCache, NO_FD};
pub use config::FdPoolConfig;
pub use filter::{
    FilterError, FilterMode, apply_disable_filter, apply_enable_filter, apply_filter,
    filter_usage,
};
pub use provider::{FdProvider, ProviderRecord};
pub use registry::{ProviderRegistry, RegistryError};
pub use scheduler::{OpenScheduler, OpenSummary, RandomizedOpenScheduler};
pub use selector::{FdSelector, RandomFdSelector, SelectError};
pub use shm::{SharedFdSlot, SharedSlotError};
