use crate::registry::ProviderRegistry;
use rand_core::RngCore;
use std::os::fd::RawFd;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    /// No provider is both enabled and initialized.
    #[error("no fd provider is enabled and initialized")]
    NoEligibleProviders,
}

/// An `FdSelector` hands out a fresh fd from one of the registry's providers.
pub trait FdSelector {
    /// Picks an eligible provider and returns one of its handles.
    ///
    /// # Arguments
    /// * `registry`: The providers to choose from. Mutable because providers
    ///   keep their own state while handing out fds.
    /// * `rng`: Source of randomness for the provider choice and passed on to
    ///   the chosen provider's `get`.
    ///
    /// # Returns
    /// The selected fd, or `SelectError::NoEligibleProviders` when no provider
    /// is both enabled and initialized.
    fn select_fd(
        &mut self,
        registry: &mut ProviderRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<RawFd, SelectError>;
}

/// Picks a provider by drawing an index over every registered provider and
/// redrawing until the draw lands on an eligible one.
///
/// Draws cover the whole registry rather than only the eligible records, so a
/// registry with few eligible providers just costs more redraws.
#[derive(Default, Debug)]
pub struct RandomFdSelector;

impl RandomFdSelector {
    /// Creates a new `RandomFdSelector`.
    pub fn new() -> Self {
        RandomFdSelector
    }
}

impl FdSelector for RandomFdSelector {
    fn select_fd(
        &mut self,
        registry: &mut ProviderRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<RawFd, SelectError> {
        if registry.num_enabled() == 0 || registry.num_initialized() == 0 {
            return Err(SelectError::NoEligibleProviders);
        }
        // Counters never go down, but a provider can still be disabled after
        // it opened; without an eligible record the redraw loop never ends.
        if !registry.has_eligible() {
            return Err(SelectError::NoEligibleProviders);
        }

        let total = registry.len() as u64;
        loop {
            let index = (rng.next_u64() % total) as usize;
            let record = registry.record_mut(index);
            if !record.is_eligible() {
                continue;
            }
            return Ok(record.provider.get(rng));
        }
    }
}
