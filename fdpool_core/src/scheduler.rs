use crate::registry::ProviderRegistry;
use log::{debug, info};
use rand::Rng;
use rand_core::RngCore;

/// Counts reported once every enabled provider has had its chance to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSummary {
    pub enabled: usize,
    pub initialized: usize,
    /// Randomized passes made before the deterministic sweep.
    pub random_passes: usize,
}

/// An `OpenScheduler` decides in which order enabled providers get opened.
///
/// Every enabled provider must be offered `open` exactly once; failures are
/// final for the run.
pub trait OpenScheduler {
    /// Gives every enabled, unopened provider in `registry` its single chance
    /// to open.
    ///
    /// # Arguments
    /// * `registry`: The providers to open. Flags and counters are updated in
    ///   place as each `open` completes.
    /// * `rng`: Source of randomness for strategies that vary the open order.
    ///
    /// # Returns
    /// An `OpenSummary` with the final enabled and initialized counts.
    fn open_all(&mut self, registry: &mut ProviderRegistry, rng: &mut dyn RngCore) -> OpenSummary;
}

/// Opens about half of the requested providers in coin-flip order, then
/// sweeps the rest in registration order.
///
/// The randomized phase keeps going while fewer than `to_enable / 2`
/// providers are initialized. It stops early once no enabled provider is
/// left unopened, which happens when enough of them fail.
#[derive(Default, Debug)]
pub struct RandomizedOpenScheduler;

impl RandomizedOpenScheduler {
    /// Creates a new `RandomizedOpenScheduler`.
    pub fn new() -> Self {
        RandomizedOpenScheduler
    }

    fn open_pass(registry: &mut ProviderRegistry, rng: &mut dyn RngCore, randomize: bool) {
        for index in 0..registry.len() {
            let record = &registry.records()[index];
            if !record.enabled() || record.initialized() {
                continue;
            }
            // Mix up init order.
            if randomize && rng.random_bool(0.5) {
                continue;
            }
            let name = record.name();
            if registry.open_at(index) {
                debug!("fd provider {name} opened");
            } else {
                debug!("fd provider {name} failed to open, disabling");
            }
        }
    }

    fn has_unopened(registry: &ProviderRegistry) -> bool {
        registry
            .records()
            .iter()
            .any(|r| r.enabled() && !r.initialized())
    }

    /// Coin-flip passes until `to_enable / 2` providers are up or nothing is
    /// left to try. Returns the number of passes made.
    fn randomized_phase(registry: &mut ProviderRegistry, rng: &mut dyn RngCore) -> usize {
        let mut passes = 0;
        while registry.num_initialized() < registry.num_to_enable() / 2
            && Self::has_unopened(registry)
        {
            Self::open_pass(registry, rng, true);
            passes += 1;
        }
        passes
    }
}

impl OpenScheduler for RandomizedOpenScheduler {
    fn open_all(&mut self, registry: &mut ProviderRegistry, rng: &mut dyn RngCore) -> OpenSummary {
        let random_passes = Self::randomized_phase(registry, rng);
        Self::open_pass(registry, rng, false);

        info!(
            "Enabled {} fd providers: initialized:{}.",
            registry.num_enabled(),
            registry.num_initialized()
        );

        OpenSummary {
            enabled: registry.num_enabled(),
            initialized: registry.num_initialized(),
            random_passes,
        }
    }
}
