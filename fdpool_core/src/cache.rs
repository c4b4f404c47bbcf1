use crate::registry::ProviderRegistry;
use crate::selector::{FdSelector, RandomFdSelector, SelectError};
use crate::shm::SharedFdSlot;
use rand::Rng;
use rand_core::RngCore;
use std::os::fd::RawFd;

/// Value of `current_fd` meaning nothing usable is cached.
///
/// This is also stdin's fd number; a provider that hands out fd 0 simply
/// gets asked again.
pub const NO_FD: RawFd = 0;

/// Lifetime bound paired with the worker count when reseeding.
const LIFETIME_PIVOT: u32 = 5;

/// Reuses one selected fd for a random number of consecutive calls before
/// selecting another.
///
/// The reuse state sits in a [`SharedFdSlot`], so all workers forked from
/// the same parent draw down a single lifetime. While `fd_lifetime` is zero
/// the next call selects; otherwise it decrements and returns the cached fd.
#[derive(Debug)]
pub struct AmortizedFdCache<S: FdSelector = RandomFdSelector> {
    slot: SharedFdSlot,
    selector: S,
    worker_count: u32,
}

impl AmortizedFdCache<RandomFdSelector> {
    /// Creates a cache over `slot` that selects with a [`RandomFdSelector`].
    ///
    /// # Arguments
    /// * `slot`: The reuse state, shared with every worker forked afterwards.
    /// * `worker_count`: Number of workers; bounds the lifetime drawn for each
    ///   freshly selected fd.
    pub fn new(slot: SharedFdSlot, worker_count: u32) -> Self {
        Self::with_selector(slot, RandomFdSelector::new(), worker_count)
    }
}

impl<S: FdSelector> AmortizedFdCache<S> {
    /// Like [`AmortizedFdCache::new`], with a caller-supplied selector.
    pub fn with_selector(slot: SharedFdSlot, selector: S, worker_count: u32) -> Self {
        Self {
            slot,
            selector,
            worker_count,
        }
    }

    pub fn slot(&self) -> &SharedFdSlot {
        &self.slot
    }

    /// Inclusive range a fresh lifetime is drawn from, smaller bound first.
    pub fn lifetime_bounds(&self) -> (u32, u32) {
        if self.worker_count > LIFETIME_PIVOT {
            (LIFETIME_PIVOT, self.worker_count)
        } else {
            (self.worker_count, LIFETIME_PIVOT)
        }
    }

    /// Returns the cached fd, or selects and caches a new one when the
    /// current lifetime ran out.
    ///
    /// Fails only when no provider is eligible; the slot then stays empty so
    /// the next call tries again.
    pub fn get_reused_fd(
        &mut self,
        registry: &mut ProviderRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<RawFd, SelectError> {
        loop {
            let lifetime = self.slot.fd_lifetime();
            if lifetime == 0 {
                let fd = self.selector.select_fd(registry, rng)?;
                self.slot.set_current_fd(fd);
                let (low, high) = self.lifetime_bounds();
                self.slot.set_fd_lifetime(rng.random_range(low..=high));
            } else {
                self.slot.set_fd_lifetime(lifetime - 1);
            }

            let fd = self.slot.current_fd();
            if fd == NO_FD {
                self.slot.set_fd_lifetime(0);
                continue;
            }
            return Ok(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FdProvider;
    use crate::scheduler::{OpenScheduler, RandomizedOpenScheduler};
    use crate::testing::{CallCounts, ScriptedProvider};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn opened(providers: Vec<ScriptedProvider>, rng: &mut ChaCha8Rng) -> ProviderRegistry {
        let mut registry = ProviderRegistry::with_providers(
            providers
                .into_iter()
                .map(|p| Box::new(p) as Box<dyn FdProvider>),
        )
        .unwrap();
        RandomizedOpenScheduler::new().open_all(&mut registry, rng);
        registry
    }

    fn cache(worker_count: u32) -> AmortizedFdCache {
        AmortizedFdCache::new(SharedFdSlot::new().unwrap(), worker_count)
    }

    /// Selector that counts how often the cache asks for a fresh fd.
    struct CountingSelector {
        inner: RandomFdSelector,
        calls: usize,
    }

    impl FdSelector for CountingSelector {
        fn select_fd(
            &mut self,
            registry: &mut ProviderRegistry,
            rng: &mut dyn RngCore,
        ) -> Result<RawFd, SelectError> {
            self.calls += 1;
            self.inner.select_fd(registry, rng)
        }
    }

    #[test]
    fn lifetime_bounds_put_smaller_value_first() {
        assert_eq!(cache(2).lifetime_bounds(), (2, 5));
        assert_eq!(cache(5).lifetime_bounds(), (5, 5));
        assert_eq!(cache(32).lifetime_bounds(), (5, 32));
    }

    #[test]
    fn cached_fd_is_reused_for_its_lifetime() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let a = ScriptedProvider::new("a", 7);
        let counts: CallCounts = a.counts();
        let mut registry = opened(vec![a, ScriptedProvider::new("b", 8).disabled()], &mut rng);
        let mut cache = AmortizedFdCache::with_selector(
            SharedFdSlot::new().unwrap(),
            CountingSelector {
                inner: RandomFdSelector::new(),
                calls: 0,
            },
            3,
        );

        assert_eq!(cache.get_reused_fd(&mut registry, &mut rng), Ok(7));
        let lifetime = cache.slot().fd_lifetime();
        assert!((3..=5).contains(&lifetime), "lifetime {lifetime} out of range");

        for _ in 0..lifetime {
            assert_eq!(cache.get_reused_fd(&mut registry, &mut rng), Ok(7));
        }
        assert_eq!(cache.selector.calls, 1);
        assert_eq!(counts.gets(), 1);
        assert_eq!(cache.slot().fd_lifetime(), 0);

        assert_eq!(cache.get_reused_fd(&mut registry, &mut rng), Ok(7));
        assert_eq!(cache.selector.calls, 2);
        assert_eq!(counts.gets(), 2);
    }

    #[test]
    fn large_worker_counts_draw_from_five_upwards() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut registry = opened(vec![ScriptedProvider::new("a", 7)], &mut rng);
        let mut cache = cache(64);

        for _ in 0..50 {
            cache.slot().set_fd_lifetime(0);
            cache.get_reused_fd(&mut registry, &mut rng).unwrap();
            let lifetime = cache.slot().fd_lifetime();
            assert!((5..=64).contains(&lifetime), "lifetime {lifetime} out of range");
        }
    }

    #[test]
    fn sentinel_fd_is_never_returned() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let zero_first = ScriptedProvider::new("a", 0).with_fds(vec![0, 9]);
        let counts = zero_first.counts();
        let mut registry = opened(vec![zero_first], &mut rng);
        let mut cache = cache(4);

        assert_eq!(cache.get_reused_fd(&mut registry, &mut rng), Ok(9));
        assert_eq!(counts.gets(), 2);
        assert_eq!(cache.slot().current_fd(), 9);

        for _ in 0..100 {
            assert_ne!(cache.get_reused_fd(&mut registry, &mut rng), Ok(NO_FD));
        }
    }

    #[test]
    fn zero_left_in_slot_by_another_worker_triggers_selection() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut registry = opened(vec![ScriptedProvider::new("a", 7)], &mut rng);
        let mut cache = cache(4);
        cache.slot().set_current_fd(NO_FD);
        cache.slot().set_fd_lifetime(3);

        assert_eq!(cache.get_reused_fd(&mut registry, &mut rng), Ok(7));
    }

    #[test]
    fn no_eligible_provider_keeps_cache_fresh() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let mut registry = opened(
            vec![
                ScriptedProvider::new("a", 7).disabled(),
                ScriptedProvider::new("b", 8).failing(),
            ],
            &mut rng,
        );
        let mut cache = cache(4);

        for _ in 0..10 {
            assert_eq!(
                cache.get_reused_fd(&mut registry, &mut rng),
                Err(SelectError::NoEligibleProviders)
            );
            assert_eq!(cache.slot().fd_lifetime(), 0);
        }
    }

    #[test]
    fn same_seed_gives_same_slot_transitions() {
        let run = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut registry = opened(
                vec![
                    ScriptedProvider::new("a", 3).with_fds(vec![3, 4]),
                    ScriptedProvider::new("b", 5).with_fds(vec![5, 6, 7]),
                    ScriptedProvider::new("c", 8),
                ],
                &mut rng,
            );
            let mut cache = cache(8);
            (0..200)
                .map(|_| {
                    let fd = cache.get_reused_fd(&mut registry, &mut rng).unwrap();
                    (fd, cache.slot().fd_lifetime())
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(15), run(15));
    }
}
