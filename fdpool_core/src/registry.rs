use crate::provider::{FdProvider, ProviderRecord};
use log::info;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("fd provider \"{0}\" is already registered")]
    DuplicateProvider(String),
}

/// Ordered set of fd providers plus the counters the scheduler and selector
/// consult.
///
/// Records keep registration order for the whole run; nothing is ever
/// removed. `initialized` and `enabled` counters are bumped together on every
/// successful open and never decremented.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    records: Vec<ProviderRecord>,
    pub(crate) to_enable: usize,
    pub(crate) num_enabled: usize,
    pub(crate) num_initialized: usize,
}

impl ProviderRegistry {
    /// Creates an empty registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `providers` in the given order and logs the
    /// resulting count.
    pub fn with_providers(
        providers: impl IntoIterator<Item = Box<dyn FdProvider>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        info!("Registered {} fd providers.", registry.len());
        Ok(registry)
    }

    /// Appends `provider` after the ones already registered.
    ///
    /// The record starts out enabled according to the provider's
    /// `default_enabled` and not initialized.
    ///
    /// # Arguments
    /// * `provider`: The provider to add. Its name must not already be taken.
    ///
    /// # Returns
    /// `Ok(())` on success, or `RegistryError::DuplicateProvider` if another
    /// provider already uses the same name.
    pub fn register(&mut self, provider: Box<dyn FdProvider>) -> Result<(), RegistryError> {
        if self.position(provider.name()).is_some() {
            return Err(RegistryError::DuplicateProvider(provider.name().to_string()));
        }
        self.records.push(ProviderRecord::new(provider));
        Ok(())
    }

    /// Total number of registered providers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of names an enable filter asked for (duplicates included).
    pub fn num_to_enable(&self) -> usize {
        self.to_enable
    }

    pub fn num_enabled(&self) -> usize {
        self.num_enabled
    }

    pub fn num_initialized(&self) -> usize {
        self.num_initialized
    }

    pub fn records(&self) -> &[ProviderRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&ProviderRecord> {
        self.position(name).map(|i| &self.records[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.records.iter().map(ProviderRecord::name)
    }

    pub fn has_eligible(&self) -> bool {
        self.records.iter().any(ProviderRecord::is_eligible)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name() == name)
    }

    pub(crate) fn records_mut(&mut self) -> &mut [ProviderRecord] {
        &mut self.records
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut ProviderRecord {
        &mut self.records[index]
    }

    /// Runs `open` on the record at `index` and folds the outcome into the
    /// flags and counters.
    pub(crate) fn open_at(&mut self, index: usize) -> bool {
        let record = &mut self.records[index];
        record.enabled = record.provider.open();
        if record.enabled {
            record.initialized = true;
            self.num_initialized += 1;
            self.num_enabled += 1;
        }
        record.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    fn boxed(p: ScriptedProvider) -> Box<dyn FdProvider> {
        Box::new(p)
    }

    #[test]
    fn register_keeps_order_and_defaults() {
        let registry = ProviderRegistry::with_providers([
            boxed(ScriptedProvider::new("a", 3)),
            boxed(ScriptedProvider::new("b", 4).disabled()),
            boxed(ScriptedProvider::new("c", 5)),
        ])
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(registry.get("a").unwrap().enabled());
        assert!(!registry.get("b").unwrap().enabled());
        assert!(registry.records().iter().all(|r| !r.initialized()));
        assert_eq!(registry.num_enabled(), 0);
        assert_eq!(registry.num_initialized(), 0);
        assert!(!registry.has_eligible());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ProviderRegistry::new();
        registry.register(boxed(ScriptedProvider::new("a", 3))).unwrap();
        let err = registry
            .register(boxed(ScriptedProvider::new("a", 9)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProvider("a".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn open_at_updates_flags_and_counters_together() {
        let mut registry = ProviderRegistry::with_providers([
            boxed(ScriptedProvider::new("ok", 3)),
            boxed(ScriptedProvider::new("bad", 4).failing()),
        ])
        .unwrap();

        assert!(registry.open_at(0));
        assert!(!registry.open_at(1));

        let ok = registry.get("ok").unwrap();
        assert!(ok.enabled() && ok.initialized());
        let bad = registry.get("bad").unwrap();
        assert!(!bad.enabled() && !bad.initialized());
        assert_eq!(registry.num_enabled(), 1);
        assert_eq!(registry.num_initialized(), 1);
        assert!(registry.has_eligible());
    }
}
