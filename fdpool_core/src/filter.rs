//! Command-line driven enable/disable selection of fd providers.

use crate::registry::ProviderRegistry;
use log::info;
use std::fmt;
use thiserror::Error;

/// Which kind of selection list is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Enable,
    Disable,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Enable => f.write_str("--enable-fds"),
            FilterMode::Disable => f.write_str("--disable-fds"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    /// A name in the list does not match any registered provider.
    #[error("Unknown {mode} parameter \"{name}\"")]
    UnknownProvider { mode: FilterMode, name: String },
}

/// Splits a comma separated provider list.
///
/// A single trailing comma is tolerated; every other empty element is kept so
/// it fails lookup like any other unknown name.
pub fn split_provider_list(list: &str) -> Vec<&str> {
    let mut names: Vec<&str> = list.split(',').collect();
    if names.last() == Some(&"") {
        names.pop();
    }
    names
}

/// Disables every provider, then enables exactly the named ones.
///
/// Each name bumps the registry's to-enable count, duplicates included. All
/// names are resolved before anything is touched, so an unknown name leaves
/// the registry as it was.
pub fn apply_enable_filter(registry: &mut ProviderRegistry, list: &str) -> Result<(), FilterError> {
    let indices = resolve(registry, list, FilterMode::Enable)?;

    for record in registry.records_mut() {
        record.enabled = false;
    }
    for index in indices {
        let record = registry.record_mut(index);
        record.enabled = true;
        info!("Enabled fd provider {}", record.name());
        registry.to_enable += 1;
    }
    Ok(())
}

/// Disables the named providers and leaves the rest alone.
pub fn apply_disable_filter(registry: &mut ProviderRegistry, list: &str) -> Result<(), FilterError> {
    let indices = resolve(registry, list, FilterMode::Disable)?;

    for index in indices {
        let record = registry.record_mut(index);
        record.enabled = false;
        info!("Disabled fd provider {}", record.name());
    }
    Ok(())
}

pub fn apply_filter(
    registry: &mut ProviderRegistry,
    mode: FilterMode,
    list: &str,
) -> Result<(), FilterError> {
    match mode {
        FilterMode::Enable => apply_enable_filter(registry, list),
        FilterMode::Disable => apply_disable_filter(registry, list),
    }
}

/// Usage text listing every provider name the filters accept.
pub fn filter_usage(registry: &ProviderRegistry) -> String {
    let mut usage = String::from("--enable-fds/--disable-fds takes comma separated list of:\n");
    for name in registry.names() {
        usage.push_str(&format!(" {name}\n"));
    }
    usage
}

fn resolve(
    registry: &ProviderRegistry,
    list: &str,
    mode: FilterMode,
) -> Result<Vec<usize>, FilterError> {
    split_provider_list(list)
        .into_iter()
        .map(|name| {
            registry
                .position(name)
                .ok_or_else(|| FilterError::UnknownProvider {
                    mode,
                    name: name.to_string(),
                })
        })
        .collect()
}
