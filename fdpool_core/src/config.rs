use crate::filter::FilterMode;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct WorkerSettings {
    /// Number of forked workers; also bounds the fd reuse lifetime.
    #[serde(default = "default_children")]
    pub children: u32,
    /// `get_reused_fd` calls each worker makes.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default)]
    pub seed: u64,
}

pub fn default_children() -> u32 {
    4
}

pub fn default_iterations() -> u64 {
    1_000
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            children: default_children(),
            iterations: default_iterations(),
            seed: 0,
        }
    }
}

/// Provider names to enable or disable. At most one list may be given.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub enable: Option<Vec<String>>,
    pub disable: Option<Vec<String>>,
}

impl ProviderSettings {
    /// Rejects names that would not survive the trip through the comma
    /// separated filter list.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.enable.is_some() && self.disable.is_some() {
            anyhow::bail!("providers.enable and providers.disable cannot both be set");
        }
        let lists = [("enable", &self.enable), ("disable", &self.disable)];
        for (key, names) in lists {
            for name in names.iter().flatten() {
                if name.is_empty() {
                    anyhow::bail!("providers.{} contains an empty provider name", key);
                }
                if name.contains(',') {
                    anyhow::bail!(
                        "providers.{} entry {:?} must name a single provider",
                        key,
                        name
                    );
                }
            }
        }
        Ok(())
    }

    /// The filter to apply, as the comma separated list the filter parser takes.
    /// Only lossless once `validate` has passed.
    pub fn filter(&self) -> Option<(FilterMode, String)> {
        match (&self.enable, &self.disable) {
            (Some(names), _) => Some((FilterMode::Enable, names.join(","))),
            (None, Some(names)) => Some((FilterMode::Disable, names.join(","))),
            (None, None) => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FdPoolConfig {
    #[serde(default)]
    pub workers: WorkerSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
}

impl FdPoolConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to load config file {:?}: {}", path, e)
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: FdPoolConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that cannot be honored together.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.providers.validate()
    }
}
