//! Stage implementation lists.

use crate::core::StageId;
use crate::errors::ConfigError;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Static configuration of one stage: its implementations in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StageEntry", into = "StageEntry")]
pub struct StageConfig {
    stage: StageId,
    implementations: Vec<String>,
}

/// Serialized form of a stage: `{ primary, fallbacks }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StageEntry {
    #[serde(default)]
    primary: Option<String>,
    #[serde(default)]
    fallbacks: Vec<String>,
}

impl From<StageEntry> for StageConfig {
    fn from(entry: StageEntry) -> Self {
        let mut implementations = Vec::with_capacity(1 + entry.fallbacks.len());
        implementations.extend(entry.primary);
        implementations.extend(entry.fallbacks);
        // The owning table assigns the real stage id.
        Self {
            stage: StageId::Fetch,
            implementations,
        }
    }
}

impl From<StageConfig> for StageEntry {
    fn from(config: StageConfig) -> Self {
        let mut iter = config.implementations.into_iter();
        Self {
            primary: iter.next(),
            fallbacks: iter.collect(),
        }
    }
}

impl StageConfig {
    /// Creates a stage config from a primary and ordered fallbacks.
    #[must_use]
    pub fn new<I, S>(stage: StageId, primary: impl Into<String>, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut implementations = vec![primary.into()];
        implementations.extend(fallbacks.into_iter().map(Into::into));
        Self {
            stage,
            implementations,
        }
    }

    /// Creates a stage config from a raw ordered list, which may be empty.
    #[must_use]
    pub fn from_list<I, S>(stage: StageId, implementations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stage,
            implementations: implementations.into_iter().map(Into::into).collect(),
        }
    }

    /// The stage this config belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageId {
        self.stage
    }

    /// The primary implementation, if any.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.implementations.first().map(String::as_str)
    }

    /// Fallback implementations in configured order.
    #[must_use]
    pub fn fallbacks(&self) -> &[String] {
        self.implementations.get(1..).unwrap_or(&[])
    }

    /// Primary first, then fallbacks.
    #[must_use]
    pub fn implementations(&self) -> &[String] {
        &self.implementations
    }

    /// Checks that the list is non-empty, duplicate-free and well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.implementations.is_empty() {
            return Err(ConfigError::EmptyImplementations { stage: self.stage });
        }

        let mut seen = HashSet::with_capacity(self.implementations.len());
        for implementation in &self.implementations {
            if !is_valid_implementation_id(implementation) {
                return Err(ConfigError::InvalidImplementation {
                    stage: self.stage,
                    implementation: implementation.clone(),
                });
            }
            if !seen.insert(implementation.as_str()) {
                return Err(ConfigError::DuplicateImplementation {
                    stage: self.stage,
                    implementation: implementation.clone(),
                });
            }
        }
        Ok(())
    }

    fn with_stage(mut self, stage: StageId) -> Self {
        self.stage = stage;
        self
    }
}

fn is_valid_implementation_id(id: &str) -> bool {
    !id.trim().is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

/// Maps every stage to its config. Always holds all four stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StageEntries", into = "BTreeMap<StageId, StageConfig>")]
pub struct StageTable {
    stages: Vec<StageConfig>,
}

impl StageTable {
    /// Builds a table from one config per stage, in any order.
    pub fn new<I>(configs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = StageConfig>,
    {
        Self::from_entries(configs.into_iter().map(|c| (c.stage(), c)))
    }

    fn from_entries<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (StageId, StageConfig)>,
    {
        let mut map = BTreeMap::new();
        for (stage, config) in entries {
            if map.insert(stage, config).is_some() {
                return Err(ConfigError::DuplicateStage(stage));
            }
        }

        let mut stages = Vec::with_capacity(StageId::CHAIN.len());
        for stage in StageId::CHAIN {
            let config = map.remove(&stage).ok_or(ConfigError::MissingStage(stage))?;
            stages.push(config.with_stage(stage));
        }
        Ok(Self { stages })
    }

    /// Returns the config for a stage.
    #[must_use]
    pub fn get(&self, stage: StageId) -> &StageConfig {
        &self.stages[stage.index()]
    }

    /// Replaces the config for a stage.
    pub fn set(&mut self, config: StageConfig) {
        let index = config.stage().index();
        self.stages[index] = config;
    }

    /// Iterates configs in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages.iter()
    }

    /// Validates every stage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stages.iter().try_for_each(StageConfig::validate)
    }
}

/// Stage map entries in file order. Keys that alias the same stage are
/// kept apart so the table can reject them.
struct StageEntries(Vec<(StageId, StageConfig)>);

impl<'de> Deserialize<'de> for StageEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = StageEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of stage names to implementation lists")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = access.next_entry::<StageId, StageConfig>()? {
                    entries.push(entry);
                }
                Ok(StageEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl TryFrom<StageEntries> for StageTable {
    type Error = ConfigError;

    fn try_from(entries: StageEntries) -> Result<Self, Self::Error> {
        Self::from_entries(entries.0)
    }
}

impl From<StageTable> for BTreeMap<StageId, StageConfig> {
    fn from(table: StageTable) -> Self {
        table.stages.into_iter().map(|c| (c.stage(), c)).collect()
    }
}
