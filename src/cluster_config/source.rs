use std::{
    collections::BTreeMap,
    fmt,
    sync::{PoisonError, RwLock},
};

use tracing::trace;

use super::{ConfigGroup, ConfigurationSnapshot};
use crate::error::BoxError;

/// Provides the configuration a running service hands out.
pub trait ConfigurationSource: fmt::Debug + Send + Sync + 'static {
    /// A counter which changes whenever the configuration changes.
    fn generation(&self) -> u64;

    /// Takes a snapshot of the whole configuration.
    fn snapshot(&self) -> Result<ConfigurationSnapshot, BoxError>;
}

/// A configuration source held in memory.
///
/// Every mutation bumps the generation.
#[derive(Debug, Default)]
pub struct InMemoryConfigurationSource {
    state: RwLock<SourceState>,
}

#[derive(Debug, Default)]
struct SourceState {
    generation: u64,
    groups: BTreeMap<String, ConfigGroup>,
}

impl InMemoryConfigurationSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source holding `groups`.
    pub fn with_groups(groups: impl IntoIterator<Item = ConfigGroup>) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| (group.name().to_owned(), group))
            .collect();
        InMemoryConfigurationSource {
            state: RwLock::new(SourceState {
                generation: 0,
                groups,
            }),
        }
    }

    /// Inserts or replaces a group, returning the previous one.
    pub fn put_group(&self, group: ConfigGroup) -> Option<ConfigGroup> {
        self.mutate(|groups| groups.insert(group.name().to_owned(), group))
    }

    /// Removes a group.
    pub fn remove_group(&self, name: &str) -> Option<ConfigGroup> {
        self.mutate(|groups| groups.remove(name))
    }

    /// Applies `f` to the named group, creating an empty group first if it does not exist.
    pub fn update_group<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut ConfigGroup),
    {
        self.mutate(|groups| {
            let group = groups
                .entry(name.to_owned())
                .or_insert_with(|| ConfigGroup::new(name));
            f(group)
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut BTreeMap<String, ConfigGroup>) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state.groups);
        state.generation += 1;
        trace!(generation = state.generation, "configuration changed");
        result
    }
}

impl ConfigurationSource for InMemoryConfigurationSource {
    fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    fn snapshot(&self) -> Result<ConfigurationSnapshot, BoxError> {
        let state = self
            .state
            .read()
            .map_err(|_| "configuration state is poisoned by a panicked writer")?;
        Ok(ConfigurationSnapshot::new(
            state.generation,
            state.groups.values().cloned(),
        ))
    }
}
