use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use super::ConfigGroup;
use crate::error::{CodecError, DecodeError};

/// An immutable view of the cluster configuration at one point in time.
///
/// Cloning is cheap; all clones share the same groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    generation: u64,
    groups: Arc<BTreeMap<String, ConfigGroup>>,
}

impl ConfigurationSnapshot {
    /// Builds a snapshot from `groups`. A later group replaces an earlier one with the same name.
    pub fn new(generation: u64, groups: impl IntoIterator<Item = ConfigGroup>) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| (group.name().to_owned(), group))
            .collect();
        ConfigurationSnapshot {
            generation,
            groups: Arc::new(groups),
        }
    }

    /// Generation of the source this snapshot was taken from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&ConfigGroup> {
        self.groups.get(name)
    }

    /// Returns `true` if the snapshot contains the named group.
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Iterates over the groups ordered by name.
    pub fn groups(&self) -> impl Iterator<Item = &ConfigGroup> {
        self.groups.values()
    }

    /// Iterates over the group names in order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if the snapshot has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns a snapshot holding only the requested groups. Names without a group are skipped.
    pub fn restrict(&self, requested: &BTreeSet<String>) -> ConfigurationSnapshot {
        let groups = requested
            .iter()
            .filter_map(|name| self.groups.get(name))
            .cloned();
        ConfigurationSnapshot::new(self.generation, groups)
    }

    pub(crate) fn to_msgpack(&self) -> Result<Vec<u8>, CodecError> {
        let body = SnapshotBodyRef {
            generation: self.generation,
            groups: self.groups.values().collect(),
        };
        rmp_serde::to_vec_named(&body).map_err(|err| CodecError::Serialize(err.to_string()))
    }

    pub(crate) fn from_msgpack(bytes: &[u8]) -> Result<Self, DecodeError> {
        let body: SnapshotBody =
            rmp_serde::from_slice(bytes).map_err(|err| DecodeError::Body(err.to_string()))?;
        let mut groups = BTreeMap::new();
        for group in body.groups {
            let name = group.name().to_owned();
            if groups.insert(name.clone(), group).is_some() {
                return Err(DecodeError::Body(format!("duplicate group '{name}'")));
            }
        }
        Ok(ConfigurationSnapshot {
            generation: body.generation,
            groups: Arc::new(groups),
        })
    }
}

/// Serializable mirror of a snapshot, borrowing the groups.
#[derive(Serialize)]
struct SnapshotBodyRef<'a> {
    generation: u64,
    groups: Vec<&'a ConfigGroup>,
}

#[derive(Deserialize)]
struct SnapshotBody {
    generation: u64,
    groups: Vec<ConfigGroup>,
}
