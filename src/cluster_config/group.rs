use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A named group of members sharing deployable artifacts and settings.
///
/// Jars, config files and regions are sets: adding a value that is already present is a no-op,
/// and no ordering between members of a set is implied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    name: String,
    jars: BTreeSet<String>,
    config_files: BTreeSet<String>,
    regions: BTreeSet<String>,
    properties: BTreeMap<String, String>,
    log_file_size_limit: Option<u64>,
}

impl ConfigGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        ConfigGroup {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The group's name, unique within a snapshot.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deployed jar file names.
    pub fn jars(&self) -> &BTreeSet<String> {
        &self.jars
    }

    /// Adds a jar, returning `false` if it was already deployed.
    pub fn add_jar(&mut self, jar: impl Into<String>) -> bool {
        self.jars.insert(jar.into())
    }

    /// Removes a jar, returning `true` if it was deployed.
    pub fn remove_jar(&mut self, jar: &str) -> bool {
        self.jars.remove(jar)
    }

    /// Configuration file names.
    pub fn config_files(&self) -> &BTreeSet<String> {
        &self.config_files
    }

    /// Adds a configuration file, returning `false` if it was already present.
    pub fn add_config_file(&mut self, file: impl Into<String>) -> bool {
        self.config_files.insert(file.into())
    }

    /// Removes a configuration file, returning `true` if it was present.
    pub fn remove_config_file(&mut self, file: &str) -> bool {
        self.config_files.remove(file)
    }

    /// Regions scoped to this group.
    pub fn regions(&self) -> &BTreeSet<String> {
        &self.regions
    }

    /// Adds a region, returning `false` if it was already present.
    pub fn add_region(&mut self, region: impl Into<String>) -> bool {
        self.regions.insert(region.into())
    }

    /// Removes a region, returning `true` if it was present.
    pub fn remove_region(&mut self, region: &str) -> bool {
        self.regions.remove(region)
    }

    /// Member properties applied to the group.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Sets a property, returning the previous value.
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    /// Maximum log file size in megabytes, if limited.
    pub fn log_file_size_limit(&self) -> Option<u64> {
        self.log_file_size_limit
    }

    /// Sets or clears the log file size limit.
    pub fn set_log_file_size_limit(&mut self, limit: Option<u64>) {
        self.log_file_size_limit = limit;
    }

    /// Builder form of [`add_jar`](Self::add_jar).
    pub fn with_jar(mut self, jar: impl Into<String>) -> Self {
        self.add_jar(jar);
        self
    }

    /// Builder form of [`add_config_file`](Self::add_config_file).
    pub fn with_config_file(mut self, file: impl Into<String>) -> Self {
        self.add_config_file(file);
        self
    }

    /// Builder form of [`add_region`](Self::add_region).
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.add_region(region);
        self
    }
}
