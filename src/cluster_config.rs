//! Serving the shared cluster configuration to remote members.
//!
//! A member which joins the cluster asks a locator for the configuration of the groups it belongs
//! to. The locator answers through the [`ClusterConfigurationHandler`], which produces one of the
//! [`ConfigurationOutcome`]s:
//!
//! - [`Fatal`](ConfigurationOutcome::Fatal) when the service is not enabled at all. The requester
//!   should fail fast, since the condition only goes away through reconfiguration.
//! - [`NotReady`](ConfigurationOutcome::NotReady) while the service is starting. The requester
//!   may retry later.
//! - [`Ready`](ConfigurationOutcome::Ready) with a snapshot restricted to the requested groups.
//! - [`Failed`](ConfigurationOutcome::Failed) when assembling the snapshot faulted. The fault is
//!   delivered to the requester as the result, so it can tell "the request reached the locator and
//!   failed" apart from "the request never arrived".

mod cache;
mod group;
mod handler;
mod snapshot;
mod source;

pub use cache::SnapshotCache;
pub use group::ConfigGroup;
pub use handler::{ClusterConfigurationHandler, ClusterConfigurationService, ServiceStatus};
pub use snapshot::ConfigurationSnapshot;
pub use source::{ConfigurationSource, InMemoryConfigurationSource};

use crate::error::ClusterConfigError;

/// The answer to a cluster configuration request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationOutcome {
    /// The service is not enabled on the answering member.
    Fatal(String),
    /// The service is enabled but not running yet.
    NotReady,
    /// The configuration of the requested groups.
    Ready(ConfigurationSnapshot),
    /// The request was received but assembling the snapshot failed.
    Failed(String),
}

impl ConfigurationOutcome {
    /// Returns `true` for [`ConfigurationOutcome::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, ConfigurationOutcome::Ready(_))
    }

    /// Converts the outcome into the form a requester acts on.
    ///
    /// `Ok(None)` means the service is still starting and the request may be retried.
    pub fn into_result(self) -> Result<Option<ConfigurationSnapshot>, ClusterConfigError> {
        match self {
            ConfigurationOutcome::Ready(snapshot) => Ok(Some(snapshot)),
            ConfigurationOutcome::NotReady => Ok(None),
            ConfigurationOutcome::Fatal(reason) => Err(ClusterConfigError::NotEnabled(reason)),
            ConfigurationOutcome::Failed(fault) => Err(ClusterConfigError::Remote(fault)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_separates_retryable_from_fatal() {
        assert_eq!(ConfigurationOutcome::NotReady.into_result(), Ok(None));

        let snapshot = ConfigurationSnapshot::new(1, [ConfigGroup::new("group1")]);
        assert_eq!(
            ConfigurationOutcome::Ready(snapshot.clone()).into_result(),
            Ok(Some(snapshot))
        );

        let err = ConfigurationOutcome::Fatal("not enabled".into())
            .into_result()
            .unwrap_err();
        assert_eq!(err, ClusterConfigError::NotEnabled("not enabled".into()));

        let err = ConfigurationOutcome::Failed("boom".into())
            .into_result()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cluster configuration request failed on the remote member: boom"
        );
    }
}
