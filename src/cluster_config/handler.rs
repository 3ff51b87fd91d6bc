use std::{
    collections::BTreeSet,
    fmt,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use itertools::Itertools;
use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::{ConfigurationOutcome, ConfigurationSource, SnapshotCache};

/// Reason returned to requesters when the service is not enabled on this member.
pub(crate) const NOT_ENABLED_REASON: &str =
    "cluster configuration service is not enabled on this member; \
     enable it in the member configuration and restart";

/// Lifecycle of the cluster configuration service on this member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The feature is not enabled on this member.
    Disabled,
    /// The feature is enabled, initialization is in progress.
    Starting,
    /// The service hands out configuration.
    Running,
    /// The service has been stopped.
    Stopped,
}

const STARTING: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// The shared configuration service of one member.
///
/// A service which is enabled starts in [`ServiceStatus::Starting`] and becomes
/// [`ServiceStatus::Running`] once its [`ConfigurationSource`] is published with
/// [`mark_running`](Self::mark_running). The source can only be published once.
pub struct ClusterConfigurationService {
    enabled: bool,
    status: AtomicU8,
    source: OnceCell<Arc<dyn ConfigurationSource>>,
}

impl ClusterConfigurationService {
    /// Creates a service which is enabled and starting.
    pub fn enabled() -> Self {
        ClusterConfigurationService {
            enabled: true,
            status: AtomicU8::new(STARTING),
            source: OnceCell::new(),
        }
    }

    /// Creates a service for a member which does not run the feature.
    pub fn disabled() -> Self {
        ClusterConfigurationService {
            enabled: false,
            ..Self::enabled()
        }
    }

    /// The current status.
    pub fn status(&self) -> ServiceStatus {
        if !self.enabled {
            return ServiceStatus::Disabled;
        }
        match self.status.load(Ordering::Acquire) {
            RUNNING => ServiceStatus::Running,
            STOPPED => ServiceStatus::Stopped,
            _ => ServiceStatus::Starting,
        }
    }

    /// Publishes the configuration source and moves the service to running.
    ///
    /// Returns the source back if the service is disabled, stopped, or already has a source. A
    /// service stopped concurrently stays stopped.
    pub fn mark_running(
        &self,
        source: Arc<dyn ConfigurationSource>,
    ) -> Result<(), Arc<dyn ConfigurationSource>> {
        if !self.enabled || self.status.load(Ordering::Acquire) == STOPPED {
            return Err(source);
        }
        self.source.set(source.clone())?;
        match self
            .status
            .compare_exchange(STARTING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!("cluster configuration service is running");
                Ok(())
            }
            Err(_) => {
                debug!("cluster configuration service stopped while starting");
                Err(source)
            }
        }
    }

    /// Stops handing out configuration.
    pub fn stop(&self) {
        if self.enabled {
            self.status.store(STOPPED, Ordering::Release);
            info!("cluster configuration service stopped");
        }
    }

    fn running_source(&self) -> Option<&Arc<dyn ConfigurationSource>> {
        if self.status.load(Ordering::Acquire) != RUNNING {
            return None;
        }
        self.source.get()
    }
}

impl fmt::Debug for ClusterConfigurationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfigurationService")
            .field("status", &self.status())
            .finish()
    }
}

/// Answers cluster configuration requests from remote members.
#[derive(Debug)]
pub struct ClusterConfigurationHandler {
    service: Arc<ClusterConfigurationService>,
    cache: Option<SnapshotCache>,
}

impl ClusterConfigurationHandler {
    /// Creates a handler without a snapshot cache.
    pub fn new(service: Arc<ClusterConfigurationService>) -> Self {
        ClusterConfigurationHandler {
            service,
            cache: None,
        }
    }

    /// Creates a handler caching up to `capacity` restricted snapshots for `ttl`.
    ///
    /// A capacity of zero disables the cache.
    pub fn with_cache(
        service: Arc<ClusterConfigurationService>,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        ClusterConfigurationHandler {
            service,
            cache: NonZeroUsize::new(capacity).map(|capacity| SnapshotCache::new(capacity, ttl)),
        }
    }

    /// The service this handler answers for.
    pub fn service(&self) -> &Arc<ClusterConfigurationService> {
        &self.service
    }

    /// Produces the configuration of the `requested` groups.
    ///
    /// Unknown group names are left out of the snapshot. A fault raised by the configuration
    /// source is logged and returned as [`ConfigurationOutcome::Failed`].
    pub fn handle(&self, requested: &BTreeSet<String>) -> ConfigurationOutcome {
        debug!(groups = %requested.iter().join(", "), "cluster configuration requested");

        match self.service.status() {
            ServiceStatus::Disabled => {
                warn!("cluster configuration requested but the service is not enabled");
                return ConfigurationOutcome::Fatal(NOT_ENABLED_REASON.to_string());
            }
            ServiceStatus::Starting | ServiceStatus::Stopped => {
                return ConfigurationOutcome::NotReady;
            }
            ServiceStatus::Running => {}
        }
        let Some(source) = self.service.running_source() else {
            return ConfigurationOutcome::NotReady;
        };

        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(source.generation(), requested))
        {
            return ConfigurationOutcome::Ready(cached);
        }

        match source.snapshot() {
            Ok(snapshot) => {
                let restricted = snapshot.restrict(requested);
                if let Some(cache) = &self.cache {
                    cache.insert(requested.clone(), restricted.clone());
                }
                ConfigurationOutcome::Ready(restricted)
            }
            Err(err) => {
                error!("failed to assemble cluster configuration: {err}");
                ConfigurationOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        cluster_config::{ConfigGroup, ConfigurationSnapshot, InMemoryConfigurationSource},
        error::BoxError,
    };

    fn groups(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[derive(Debug)]
    struct CountingSource {
        inner: InMemoryConfigurationSource,
        snapshots: AtomicUsize,
    }

    impl ConfigurationSource for CountingSource {
        fn generation(&self) -> u64 {
            self.inner.generation()
        }

        fn snapshot(&self) -> Result<ConfigurationSnapshot, BoxError> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            self.inner.snapshot()
        }
    }

    #[test]
    fn disabled_service_is_fatal() {
        let handler = ClusterConfigurationHandler::new(Arc::new(
            ClusterConfigurationService::disabled(),
        ));
        match handler.handle(&groups(&["group1"])) {
            ConfigurationOutcome::Fatal(reason) => assert!(reason.contains("not enabled")),
            other => panic!("expected fatal outcome, got {other:?}"),
        }
    }

    #[test]
    fn disabled_service_refuses_a_source() {
        let service = ClusterConfigurationService::disabled();
        assert!(service
            .mark_running(Arc::new(InMemoryConfigurationSource::new()))
            .is_err());
        assert_eq!(service.status(), ServiceStatus::Disabled);
    }

    #[test]
    fn source_is_published_once() {
        let service = ClusterConfigurationService::enabled();
        assert_eq!(service.status(), ServiceStatus::Starting);
        service
            .mark_running(Arc::new(InMemoryConfigurationSource::new()))
            .unwrap();
        assert!(service
            .mark_running(Arc::new(InMemoryConfigurationSource::new()))
            .is_err());
        assert_eq!(service.status(), ServiceStatus::Running);
    }

    #[test]
    fn stopped_service_is_never_restarted() {
        let service = Arc::new(ClusterConfigurationService::enabled());
        service.stop();
        let rejected = service
            .mark_running(Arc::new(InMemoryConfigurationSource::new()))
            .unwrap_err();
        assert!(format!("{rejected:?}").contains("InMemoryConfigurationSource"));
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[test]
    fn stop_racing_startup_leaves_service_stopped() {
        for _ in 0..200 {
            let service = Arc::new(ClusterConfigurationService::enabled());
            let starter = {
                let service = service.clone();
                std::thread::spawn(move || {
                    service
                        .mark_running(Arc::new(InMemoryConfigurationSource::new()))
                        .is_ok()
                })
            };
            service.stop();
            starter.join().unwrap();
            assert_eq!(service.status(), ServiceStatus::Stopped);
            let handler = ClusterConfigurationHandler::new(service);
            assert_eq!(
                handler.handle(&groups(&["group1"])),
                ConfigurationOutcome::NotReady
            );
        }
    }

    #[test]
    fn stopped_service_is_not_ready() {
        let service = Arc::new(ClusterConfigurationService::enabled());
        service
            .mark_running(Arc::new(InMemoryConfigurationSource::new()))
            .unwrap();
        service.stop();
        let handler = ClusterConfigurationHandler::new(service);
        assert_eq!(
            handler.handle(&groups(&["group1"])),
            ConfigurationOutcome::NotReady
        );
    }

    #[test]
    fn cache_is_reused_until_generation_changes() {
        let source = Arc::new(CountingSource {
            inner: InMemoryConfigurationSource::with_groups([ConfigGroup::new("group1")]),
            snapshots: AtomicUsize::new(0),
        });
        let service = Arc::new(ClusterConfigurationService::enabled());
        service.mark_running(source.clone()).unwrap();
        let handler =
            ClusterConfigurationHandler::with_cache(service, 8, Duration::from_secs(60));

        let requested = groups(&["group1"]);
        assert!(handler.handle(&requested).is_ready());
        assert!(handler.handle(&requested).is_ready());
        assert_eq!(source.snapshots.load(Ordering::SeqCst), 1);

        source
            .inner
            .update_group("group1", |group| group.set_log_file_size_limit(Some(5)));
        match handler.handle(&requested) {
            ConfigurationOutcome::Ready(snapshot) => assert_eq!(
                snapshot.group("group1").unwrap().log_file_size_limit(),
                Some(5)
            ),
            other => panic!("expected ready outcome, got {other:?}"),
        }
        assert_eq!(source.snapshots.load(Ordering::SeqCst), 2);
    }
}
