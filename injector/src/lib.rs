//! Dependency injection to enable easy access to process-global resources.
use std::sync::Arc;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use shardctl_collab::broker::Broker;
use shardctl_collab::cluster::Cluster;
use shardctl_collab::distribution::Distribution;
use shardctl_collab::meta::Meta;
use shardctl_collab::target::Target;
use shardctl_context::Context;
use shardctl_scheduler::config::SchedulerConf;
use shardctl_scheduler::Scheduler;

/// Singleton instance of the process globals container.
static GLOBAL_INJECTOR: Lazy<RwLock<Option<Injector>>> = Lazy::new(|| RwLock::new(None));

/// Container for all process-global dependencies the scheduler and its surrounding
/// process need: the collaborator handles it schedules work against, the scoped-context
/// root, and the process configuration.
#[derive(Clone)]
pub struct Injector {
    /// Process-global context to derive scoped contexts from.
    pub context: Context,

    /// Process configuration for the scheduler.
    pub conf: SchedulerConf,

    /// Recovery-info broker.
    pub broker: Arc<dyn Broker>,

    /// RPC client to data-plane nodes.
    pub cluster: Arc<dyn Cluster>,

    /// Observed placement.
    pub distribution: Arc<dyn Distribution>,

    /// Replica/collection metadata.
    pub meta: Arc<dyn Meta>,

    /// Desired placement.
    pub target: Arc<dyn Target>,

    /// The task scheduler itself, wired against the collaborator handles above.
    pub scheduler: Arc<Scheduler>,
}

impl Injector {
    /// Get the globally set [`Injector`] instance.
    ///
    /// # Panics
    ///
    /// Panics if no [`Injector`] was set during process initialisation.
    pub fn global() -> Injector {
        GLOBAL_INJECTOR
            .read()
            .expect("GLOBAL_INJECTOR RwLock poisoned")
            .as_ref()
            .expect("global injector is not initialised")
            .clone()
    }

    /// Set the [`Injector`] instance for the process to fetch with [`Injector::global`].
    ///
    /// # Panics
    ///
    /// Panics if an [`Injector`] has already been set.
    pub fn set_global(injector: Injector) {
        let mut global_injector = GLOBAL_INJECTOR
            .write()
            .expect("GLOBAL_INJECTOR RwLock poisoned");
        if global_injector.is_some() {
            drop(global_injector);
            panic!("global injector already initialised");
        }
        slog::trace!(
            injector.context.logger,
            "Initialising Global Injector for the process"
        );
        *global_injector = Some(injector);
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Injector {
    /// [`Injector`] instance backed entirely by in-memory fixtures, for unit tests.
    pub fn fixture() -> Injector {
        let context = Context::fixture();
        let conf = SchedulerConf::default();
        let broker: Arc<dyn Broker> = Arc::new(shardctl_collab::broker::fixture::MemoryBroker::new());
        let cluster: Arc<dyn Cluster> = Arc::new(shardctl_collab::cluster::fixture::MemoryCluster::new());
        let distribution: Arc<dyn Distribution> =
            Arc::new(shardctl_collab::distribution::fixture::MemoryDistribution::new());
        let meta: Arc<dyn Meta> = Arc::new(shardctl_collab::meta::fixture::MemoryMeta::new());
        let target: Arc<dyn Target> = Arc::new(shardctl_collab::target::fixture::MemoryTarget::new());
        let scheduler = Scheduler::new(
            context.clone(),
            conf.clone(),
            broker.clone(),
            cluster.clone(),
            distribution.clone(),
            target.clone(),
            meta.clone(),
        );
        Injector {
            context,
            conf,
            broker,
            cluster,
            distribution,
            meta,
            target,
            scheduler,
        }
    }
}
