//! Source registry implementation
//!
//! The registry is built once at startup and never changes shape afterwards,
//! so lookups need no lock. All mutable state lives inside the supervisors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::{ConfigError, RelayConfig};
use crate::fanout::{ClientId, ClientSink};
use crate::process::{FfmpegLauncher, Launcher};
use crate::redact::Redactor;
use crate::source::{Source, SourceId};
use crate::supervisor::{StreamSupervisor, SupervisorConfig, SupervisorError};

use super::snapshot::SourceSnapshot;

/// Maps source ids to their supervisors
pub struct SourceRegistry {
    supervisors: HashMap<SourceId, Arc<StreamSupervisor>>,
    redactor: Redactor,
}

impl SourceRegistry {
    /// Build a registry from configuration, using ffmpeg as the transcoder
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let launcher = Arc::new(FfmpegLauncher::with_binary(config.transcoder.clone()));
        Self::from_config_with_launcher(config, launcher)
    }

    /// Build a registry from configuration with a custom launcher
    pub fn from_config_with_launcher(
        config: &RelayConfig,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_sources(
            config.sources(),
            config.supervisor_config(),
            launcher,
            config.redactor()?,
        ))
    }

    /// Build a registry with one inert supervisor per source
    ///
    /// No process is spawned until a client attaches. Transcoder stderr of
    /// every source is logged through `redactor`.
    pub fn from_sources(
        sources: impl IntoIterator<Item = Source>,
        config: SupervisorConfig,
        launcher: Arc<dyn Launcher>,
        redactor: Redactor,
    ) -> Self {
        let config = config.redactor(redactor.clone());
        let mut supervisors = HashMap::new();

        for source in sources {
            let id = source.id.clone();
            let supervisor =
                StreamSupervisor::new(Arc::new(source), config.clone(), Arc::clone(&launcher));

            tracing::info!(source = %id, name = %supervisor.source().name, "Source registered");

            if supervisors.insert(id.clone(), supervisor).is_some() {
                tracing::warn!(source = %id, "Duplicate source id, keeping the last definition");
            }
        }

        Self {
            supervisors,
            redactor,
        }
    }

    /// Look up a source's supervisor
    pub fn get(&self, id: &SourceId) -> Option<&Arc<StreamSupervisor>> {
        self.supervisors.get(id)
    }

    /// Check if a source is registered
    pub fn contains(&self, id: &SourceId) -> bool {
        self.supervisors.contains_key(id)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    /// Whether no sources are registered
    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    /// Registered source ids, sorted
    pub fn ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = self.supervisors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Attach a sink to a source
    ///
    /// Returns the supervisor so the caller can detach later.
    pub async fn add_client(
        &self,
        id: &SourceId,
        sink: Arc<dyn ClientSink>,
    ) -> Result<(Arc<StreamSupervisor>, ClientId), SupervisorError> {
        let supervisor = self
            .get(id)
            .ok_or_else(|| SupervisorError::SourceNotFound(id.clone()))?;

        let client = supervisor.add_client(sink).await?;
        Ok((Arc::clone(supervisor), client))
    }

    /// Per-source state with credentials redacted
    pub fn snapshot(&self) -> BTreeMap<String, SourceSnapshot> {
        self.supervisors
            .iter()
            .map(|(id, supervisor)| {
                let source = supervisor.source();
                let snapshot = SourceSnapshot::new(
                    &source.name,
                    supervisor.stats(),
                    self.redactor.redact(&source.upstream_uri),
                );
                (id.to_string(), snapshot)
            })
            .collect()
    }

    /// Stop every supervisor and release all processes
    pub async fn shutdown(&self) {
        tracing::info!(sources = self.supervisors.len(), "Stopping all sources");

        let mut stopping = JoinSet::new();
        for supervisor in self.supervisors.values() {
            let supervisor = Arc::clone(supervisor);
            stopping.spawn(async move { supervisor.stop().await });
        }

        while let Some(result) = stopping.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Source shutdown task failed");
            }
        }
    }
}
