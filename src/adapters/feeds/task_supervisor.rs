//! Feed Task Supervisor - Lifecycle Management for Feed Pipelines
//!
//! Spawns one tokio task per enabled feed. Pipelines recover dropped
//! sessions themselves; the supervisor only starts them, reports their
//! aggregate health for the /ready endpoint and stops them on shutdown.
//! One feed failing never touches another.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{build_handler, FeedTargets};
use crate::config::AppConfig;
use crate::ports::queue::{QueueBinding, QueueTransport};
use crate::ports::telemetry::Telemetry;
use crate::usecases::ingestion::{FeedPipeline, PipelineState};
use crate::usecases::retry::RetryPolicy;

/// Supervises all feed pipeline tasks.
pub struct FeedSupervisor {
    /// One pipeline per enabled feed.
    pipelines: Vec<Arc<FeedPipeline>>,
    /// Shutdown broadcaster shared with the rest of the service.
    shutdown_tx: broadcast::Sender<()>,
}

impl FeedSupervisor {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            pipelines: Vec::new(),
            shutdown_tx,
        }
    }

    /// Build a pipeline for every enabled feed in the configuration.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn QueueTransport>,
        targets: &FeedTargets,
        telemetry: Arc<dyn Telemetry>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let mut supervisor = Self::new(shutdown_tx);
        let retry = RetryPolicy::from(&config.retry);

        for feed in config.feeds.iter().filter(|f| f.enabled) {
            let handler = build_handler(feed, targets)?;
            let binding = QueueBinding {
                queue: feed.queue.clone(),
                prefetch: feed.prefetch(),
                consumer_tag: format!("{}-{}-{}", config.service.name, feed.name, Uuid::new_v4()),
            };

            let mut pipeline = FeedPipeline::new(handler, Arc::clone(&transport), binding)
                .with_retry(retry.clone())
                .with_telemetry(Arc::clone(&telemetry));
            if config.broker.auto_recovery {
                pipeline = pipeline.with_recovery(config.broker.recovery_interval());
            }
            supervisor.add(pipeline);
        }

        let disabled = config.feeds.len() - supervisor.pipelines.len();
        if disabled > 0 {
            info!(disabled, "Skipping disabled feeds");
        }
        Ok(supervisor)
    }

    pub fn add(&mut self, pipeline: FeedPipeline) {
        self.pipelines.push(Arc::new(pipeline));
    }

    pub fn pipelines(&self) -> &[Arc<FeedPipeline>] {
        &self.pipelines
    }

    /// Spawn every pipeline and return the join handles.
    #[instrument(skip(self))]
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let handles: Vec<_> = self
            .pipelines
            .iter()
            .map(|pipeline| {
                let pipeline = Arc::clone(pipeline);
                let shutdown_rx = self.shutdown_tx.subscribe();

                tokio::spawn(async move {
                    match pipeline.run(shutdown_rx).await {
                        Ok(()) => info!(feed = %pipeline.name(), "Feed pipeline exited normally"),
                        Err(e) => error!(
                            feed = %pipeline.name(),
                            error = %e,
                            "Feed pipeline gave up, staying disconnected"
                        ),
                    }
                })
            })
            .collect();

        info!(feed_count = handles.len(), "Feed tasks spawned");
        handles
    }

    /// Pipelines currently consuming.
    pub fn consuming_count(&self) -> usize {
        self.pipelines
            .iter()
            .filter(|p| p.state() == PipelineState::Consuming)
            .count()
    }

    /// At least one feed is consuming (degraded mode OK).
    pub fn is_healthy(&self) -> bool {
        self.consuming_count() > 0
    }

    /// Every feed is consuming.
    pub fn is_fully_healthy(&self) -> bool {
        !self.pipelines.is_empty() && self.consuming_count() == self.pipelines.len()
    }

    /// Stop every pipeline. Safe to call more than once.
    pub async fn stop_all(&self) {
        for pipeline in &self.pipelines {
            if pipeline.state() != PipelineState::Stopped {
                warn!(feed = %pipeline.name(), state = %pipeline.state(), "Stopping feed pipeline");
            }
            pipeline.stop().await;
        }
    }
}
