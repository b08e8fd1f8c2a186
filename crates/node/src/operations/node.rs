use super::configure::{self, HostDefaults};
use super::lock::NodeLock;
use super::{NodeError, StartOutcome, StopOutcome, UpdateOutcome};
use crate::cli::prompt::Prompt;
use crate::console::Console;
use crate::docker::{
    should_update, DockerEngine, ImageReference, NodeContainerSpec, NODE_CONTAINER_NAME,
    NODE_NETWORK_NAME,
};
use crate::scheduler::AutoUpdate;
use crate::status::StatusProbe;
use log::{debug, info, warn};
use shared::api::PlatformApi;
use shared::config::ConfigStore;
use shared::models::{NodeConfiguration, NodeStatus};
use std::fmt::Display;
use std::sync::Arc;

fn start_failed(e: impl Display) -> NodeError {
    debug!("Start failed: {e}");
    NodeError::StartFailed
}

fn engine_unavailable(e: impl Display) -> NodeError {
    debug!("Docker query failed: {e}");
    NodeError::EngineUnavailable
}

fn parse_image(image: &str) -> Result<ImageReference, NodeError> {
    image
        .parse()
        .map_err(|e| NodeError::InvalidInput(format!("Invalid image {image}: {e}")))
}

/// Drives the node through configure, start, update and stop. Every
/// mutating operation holds the node lock for its whole duration.
pub(crate) struct NodeController {
    engine: DockerEngine,
    store: ConfigStore,
    auto_update: AutoUpdate,
    probe: Arc<dyn StatusProbe>,
    api: Arc<dyn PlatformApi>,
    prompt: Arc<dyn Prompt>,
}

impl NodeController {
    pub(crate) fn new(
        engine: DockerEngine,
        store: ConfigStore,
        auto_update: AutoUpdate,
        probe: Arc<dyn StatusProbe>,
        api: Arc<dyn PlatformApi>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        Self {
            engine,
            store,
            auto_update,
            probe,
            api,
            prompt,
        }
    }

    fn lock(&self) -> Result<NodeLock, NodeError> {
        self.store.ensure_dir()?;
        Ok(NodeLock::acquire(self.store.dir())?)
    }

    fn load_config(&self) -> Result<NodeConfiguration, NodeError> {
        self.store.load_node()?.ok_or(NodeError::NotConfigured)
    }

    pub(crate) async fn status(&self) -> NodeStatus {
        self.probe.status().await
    }

    pub(crate) async fn is_running(&self) -> Result<bool, NodeError> {
        self.engine
            .container_running(NODE_CONTAINER_NAME)
            .await
            .map_err(engine_unavailable)
    }

    /// Interactive configuration: collects the settings, then registers and
    /// persists them through [`NodeController::configure`].
    pub(crate) async fn configure_interactive(
        &self,
        verbose: bool,
    ) -> Result<NodeConfiguration, NodeError> {
        let host = HostDefaults::detect(&self.engine).await?;
        let existing = self.store.load_node()?;
        let draft = configure::collect(
            self.prompt.as_ref(),
            self.api.as_ref(),
            &host,
            existing.as_ref(),
            verbose,
        )
        .await?;
        self.configure(draft).await
    }

    /// Validates `draft`, registers it with the platform and persists it.
    /// Nothing is written unless every step succeeds.
    pub(crate) async fn configure(
        &self,
        mut draft: NodeConfiguration,
    ) -> Result<NodeConfiguration, NodeError> {
        draft.validate()?;
        let _lock = self.lock()?;

        if let (true, Some(model_id)) = (draft.node_mode.requires_model(), draft.model_id) {
            self.api.get_model(model_id).await.map_err(|e| {
                debug!("{e}");
                NodeError::ModelNotFound(model_id)
            })?;
        }

        let registration = self
            .api
            .register_node(&draft.node_name, draft.node_mode)
            .await
            .map_err(|source| NodeError::Registration {
                name: draft.node_name.clone(),
                source,
            })?;
        draft.node_id = Some(registration.id);
        draft.node_access_token = Some(registration.access_token);

        self.store.save_node(&draft)?;
        info!("Node {} configured", draft.node_name);
        Ok(draft)
    }

    /// Starts the node, optionally switching to `image` first. A running node
    /// is only restarted after the operator confirms.
    pub(crate) async fn start(&self, image: Option<&str>) -> Result<StartOutcome, NodeError> {
        let _lock = self.lock()?;
        let mut config = self.load_config()?;
        if let Some(image) = image {
            config.image = parse_image(image)?.to_string();
        }
        config.validate_startable()?;
        let (image_ref, spec) = self.prepare(&config).await?;

        if self.is_running().await? {
            if !self
                .prompt
                .confirm("Node is already running. Do you want to restart it?", false)
            {
                return Ok(StartOutcome::Declined);
            }
            self.teardown().await?;
        }

        if image.is_some() {
            self.store.save_node(&config)?;
        }

        self.launch(&image_ref, &spec).await?;
        Ok(StartOutcome::Started)
    }

    /// Stops and removes the node container and its network. Every step is
    /// attempted even when an earlier one fails.
    pub(crate) async fn stop(&self) -> Result<StopOutcome, NodeError> {
        let _lock = self.lock()?;
        let exists = self
            .engine
            .container_exists(NODE_CONTAINER_NAME)
            .await
            .map_err(engine_unavailable)?;
        if !exists {
            return Ok(StopOutcome::AlreadyOffline);
        }

        if self.probe.status().await == NodeStatus::Busy
            && !self.prompt.confirm(
                "Node is busy, stopping it will terminate the current run. Continue?",
                false,
            )
        {
            return Ok(StopOutcome::Declined);
        }

        if let Some(node_id) = self.store.load_node()?.and_then(|c| c.node_id) {
            if let Err(e) = self.api.deactivate_node(node_id).await {
                warn!("Failed to report the node as offline to the platform");
                debug!("{e}");
            }
        }

        self.teardown().await?;
        Ok(StopOutcome::Stopped)
    }

    /// Replaces the running node with the newest image when it is idle or the
    /// operator agrees to interrupt it. `answer` pre-answers that question.
    pub(crate) async fn update(&self, answer: Option<bool>) -> Result<UpdateOutcome, NodeError> {
        let _lock = self.lock()?;
        let config = self.load_config()?;

        match self.probe.status().await {
            NodeStatus::Inactive | NodeStatus::Deleted => return Ok(UpdateOutcome::NotRunning),
            NodeStatus::Reconnecting => return Ok(UpdateOutcome::Reconnecting),
            NodeStatus::Busy if !self.confirm_interrupt(answer) => {
                return Ok(UpdateOutcome::Declined)
            }
            NodeStatus::Busy | NodeStatus::Active => {}
        }

        let (image, spec) = self.prepare(&config).await?;
        if !should_update(&self.engine, &image).await {
            return Ok(UpdateOutcome::UpToDate);
        }
        self.pull(&image).await?;

        // The pull can take minutes and the node may have picked up work.
        if self.probe.status().await == NodeStatus::Busy && !self.confirm_interrupt(answer) {
            return Ok(UpdateOutcome::Declined);
        }

        self.teardown().await.map_err(|_| NodeError::UpdateFailed)?;
        self.launch(&image, &spec).await.map_err(|e| match e {
            NodeError::StartFailed => NodeError::UpdateFailed,
            other => other,
        })?;
        Ok(UpdateOutcome::Updated)
    }

    fn confirm_interrupt(&self, answer: Option<bool>) -> bool {
        answer.unwrap_or_else(|| {
            self.prompt.confirm(
                "Node is busy, updating now will terminate the current run. Continue?",
                false,
            )
        })
    }

    async fn check_resources(&self, config: &NodeConfiguration) -> Result<(), NodeError> {
        let limits = self
            .engine
            .resource_limits()
            .await
            .map_err(engine_unavailable)?;

        if config.cpu_count > limits.cpu_count {
            return Err(NodeError::ResourceLimits {
                resource: "CPU count",
                configured: config.cpu_count.to_string(),
                available: limits.cpu_count.to_string(),
            });
        }
        if config.node_ram > limits.memory_gb {
            return Err(NodeError::ResourceLimits {
                resource: "RAM",
                configured: format!("{}GB", config.node_ram),
                available: format!("{}GB", limits.memory_gb),
            });
        }
        Ok(())
    }

    async fn pull(&self, image: &ImageReference) -> Result<(), NodeError> {
        let spinner = Console::spinner(&format!("Pulling image {image}"));
        let result = self.engine.image_pull(image).await;
        spinner.finish_and_clear();

        result.map_err(|e| {
            debug!("{e}");
            NodeError::PullFailed(image.to_string())
        })
    }

    /// Runs every check that can reject `config` before the running node is
    /// touched.
    async fn prepare(
        &self,
        config: &NodeConfiguration,
    ) -> Result<(ImageReference, NodeContainerSpec), NodeError> {
        let image = parse_image(&config.image)?;
        self.check_resources(config).await?;
        let user = self.store.load_user()?;
        Ok((image, NodeContainerSpec::from_config(config, &user.server_url)))
    }

    async fn launch(
        &self,
        image: &ImageReference,
        spec: &NodeContainerSpec,
    ) -> Result<(), NodeError> {
        if self
            .engine
            .container_exists(NODE_CONTAINER_NAME)
            .await
            .map_err(start_failed)?
        {
            debug!("Removing leftover container {NODE_CONTAINER_NAME}");
            self.engine
                .remove_container(NODE_CONTAINER_NAME)
                .await
                .map_err(start_failed)?;
        }

        if should_update(&self.engine, image).await {
            self.pull(image).await?;
        }

        let spinner = Console::spinner("Starting node");
        let result = match self.engine.create_network(NODE_NETWORK_NAME).await {
            Ok(()) => self.engine.start(spec).await,
            Err(e) => Err(e),
        };
        spinner.finish_and_clear();
        result.map_err(start_failed)?;
        info!("Node container {NODE_CONTAINER_NAME} started with {image}");

        if let Err(e) = self.auto_update.arm(&self.engine, spec).await {
            warn!("Failed to enable auto-update, run `coretex node update` manually");
            debug!("{e}");
        }
        if let Err(e) = self
            .engine
            .remove_dangling_images(&image.repository, &image.tag)
            .await
        {
            debug!("Failed to remove old node images: {e}");
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<(), NodeError> {
        let mut failed = false;

        if let Err(e) = self.engine.stop_container(NODE_CONTAINER_NAME).await {
            warn!("Failed to stop container {NODE_CONTAINER_NAME}");
            debug!("{e}");
            failed = true;
        }
        if let Err(e) = self.engine.remove_container(NODE_CONTAINER_NAME).await {
            warn!("Failed to remove container {NODE_CONTAINER_NAME}");
            debug!("{e}");
            failed = true;
        }
        match self.engine.network_exists(NODE_NETWORK_NAME).await {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = self.engine.remove_network(NODE_NETWORK_NAME).await {
                    warn!("Failed to remove network {NODE_NETWORK_NAME}");
                    debug!("{e}");
                    failed = true;
                }
            }
            Err(e) => {
                debug!("{e}");
                failed = true;
            }
        }

        if failed {
            return Err(NodeError::StopFailed);
        }
        Ok(())
    }
}
