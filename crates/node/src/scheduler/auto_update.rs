use super::{CronScheduler, SchedulerError};
use crate::docker::container::TRACING_CAPABILITY;
use crate::docker::{DockerEngine, NodeContainerSpec, NODE_PORT};
use crate::operations::lock::NodeLock;
use crate::process::ProcessRunner;
use crate::status::status_url;
use crate::APP_VERSION;
use log::{debug, info};
use shared::models::NodeStatus;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tera::{Context, Tera};

pub(crate) const START_SCRIPT: &str = "ctx_node_start.sh";
pub(crate) const UPDATE_SCRIPT: &str = "ctx_node_update.sh";
pub(crate) const AUTO_UPDATE_LOG: &str = "ctx_autoupdate.log";
const SCHEDULE: &str = "*/30 * * * *";

static START_TEMPLATE: &str = include_str!("templates/start.sh.j2");
static UPDATE_TEMPLATE: &str = include_str!("templates/update.sh.j2");

const TEMPLATES: &[(&str, &str)] = &[
    (START_SCRIPT, START_TEMPLATE),
    (UPDATE_SCRIPT, UPDATE_TEMPLATE),
];

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Keeps the node current without operator involvement: renders the start
/// and update scripts into the configuration directory and registers a
/// recurring job running the update script.
pub(crate) struct AutoUpdate {
    dir: PathBuf,
    cron: CronScheduler,
    tera: Tera,
}

impl AutoUpdate {
    pub(crate) fn new(
        runner: Arc<dyn ProcessRunner>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, SchedulerError> {
        let dir = dir.into();
        let mut tera = Tera::default();
        for (name, content) in TEMPLATES {
            tera.add_raw_template(name, content)
                .map_err(|source| SchedulerError::Template {
                    name: name.to_string(),
                    source,
                })?;
        }

        Ok(Self {
            cron: CronScheduler::new(runner, &dir),
            dir,
            tera,
        })
    }

    pub(crate) fn script_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub(crate) fn job_line(&self) -> String {
        format!(
            "{SCHEDULE} {} >> {} 2>&1",
            self.script_path(UPDATE_SCRIPT).display(),
            self.script_path(AUTO_UPDATE_LOG).display()
        )
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, SchedulerError> {
        self.tera
            .render(name, context)
            .map_err(|source| SchedulerError::Template {
                name: name.to_string(),
                source,
            })
    }

    pub(crate) fn render_start_script(
        &self,
        spec: &NodeContainerSpec,
        docker: &str,
    ) -> Result<String, SchedulerError> {
        let mut context = Context::new();
        context.insert("version", APP_VERSION);
        context.insert("docker", docker);
        context.insert("network", &spec.network);
        context.insert("container", &spec.name);
        context.insert("image", &spec.image);
        context.insert("port", &NODE_PORT);
        context.insert("capability", TRACING_CAPABILITY);
        context.insert("ram", &spec.ram_gb);
        context.insert("memory_swap", &spec.memory_swap_gb());
        context.insert("shared_memory", &spec.shared_memory_gb);
        context.insert("cpu_count", &spec.cpu_count);
        context.insert("allow_gpu", &spec.allow_gpu);

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| shell_quote(&format!("{key}={value}")))
            .collect();
        context.insert("env", &env);

        let volumes: Vec<String> = spec
            .volumes
            .iter()
            .map(|volume| shell_quote(&volume.as_arg()))
            .collect();
        context.insert("volumes", &volumes);

        self.render(START_SCRIPT, &context)
    }

    pub(crate) fn render_update_script(
        &self,
        spec: &NodeContainerSpec,
        docker: &str,
    ) -> Result<String, SchedulerError> {
        let mut context = Context::new();
        context.insert("version", APP_VERSION);
        context.insert("docker", docker);
        context.insert("image", &spec.image);
        context.insert("container", &spec.name);
        context.insert("status_url", &status_url());
        context.insert("active_status", &NodeStatus::Active.code());
        context.insert(
            "lock_file",
            &NodeLock::path_in(&self.dir).display().to_string(),
        );
        context.insert(
            "start_script",
            &self.script_path(START_SCRIPT).display().to_string(),
        );

        self.render(UPDATE_SCRIPT, &context)
    }

    fn write_script(&self, name: &str, contents: &str) -> Result<PathBuf, SchedulerError> {
        let path = self.script_path(name);
        let io_error = |source| SchedulerError::Io {
            path: path.clone(),
            source,
        };

        fs::write(&path, contents).map_err(io_error)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(io_error)?;
        debug!("Wrote {path:?}");
        Ok(path)
    }

    /// Writes both scripts for `spec` and registers the update job once.
    pub(crate) async fn arm(
        &self,
        engine: &DockerEngine,
        spec: &NodeContainerSpec,
    ) -> Result<(), SchedulerError> {
        let docker = engine.binary_path().await?;

        let start = self.render_start_script(spec, &docker)?;
        let update = self.render_update_script(spec, &docker)?;
        self.write_script(START_SCRIPT, &start)?;
        self.write_script(UPDATE_SCRIPT, &update)?;

        if self.cron.schedule(&self.job_line()).await? {
            info!("Auto-update enabled, checking for a new node image every 30 minutes");
        }
        Ok(())
    }
}
