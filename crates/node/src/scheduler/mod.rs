pub(crate) mod auto_update;
pub(crate) mod cron;

pub(crate) use auto_update::AutoUpdate;
pub(crate) use cron::CronScheduler;

use crate::docker::EngineError;
use crate::process::CommandError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum SchedulerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to render {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },
}
