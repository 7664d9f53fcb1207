//! Fixed-delay background loop over the ingestion pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::pipeline::LocalMappingIngestionPipeline;

/// Environment variable naming the watched directory.
pub const LOCAL_CODEMAPPING_FILE_PATH: &str = "LOCAL_CODEMAPPING_FILE_PATH";

pub const DEFAULT_INGESTION_DELAY: Duration = Duration::from_secs(60);

/// Interprets a directory setting: missing, blank or `none` disables
/// ingestion.
pub fn ingestion_directory(setting: Option<&str>) -> Option<PathBuf> {
    let setting = setting?.trim();
    if setting.is_empty() || setting.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(PathBuf::from(setting))
}

/// Runs a pass, sleeps for the delay, and repeats. The next pass is only
/// scheduled once the previous one has finished.
pub struct IngestionScheduler {
    pipeline: Arc<LocalMappingIngestionPipeline>,
    delay: Duration,
}

impl IngestionScheduler {
    pub fn new(pipeline: Arc<LocalMappingIngestionPipeline>, delay: Duration) -> Self {
        Self { pipeline, delay }
    }

    /// Starts the loop on the runtime. The first pass runs immediately.
    ///
    /// Dropping the returned handle detaches the loop: it keeps running
    /// until the runtime shuts down.
    pub fn spawn(self) -> IngestionHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(
                directory = %self.pipeline.settings().directory.display(),
                delay_secs = self.delay.as_secs(),
                "Local mapping ingestion started"
            );

            let mut detached = false;
            loop {
                if let Err(e) = self.pipeline.run_pass().await {
                    error!(error = %e, "Local mapping ingestion pass failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    changed = shutdown_rx.changed(), if !detached => {
                        if changed.is_ok() {
                            break;
                        }
                        // handle dropped without shutdown
                        detached = true;
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }

            info!("Local mapping ingestion stopped");
        });

        IngestionHandle { shutdown, task }
    }
}

/// Stops the ingestion loop.
#[must_use = "dropping the handle leaves no way to stop the ingestion loop"]
pub struct IngestionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IngestionHandle {
    /// Signals the loop and waits for it; a running pass finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Ingestion task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_directory_setting() {
        assert_eq!(ingestion_directory(None), None);
        assert_eq!(ingestion_directory(Some("  ")), None);
        assert_eq!(ingestion_directory(Some("None")), None);
        assert_eq!(
            ingestion_directory(Some("/var/lib/omopfhir/mappings")),
            Some(PathBuf::from("/var/lib/omopfhir/mappings"))
        );
    }
}
