//! Saves the organisation configuration to every configured region and
//! removes it from regions that are no longer configured.

use crate::backend::Backend;
use crate::configuration::Configuration;
use crate::errors::Result;
use crate::fanout::{FanOut, Job, all_ok};
use crate::outcome::{OperationKind, RegionOutcome};
use crate::progress::Progress;
use crate::worker::{RegionOperation, RegionWorker};

#[derive(Debug, Default)]
pub struct ReplicationReport {
    pub saves: Vec<RegionOutcome>,
    pub deletes: Vec<RegionOutcome>,
}

impl ReplicationReport {
    /// True only when every save and every delete succeeded.
    pub fn all_ok(&self) -> bool {
        all_ok(&self.saves) && all_ok(&self.deletes)
    }

    pub fn len(&self) -> usize {
        self.saves.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ConfigurationSaver<'a> {
    backend: &'a dyn Backend,
    fanout: FanOut,
    progress: &'a dyn Progress,
    parameter_name: String,
    read_only: bool,
}

impl<'a> ConfigurationSaver<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        fanout: FanOut,
        progress: &'a dyn Progress,
        parameter_name: impl Into<String>,
        read_only: bool,
    ) -> Self {
        ConfigurationSaver {
            backend,
            fanout,
            progress,
            parameter_name: parameter_name.into(),
            read_only,
        }
    }

    /// Saves `configuration` to `save_regions` and deletes it from
    /// `delete_regions`. The two sets run as independent pools at the same
    /// time, and no failure cancels a sibling.
    pub async fn save(
        &self,
        configuration: &Configuration,
        save_regions: &[String],
        delete_regions: &[String],
    ) -> Result<ReplicationReport> {
        let document = configuration.to_json()?;

        tracing::info!(
            save = ?save_regions,
            delete = ?delete_regions,
            read_only = self.read_only,
            "Replicating configuration"
        );

        let saves = self.jobs(save_regions, OperationKind::SaveConfiguration, |name| {
            RegionOperation::SaveConfig {
                name,
                document: document.clone(),
            }
        });
        let deletes = self.jobs(delete_regions, OperationKind::DeleteConfiguration, |name| {
            RegionOperation::DeleteConfig { name }
        });

        let (saves, deletes) = tokio::join!(
            self.fanout.run(saves, |outcome| self.report(outcome)),
            self.fanout.run(deletes, |outcome| self.report(outcome)),
        );

        Ok(ReplicationReport { saves, deletes })
    }

    fn jobs<F>(&self, regions: &[String], kind: OperationKind, operation: F) -> Vec<Job>
    where
        F: Fn(String) -> RegionOperation,
    {
        regions
            .iter()
            .map(|region| Job {
                worker: RegionWorker::new(self.backend, region).with_read_only(self.read_only),
                kind,
                operations: vec![operation(self.parameter_name.clone())],
            })
            .collect()
    }

    fn report(&self, outcome: &RegionOutcome) {
        let region = &outcome.region;
        let not_really = if self.read_only { " (not really)" } else { "" };
        let line = match (outcome.kind, &outcome.error) {
            (OperationKind::DeleteConfiguration, None) => {
                format!("Configuration deleted from {region}{not_really} OK! 🧁")
            }
            (OperationKind::DeleteConfiguration, Some(err)) => {
                format!("🔥 Failed to delete configuration from {region}: {err}")
            }
            (_, None) => format!("Configuration saved to {region}{not_really} OK! 🧁"),
            (_, Some(err)) => format!("🔥 Failed to save configuration to {region}: {err}"),
        };
        self.progress.line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, Call, MemoryBackend};
    use crate::progress::BufferProgress;
    use std::time::Duration;

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    fn fanout() -> FanOut {
        FanOut::default().with_poll_interval(Duration::from_millis(10))
    }

    fn configuration() -> Configuration {
        Configuration {
            bucket_param_name: "/bucket-name".into(),
            regions: "A,B".into(),
            ..Configuration::empty("A")
        }
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let backend = MemoryBackend::new();
        backend.set_parameter("C", "/startifact", "{}");
        let progress = BufferProgress::new();
        let saver = ConfigurationSaver::new(&backend, fanout(), &progress, "/startifact", false);

        let report = saver
            .save(&configuration(), &regions(&["A", "B"]), &regions(&["C"]))
            .await
            .unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.saves.len(), 2);
        assert_eq!(report.deletes.len(), 1);
        assert!(report.all_ok());

        let document = configuration().to_json().unwrap();
        assert_eq!(backend.parameter("A", "/startifact").unwrap(), document);
        assert_eq!(backend.parameter("B", "/startifact").unwrap(), document);
        assert!(backend.parameter("C", "/startifact").is_none());

        let mut lines = progress.lines();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "Configuration deleted from C OK! 🧁",
                "Configuration saved to A OK! 🧁",
                "Configuration saved to B OK! 🧁",
            ]
        );
    }

    #[tokio::test]
    async fn test_any_failure_fails_the_whole() {
        for failing in ["A", "B", "C"] {
            let backend = MemoryBackend::new();
            backend.fail_region(failing, BackendError::Other("down".into()));
            let progress = BufferProgress::new();
            let saver = ConfigurationSaver::new(&backend, fanout(), &progress, "/startifact", false);

            let report = saver
                .save(&configuration(), &regions(&["A", "B"]), &regions(&["C"]))
                .await
                .unwrap();

            assert_eq!(report.len(), 3, "{failing}");
            assert!(!report.all_ok(), "{failing}");
        }
    }

    #[tokio::test]
    async fn test_failure_lines() {
        let backend = MemoryBackend::new();
        backend.fail("A", Call::PutParameter, BackendError::PermissionDenied);
        backend.fail("C", Call::DeleteParameter, BackendError::Other("down".into()));
        let progress = BufferProgress::new();
        let saver = ConfigurationSaver::new(&backend, fanout(), &progress, "/startifact", false);

        saver
            .save(&configuration(), &regions(&["A"]), &regions(&["C"]))
            .await
            .unwrap();

        let lines = progress.lines();
        assert!(lines.iter().any(|l| l.starts_with(
            "🔥 Failed to save configuration to A: You do not have permission to put"
        )));
        assert!(lines.contains(&"🔥 Failed to delete configuration from C: C: down".to_string()));
    }

    #[tokio::test]
    async fn test_read_only_reads_but_never_writes() {
        let backend = MemoryBackend::new();
        backend.set_parameter("C", "/startifact", "{}");
        let progress = BufferProgress::new();
        let saver = ConfigurationSaver::new(&backend, fanout(), &progress, "/startifact", true);

        let report = saver
            .save(&configuration(), &regions(&["A", "B"]), &regions(&["C"]))
            .await
            .unwrap();

        assert!(report.all_ok());
        assert_eq!(backend.total_calls(Call::GetParameter), 3);
        assert_eq!(backend.total_calls(Call::PutParameter), 0);
        assert_eq!(backend.total_calls(Call::DeleteParameter), 0);
        assert_eq!(backend.parameter("C", "/startifact").unwrap(), "{}");
        assert!(
            progress
                .lines()
                .contains(&"Configuration saved to A (not really) OK! 🧁".to_string())
        );
    }

    #[tokio::test]
    async fn test_nothing_to_do() {
        let backend = MemoryBackend::new();
        let progress = BufferProgress::new();
        let saver = ConfigurationSaver::new(&backend, fanout(), &progress, "/startifact", false);

        let report = saver.save(&configuration(), &[], &[]).await.unwrap();
        assert!(report.is_empty());
        assert!(report.all_ok());
    }
}
