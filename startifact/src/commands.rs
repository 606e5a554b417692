use crate::config::{BackendConfig, Config};
use crate::{Cli, CliCommand, ConfigCommand};
use stager::backend::{Backend, FilesystemBackend, MemoryBackend};
use stager::config::parse_regions;
use stager::{Configuration, Environment, Metadata, Session, StagerError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Stager(#[from] StagerError),
    #[error("Could not save the configuration to every region.")]
    ReplicationFailed,
}

fn make_backend(config: &BackendConfig) -> Arc<dyn Backend> {
    match config {
        BackendConfig::Filesystem { base_dir } => Arc::new(FilesystemBackend::new(base_dir)),
        BackendConfig::Memory => {
            tracing::warn!("Using the memory backend; nothing will be kept");
            Arc::new(MemoryBackend::new())
        }
    }
}

pub async fn run(cli: Cli, config: &Config) -> Result<(), CliError> {
    let mut session = Session::new(make_backend(&config.backend), Environment::from_process())?
        .with_read_only(cli.dry_run);
    if let Some(concurrency) = config.concurrency {
        session = session.with_concurrency(concurrency);
    }

    match cli.command {
        CliCommand::Stage {
            project,
            version,
            path,
            metadata,
        } => {
            let metadata: Metadata = metadata.into_iter().collect();
            session
                .stage_file(&project, version, &path, &metadata)
                .await?;
        }

        CliCommand::Version { project } => {
            let version = session.latest_version(&project).await?;
            println!("{version}");
        }

        CliCommand::Metadata { project, version } => {
            let artifact = session.get(&project, version).await?;
            for (key, value) in artifact.metadata().await? {
                println!("{key}={value}");
            }
        }

        CliCommand::Download {
            project,
            path,
            version,
        } => {
            let artifact = session.get(&project, version).await?;
            artifact.download(&path).await?;
        }

        CliCommand::Config(ConfigCommand::Show) => {
            let configuration = session.stored_configuration().await?;
            println!("{}", configuration.to_json()?);
        }

        CliCommand::Config(ConfigCommand::Set {
            bucket_param_name,
            bucket_key_prefix,
            parameter_name_prefix,
            regions,
        }) => {
            let old = session.stored_configuration().await?.clone();
            let new = updated(
                &old,
                bucket_param_name,
                bucket_key_prefix,
                parameter_name_prefix,
                regions,
            );
            let delete_regions = dropped_regions(&old, &new);

            let report = session.save_configuration(&new, &delete_regions).await?;
            if !report.all_ok() {
                return Err(CliError::ReplicationFailed);
            }
        }
    }

    Ok(())
}

fn updated(
    old: &Configuration,
    bucket_param_name: Option<String>,
    bucket_key_prefix: Option<String>,
    parameter_name_prefix: Option<String>,
    regions: Option<String>,
) -> Configuration {
    let mut new = old.clone();
    if let Some(name) = bucket_param_name {
        new.bucket_param_name = name;
    }
    if let Some(prefix) = bucket_key_prefix {
        new.bucket_key_prefix = prefix;
    }
    if let Some(prefix) = parameter_name_prefix {
        new.parameter_name_prefix = prefix;
    }
    if let Some(regions) = regions {
        new.regions = parse_regions(&regions).join(",");
    }
    new
}

/// Regions the old configuration named that the new one does not.
fn dropped_regions(old: &Configuration, new: &Configuration) -> Vec<String> {
    let keep = new.region_list();
    old.region_list()
        .into_iter()
        .filter(|region| !keep.contains(region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updated_keeps_unset_fields() {
        let old = Configuration {
            bucket_param_name: "/old".into(),
            bucket_key_prefix: "builds/".into(),
            regions: "A,C".into(),
            ..Configuration::empty("A")
        };

        let new = updated(&old, Some("/new".into()), None, None, Some(" A, B ,".into()));
        assert_eq!(new.bucket_param_name, "/new");
        assert_eq!(new.bucket_key_prefix, "builds/");
        assert_eq!(new.regions, "A,B");
        assert_eq!(new.bucket_region, "A");
    }

    #[test]
    fn test_dropped_regions() {
        let old = Configuration {
            regions: "A,C,D".into(),
            ..Configuration::empty("A")
        };
        let new = Configuration {
            regions: "A,B".into(),
            ..Configuration::empty("A")
        };
        assert_eq!(dropped_regions(&old, &new), vec!["C", "D"]);
        assert!(dropped_regions(&new, &new).is_empty());
    }

    #[test]
    fn test_memory_backend() {
        let backend = make_backend(&BackendConfig::Memory);
        assert_eq!(backend.parameter_store("eu-west-2").region(), "eu-west-2");
    }
}
