//! The organisation configuration document.
//!
//! One JSON document per organisation, replicated verbatim to every
//! configured region's parameter store. Every field is optional when read and
//! is filled with a default, so a missing parameter behaves like `{}`.

use crate::artifacts::ArtifactKey;
use crate::config::{Overrides, parse_regions};
use crate::errors::{Result, StagerError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PARAMETER_NAME: &str = "/startifact";

/// Defaulted organisation configuration.
///
/// Fields are declared alphabetically so the serialised document has sorted
/// keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub bucket_key_prefix: String,
    pub bucket_param_name: String,
    pub bucket_param_region: String,
    pub bucket_region: String,
    pub parameter_name_prefix: String,
    pub parameter_region: String,
    /// Comma-separated regions to operate in.
    pub regions: String,
    pub save_ok: String,
    pub start_ok: String,
}

#[derive(Debug, Default, Deserialize)]
struct StoredConfiguration {
    bucket_key_prefix: Option<String>,
    bucket_param_name: Option<String>,
    bucket_param_region: Option<String>,
    bucket_region: Option<String>,
    parameter_name_prefix: Option<String>,
    parameter_region: Option<String>,
    regions: Option<String>,
    save_ok: Option<String>,
    start_ok: Option<String>,
}

impl Configuration {
    /// An empty configuration as read from `region`.
    pub fn empty(region: &str) -> Self {
        Self::from_stored(StoredConfiguration::default(), region)
    }

    /// Parses a stored document and fills in defaults. Region fields default
    /// to the region the document was read from.
    pub fn from_json(raw: &str, region: &str) -> Result<Self> {
        let stored: StoredConfiguration =
            serde_json::from_str(raw).map_err(StagerError::InvalidConfiguration)?;
        Ok(Self::from_stored(stored, region))
    }

    fn from_stored(stored: StoredConfiguration, region: &str) -> Self {
        let or_region = |value: Option<String>| value.unwrap_or_else(|| region.to_string());
        Configuration {
            bucket_key_prefix: stored.bucket_key_prefix.unwrap_or_default(),
            bucket_param_name: stored.bucket_param_name.unwrap_or_default(),
            bucket_param_region: or_region(stored.bucket_param_region),
            bucket_region: or_region(stored.bucket_region),
            parameter_name_prefix: stored.parameter_name_prefix.unwrap_or_default(),
            parameter_region: or_region(stored.parameter_region),
            regions: stored.regions.unwrap_or_default(),
            save_ok: stored.save_ok.unwrap_or_default(),
            start_ok: stored.start_ok.unwrap_or_default(),
        }
    }

    /// Serialises the document as it is stored: sorted keys, two-space indent.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(StagerError::InvalidConfiguration)
    }

    pub fn region_list(&self) -> Vec<String> {
        parse_regions(&self.regions)
    }

    /// The bucket name parameter, which staging and downloading cannot do
    /// without.
    pub fn require_bucket_param_name(&self) -> Result<&str> {
        if self.bucket_param_name.is_empty() {
            return Err(StagerError::NoConfiguration {
                key: Some("bucket_param_name".into()),
            });
        }
        Ok(&self.bucket_param_name)
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(prefix) = &overrides.bucket_key_prefix {
            self.bucket_key_prefix = prefix.clone();
        }
        if let Some(name) = &overrides.bucket_param_name {
            self.bucket_param_name = name.clone();
        }
        if let Some(prefix) = &overrides.parameter_name_prefix {
            self.parameter_name_prefix = prefix.clone();
        }
    }

    /// Name of the parameter holding a project's latest version.
    pub fn latest_version_parameter_name(&self, project: &str) -> String {
        format!("{}/{project}/latest", self.parameter_name_prefix)
    }

    pub fn artifact_key(&self, artifact: &ArtifactKey) -> String {
        artifact.key(Some(&self.bucket_key_prefix))
    }

    pub fn metadata_key(&self, artifact: &ArtifactKey) -> String {
        artifact.metadata_key(Some(&self.bucket_key_prefix))
    }
}
