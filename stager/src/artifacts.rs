//! Artifact identity: project names, versions, storage keys and metadata.

use crate::errors::{Result, StagerError};
use bytes::Bytes;
use indexmap::IndexMap;
use regex::Regex;
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub const PROJECT_NAME_EXPRESSION: &str = r"^[a-zA-Z0-9_\-\.]+$";

static PROJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(PROJECT_NAME_EXPRESSION).expect("project name expression is valid")
});

/// Key/value metadata attached to one staged artifact, in insertion order.
pub type Metadata = IndexMap<String, String>;

/// Validates a proposed project name.
pub fn validate_project_name(name: &str) -> Result<()> {
    if PROJECT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(StagerError::ProjectName {
            name: name.to_string(),
            expression: PROJECT_NAME_EXPRESSION,
        })
    }
}

pub fn make_fqn(project: &str, version: &Version) -> String {
    format!("{project}@{version}")
}

/// Storage key of an artifact. An empty prefix and no prefix are equivalent.
pub fn make_key(project: &str, version: &Version, prefix: Option<&str>) -> String {
    format!("{}{}", prefix.unwrap_or_default(), make_fqn(project, version))
}

pub fn make_metadata_key(project: &str, version: &Version, prefix: Option<&str>) -> String {
    format!("{}/metadata", make_key(project, version, prefix))
}

/// Identifies one immutable staged artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    project: String,
    version: Version,
}

impl ArtifactKey {
    pub fn new(project: impl Into<String>, version: Version) -> Result<Self> {
        let project = project.into();
        validate_project_name(&project)?;
        Ok(ArtifactKey { project, version })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn fqn(&self) -> String {
        make_fqn(&self.project, &self.version)
    }

    pub fn key(&self, prefix: Option<&str>) -> String {
        make_key(&self.project, &self.version, prefix)
    }

    pub fn metadata_key(&self, prefix: Option<&str>) -> String {
        make_metadata_key(&self.project, &self.version, prefix)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.project, self.version)
    }
}

/// A version as requested by a caller, before the latest one is resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionSpec {
    Latest,
    Exact(Version),
}

impl FromStr for VersionSpec {
    type Err = StagerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionSpec::Latest);
        }
        parse_version(s).map(VersionSpec::Exact)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Latest => f.write_str("latest"),
            VersionSpec::Exact(version) => version.fmt(f),
        }
    }
}

pub fn parse_version(s: &str) -> Result<Version> {
    Version::parse(s.trim()).map_err(|e| StagerError::InvalidVersion {
        version: s.to_string(),
        reason: e.to_string(),
    })
}

/// Serialises metadata as it is stored: keys sorted, two-space indent.
///
/// Returns `None` for empty metadata, which is never uploaded.
pub fn encode_metadata(metadata: &Metadata) -> Result<Option<Bytes>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    let sorted: BTreeMap<&String, &String> = metadata.iter().collect();
    let json = serde_json::to_vec_pretty(&sorted).map_err(StagerError::InvalidMetadata)?;
    Ok(Some(Bytes::from(json)))
}

pub fn decode_metadata(body: &[u8]) -> Result<Metadata> {
    serde_json::from_slice(body).map_err(StagerError::InvalidMetadata)
}
