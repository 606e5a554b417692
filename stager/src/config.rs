//! Invocation environment.
//!
//! Read once per invocation and carried by the `Session`; nothing here is a
//! process-wide global.

use crate::configuration::DEFAULT_PARAMETER_NAME;
use crate::errors::{Result, StagerError};
use std::collections::HashMap;

pub const REGIONS_VARIABLE: &str = "STARTIFACT_REGIONS";
pub const PARAMETER_VARIABLE: &str = "STARTIFACT_PARAMETER";
pub const BUCKET_KEY_PREFIX_VARIABLE: &str = "STARTIFACT_BUCKET_KEY_PREFIX";
pub const BUCKET_PARAM_NAME_VARIABLE: &str = "STARTIFACT_BUCKET_PARAM_NAME";
pub const PARAMETER_NAME_PREFIX_VARIABLE: &str = "STARTIFACT_PARAMETER_NAME_PREFIX";

const VARIABLE_PREFIX: &str = "STARTIFACT_";

/// Values that replace the corresponding organisation configuration fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub bucket_key_prefix: Option<String>,
    pub bucket_param_name: Option<String>,
    pub parameter_name_prefix: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the `STARTIFACT_*` variables of the current process.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars().filter(|(k, _)| k.starts_with(VARIABLE_PREFIX)))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Environment {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// The regions to operate in. An empty or unset list is an error.
    pub fn regions(&self) -> Result<Vec<String>> {
        let regions = self.get(REGIONS_VARIABLE).map(parse_regions).unwrap_or_default();
        if regions.is_empty() {
            return Err(StagerError::NoRegionsConfigured {
                variable: REGIONS_VARIABLE.to_string(),
            });
        }
        Ok(regions)
    }

    /// Name of the parameter that holds the organisation configuration.
    pub fn configuration_parameter_name(&self) -> String {
        match self.get(PARAMETER_VARIABLE) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_PARAMETER_NAME.to_string(),
        }
    }

    /// Set variables override, even when empty: an empty prefix is legitimate.
    pub fn overrides(&self) -> Overrides {
        let get = |name: &str| self.get(name).map(str::to_string);
        Overrides {
            bucket_key_prefix: get(BUCKET_KEY_PREFIX_VARIABLE),
            bucket_param_name: get(BUCKET_PARAM_NAME_VARIABLE).filter(|v| !v.is_empty()),
            parameter_name_prefix: get(PARAMETER_NAME_PREFIX_VARIABLE),
        }
    }
}

/// Splits a comma-separated region list, dropping blanks.
pub fn parse_regions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
