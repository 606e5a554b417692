//! Stages versioned artifacts into several independently-failing regions and
//! resolves them back.
//!
//! Writes fan out to every region concurrently ([`stager`],
//! [`replication`]); reads interrogate regions in order and settle on one
//! answer ([`resolver`]). A [`session::Session`] ties them together for one
//! invocation.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod configuration;
pub mod errors;
pub mod fanout;
pub mod hash;
pub mod metrics_defs;
pub mod outcome;
pub mod parameters;
pub mod prober;
pub mod progress;
pub mod replication;
pub mod resolver;
pub mod session;
pub mod stager;
pub mod worker;

#[cfg(test)]
mod testutils;

pub use artifacts::{ArtifactKey, Metadata, VersionSpec};
pub use config::Environment;
pub use configuration::Configuration;
pub use errors::{Result, StagerError};
pub use session::{Artifact, Session};
