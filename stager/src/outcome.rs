use crate::errors::StagerError;
use std::fmt;

/// The kind of regional work an outcome reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Stage,
    SaveConfiguration,
    DeleteConfiguration,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Stage => "stage",
            OperationKind::SaveConfiguration => "save_configuration",
            OperationKind::DeleteConfiguration => "delete_configuration",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one region's work, sent from its worker to the coordinator.
///
/// Errors are carried as data so one failing region never aborts the others.
#[derive(Debug)]
pub struct RegionOutcome {
    pub region: String,
    pub kind: OperationKind,
    pub error: Option<StagerError>,
}

impl RegionOutcome {
    pub fn ok(region: impl Into<String>, kind: OperationKind) -> Self {
        RegionOutcome {
            region: region.into(),
            kind,
            error: None,
        }
    }

    pub fn failed(region: impl Into<String>, kind: OperationKind, error: StagerError) -> Self {
        RegionOutcome {
            region: region.into(),
            kind,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
