//! Metrics definitions for the stager.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REGION_OPERATION: MetricDef = MetricDef {
    name: "region.operation",
    metric_type: MetricType::Counter,
    description: "Regional operations completed, tagged by operation and outcome",
};

pub const FANOUT_DURATION: MetricDef = MetricDef {
    name: "fanout.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a fan-out across all regions in seconds",
};

pub const RESOLVER_INTERROGATIONS: MetricDef = MetricDef {
    name: "resolver.interrogations",
    metric_type: MetricType::Counter,
    description: "Regions queried while resolving a value",
};

pub const RESOLVER_REGION_FAILURE: MetricDef = MetricDef {
    name: "resolver.region_failure",
    metric_type: MetricType::Counter,
    description: "Regions skipped while resolving a value because they failed",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REGION_OPERATION,
    FANOUT_DURATION,
    RESOLVER_INTERROGATIONS,
    RESOLVER_REGION_FAILURE,
];
