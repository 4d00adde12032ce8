//! Workload classification of logical operation names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadCategory {
    Transactional,
    Lookup,
    Crud,
    Analytics,
    Aggregation,
    Reporting,
    Batch,
    Complex,
    Maintenance,
}

impl WorkloadCategory {
    pub const ALL: [WorkloadCategory; 9] = [
        Self::Transactional,
        Self::Lookup,
        Self::Crud,
        Self::Analytics,
        Self::Aggregation,
        Self::Reporting,
        Self::Batch,
        Self::Complex,
        Self::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::Lookup => "lookup",
            Self::Crud => "crud",
            Self::Analytics => "analytics",
            Self::Aggregation => "aggregation",
            Self::Reporting => "reporting",
            Self::Batch => "batch",
            Self::Complex => "complex",
            Self::Maintenance => "maintenance",
        }
    }

    /// Built-in preferred instance for this category.
    pub fn default_instance(&self) -> &'static str {
        match self {
            Self::Transactional | Self::Lookup | Self::Crud => "primary",
            Self::Analytics | Self::Aggregation | Self::Complex => "analytics",
            Self::Reporting | Self::Batch | Self::Maintenance => "reporting",
        }
    }
}

impl fmt::Display for WorkloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown workload category '{s}'"))
    }
}

const CLASSIFICATION: &[(&str, WorkloadCategory)] = &[
    ("employees.list", WorkloadCategory::Lookup),
    ("employees.high_salary", WorkloadCategory::Lookup),
    ("employees.create", WorkloadCategory::Crud),
    ("analytics.salary_stats", WorkloadCategory::Analytics),
    ("analytics.hiring_trend", WorkloadCategory::Aggregation),
    ("reports.salary_bands", WorkloadCategory::Reporting),
    ("queries.complex", WorkloadCategory::Complex),
    ("queries.slow", WorkloadCategory::Batch),
    ("health.probe", WorkloadCategory::Maintenance),
];

/// Classify an operation. Unmapped names are transactional.
pub fn classify(operation: &str) -> WorkloadCategory {
    CLASSIFICATION
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, category)| *category)
        .unwrap_or(WorkloadCategory::Transactional)
}
