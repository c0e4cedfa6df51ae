//! Per-step and aggregate outcomes of a platform sync.

use serde::{Deserialize, Serialize};

use crate::status::TaskType;
use crate::types::{DbId, Timestamp};

/// One unit of a full platform sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    PlatformInfo,
    Hosts,
    Vms,
    Datastores,
    Templates,
    Metrics,
}

impl SyncStep {
    /// The steps of a full sync, in execution order.
    pub const FULL_SYNC: [SyncStep; 5] = [
        SyncStep::PlatformInfo,
        SyncStep::Hosts,
        SyncStep::Vms,
        SyncStep::Datastores,
        SyncStep::Templates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlatformInfo => "platform_info",
            Self::Hosts => "hosts",
            Self::Vms => "vms",
            Self::Datastores => "datastores",
            Self::Templates => "templates",
            Self::Metrics => "metrics",
        }
    }

    /// Task type of a standalone run of this step.
    pub fn task_type(self) -> TaskType {
        match self {
            Self::PlatformInfo => TaskType::SyncPlatform,
            Self::Hosts => TaskType::SyncHosts,
            Self::Vms => TaskType::SyncVms,
            Self::Datastores => TaskType::SyncDatastores,
            Self::Templates => TaskType::SyncTemplates,
            Self::Metrics => TaskType::CollectMetrics,
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step. A failed step carries its error and zero counts
/// for whatever it did not reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: SyncStep,
    pub success: bool,
    pub synced_count: u64,
    pub failed_count: u64,
    pub created_count: u64,
    pub updated_count: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Step-specific facts (platform version, totals, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl StepReport {
    pub fn failed(step: SyncStep, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            synced_count: 0,
            failed_count: 0,
            created_count: 0,
            updated_count: 0,
            attempts,
            error: Some(error.into()),
            detail: None,
        }
    }
}

/// Aggregate of every step of one platform sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    pub platform_id: DbId,
    pub platform_name: String,
    pub results: Vec<StepReport>,
    pub sync_time: Timestamp,
}

impl SyncReport {
    pub fn total_synced(&self) -> u64 {
        self.results.iter().map(|r| r.synced_count).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.results.iter().map(|r| r.failed_count).sum()
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.results.iter().filter(|r| !r.success)
    }
}
