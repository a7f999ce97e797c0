//! Lookups of project-scoped configuration.
//!
//! Some pseudo fields compile organization configuration into the query, such as the apdex
//! threshold of each project or the key transactions of a team. The storage of this configuration
//! is outside of this crate and accessed through [`ProjectStore`].

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The metric a transaction threshold applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMetric {
    /// The duration of the transaction.
    Duration,
    /// The largest contentful paint measurement.
    Lcp,
}

impl TransactionMetric {
    /// Returns the name of the metric as used in queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Lcp => "lcp",
        }
    }
}

impl fmt::Display for TransactionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The apdex threshold configured for a project.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProjectThreshold {
    /// The project the threshold applies to.
    pub project_id: u64,
    /// The measured metric.
    pub metric: TransactionMetric,
    /// The threshold in milliseconds.
    pub threshold: u64,
}

/// A threshold overriding the project threshold for a single transaction.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct TransactionThreshold {
    /// The name of the transaction.
    pub transaction: String,
    /// The project of the transaction.
    pub project_id: u64,
    /// The measured metric.
    pub metric: TransactionMetric,
    /// The threshold in milliseconds.
    pub threshold: u64,
}

/// A transaction a team marked as key transaction.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
pub struct KeyTransaction {
    /// The team that marked the transaction.
    pub team_id: u64,
    /// The project of the transaction.
    pub project_id: u64,
    /// The name of the transaction.
    pub transaction: String,
}

/// An error raised by a [`ProjectStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage could not be reached.
    #[error("project store unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The lookup failed for another reason.
    #[error("project store lookup failed: {0}")]
    Lookup(String),
}

/// Read-only access to project-scoped configuration.
///
/// Implementations must be safe to share across concurrent resolutions. Results are returned
/// ordered by project id.
pub trait ProjectStore: fmt::Debug + Send + Sync {
    /// Returns the project thresholds configured for the given projects.
    fn project_thresholds(
        &self,
        organization_id: u64,
        project_ids: &[u64],
    ) -> Result<Vec<ProjectThreshold>, StoreError>;

    /// Returns the per-transaction threshold overrides for the given projects.
    fn transaction_thresholds(
        &self,
        organization_id: u64,
        project_ids: &[u64],
    ) -> Result<Vec<TransactionThreshold>, StoreError>;

    /// Returns distinct `(project_id, transaction)` pairs marked as key transactions by any of
    /// the teams, ordered by transaction and project, and limited to `limit` entries.
    fn team_key_transactions(
        &self,
        organization_id: u64,
        team_ids: &[u64],
        project_ids: &[u64],
        limit: usize,
    ) -> Result<Vec<(u64, String)>, StoreError>;
}

/// A [`ProjectStore`] holding its configuration in memory.
///
/// When `organization_id` is set, lookups for any other organization return nothing.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InMemoryStore {
    /// The organization owning this configuration.
    pub organization_id: Option<u64>,
    /// Project thresholds.
    pub project_thresholds: Vec<ProjectThreshold>,
    /// Transaction threshold overrides.
    pub transaction_thresholds: Vec<TransactionThreshold>,
    /// Team key transactions.
    pub key_transactions: Vec<KeyTransaction>,
}

impl InMemoryStore {
    fn owns(&self, organization_id: u64) -> bool {
        self.organization_id.is_none_or(|id| id == organization_id)
    }
}

impl ProjectStore for InMemoryStore {
    fn project_thresholds(
        &self,
        organization_id: u64,
        project_ids: &[u64],
    ) -> Result<Vec<ProjectThreshold>, StoreError> {
        if !self.owns(organization_id) {
            return Ok(Vec::new());
        }

        Ok(self
            .project_thresholds
            .iter()
            .filter(|config| project_ids.contains(&config.project_id))
            .sorted_by_key(|config| config.project_id)
            .cloned()
            .collect())
    }

    fn transaction_thresholds(
        &self,
        organization_id: u64,
        project_ids: &[u64],
    ) -> Result<Vec<TransactionThreshold>, StoreError> {
        if !self.owns(organization_id) {
            return Ok(Vec::new());
        }

        Ok(self
            .transaction_thresholds
            .iter()
            .filter(|config| project_ids.contains(&config.project_id))
            .sorted_by_key(|config| config.project_id)
            .cloned()
            .collect())
    }

    fn team_key_transactions(
        &self,
        organization_id: u64,
        team_ids: &[u64],
        project_ids: &[u64],
        limit: usize,
    ) -> Result<Vec<(u64, String)>, StoreError> {
        if !self.owns(organization_id) {
            return Ok(Vec::new());
        }

        Ok(self
            .key_transactions
            .iter()
            .filter(|key| team_ids.contains(&key.team_id) && project_ids.contains(&key.project_id))
            .map(|key| (key.transaction.as_str(), key.project_id))
            .sorted()
            .dedup()
            .take(limit)
            .map(|(transaction, project_id)| (project_id, transaction.to_owned()))
            .collect())
    }
}
