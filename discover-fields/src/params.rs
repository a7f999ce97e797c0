use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::expr::Aggregate;
use crate::store::ProjectStore;

/// An aggregate computed outside of function resolution.
///
/// Callers use these to inject ratios of other resolved aggregates under a field name. Resolving
/// that field name short-circuits to the stored aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecomputedAlias {
    /// The aggregate returned for the field.
    pub aggregate: Aggregate,
}

/// Shared, read-only context for resolving the fields of a single query.
///
/// Argument descriptors consult the time range for defaults and validation. Pseudo fields use the
/// organization, project and team ids for lookups against the [`ProjectStore`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Params {
    /// The organization the query runs in.
    pub organization_id: Option<u64>,
    /// The projects the query is scoped to.
    pub project_ids: Vec<u64>,
    /// The teams of the requesting user, required for key transactions.
    pub team_ids: Option<Vec<u64>>,
    /// Start of the queried time range.
    pub start: Option<DateTime<Utc>>,
    /// End of the queried time range.
    pub end: Option<DateTime<Utc>>,
    /// Optional environment filter.
    pub environment: Option<Vec<String>>,
    /// Precomputed aggregates by field name.
    #[serde(skip)]
    pub aliases: BTreeMap<String, PrecomputedAlias>,
    /// Lookups for project-scoped configuration.
    ///
    /// Without a store, all lookups behave as if nothing was configured.
    #[serde(skip)]
    pub store: Option<Arc<dyn ProjectStore>>,
}

impl Params {
    /// Creates parameters scoped to an organization and a set of projects.
    pub fn new(organization_id: u64, project_ids: impl Into<Vec<u64>>) -> Self {
        Self {
            organization_id: Some(organization_id),
            project_ids: project_ids.into(),
            ..Self::default()
        }
    }

    /// Sets the queried time range.
    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Sets the teams of the requesting user.
    pub fn with_teams(mut self, team_ids: impl Into<Vec<u64>>) -> Self {
        self.team_ids = Some(team_ids.into());
        self
    }

    /// Attaches a project store for lookups.
    pub fn with_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers a precomputed aggregate under a field name.
    pub fn with_alias(mut self, field: impl Into<String>, aggregate: Aggregate) -> Self {
        self.aliases
            .insert(field.into(), PrecomputedAlias { aggregate });
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_deserialize_params() {
        let params: Params = serde_json::from_str(
            r#"{
                "organization_id": 1,
                "project_ids": [2, 3],
                "start": "2021-01-01T00:00:00Z",
                "end": "2021-01-02T00:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(params.organization_id, Some(1));
        assert_eq!(params.project_ids, [2, 3]);
        assert_eq!(
            params.start,
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(params.team_ids.is_none());
        assert!(params.store.is_none());
    }
}
