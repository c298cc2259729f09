//! Grouped-count aggregation.
//!
//! Maintains the count of records per distinct value of the key column,
//! counting either all non-null values of the count column (SQL
//! `count(col)`) or its distinct values (`count(distinct col)`).
//!
//! Because the source never re-emits a consumed file, the aggregate carries
//! its own state across batches and restarts: it is serialized into the sink
//! checkpoint partition alongside the committed table version. Records whose
//! key column is null are grouped under the empty-string key.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{AggregateConfig, CountPolicy};
use crate::source::Record;

/// One `(group key, count)` pair of the aggregate output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: String,
    pub count: u64,
}

/// Serializable aggregate state, checkpointed between batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum AggregateState {
    /// Per-key counts of non-null count-column values.
    All { counts: BTreeMap<String, u64> },
    /// Per-key sets of distinct count-column values.
    Distinct {
        seen: BTreeMap<String, BTreeSet<String>>,
    },
}

impl AggregateState {
    fn for_policy(policy: CountPolicy) -> Self {
        match policy {
            CountPolicy::All => AggregateState::All {
                counts: BTreeMap::new(),
            },
            CountPolicy::Distinct => AggregateState::Distinct {
                seen: BTreeMap::new(),
            },
        }
    }

    /// The policy this state was accumulated under.
    pub fn policy(&self) -> CountPolicy {
        match self {
            AggregateState::All { .. } => CountPolicy::All,
            AggregateState::Distinct { .. } => CountPolicy::Distinct,
        }
    }
}

/// Running grouped-count aggregator.
pub struct Aggregator {
    key_column: String,
    count_column: String,
    state: AggregateState,
}

impl Aggregator {
    /// Create an empty aggregator for the configured policy.
    pub fn new(config: &AggregateConfig) -> Self {
        Self {
            key_column: config.key_column.clone(),
            count_column: config.count_column.clone(),
            state: AggregateState::for_policy(config.policy()),
        }
    }

    /// Resume from checkpointed state.
    ///
    /// If the checkpointed state was accumulated under a different policy
    /// than the config now asks for, it is discarded and counting starts
    /// empty; mixing the two would produce counts that are neither.
    pub fn resume(config: &AggregateConfig, state: AggregateState) -> Self {
        let state = if state.policy() == config.policy() {
            state
        } else {
            tracing::warn!(
                checkpointed = ?state.policy(),
                configured = ?config.policy(),
                "Aggregate policy changed, discarding checkpointed counts"
            );
            AggregateState::for_policy(config.policy())
        };

        Self {
            key_column: config.key_column.clone(),
            count_column: config.count_column.clone(),
            state,
        }
    }

    /// Fold one record into the aggregate.
    pub fn observe(&mut self, record: &Record) {
        // SQL count(col) semantics: null values of the count column do not count
        let Some(value) = record.get(&self.count_column) else {
            return;
        };
        let key = record.get(&self.key_column).unwrap_or_default().to_string();

        match &mut self.state {
            AggregateState::All { counts } => {
                *counts.entry(key).or_insert(0) += 1;
            }
            AggregateState::Distinct { seen } => {
                seen.entry(key).or_default().insert(value.to_string());
            }
        }
    }

    /// Current `(key, count)` snapshot, sorted by key.
    ///
    /// Exactly one row per distinct key value.
    pub fn snapshot(&self) -> Vec<AggregateRow> {
        match &self.state {
            AggregateState::All { counts } => counts
                .iter()
                .map(|(key, count)| AggregateRow {
                    key: key.clone(),
                    count: *count,
                })
                .collect(),
            AggregateState::Distinct { seen } => seen
                .iter()
                .map(|(key, values)| AggregateRow {
                    key: key.clone(),
                    count: values.len() as u64,
                })
                .collect(),
        }
    }

    /// The state to checkpoint after a committed batch.
    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    /// Number of distinct group keys seen so far.
    pub fn group_count(&self) -> usize {
        match &self.state {
            AggregateState::All { counts } => counts.len(),
            AggregateState::Distinct { seen } => seen.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::source::CsvReader;
    use std::sync::Arc;

    fn config(distinct: bool) -> AggregateConfig {
        AggregateConfig {
            key_column: "state".to_string(),
            count_column: "customer_name".to_string(),
            distinct,
            output_column: "customer_count".to_string(),
        }
    }

    fn records(data: &str) -> Vec<Record> {
        let schema = Arc::new(Schema::from_columns(
            ["customer_name", "state"].map(str::to_string),
        ));
        CsvReader::new(schema, "test".to_string())
            .read(data.as_bytes(), "test.csv")
            .records
    }

    #[test]
    fn test_count_all_by_state() {
        let mut agg = Aggregator::new(&config(false));
        for record in records("customer_name,state\nAlice,CA\nBob,CA\nCarol,NY\n") {
            agg.observe(&record);
        }

        let snapshot = agg.snapshot();
        assert_eq!(
            snapshot,
            vec![
                AggregateRow { key: "CA".to_string(), count: 2 },
                AggregateRow { key: "NY".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_distinct_collapses_duplicate_names() {
        let rows = "customer_name,state\nAlice,CA\nAlice,CA\nBob,CA\nCarol,NY\n";

        let mut all = Aggregator::new(&config(false));
        let mut distinct = Aggregator::new(&config(true));
        for record in records(rows) {
            all.observe(&record);
            distinct.observe(&record);
        }

        let all_ca = all.snapshot()[0].count;
        let distinct_ca = distinct.snapshot()[0].count;
        assert_eq!(all_ca, 3);
        // The duplicate name reduces the state's count by the duplicate count
        assert_eq!(distinct_ca, 2);
    }

    #[test]
    fn test_null_count_column_does_not_count() {
        // Second row is short: customer_name present, state missing;
        // third row has no customer_name value at all
        let rows = "customer_name,state\nAlice,CA\nBob\n,NY\n";
        let mut agg = Aggregator::new(&config(false));
        for record in records(rows) {
            agg.observe(&record);
        }

        let snapshot = agg.snapshot();
        // Bob lands under the empty key; the empty-name NY row still counts
        // because CSV yields an empty string, not a null
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].key, "");
        assert_eq!(snapshot[0].count, 1);
    }

    #[test]
    fn test_state_roundtrips_through_checkpoint() {
        let mut agg = Aggregator::new(&config(true));
        for record in records("customer_name,state\nAlice,CA\nBob,CA\n") {
            agg.observe(&record);
        }

        let json = serde_json::to_string(agg.state()).unwrap();
        let restored: AggregateState = serde_json::from_str(&json).unwrap();
        let resumed = Aggregator::resume(&config(true), restored);

        assert_eq!(resumed.snapshot(), agg.snapshot());
    }

    #[test]
    fn test_policy_change_discards_state() {
        let mut agg = Aggregator::new(&config(false));
        for record in records("customer_name,state\nAlice,CA\n") {
            agg.observe(&record);
        }

        let resumed = Aggregator::resume(&config(true), agg.state().clone());
        assert_eq!(resumed.group_count(), 0);
    }
}
