//! Query result types

use crate::types::DataPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Output of a range query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Datapoints in increasing timestamp order
    pub datapoints: Vec<DataPoint>,

    /// Sources that contributed data, each listed once
    pub sources: Vec<String>,
}

impl QueryResponse {
    /// Create a response from its parts
    pub fn new(datapoints: Vec<DataPoint>, sources: Vec<String>) -> Self {
        Self {
            datapoints,
            sources,
        }
    }

    /// Returns true if no datapoints were produced
    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    /// Number of datapoints
    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    /// Timestamps of all datapoints
    pub fn timestamps(&self) -> Vec<i64> {
        self.datapoints.iter().map(|p| p.timestamp_nanos).collect()
    }

    /// Values of all datapoints
    pub fn values(&self) -> Vec<f64> {
        self.datapoints.iter().map(|p| p.value).collect()
    }
}

/// Concatenates the responses of sequential sub-range queries
///
/// Datapoints are appended as they arrive; sources are kept in first-seen
/// order without duplicates.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    response: QueryResponse,
    seen: HashSet<String>,
}

impl ResponseAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sub-range response
    pub fn push(&mut self, chunk: QueryResponse) {
        self.response.datapoints.extend(chunk.datapoints);
        for source in chunk.sources {
            if self.seen.insert(source.clone()) {
                self.response.sources.push(source);
            }
        }
    }

    /// Finished response
    pub fn finish(self) -> QueryResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_dedups_sources_in_first_seen_order() {
        let mut acc = ResponseAccumulator::new();
        acc.push(QueryResponse::new(
            vec![DataPoint::new(1, 1.0)],
            vec!["b".into(), "a".into()],
        ));
        acc.push(QueryResponse::new(
            vec![DataPoint::new(2, 2.0)],
            vec!["c".into(), "a".into()],
        ));

        let response = acc.finish();
        assert_eq!(response.timestamps(), vec![1, 2]);
        assert_eq!(response.values(), vec![1.0, 2.0]);
        assert_eq!(response.sources, vec!["b", "a", "c"]);
    }
}
