//! Selecting output records by parameter constraints.
use crate::combinator::{Assignment, Constraints};
use crate::param::SerializedParams;
use crate::registry::OutputRecord;

/// Keeps the records consistent with the expansions of `constraints`.
///
/// Without constraints every record is returned. A constrained parameter
/// that a record does not have never disqualifies it, which allows narrowing
/// down outputs of tasks with differing parameter sets.
///
/// Nothing is merged: a record is emitted once for every assignment it
/// matches, so overlapping assignments repeat it. Input order is kept.
pub fn filter(records: &[OutputRecord], constraints: &Constraints) -> Vec<OutputRecord> {
    if constraints.is_empty() {
        return records.to_vec();
    }

    let assignments: Vec<Assignment> = constraints.expand().collect();

    records
        .iter()
        .flat_map(|record| {
            assignments
                .iter()
                .filter(move |assignment| matches(&record.parameters, assignment))
                .map(move |_| record.clone())
        })
        .collect()
}

/// Every parameter present on both sides must agree.
pub fn matches(params: &SerializedParams, assignment: &Assignment) -> bool {
    assignment
        .iter()
        .all(|(name, value)| params.get(name).is_none_or(|own| own == value.as_str()))
}
