//! Segment breakdowns. Only codes 1 (Individuals) and 2 (Sellers) are
//! recognized; any other code is counted and left out of the rows.

use crate::rates::RateSummary;
use onboarding_core::types::{MetricsRecord, SegmentKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentRow {
    pub segment: SegmentKind,
    pub rates: RateSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentCohortRow {
    pub segment: SegmentKind,
    pub ab_group: String,
    pub rates: RateSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegmentBreakdown {
    pub rows: Vec<SegmentRow>,
    pub by_cohort: Vec<SegmentCohortRow>,
    pub unrecognized_users: u64,
}

pub fn segment_breakdown(records: &[MetricsRecord]) -> SegmentBreakdown {
    let mut by_segment: BTreeMap<SegmentKind, Vec<&MetricsRecord>> = BTreeMap::new();
    let mut by_pair: BTreeMap<(SegmentKind, &str), Vec<&MetricsRecord>> = BTreeMap::new();
    let mut unrecognized_users = 0;

    for r in records {
        match r.segment_kind() {
            Some(kind) => {
                by_segment.entry(kind).or_default().push(r);
                by_pair.entry((kind, r.ab_group.as_str())).or_default().push(r);
            }
            None => unrecognized_users += 1,
        }
    }

    SegmentBreakdown {
        rows: by_segment
            .into_iter()
            .map(|(segment, rows)| SegmentRow {
                segment,
                rates: RateSummary::from_records(rows),
            })
            .collect(),
        by_cohort: by_pair
            .into_iter()
            .map(|((segment, ab_group), rows)| SegmentCohortRow {
                segment,
                ab_group: ab_group.to_string(),
                rates: RateSummary::from_records(rows),
            })
            .collect(),
        unrecognized_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::record;

    #[test]
    fn test_breakdown_by_segment_and_cohort() {
        let records = vec![
            record("a", 1, "treatment", [0, 1, 1, 1]),
            record("b", 1, "control", [1, 0, 0, 0]),
            record("c", 2, "treatment", [0, 1, 0, 0]),
            record("d", 3, "treatment", [0, 1, 0, 0]),
        ];
        let breakdown = segment_breakdown(&records);

        assert_eq!(breakdown.unrecognized_users, 1);
        assert_eq!(breakdown.rows.len(), 2);
        assert_eq!(breakdown.rows[0].segment, SegmentKind::Individuals);
        assert_eq!(breakdown.rows[0].rates.total_users, 2);
        assert_eq!(breakdown.rows[0].rates.habit_rate, 50.0);
        assert_eq!(breakdown.rows[1].segment.label(), "Sellers");

        let pairs: Vec<(&str, &str)> = breakdown
            .by_cohort
            .iter()
            .map(|r| (r.segment.label(), r.ab_group.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Individuals", "control"),
                ("Individuals", "treatment"),
                ("Sellers", "treatment")
            ]
        );
    }
}
