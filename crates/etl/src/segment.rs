//! Segment resolution: one segment per user by majority vote over their
//! transactions.

use onboarding_core::types::{ResolvedSegment, TransactionRecord};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Pick the most frequently observed segment per user.
///
/// A missing segment is counted as its own value and orders before every
/// code, so on a count tie it wins, followed by the smallest code. A user
/// whose winning value is missing has an unresolvable segment and receives
/// no resolved segment. The result is sorted by `user_id` and does not
/// depend on input order.
pub fn resolve_segments(transactions: &[TransactionRecord]) -> Vec<ResolvedSegment> {
    let mut votes: BTreeMap<&str, HashMap<Option<i32>, usize>> = BTreeMap::new();

    for tx in transactions {
        *votes
            .entry(tx.user_id.as_str())
            .or_default()
            .entry(tx.segment)
            .or_insert(0) += 1;
    }

    let mut unresolved = 0usize;
    let resolved: Vec<ResolvedSegment> = votes
        .into_iter()
        .filter_map(|(user_id, counts)| {
            let winner = counts
                .into_iter()
                .max_by(|(seg_a, count_a), (seg_b, count_b)| {
                    count_a.cmp(count_b).then_with(|| seg_b.cmp(seg_a))
                })
                .and_then(|(segment, _)| segment);
            if winner.is_none() {
                unresolved += 1;
            }
            winner.map(|segment| ResolvedSegment {
                user_id: user_id.to_string(),
                segment,
            })
        })
        .collect();

    if unresolved > 0 {
        debug!(users = unresolved, "Users with a missing majority segment left unresolved");
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(user_id: &str, segment: Option<i32>) -> TransactionRecord {
        TransactionRecord {
            user_id: user_id.to_string(),
            segment,
            transaction_dt: None,
            tx_type: None,
        }
    }

    fn as_pairs(resolved: &[ResolvedSegment]) -> Vec<(&str, i32)> {
        resolved
            .iter()
            .map(|r| (r.user_id.as_str(), r.segment))
            .collect()
    }

    #[test]
    fn test_majority_segment_wins() {
        let txs = vec![
            tx("u1", Some(2)),
            tx("u1", Some(1)),
            tx("u1", Some(2)),
            tx("u2", Some(1)),
        ];
        let resolved = resolve_segments(&txs);
        assert_eq!(as_pairs(&resolved), vec![("u1", 2), ("u2", 1)]);
    }

    #[test]
    fn test_tie_goes_to_smallest_segment() {
        let txs = vec![
            tx("u1", Some(2)),
            tx("u1", Some(1)),
            tx("u2", Some(3)),
            tx("u2", Some(2)),
            tx("u2", Some(3)),
            tx("u2", Some(2)),
        ];
        let resolved = resolve_segments(&txs);
        assert_eq!(as_pairs(&resolved), vec![("u1", 1), ("u2", 2)]);
    }

    #[test]
    fn test_result_is_independent_of_input_order() {
        let mut txs = vec![
            tx("b", Some(2)),
            tx("a", Some(1)),
            tx("b", Some(1)),
            tx("a", Some(2)),
            tx("a", Some(2)),
        ];
        let forward = resolve_segments(&txs);
        txs.reverse();
        let backward = resolve_segments(&txs);
        assert_eq!(forward, backward);
        assert_eq!(as_pairs(&forward), vec![("a", 2), ("b", 1)]);
    }

    #[test]
    fn test_missing_segment_majority_is_unresolved() {
        let txs = vec![
            tx("u1", None),
            tx("u1", None),
            tx("u1", None),
            tx("u1", Some(2)),
            tx("u2", None),
            tx("u3", Some(1)),
            tx("u3", Some(1)),
            tx("u3", None),
        ];
        let resolved = resolve_segments(&txs);
        assert_eq!(as_pairs(&resolved), vec![("u3", 1)]);
        assert!(resolve_segments(&[]).is_empty());
    }

    #[test]
    fn test_missing_segment_wins_a_tie() {
        let txs = vec![
            tx("u1", Some(1)),
            tx("u1", None),
            tx("u2", Some(2)),
            tx("u2", None),
            tx("u2", Some(2)),
        ];
        let resolved = resolve_segments(&txs);
        assert_eq!(as_pairs(&resolved), vec![("u2", 2)]);
    }
}
