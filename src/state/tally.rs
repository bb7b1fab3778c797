use indexmap::IndexMap;

use crate::state::lobby::PlayerId;

/// Vote counts for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTally {
    /// Votes received by every alive player, in roster order (zero included).
    pub counts: IndexMap<PlayerId, u32>,
    /// Highest count, zero when nobody received a valid vote.
    pub max: u32,
    /// Players reaching `max`, in roster order.
    pub leaders: Vec<PlayerId>,
}

impl VoteTally {
    /// The single leader, if the round has a clear loser.
    pub fn clear_loser(&self) -> Option<&PlayerId> {
        match self.leaders.as_slice() {
            [loser] => Some(loser),
            _ => None,
        }
    }
}

/// Count the votes cast between alive players.
///
/// Entries whose voter or target is not in `alive` are ignored. `alive` must be
/// in roster order; leaders keep that order.
pub fn tally(votes: &IndexMap<PlayerId, PlayerId>, alive: &[PlayerId]) -> VoteTally {
    let mut counts: IndexMap<PlayerId, u32> = alive.iter().map(|id| (id.clone(), 0)).collect();

    for (voter, target) in votes {
        if !counts.contains_key(voter) {
            continue;
        }
        if let Some(count) = counts.get_mut(target) {
            *count += 1;
        }
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let leaders = counts
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(id, _)| id.clone())
        .collect();

    VoteTally {
        counts,
        max,
        leaders,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ids(list: &[&str]) -> Vec<PlayerId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn votes(pairs: &[(&str, &str)]) -> IndexMap<PlayerId, PlayerId> {
        pairs
            .iter()
            .map(|(voter, target)| (voter.to_string(), target.to_string()))
            .collect()
    }

    #[test]
    fn single_leader_is_clear_loser() {
        let result = tally(
            &votes(&[("A", "C"), ("B", "C"), ("C", "A")]),
            &ids(&["A", "B", "C"]),
        );
        assert_eq!(result.counts["A"], 1);
        assert_eq!(result.counts["B"], 0);
        assert_eq!(result.counts["C"], 2);
        assert_eq!(result.max, 2);
        assert_eq!(result.clear_loser().map(String::as_str), Some("C"));
    }

    #[test]
    fn ties_keep_roster_order() {
        let result = tally(
            &votes(&[("A", "C"), ("C", "B"), ("B", "A")]),
            &ids(&["C", "A", "B"]),
        );
        assert_eq!(result.leaders, ids(&["C", "A", "B"]));
        assert_eq!(result.max, 1);
        assert_eq!(result.clear_loser(), None);
    }

    #[test]
    fn stale_and_foreign_votes_are_ignored() {
        let result = tally(
            &votes(&[("A", "B"), ("dead", "A"), ("B", "dead"), ("ghost", "ghost")]),
            &ids(&["A", "B"]),
        );
        assert_eq!(result.counts.values().sum::<u32>(), 1);
        assert_eq!(result.leaders, ids(&["B"]));
    }

    #[test]
    fn no_votes_means_everyone_leads() {
        let result = tally(&IndexMap::new(), &ids(&["A", "B"]));
        assert_eq!(result.max, 0);
        assert_eq!(result.leaders, ids(&["A", "B"]));
    }

    #[test]
    fn empty_alive_set_has_no_leaders() {
        let result = tally(&votes(&[("A", "B")]), &[]);
        assert!(result.leaders.is_empty());
        assert!(result.counts.is_empty());
    }

    fn pool() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn counts_sum_to_valid_entries(
            alive in prop::collection::btree_set(pool(), 1..6),
            raw in prop::collection::vec((pool(), pool()), 0..12),
        ) {
            let alive: Vec<PlayerId> = alive.into_iter().collect();
            let votes: IndexMap<PlayerId, PlayerId> = raw.into_iter().collect();
            let result = tally(&votes, &alive);

            let valid = votes
                .iter()
                .filter(|(voter, target)| alive.contains(voter) && alive.contains(target))
                .count() as u32;
            prop_assert_eq!(result.counts.values().sum::<u32>(), valid);
            prop_assert!(!result.leaders.is_empty());
            for leader in &result.leaders {
                prop_assert_eq!(result.counts[leader], result.max);
            }
            prop_assert!(result.counts.values().all(|count| *count <= result.max));
        }
    }
}
