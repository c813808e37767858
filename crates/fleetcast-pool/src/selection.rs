//! Pure client selection algorithms.
//!
//! Kept free of `Arc<BackendClient>`/locking so the picking logic itself is
//! unit-testable against plain candidate snapshots, the way
//! `fleetcast_client::reconnect`'s backoff calculator is tested without a
//! socket.

use fleetcast_types::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    PickZero,
    PickLowest,
    PickRoutine,
}

/// A selection-time snapshot of one dispatcher slot. `locked` candidates are
/// never returned by any of the three algorithms below.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub index: usize,
    pub id: ClientId,
    pub queue_depth: u64,
    pub locked: bool,
    pub online: bool,
}

fn passes_filter(id: &ClientId, include_ids: &[ClientId], exclude_ids: &[ClientId]) -> bool {
    if !include_ids.is_empty() {
        include_ids.contains(id)
    } else if !exclude_ids.is_empty() {
        !exclude_ids.contains(id)
    } else {
        true
    }
}

fn eligible<'a>(
    candidates: &'a [Candidate],
    include_ids: &[ClientId],
    exclude_ids: &[ClientId],
) -> impl Iterator<Item = &'a Candidate> {
    candidates
        .iter()
        .filter(move |c| c.online && !c.locked && passes_filter(&c.id, include_ids, exclude_ids))
}

/// First eligible client with an empty queue. `None` if none qualifies; the
/// caller blocks and retries on the next state-change notification.
pub fn pick_zero(
    candidates: &[Candidate],
    include_ids: &[ClientId],
    exclude_ids: &[ClientId],
) -> Option<usize> {
    eligible(candidates, include_ids, exclude_ids)
        .find(|c| c.queue_depth == 0)
        .map(|c| c.index)
}

/// The eligible client minimizing `queue_depth`; ties keep insertion order
/// because `Iterator::min_by_key` returns the first minimal element.
pub fn pick_lowest(
    candidates: &[Candidate],
    include_ids: &[ClientId],
    exclude_ids: &[ClientId],
) -> Option<usize> {
    eligible(candidates, include_ids, exclude_ids)
        .min_by_key(|c| c.queue_depth)
        .map(|c| c.index)
}

/// Round-robin over the eligible set. `cursor` advances whenever the
/// eligible set is non-empty, even though the candidate it names may be
/// excluded on the next call by a filter change — the cursor advances
/// unconditionally regardless.
pub fn pick_routine(
    candidates: &[Candidate],
    include_ids: &[ClientId],
    exclude_ids: &[ClientId],
    cursor: &mut usize,
) -> Option<usize> {
    let pool: Vec<&Candidate> = eligible(candidates, include_ids, exclude_ids).collect();
    if pool.is_empty() {
        return None;
    }
    let chosen = pool[*cursor % pool.len()].index;
    *cursor = cursor.wrapping_add(1);
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, queue_depth: u64, locked: bool, online: bool) -> Candidate {
        Candidate {
            index,
            id: ClientId::from(format!("c{index}")),
            queue_depth,
            locked,
            online,
        }
    }

    #[test]
    fn pick_zero_finds_first_idle_client() {
        let candidates = vec![
            candidate(0, 3, false, true),
            candidate(1, 0, false, true),
            candidate(2, 0, false, true),
        ];
        assert_eq!(pick_zero(&candidates, &[], &[]), Some(1));
    }

    #[test]
    fn pick_zero_skips_locked_even_if_idle() {
        let candidates = vec![candidate(0, 0, true, true), candidate(1, 0, false, true)];
        assert_eq!(pick_zero(&candidates, &[], &[]), Some(1));
    }

    #[test]
    fn pick_zero_returns_none_when_all_busy() {
        let candidates = vec![candidate(0, 1, false, true), candidate(1, 2, false, true)];
        assert_eq!(pick_zero(&candidates, &[], &[]), None);
    }

    #[test]
    fn pick_lowest_breaks_ties_by_insertion_order() {
        let candidates = vec![
            candidate(0, 2, false, true),
            candidate(1, 2, false, true),
            candidate(2, 5, false, true),
        ];
        assert_eq!(pick_lowest(&candidates, &[], &[]), Some(0));
    }

    #[test]
    fn pick_lowest_never_returns_a_locked_or_offline_client() {
        let candidates = vec![
            candidate(0, 0, true, true),
            candidate(1, 9, false, false),
            candidate(2, 4, false, true),
        ];
        assert_eq!(pick_lowest(&candidates, &[], &[]), Some(2));
    }

    #[test]
    fn pick_routine_cycles_and_advances_unconditionally() {
        let candidates = vec![
            candidate(0, 0, false, true),
            candidate(1, 0, false, true),
            candidate(2, 0, false, true),
        ];
        let mut cursor = 0;
        let picks: Vec<usize> = (0..4)
            .map(|_| pick_routine(&candidates, &[], &[], &mut cursor).unwrap())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn include_filter_restricts_candidate_set() {
        let candidates = vec![candidate(0, 0, false, true), candidate(1, 0, false, true)];
        let include = vec![ClientId::from("c1")];
        assert_eq!(pick_zero(&candidates, &include, &[]), Some(1));
    }

    #[test]
    fn exclude_filter_removes_named_clients() {
        let candidates = vec![candidate(0, 0, false, true), candidate(1, 0, false, true)];
        let exclude = vec![ClientId::from("c0")];
        assert_eq!(pick_zero(&candidates, &[], &exclude), Some(1));
    }
}
