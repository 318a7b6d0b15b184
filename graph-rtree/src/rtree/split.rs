//! Node split heuristics.
//!
//! Both heuristics work on the envelopes of an overflowing node's members
//! and return two groups of member positions. Group 1 stays in the original
//! node, group 2 moves to the new sibling.

use super::rtree_config::SplitMode;
use crate::envelope::Envelope;

pub(crate) fn split_groups(
    mode: SplitMode,
    envelopes: &[Envelope],
    min_node_references: usize,
) -> (Vec<usize>, Vec<usize>) {
    match mode {
        SplitMode::Quadratic => quadratic_split(envelopes, min_node_references),
        SplitMode::Greene => greene_split(envelopes),
    }
}

/// Guttman's quadratic split.
///
/// Seeds are the pair wasting the most dead space. The remaining members are
/// then assigned one at a time, always taking the member with the strongest
/// preference for one group. As soon as a group can only reach the minimum
/// fill by taking every unassigned member, it takes them all.
///
/// Ties are deterministic: the first candidate in stored order wins, and a
/// member equally cheap for both groups goes to the smaller group by area,
/// then by member count, then to group 1.
pub(crate) fn quadratic_split(
    envelopes: &[Envelope],
    min_node_references: usize,
) -> (Vec<usize>, Vec<usize>) {
    let n = envelopes.len();
    if n < 2 {
        return ((0..n).collect(), Vec::new());
    }

    let (seed_a, seed_b) = pick_seeds(envelopes);
    let mut group1 = vec![seed_a];
    let mut group2 = vec![seed_b];
    let mut envelope1 = envelopes[seed_a];
    let mut envelope2 = envelopes[seed_b];

    let mut remaining: Vec<usize> = (0..n).filter(|i| *i != seed_a && *i != seed_b).collect();

    while !remaining.is_empty() {
        if group1.len() + remaining.len() <= min_node_references {
            group1.append(&mut remaining);
            break;
        }
        if group2.len() + remaining.len() <= min_node_references {
            group2.append(&mut remaining);
            break;
        }

        let position = pick_next(envelopes, &remaining, &envelope1, &envelope2);
        let member = remaining.remove(position);
        let candidate = &envelopes[member];

        let cost1 = envelope1.enlargement(candidate);
        let cost2 = envelope2.enlargement(candidate);
        let to_first = if cost1 != cost2 {
            cost1 < cost2
        } else if envelope1.area() != envelope2.area() {
            envelope1.area() < envelope2.area()
        } else {
            group1.len() <= group2.len()
        };

        if to_first {
            group1.push(member);
            envelope1.expand_to_include(candidate);
        } else {
            group2.push(member);
            envelope2.expand_to_include(candidate);
        }
    }

    (group1, group2)
}

/// The pair with the largest dead space: `area(a ∪ b) - area(a) - area(b)`.
fn pick_seeds(envelopes: &[Envelope]) -> (usize, usize) {
    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..envelopes.len() {
        for j in (i + 1)..envelopes.len() {
            let dead_space = envelopes[i].separation(&envelopes[j]);
            if dead_space > worst {
                worst = dead_space;
                seeds = (i, j);
            }
        }
    }
    seeds
}

/// Position in `remaining` of the member whose enlargement costs differ the
/// most between the two groups.
fn pick_next(
    envelopes: &[Envelope],
    remaining: &[usize],
    envelope1: &Envelope,
    envelope2: &Envelope,
) -> usize {
    let mut best = 0;
    let mut best_difference = f64::NEG_INFINITY;
    for (position, member) in remaining.iter().enumerate() {
        let candidate = &envelopes[*member];
        let difference =
            (envelope1.enlargement(candidate) - envelope2.enlargement(candidate)).abs();
        if difference > best_difference {
            best_difference = difference;
            best = position;
        }
    }
    best
}

/// Greene's split: order members by their center along the longest axis of
/// the node and cut the ordering in half.
pub(crate) fn greene_split(envelopes: &[Envelope]) -> (Vec<usize>, Vec<usize>) {
    let bounds = Envelope::union_all(envelopes);
    let along_x = bounds.width() >= bounds.height();
    let key = |e: &Envelope| {
        if along_x {
            (e.min_x + e.max_x) / 2.0
        } else {
            (e.min_y + e.max_y) / 2.0
        }
    };

    let mut order: Vec<usize> = (0..envelopes.len()).collect();
    order.sort_by(|a, b| key(&envelopes[*a]).total_cmp(&key(&envelopes[*b])));

    let group2 = order.split_off(order.len() / 2);
    (order, group2)
}
