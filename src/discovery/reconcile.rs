//! Deduplication of a single source's cards.

use std::collections::HashMap;

use crate::identity::AgentCard;

/// Collapse `cards` to one entry per mint.
///
/// The first card seen for a mint is kept unless it is bare and a later
/// card for the same mint carries a resolved name. Output order is the
/// first-seen position of each mint. Cards with an empty mint are dropped.
pub fn reconcile(cards: impl IntoIterator<Item = AgentCard>) -> Vec<AgentCard> {
    let mut out: Vec<AgentCard> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for card in cards {
        if card.mint.is_empty() {
            continue;
        }
        match index.get(&card.mint) {
            Some(&slot) => {
                if !out[slot].has_resolved_name() && card.has_resolved_name() {
                    out[slot] = card;
                }
            }
            None => {
                index.insert(card.mint.clone(), out.len());
                out.push(card);
            }
        }
    }

    out
}
