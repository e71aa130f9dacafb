//! Deterministic ordering of hits.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::Hit;
use crate::types::models::EntryKey;

/// Score descending, then headword, then key.
pub fn compare(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.headword.cmp(&b.headword))
        .then_with(|| a.key.cmp(&b.key))
}

/// Keeps the best hit per key and sorts.
pub fn rank(hits: Vec<Hit>) -> Vec<Hit> {
    let mut best: BTreeMap<EntryKey, Hit> = BTreeMap::new();
    for hit in hits {
        match best.get(&hit.key) {
            Some(current) if current.score >= hit.score => {}
            _ => {
                best.insert(hit.key, hit);
            }
        }
    }
    let mut ranked: Vec<Hit> = best.into_values().collect();
    ranked.sort_by(compare);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(key: u32, headword: &str, score: f32) -> Hit {
        Hit {
            key: EntryKey(key),
            headword: headword.to_string(),
            score,
        }
    }

    #[test]
    fn ties_fall_back_to_headword_then_key() {
        let ranked = rank(vec![
            hit(3, "beta", 1.0),
            hit(2, "alpha", 1.0),
            hit(1, "alpha", 1.0),
            hit(0, "zeta", 5.0),
        ]);
        let order: Vec<u32> = ranked.iter().map(|h| h.key.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn duplicate_keys_keep_their_best_score() {
        let ranked = rank(vec![hit(1, "run", 50.0), hit(1, "run", 100.0), hit(2, "ran", 80.0)]);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score, 100.0);
        assert_eq!(ranked[1].key, EntryKey(2));
    }
}
