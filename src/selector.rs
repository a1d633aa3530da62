//! Uniform random selection over the unsent remainder of the pool.

use crate::history::HistoryStore;
use rand::Rng;
use rand::seq::SliceRandom;

/// Pick an unsent image from `pool` with uniform probability.
///
/// Returns `None` when every pool item is already in the history; the
/// caller reports exhaustion upward instead of retrying.
///
/// Randomness is supplied by the caller so tests can seed it.
pub fn select_unsent<R: Rng + ?Sized>(
    pool: &[String],
    history: &HistoryStore,
    rng: &mut R,
) -> Option<String> {
    let unsent: Vec<&String> = pool
        .iter()
        .filter(|id| !history.contains(id.as_str()))
        .collect();
    unsent.choose(rng).map(|id| (*id).clone())
}
