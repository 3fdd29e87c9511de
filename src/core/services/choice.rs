use std::fmt::Debug;

use rand::Rng;

/// Source of the index picked by the `random` filter.
pub trait ChoiceSource: Debug + Send + Sync {
    /// Picks an index in `0..len`, or `None` when `len` is zero.
    fn choose(&self, len: usize) -> Option<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct ThreadRngChoice;

impl ChoiceSource for ThreadRngChoice {
    fn choose(&self, len: usize) -> Option<usize> {
        // empty sequences do not need to fail
        if len == 0 {
            return None;
        }

        let mut rng = rand::rng();
        Some(rng.random_range(0..len))
    }
}
