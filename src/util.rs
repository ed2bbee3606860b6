use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;

pub trait RandomTies<T> {
    /// Sort the elements by the given key, ordering elements with equal keys randomly.
    ///
    /// This is done by shuffling the slice before the (stable) sort, so the runtime is
    /// O(n log n) like a plain sort.
    fn sort_by_key_random_ties<K, F, R>(&mut self, rng: &mut R, key: F)
    where
        K: Ord,
        F: FnMut(&T) -> K,
        R: Rng + ?Sized;

    /// Return the index of an element with minimum key. Among equal keys, one is picked at
    /// random. Returns None for an empty slice.
    fn position_min_random_ties<K, F, R>(&self, rng: &mut R, key: F) -> Option<usize>
    where
        K: Ord,
        F: FnMut(&T) -> K,
        R: Rng + ?Sized;
}

impl<T> RandomTies<T> for [T] {
    fn sort_by_key_random_ties<K, F, R>(&mut self, rng: &mut R, key: F)
    where
        K: Ord,
        F: FnMut(&T) -> K,
        R: Rng + ?Sized,
    {
        self.shuffle(rng);
        self.sort_by_key(key);
    }

    fn position_min_random_ties<K, F, R>(&self, rng: &mut R, mut key: F) -> Option<usize>
    where
        K: Ord,
        F: FnMut(&T) -> K,
        R: Rng + ?Sized,
    {
        let mut best: Option<(K, usize)> = None;
        let mut num_best = 0u32;
        for (i, item) in self.iter().enumerate() {
            let k = key(item);
            match best.as_ref().map(|(best_key, _)| k.cmp(best_key)) {
                Some(Ordering::Greater) => (),
                Some(Ordering::Equal) => {
                    // Reservoir sampling among the elements with equal key
                    num_best += 1;
                    if rng.random_range(0..num_best) == 0 {
                        best = Some((k, i));
                    }
                }
                _ => {
                    best = Some((k, i));
                    num_best = 1;
                }
            }
        }
        best.map(|(_, i)| i)
    }
}
