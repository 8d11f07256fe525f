//! N-dimensional coordinate odometer.
//!
//! Visits every coordinate of a box in order, dimension 0 fastest, optionally
//! holding one dimension (the processing dimension) at zero so that each
//! yielded position is the start of an image line.

/// Iterator over coordinates in a box of the given sizes.
#[derive(Debug, Clone)]
pub struct Odometer {
    sizes: Vec<usize>,
    skip: Option<usize>,
    first: usize,
    limit: Option<usize>,
    position: Vec<usize>,
    remaining: usize,
}

impl Odometer {
    /// Iterates over all coordinates.
    pub fn new(sizes: &[usize]) -> Self {
        Self::build(sizes, None)
    }

    /// Iterates over line starts: coordinate `dim` stays 0.
    pub fn lines(sizes: &[usize], dim: usize) -> Self {
        Self::build(sizes, Some(dim))
    }

    fn build(sizes: &[usize], skip: Option<usize>) -> Self {
        let mut odometer = Odometer {
            sizes: sizes.to_vec(),
            skip: skip.filter(|&d| d < sizes.len()),
            first: 0,
            limit: None,
            position: vec![0; sizes.len()],
            remaining: 0,
        };
        odometer.reset();
        odometer
    }

    /// Total number of positions visited from the start.
    pub fn total(&self) -> usize {
        self.sizes
            .iter()
            .enumerate()
            .filter(|&(d, _)| Some(d) != self.skip)
            .map(|(_, &s)| s)
            .product()
    }

    /// Restricts the sequence to `count` positions starting at linear index `first`.
    pub fn window(mut self, first: usize, count: usize) -> Self {
        let total = self.total();
        self.first = first.min(total);
        self.limit = Some(count);
        self.reset();
        self
    }

    /// Restarts at the beginning of the current window.
    pub fn reset(&mut self) {
        let total = self.total();
        self.position = self.position_of(self.first);
        let available = total - self.first.min(total);
        self.remaining = self.limit.map_or(available, |limit| limit.min(available));
    }

    /// Coordinates of the `index`-th position in iteration order.
    pub fn position_of(&self, mut index: usize) -> Vec<usize> {
        let mut position = vec![0; self.sizes.len()];
        for (d, &size) in self.sizes.iter().enumerate() {
            if Some(d) == self.skip || size == 0 {
                continue;
            }
            position[d] = index % size;
            index /= size;
        }
        position
    }

    fn increment(&mut self) {
        for d in 0..self.sizes.len() {
            if Some(d) == self.skip {
                continue;
            }
            self.position[d] += 1;
            if self.position[d] < self.sizes[d] {
                return;
            }
            self.position[d] = 0;
        }
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.position.clone();
        self.remaining -= 1;
        if self.remaining > 0 {
            self.increment();
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Odometer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visits_dimension_zero_fastest() {
        let all: Vec<_> = Odometer::new(&[2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![1, 0]);
        assert_eq!(all[2], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn test_lines_hold_processing_dimension() {
        let starts: Vec<_> = Odometer::lines(&[4, 2, 3], 0).collect();
        assert_eq!(starts.len(), 6);
        assert!(starts.iter().all(|p| p[0] == 0));
        assert_eq!(starts[1], vec![0, 1, 0]);
        assert_eq!(starts[2], vec![0, 0, 1]);
    }

    #[test]
    fn test_window_matches_full_sequence() {
        let full: Vec<_> = Odometer::lines(&[3, 4, 5], 1).collect();
        let part: Vec<_> = Odometer::lines(&[3, 4, 5], 1).window(4, 6).collect();
        assert_eq!(part, full[4..10].to_vec());
        let tail: Vec<_> = Odometer::lines(&[3, 4, 5], 1).window(12, 100).collect();
        assert_eq!(tail, full[12..].to_vec());
    }

    #[test]
    fn test_zero_dimensional_box_has_one_position() {
        let all: Vec<_> = Odometer::new(&[]).collect();
        assert_eq!(all, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_restartable() {
        let mut it = Odometer::new(&[2, 2]);
        let first: Vec<_> = it.by_ref().collect();
        it.reset();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
    }
}
