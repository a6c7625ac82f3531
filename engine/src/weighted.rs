use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("weighted table has no entries")]
    Empty,
    #[error("weight {weight} at index {index} must be finite and greater than zero")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("weights sum to {total}, which is not a finite number")]
    NonFiniteTotal { total: f64 },
}

/// Cumulative-weight table shared by every random draw in the engine
/// (slot symbols, wheel prizes, sticker rarities).
///
/// Drawing picks a uniform point in `[0, total)` and returns the first entry
/// whose cumulative weight exceeds it, so entry `i` is selected with
/// probability `weight(i) / total`.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    items: Vec<T>,
    cumulative: Vec<f64>,
    total: f64,
}

impl<T> WeightedTable<T> {
    pub fn new<I>(entries: I) -> Result<Self, WeightError>
    where
        I: IntoIterator<Item = (T, f64)>,
    {
        let mut items = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0;

        for (index, (item, weight)) in entries.into_iter().enumerate() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(WeightError::InvalidWeight { index, weight });
            }
            total += weight;
            items.push(item);
            cumulative.push(total);
        }

        if items.is_empty() {
            return Err(WeightError::Empty);
        }
        if !total.is_finite() {
            return Err(WeightError::NonFiniteTotal { total });
        }

        Ok(WeightedTable {
            items,
            cumulative,
            total,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    /// Probability of drawing the entry at `index`
    pub fn probability(&self, index: usize) -> f64 {
        let previous = if index == 0 {
            0.0
        } else {
            self.cumulative[index - 1]
        };
        (self.cumulative[index] - previous) / self.total
    }

    /// Index of the first entry whose cumulative weight exceeds `point`
    pub fn locate(&self, point: f64) -> usize {
        let index = self.cumulative.partition_point(|&c| c <= point);
        // Float rounding can leave the last cumulative a hair under `total`
        index.min(self.items.len() - 1)
    }

    pub fn draw_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let point = rng.gen_range(0.0..self.total);
        self.locate(point)
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.draw_index(rng)]
    }
}
