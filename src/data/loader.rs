use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::PointCloud;
use crate::error::{DiffusionError, Result};

/// Endless stream of shuffled mini-batches over a finite point cloud.
///
/// Each pass visits every point exactly once; the order is reshuffled when a
/// pass is exhausted and the last batch of a pass may be smaller than
/// `batch_size`.
#[derive(Debug)]
pub struct CyclicBatcher<'a> {
    dataset: &'a PointCloud,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
    rng: StdRng,
}

impl<'a> CyclicBatcher<'a> {
    pub fn new(dataset: &'a PointCloud, batch_size: usize, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(DiffusionError::config("batch_size must be positive"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            dataset,
            batch_size,
            order,
            cursor: 0,
            epoch: 0,
            rng,
        })
    }

    /// Number of completed passes over the dataset.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn next_indices(&mut self) -> Vec<usize> {
        if self.cursor >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
            self.epoch += 1;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        indices
    }

    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> Tensor<B, 2> {
        let indices = self.next_indices();
        self.dataset.batch(&indices, device)
    }
}

impl Iterator for CyclicBatcher<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_indices())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(len: usize) -> PointCloud {
        PointCloud::new(1, (0..len).map(|i| i as f32).collect()).unwrap()
    }

    #[test]
    fn test_each_pass_covers_every_point() {
        let dataset = cloud(10);
        let mut batcher = CyclicBatcher::new(&dataset, 4, 3).unwrap();

        for epoch in 0..3 {
            let mut seen: Vec<usize> = Vec::new();
            let sizes: Vec<usize> = (0..3)
                .map(|_| {
                    let batch = batcher.next_indices();
                    seen.extend(&batch);
                    batch.len()
                })
                .collect();

            assert_eq!(sizes, vec![4, 4, 2]);
            seen.sort_unstable();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
            assert_eq!(batcher.epoch(), epoch);
        }
    }

    #[test]
    fn test_reshuffles_between_passes() {
        let dataset = cloud(64);
        let mut batcher = CyclicBatcher::new(&dataset, 64, 5).unwrap();

        let first = batcher.next().unwrap();
        let second = batcher.next().unwrap();

        assert_eq!(batcher.epoch(), 1);
        assert_ne!(first, second);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let dataset = cloud(20);
        let a: Vec<Vec<usize>> = CyclicBatcher::new(&dataset, 6, 9).unwrap().take(8).collect();
        let b: Vec<Vec<usize>> = CyclicBatcher::new(&dataset, 6, 9).unwrap().take(8).collect();

        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let dataset = cloud(3);

        assert!(matches!(
            CyclicBatcher::new(&dataset, 0, 0),
            Err(DiffusionError::Configuration(_))
        ));
    }
}
