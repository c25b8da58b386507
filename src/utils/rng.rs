//! Seeded xorshift PRNG.
//!
//! Every random decision in a run (weight init, dropout masks, the validation
//! split, per-epoch batch order, synthetic data) draws from a `SimpleRng`
//! derived from the run seed, so two runs with the same seed are identical.

/// Xorshift64 generator. Cheap to clone; clones continue the same stream.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

const ZERO_SEED_STATE: u64 = 0x9e3779b97f4a7c15;

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { ZERO_SEED_STATE } else { seed };
        Self { state }
    }

    /// Derive an independent generator, advancing `self`.
    ///
    /// Used to hand a private stream to a component (a dropout layer, the
    /// epoch shuffler) without coupling its draws to everyone else's.
    pub fn fork(&mut self) -> SimpleRng {
        let a = self.next_u32() as u64;
        let b = self.next_u32() as u64;
        // splitmix finalizer so adjacent forks do not start correlated
        let mut z = (a << 32 | b).wrapping_add(ZERO_SEED_STATE);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        SimpleRng::new(z ^ (z >> 31))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 mantissa bits keep the result strictly below 1.0
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Standard normal sample (Box-Muller).
    pub fn next_gaussian(&mut self) -> f32 {
        let u1 = self.next_f32().max(f32::MIN_POSITIVE);
        let u2 = self.next_f32();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(42);
        let mut rng2 = SimpleRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_rng_next_f32_range() {
        let mut rng = SimpleRng::new(12345);

        for _ in 0..10_000 {
            let val = rng.next_f32();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut rng = SimpleRng::new(0);
        assert_ne!(rng.next_u32(), 0);
    }

    #[test]
    fn test_fork_is_deterministic_and_distinct() {
        let mut parent1 = SimpleRng::new(7);
        let mut parent2 = SimpleRng::new(7);
        let mut child1 = parent1.fork();
        let mut child2 = parent2.fork();

        let a: Vec<u32> = (0..8).map(|_| child1.next_u32()).collect();
        let b: Vec<u32> = (0..8).map(|_| child2.next_u32()).collect();
        assert_eq!(a, b);

        let c: Vec<u32> = (0..8).map(|_| parent1.next_u32()).collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = SimpleRng::new(99);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| rng.next_gaussian()).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n as f32;

        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.1, "variance {}", var);
    }

    #[test]
    fn test_shuffle_usize_is_permutation() {
        let mut rng = SimpleRng::new(33333);
        let mut data: Vec<usize> = (0..10).collect();
        let original = data.clone();

        rng.shuffle_usize(&mut data);

        let mut sorted = data.clone();
        sorted.sort();
        assert_eq!(sorted, original);
        assert_ne!(data, original);
    }

    #[test]
    fn test_shuffle_single() {
        let mut rng = SimpleRng::new(55555);
        let mut data = vec![42];
        rng.shuffle_usize(&mut data);
        assert_eq!(data, vec![42]);
    }
}
