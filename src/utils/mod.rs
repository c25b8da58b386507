//! Shared utilities: the seeded RNG and activation kernels.

pub mod activations;
pub mod rng;

pub use rng::SimpleRng;
