//! Tests for accuracy and the train/validation split
//!
//! - accuracy stays in [0, 1] and hits its extremes
//! - mismatched batches fail instead of truncating
//! - the split is a disjoint cover of the index set for any size and seed

use approx::assert_relative_eq;
use convnet_trainer::data::split_indices;
use convnet_trainer::error::Error;
use convnet_trainer::metrics::{accuracy, argmax, ConfusionCounts};
use convnet_trainer::utils::SimpleRng;

mod accuracy_tests {
    use super::*;

    #[test]
    fn test_reference_examples() {
        assert_eq!(accuracy(&[0.9, 0.1, 0.2, 0.8], &[0, 1], 2).unwrap(), 1.0);
        assert_eq!(accuracy(&[0.1, 0.9, 0.8, 0.2], &[0, 1], 2).unwrap(), 0.0);
    }

    #[test]
    fn test_accuracy_in_unit_interval() {
        let mut rng = SimpleRng::new(17);
        for batch in 1..20 {
            let outputs: Vec<f32> = (0..batch * 5).map(|_| rng.next_gaussian()).collect();
            let labels: Vec<usize> = (0..batch).map(|_| rng.gen_usize(5)).collect();
            let acc = accuracy(&outputs, &labels, 5).unwrap();
            assert!((0.0..=1.0).contains(&acc));
        }
    }

    #[test]
    fn test_accuracy_matches_argmax_count() {
        let outputs = [
            0.1, 0.7, 0.2, //
            0.5, 0.2, 0.3, //
            0.3, 0.3, 0.3, //
            0.0, 0.1, 0.9,
        ];
        let labels = [1, 0, 1, 2];
        // the all-equal row predicts class 0
        assert_eq!(argmax(&outputs[6..9]), 0);
        assert_relative_eq!(accuracy(&outputs, &labels, 3).unwrap(), 0.75);
    }

    #[test]
    fn test_mismatched_batch_fails_loudly() {
        let outputs = [0.9, 0.1, 0.2, 0.8, 0.5, 0.5];
        assert!(matches!(
            accuracy(&outputs, &[0, 1], 2),
            Err(Error::LengthMismatch {
                outputs: 3,
                labels: 2
            })
        ));
        assert!(accuracy(&outputs[..5], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_confusion_counts_across_batches() {
        let mut counts = ConfusionCounts::new(2);
        counts.record(&[1.0, 0.0, 0.0, 1.0], &[0, 0]).unwrap();
        counts.record(&[0.0, 1.0], &[1]).unwrap();

        assert_eq!(counts.samples(), 3);
        assert_eq!(counts.per_class(), vec![Some(0.5), Some(1.0)]);
        assert_relative_eq!(counts.accuracy().unwrap(), 2.0 / 3.0);
    }
}

mod split_tests {
    use super::*;

    #[test]
    fn test_split_invariants_for_many_sizes() {
        for n in [0usize, 1, 9, 10, 11, 100, 1234] {
            for seed in 0..4 {
                let mut rng = SimpleRng::new(seed);
                let (train, val) = split_indices(n, 0.1, &mut rng).unwrap();

                assert_eq!(val.len(), n / 10, "n={}", n);
                assert_eq!(train.len() + val.len(), n);

                let mut seen = vec![false; n];
                for &i in train.iter().chain(&val) {
                    assert!(!seen[i], "index {} appears twice", i);
                    seen[i] = true;
                }
                assert!(seen.iter().all(|&s| s));
            }
        }
    }

    #[test]
    fn test_split_is_seeded() {
        let a = split_indices(50, 0.2, &mut SimpleRng::new(5)).unwrap();
        let b = split_indices(50, 0.2, &mut SimpleRng::new(5)).unwrap();
        let c = split_indices(50, 0.2, &mut SimpleRng::new(6)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fraction_out_of_range() {
        let mut rng = SimpleRng::new(0);
        assert!(split_indices(10, -0.1, &mut rng).is_err());
        assert!(split_indices(10, 1.0, &mut rng).is_err());
    }
}
