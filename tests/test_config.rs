//! Tests for run and architecture configuration files
//!
//! - the shipped JSON files load and describe the reference run
//! - partial files fall back to defaults
//! - invalid JSON, unknown fields and out-of-range values are rejected
//! - missing files surface as io errors

use convnet_trainer::architecture::{load_architecture, ArchitectureConfig};
use convnet_trainer::config::{load_config, OptimizerKind};
use convnet_trainer::data::ImageShape;
use convnet_trainer::device::DeviceRequest;
use convnet_trainer::error::Error;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

mod shipped_config_tests {
    use super::*;

    #[test]
    fn test_load_cifar10_config() {
        let config = load_config("config/cifar10.json").expect("Failed to load cifar10 config");

        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.learning_rate, 0.003);
        assert_eq!(config.weight_decay, 0.0001);
        assert_eq!(config.validation_fraction, 0.1);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.device, DeviceRequest::Accelerator);
        assert_eq!(
            config.architecture,
            Some(PathBuf::from("config/architectures/cifar_net.json"))
        );
    }

    #[test]
    fn test_shipped_architecture_matches_builtin() {
        let loaded = load_architecture("config/architectures/cifar_net.json")
            .expect("Failed to load cifar_net architecture");
        let builtin = ArchitectureConfig::cifar_net(10);

        let shapes = |config: &ArchitectureConfig| -> Vec<ImageShape> {
            config.plan().unwrap().iter().map(|p| p.output).collect()
        };

        assert_eq!(loaded.input, builtin.input);
        assert_eq!(loaded.layers.len(), builtin.layers.len());
        assert_eq!(shapes(&loaded), shapes(&builtin));
        assert_eq!(loaded.n_classes().unwrap(), 10);
    }
}

mod temp_config_tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_temp_config("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.seed, 42);
        assert!(config.shuffle_each_epoch);
        assert_eq!(config.architecture, None);
    }

    #[test]
    fn test_parse_all_fields() {
        let file = write_temp_config(
            r#"{
                "epochs": 3,
                "batch_size": 32,
                "learning_rate": 0.1,
                "weight_decay": 0.0,
                "validation_fraction": 0.2,
                "seed": 7,
                "optimizer": "sgd",
                "device": "cpu",
                "shuffle_each_epoch": false,
                "data_dir": "/tmp/cifar",
                "architecture": "net.json"
            }"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.seed, 7);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.device, DeviceRequest::Cpu);
        assert!(!config.shuffle_each_epoch);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/cifar"));
    }

    #[test]
    fn test_architecture_file_round_trip_through_disk() {
        let file = write_temp_config(
            r#"{
                "input": { "channels": 1, "height": 6, "width": 6 },
                "layers": [
                    { "layer_type": "conv2d", "out_channels": 2, "kernel_size": 3 },
                    { "layer_type": "relu" },
                    { "layer_type": "dense", "output_size": 4 }
                ]
            }"#,
        );
        let config = load_architecture(file.path()).unwrap();
        let plan = config.plan().unwrap();
        assert_eq!(plan[0].output, ImageShape::new(2, 4, 4));
        assert_eq!(plan[2].input.len(), 32);
    }
}

mod error_handling_tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("config/does_not_exist.json"),
            Err(Error::Io(_))
        ));
        assert!(matches!(
            load_architecture("config/does_not_exist.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_invalid_json_syntax() {
        let file = write_temp_config(r#"{ "epochs": 3, "#);
        assert!(matches!(load_config(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_wrong_type() {
        let file = write_temp_config(r#"{ "epochs": "ten" }"#);
        assert!(matches!(load_config(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_unknown_optimizer() {
        let file = write_temp_config(r#"{ "optimizer": "rmsprop" }"#);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_out_of_range_values() {
        for body in [
            r#"{ "epochs": 0 }"#,
            r#"{ "batch_size": 0 }"#,
            r#"{ "learning_rate": 0.0 }"#,
            r#"{ "validation_fraction": 1.5 }"#,
        ] {
            let file = write_temp_config(body);
            assert!(
                matches!(load_config(file.path()), Err(Error::InvalidConfig(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_unknown_layer_type() {
        let file = write_temp_config(
            r#"{
                "input": { "channels": 1, "height": 2, "width": 2 },
                "layers": [ { "layer_type": "lstm", "hidden": 4 } ]
            }"#,
        );
        assert!(matches!(load_architecture(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_kernel_larger_than_input() {
        let file = write_temp_config(
            r#"{
                "input": { "channels": 1, "height": 2, "width": 2 },
                "layers": [ { "layer_type": "conv2d", "out_channels": 1, "kernel_size": 5 } ]
            }"#,
        );
        assert!(matches!(
            load_architecture(file.path()),
            Err(Error::InvalidArchitecture { layer: 0, .. })
        ));
    }
}
