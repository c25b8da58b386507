// CIFAR-10 CNN training with a held-out validation split.
//
// Usage:
//   cargo run --release --bin train_cifar [config.json]
//
// Expects the CIFAR-10 binary distribution (data_batch_{1..5}.bin,
// test_batch.bin) under `data_dir` (default ./data/cifar-10-batches-bin).
// Without a config file the reference hyperparameters are used: 10 epochs,
// batch 128, Adam lr 3e-3, weight decay 1e-4, 10% validation.
//
// Diagnostics go to stdout; tracing events go to stderr (RUST_LOG=debug
// for per-batch loss and accuracy).

use std::io::{self, Write};
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use convnet_trainer::architecture::{build_model, load_architecture, ArchitectureConfig};
use convnet_trainer::config::{load_config, TrainingConfig};
use convnet_trainer::data::{split_indices, CifarDataset, Dataset, Split};
use convnet_trainer::device::Device;
use convnet_trainer::model::Classifier;
use convnet_trainer::optimizers;
use convnet_trainer::training::{evaluate, Trainer};
use convnet_trainer::utils::SimpleRng;
use convnet_trainer::Result;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(config: &TrainingConfig) -> Result<()> {
    let device = Device::resolve(config.device);
    let mut rng = SimpleRng::new(config.seed);

    let train_set = CifarDataset::load(&config.data_dir, Split::Train)?;
    let test_set = CifarDataset::load(&config.data_dir, Split::Test)?;
    println!("Train: {} | Test: {}", train_set.len(), test_set.len());

    let architecture = match &config.architecture {
        Some(path) => load_architecture(path)?,
        None => ArchitectureConfig::cifar_net(train_set.n_classes()),
    };
    let mut model = build_model(&architecture, &mut rng, device)?;
    info!(parameters = model.parameter_count(), "model built");
    for line in model.summary() {
        info!("{}", line);
    }

    let (train, validation) = split_indices(train_set.len(), config.validation_fraction, &mut rng)?;
    let mut optimizer = optimizers::from_config(config);
    let mut trainer = Trainer::from_config(config, rng.fork());

    let probe = trainer.probe(&mut model, &train_set, &train)?;
    println!("{}", probe);

    let mut stdout = io::stdout();
    let history = trainer.run(
        &mut model,
        optimizer.as_mut(),
        &train_set,
        &train,
        &validation,
        &mut stdout,
    )?;
    println!("{}", history.summary());

    let evaluation = evaluate(&mut model, &test_set, config.batch_size)?;
    println!("{}", evaluation);
    stdout.flush()?;
    Ok(())
}

fn main() {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path).unwrap_or_else(|e| {
            eprintln!("Could not load config {}: {}", path, e);
            process::exit(2);
        }),
        None => TrainingConfig::default(),
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
