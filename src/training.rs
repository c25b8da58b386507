//! Train/validate loop and its bookkeeping.
//!
//! A run moves through `Idle -> (TrainingEpoch -> ValidatingEpoch) × epochs
//! -> Done`. Every batch's loss and accuracy lands in the epoch's
//! [`EpochResult`]; the best validation batch accuracy of the whole run is
//! tracked in [`RunState`]. Any failure aborts the run and comes back as an
//! [`Error::Batch`] naming the phase, epoch and batch.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::data::{batch_count, Batch, BatchIter, Dataset, ImageShape};
use crate::error::{Error, Result, RunPhase};
use crate::loss::cross_entropy;
use crate::metrics::{accuracy, ConfusionCounts};
use crate::model::Classifier;
use crate::optimizers::Optimizer;
use crate::utils::SimpleRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TrainingEpoch,
    ValidatingEpoch,
    Done,
}

/// Per-batch results of one pass over one split.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpochResult {
    pub epoch: usize,
    pub losses: Vec<f32>,
    pub accuracies: Vec<f32>,
    pub duration: Duration,
}

fn mean(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}

impl EpochResult {
    fn new(epoch: usize) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> usize {
        self.losses.len()
    }

    pub fn mean_loss(&self) -> Option<f32> {
        mean(&self.losses)
    }

    pub fn mean_accuracy(&self) -> Option<f32> {
        mean(&self.accuracies)
    }
}

/// Best validation batch accuracy seen so far and where it happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunState {
    best_accuracy: f32,
    best_epoch: Option<usize>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            best_accuracy: f32::NEG_INFINITY,
            best_epoch: None,
        }
    }
}

impl RunState {
    /// Records a validation batch accuracy; returns whether it is a new best.
    ///
    /// Only a strictly higher accuracy replaces the current best.
    pub fn observe(&mut self, accuracy: f32, epoch: usize) -> bool {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.best_epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    /// `-inf` until the first validation batch.
    pub fn best_accuracy(&self) -> f32 {
        self.best_accuracy
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

/// Everything a run recorded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunHistory {
    pub train: Vec<EpochResult>,
    pub validation: Vec<EpochResult>,
    pub state: RunState,
    pub total_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: Option<f32>,
    pub train_accuracy: Option<f32>,
    pub validation_loss: Option<f32>,
    pub validation_accuracy: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub epochs: Vec<EpochSummary>,
    pub best_accuracy: Option<f32>,
    pub best_epoch: Option<usize>,
}

impl RunHistory {
    /// Per-epoch means and the best validation batch.
    pub fn summary(&self) -> RunSummary {
        let epochs = self
            .train
            .iter()
            .enumerate()
            .map(|(i, train)| {
                let validation = self.validation.get(i);
                EpochSummary {
                    epoch: train.epoch,
                    train_loss: train.mean_loss(),
                    train_accuracy: train.mean_accuracy(),
                    validation_loss: validation.and_then(EpochResult::mean_loss),
                    validation_accuracy: validation.and_then(EpochResult::mean_accuracy),
                }
            })
            .collect();
        RunSummary {
            epochs,
            best_accuracy: self.state.best_epoch().map(|_| self.state.best_accuracy()),
            best_epoch: self.state.best_epoch(),
        }
    }
}

fn fmt_opt(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "epoch  train_loss  train_acc  val_loss  val_acc")?;
        for e in &self.epochs {
            writeln!(
                f,
                "{:>5}  {:>10}  {:>9}  {:>8}  {:>7}",
                e.epoch + 1,
                fmt_opt(e.train_loss),
                fmt_opt(e.train_accuracy),
                fmt_opt(e.validation_loss),
                fmt_opt(e.validation_accuracy)
            )?;
        }
        match (self.best_accuracy, self.best_epoch) {
            (Some(acc), Some(epoch)) => {
                write!(f, "best validation accuracy {:.4} at epoch {}", acc, epoch + 1)
            }
            _ => write!(f, "no validation batches"),
        }
    }
}

/// Shapes seen by a single forward pass on the first training batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub batch_size: usize,
    pub input_shape: ImageShape,
    pub n_classes: usize,
    /// Scores of the first sample
    pub first_scores: Vec<f32>,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "images.shape [{}, {}, {}, {}]",
            self.batch_size, self.input_shape.channels, self.input_shape.height, self.input_shape.width
        )?;
        writeln!(f, "out.shape [{}, {}]", self.batch_size, self.n_classes)?;
        write!(f, "out[0] {:?}", self.first_scores)
    }
}

fn minutes(duration: Duration) -> f64 {
    duration.as_secs_f64() / 60.0
}

fn check_finite(loss: f32, phase: RunPhase, epoch: usize, batch: usize) -> Result<f32> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(Error::NonFiniteLoss {
            phase,
            epoch,
            batch,
            loss,
        })
    }
}

/// Runs the train/validate loop.
///
/// # Example
///
/// ```no_run
/// use convnet_trainer::architecture::{build_model, ArchitectureConfig};
/// use convnet_trainer::data::{split_indices, ImageShape, SyntheticDataset};
/// use convnet_trainer::device::Device;
/// use convnet_trainer::optimizers::Adam;
/// use convnet_trainer::training::Trainer;
/// use convnet_trainer::utils::SimpleRng;
///
/// let dataset = SyntheticDataset::balanced(100, 10, ImageShape::new(3, 32, 32), 0).unwrap();
/// let mut rng = SimpleRng::new(0);
/// let (train, val) = split_indices(100, 0.1, &mut rng).unwrap();
/// let mut model = build_model(&ArchitectureConfig::cifar_net(10), &mut rng, Device::Cpu).unwrap();
/// let mut adam = Adam::new(3e-3, 0.9, 0.999, 1e-8);
///
/// let mut trainer = Trainer::new(1, 10, rng.fork());
/// let history = trainer
///     .run(&mut model, &mut adam, &dataset, &train, &val, &mut std::io::stdout())
///     .unwrap();
/// println!("{}", history.summary());
/// ```
pub struct Trainer {
    epochs: usize,
    batch_size: usize,
    shuffle_each_epoch: bool,
    rng: SimpleRng,
    phase: Phase,
}

impl Trainer {
    pub fn new(epochs: usize, batch_size: usize, rng: SimpleRng) -> Self {
        assert!(batch_size > 0, "batch_size must be greater than 0");
        Self {
            epochs,
            batch_size,
            shuffle_each_epoch: true,
            rng,
            phase: Phase::Idle,
        }
    }

    pub fn from_config(config: &TrainingConfig, rng: SimpleRng) -> Self {
        Self::new(config.epochs, config.batch_size, rng).with_shuffle(config.shuffle_each_epoch)
    }

    /// Draw a new batch order over each split every epoch.
    pub fn with_shuffle(mut self, shuffle_each_epoch: bool) -> Self {
        self.shuffle_each_epoch = shuffle_each_epoch;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One evaluation-mode forward pass on the first batch of `indices`.
    ///
    /// The model's training/evaluation mode is restored afterwards.
    pub fn probe<D: Dataset + ?Sized>(
        &self,
        model: &mut dyn Classifier,
        dataset: &D,
        indices: &[usize],
    ) -> Result<ProbeReport> {
        let batch = BatchIter::new(dataset, indices, self.batch_size, model.device())
            .next()
            .ok_or(Error::EmptyBatch)??;

        let was_training = model.is_training();
        model.eval_mode();
        let scores = model.forward(&batch);
        if was_training {
            model.train_mode();
        }
        let scores = scores?;

        let n_classes = model.n_classes();
        Ok(ProbeReport {
            batch_size: batch.len(),
            input_shape: batch.shape,
            n_classes,
            first_scores: scores[..n_classes].to_vec(),
        })
    }

    fn order(&mut self, indices: &[usize]) -> Vec<usize> {
        let mut order = indices.to_vec();
        if self.shuffle_each_epoch {
            self.rng.shuffle_usize(&mut order);
        }
        order
    }

    fn train_batch(
        model: &mut dyn Classifier,
        optimizer: &mut dyn Optimizer,
        batch: &Batch,
        epoch: usize,
        index: usize,
    ) -> Result<(f32, f32)> {
        let n_classes = model.n_classes();
        model.zero_grad();
        let scores = model.forward(batch)?;
        let (loss, grad) = cross_entropy(&scores, &batch.labels, n_classes)?;
        let loss = check_finite(loss, RunPhase::Training, epoch, index)?;
        let acc = accuracy(&scores, &batch.labels, n_classes)?;
        model.backward(&grad)?;
        model.step(optimizer);
        Ok((loss, acc))
    }

    fn validate_batch(
        model: &mut dyn Classifier,
        batch: &Batch,
        epoch: usize,
        index: usize,
    ) -> Result<(f32, f32)> {
        let n_classes = model.n_classes();
        let scores = model.forward(batch)?;
        let (loss, _) = cross_entropy(&scores, &batch.labels, n_classes)?;
        let loss = check_finite(loss, RunPhase::Validation, epoch, index)?;
        let acc = accuracy(&scores, &batch.labels, n_classes)?;
        Ok((loss, acc))
    }

    /// Trains on `train` and validates on `validation` for every epoch,
    /// printing the phase durations to `out`.
    pub fn run<D, W>(
        &mut self,
        model: &mut dyn Classifier,
        optimizer: &mut dyn Optimizer,
        dataset: &D,
        train: &[usize],
        validation: &[usize],
        out: &mut W,
    ) -> Result<RunHistory>
    where
        D: Dataset + ?Sized,
        W: Write + ?Sized,
    {
        let mut history = RunHistory::default();
        let device = model.device();
        let run_start = Instant::now();

        info!(
            epochs = self.epochs,
            batch_size = self.batch_size,
            train_samples = train.len(),
            validation_samples = validation.len(),
            train_batches = batch_count(train.len(), self.batch_size),
            %device,
            "starting run"
        );

        for epoch in 0..self.epochs {
            self.phase = Phase::TrainingEpoch;
            model.train_mode();
            let order = self.order(train);
            let mut result = EpochResult::new(epoch);
            let start = Instant::now();

            for (index, batch) in BatchIter::new(dataset, &order, self.batch_size, device).enumerate() {
                let at = |e: Error| e.at(RunPhase::Training, epoch, index);
                let batch = batch.map_err(at)?;
                let (loss, acc) = Self::train_batch(model, optimizer, &batch, epoch, index)
                    .map_err(at)?;
                debug!(epoch, batch = index, loss, accuracy = acc, "train batch");
                result.losses.push(loss);
                result.accuracies.push(acc);
            }
            result.duration = start.elapsed();
            writeln!(out, "Batch time: {:.3} minutes", minutes(result.duration))?;
            history.train.push(result);

            self.phase = Phase::ValidatingEpoch;
            model.eval_mode();
            let order = self.order(validation);
            let mut result = EpochResult::new(epoch);
            let start = Instant::now();

            for (index, batch) in BatchIter::new(dataset, &order, self.batch_size, device).enumerate() {
                let at = |e: Error| e.at(RunPhase::Validation, epoch, index);
                let batch = batch.map_err(at)?;
                let (loss, acc) = Self::validate_batch(model, &batch, epoch, index).map_err(at)?;
                if history.state.observe(acc, epoch) {
                    debug!(epoch, batch = index, accuracy = acc, "new best validation accuracy");
                }
                result.losses.push(loss);
                result.accuracies.push(acc);
            }
            result.duration = start.elapsed();
            writeln!(out, "Validation runtime: {:.3} minutes", minutes(result.duration))?;

            info!(
                epoch,
                train_loss = history.train[epoch].mean_loss().unwrap_or(f32::NAN),
                validation_loss = result.mean_loss().unwrap_or(f32::NAN),
                validation_accuracy = result.mean_accuracy().unwrap_or(f32::NAN),
                "epoch finished"
            );
            history.validation.push(result);
        }

        self.phase = Phase::Done;
        history.total_time = run_start.elapsed();
        writeln!(out, "Total time: {:.3} minutes", minutes(history.total_time))?;
        info!(
            best_accuracy = history.state.best_accuracy(),
            best_epoch = ?history.state.best_epoch(),
            "run finished"
        );
        Ok(history)
    }
}

/// Test-split results.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Mean loss per sample
    pub mean_loss: f32,
    pub accuracy: f32,
    /// Class name and accuracy; `None` if the class never occurs
    pub per_class: Vec<(String, Option<f32>)>,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Test loss: {:.4}", self.mean_loss)?;
        write!(f, "Test accuracy: {:.2}%", 100.0 * self.accuracy)?;
        for (name, acc) in &self.per_class {
            match acc {
                Some(acc) => write!(f, "\n  {:<12} {:.2}%", name, 100.0 * acc)?,
                None => write!(f, "\n  {:<12} -", name)?,
            }
        }
        Ok(())
    }
}

/// Scores every sample of `dataset` in evaluation mode.
pub fn evaluate<D: Dataset + ?Sized>(
    model: &mut dyn Classifier,
    dataset: &D,
    batch_size: usize,
) -> Result<Evaluation> {
    if dataset.is_empty() {
        return Err(Error::EmptyBatch);
    }
    let n_classes = model.n_classes();
    if dataset.n_classes() != n_classes {
        return Err(Error::Dataset(format!(
            "dataset has {} classes but the model scores {}",
            dataset.n_classes(),
            n_classes
        )));
    }

    model.eval_mode();
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut counts = ConfusionCounts::new(n_classes);
    let mut total_loss = 0.0f64;

    for (index, batch) in BatchIter::new(dataset, &indices, batch_size, model.device()).enumerate() {
        let at = |e: Error| e.at(RunPhase::Evaluation, 0, index);
        let batch = batch.map_err(at)?;
        let scores = model.forward(&batch).map_err(at)?;
        let (loss, _) = cross_entropy(&scores, &batch.labels, n_classes).map_err(at)?;
        check_finite(loss, RunPhase::Evaluation, 0, index)?;
        total_loss += loss as f64 * batch.len() as f64;
        counts.record(&scores, &batch.labels).map_err(at)?;
    }

    let per_class = dataset
        .classes()
        .iter()
        .cloned()
        .zip(counts.per_class())
        .collect();
    Ok(Evaluation {
        mean_loss: (total_loss / counts.samples() as f64) as f32,
        accuracy: counts.accuracy().unwrap_or(0.0),
        per_class,
    })
}
