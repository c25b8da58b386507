//! CIFAR-10 binary format reader.
//!
//! The binary distribution is a directory with `data_batch_1.bin` ..
//! `data_batch_5.bin` (train), `test_batch.bin` (test) and an optional
//! `batches.meta.txt` with one class name per line. Every record is one label
//! byte followed by 3072 pixel bytes: the red, green and blue 32×32 planes.
//! Fetching the archive is left to the user.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::data::transform::{to_tensor, Normalize};
use crate::data::{Dataset, ImageShape, Sample, Split};
use crate::error::{Error, Result};

pub const IMAGE_SHAPE: ImageShape = ImageShape::new(3, 32, 32);
const RECORD_LEN: usize = 1 + IMAGE_SHAPE.len();

pub const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_FILE: &str = "test_batch.bin";
pub const META_FILE: &str = "batches.meta.txt";

pub const CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// CIFAR-10 split kept as raw bytes; pixels are scaled and normalized on
/// `get`.
#[derive(Debug, Clone)]
pub struct CifarDataset {
    pixels: Vec<u8>,
    labels: Vec<usize>,
    classes: Vec<String>,
    normalize: Normalize,
}

/// Appends the records in `bytes` to `pixels` / `labels`.
fn parse_records(
    name: &str,
    bytes: &[u8],
    n_classes: usize,
    pixels: &mut Vec<u8>,
    labels: &mut Vec<usize>,
) -> Result<()> {
    if bytes.is_empty() || bytes.len() % RECORD_LEN != 0 {
        return Err(Error::Dataset(format!(
            "{} is truncated: {} bytes is not a whole number of {}-byte records",
            name,
            bytes.len(),
            RECORD_LEN
        )));
    }
    for record in bytes.chunks_exact(RECORD_LEN) {
        let label = record[0] as usize;
        if label >= n_classes {
            return Err(Error::Dataset(format!(
                "{} has label {} but only {} classes",
                name, label, n_classes
            )));
        }
        labels.push(label);
        pixels.extend_from_slice(&record[1..]);
    }
    Ok(())
}

fn read_classes(dir: &Path) -> Result<Vec<String>> {
    let path = dir.join(META_FILE);
    if !path.exists() {
        return Ok(CLASSES.iter().map(|c| c.to_string()).collect());
    }
    let classes: Vec<String> = fs::read_to_string(&path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if classes.is_empty() {
        return Err(Error::Dataset(format!("{} lists no classes", path.display())));
    }
    Ok(classes)
}

impl CifarDataset {
    /// Reads one split from `dir`, normalizing with mean = std = 0.5.
    pub fn load(dir: impl AsRef<Path>, split: Split) -> Result<Self> {
        Self::load_with(dir, split, Normalize::symmetric(IMAGE_SHAPE.channels))
    }

    pub fn load_with(dir: impl AsRef<Path>, split: Split, normalize: Normalize) -> Result<Self> {
        let dir = dir.as_ref();
        if normalize.channels() != IMAGE_SHAPE.channels {
            return Err(Error::Dataset(format!(
                "normalize has {} channels, images have {}",
                normalize.channels(),
                IMAGE_SHAPE.channels
            )));
        }
        let classes = read_classes(dir)?;
        let files: &[&str] = match split {
            Split::Train => &TRAIN_FILES,
            Split::Test => &[TEST_FILE],
        };

        let mut pixels = Vec::new();
        let mut labels = Vec::new();
        for name in files {
            let path = dir.join(name);
            let bytes = fs::read(&path).map_err(|e| {
                Error::Dataset(format!("could not read {}: {}", path.display(), e))
            })?;
            parse_records(name, &bytes, classes.len(), &mut pixels, &mut labels)?;
        }

        info!(?split, samples = labels.len(), dir = %dir.display(), "loaded cifar-10");
        Ok(Self {
            pixels,
            labels,
            classes,
            normalize,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl Dataset for CifarDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let label = *self.labels.get(index).ok_or_else(|| {
            Error::Dataset(format!("index {} out of range for {} samples", index, self.len()))
        })?;
        let size = IMAGE_SHAPE.len();
        let mut image = to_tensor(&self.pixels[index * size..(index + 1) * size]);
        self.normalize.apply(&mut image, IMAGE_SHAPE)?;
        Ok(Sample { image, label })
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn image_shape(&self) -> ImageShape {
        IMAGE_SHAPE
    }
}
