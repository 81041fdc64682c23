use std::path::{Path, PathBuf};

use burn::tensor::{Tensor, TensorData, backend::Backend};
use thiserror::Error;

use crate::idx::{self, IdxError, IdxImages};

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

const MAX_INTENSITY: f32 = 255.0;

/// Error raised while loading the dataset.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Idx(#[from] IdxError),

    #[error("split has {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    #[error("label {label} at index {index} is not a digit")]
    LabelOutOfRange { index: usize, label: u8 },

    #[error("{found} pixel bytes do not fill {count} images of {rows}x{cols}")]
    PixelCountMismatch {
        count: usize,
        rows: usize,
        cols: usize,
        found: usize,
    },

    #[error("images are {found:?} but the model expects {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("dataset download is not available, pass a data directory or enable the `download` feature")]
    DownloadUnavailable,
}

/// Where the dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Burn's MNIST dataset, downloaded to its cache directory on first use.
    Download,
    /// A directory holding the four uncompressed IDX files.
    Directory(PathBuf),
}

/// One split of the dataset, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSplit {
    pub count: usize,
    pub height: usize,
    pub width: usize,
    /// Row-major intensities, `count * height * width` bytes.
    pub images: Vec<u8>,
    /// One digit per image.
    pub labels: Vec<u8>,
}

impl RawSplit {
    /// Pair decoded images with their labels, checking sizes and label range.
    pub fn new(images: IdxImages, labels: Vec<u8>) -> Result<Self, DataError> {
        let expected = images
            .count
            .checked_mul(images.rows)
            .and_then(|n| n.checked_mul(images.cols));
        if expected != Some(images.pixels.len()) {
            return Err(DataError::PixelCountMismatch {
                count: images.count,
                rows: images.rows,
                cols: images.cols,
                found: images.pixels.len(),
            });
        }

        if images.count != labels.len() {
            return Err(DataError::CountMismatch {
                images: images.count,
                labels: labels.len(),
            });
        }

        if let Some((index, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, label)| **label as usize >= NUM_CLASSES)
        {
            return Err(DataError::LabelOutOfRange { index, label });
        }

        Ok(Self {
            count: images.count,
            height: images.rows,
            width: images.cols,
            images: images.pixels,
            labels,
        })
    }

    /// `[count, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [self.count, self.height, self.width]
    }

    /// Rescale intensities to `[0, 1]` and append a unit channel dimension.
    pub fn normalize(&self) -> NormalizedImages {
        NormalizedImages {
            values: rescale(&self.images),
            shape: expand_channel(self.shape()),
        }
    }

    fn read(dir: &Path, images: &str, labels: &str) -> Result<Self, DataError> {
        let images = idx::read_images(dir.join(images))?;
        let labels = idx::read_labels(dir.join(labels))?;

        Self::new(images, labels)
    }

    #[cfg(feature = "download")]
    fn from_dataset(
        dataset: &burn::data::dataset::vision::MnistDataset,
    ) -> Result<Self, DataError> {
        use burn::data::dataset::Dataset;

        let count = dataset.len();
        let mut pixels = Vec::new();
        let mut labels = Vec::with_capacity(count);
        let (mut rows, mut cols) = (0, 0);

        for item in dataset.iter() {
            rows = item.image.len();
            cols = item.image[0].len();
            // Items carry the raw intensities as floats.
            pixels.extend(item.image.iter().flatten().map(|px| *px as u8));
            labels.push(item.label);
        }

        let images = IdxImages {
            count,
            rows,
            cols,
            pixels,
        };

        Self::new(images, labels)
    }
}

/// Training and test splits.
#[derive(Debug, Clone)]
pub struct MnistData {
    pub train: RawSplit,
    pub test: RawSplit,
}

impl MnistData {
    pub fn load(source: &DataSource) -> Result<Self, DataError> {
        let data = match source {
            DataSource::Directory(dir) => {
                log::info!("Loading MNIST from {}", dir.display());
                Self {
                    train: RawSplit::read(dir, TRAIN_IMAGES, TRAIN_LABELS)?,
                    test: RawSplit::read(dir, TEST_IMAGES, TEST_LABELS)?,
                }
            }
            DataSource::Download => Self::download()?,
        };

        log::info!(
            "Loaded {} training and {} test images",
            data.train.count,
            data.test.count
        );

        Ok(data)
    }

    #[cfg(feature = "download")]
    fn download() -> Result<Self, DataError> {
        use burn::data::dataset::vision::MnistDataset;

        log::info!("Loading MNIST through the burn dataset cache");
        Ok(Self {
            train: RawSplit::from_dataset(&MnistDataset::train())?,
            test: RawSplit::from_dataset(&MnistDataset::test())?,
        })
    }

    #[cfg(not(feature = "download"))]
    fn download() -> Result<Self, DataError> {
        Err(DataError::DownloadUnavailable)
    }
}

/// Images rescaled to `[0, 1]`, laid out as `[count, height, width, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImages {
    values: Vec<f32>,
    shape: [usize; 4],
}

impl NormalizedImages {
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Check that each image has the `[height, width, channels]` a model expects.
    pub fn check_input_shape(&self, expected: [usize; 3]) -> Result<(), DataError> {
        let [_, height, width, channels] = self.shape;
        let found = [height, width, channels];

        if found != expected {
            return Err(DataError::ShapeMismatch { expected, found });
        }

        Ok(())
    }

    /// The first `n` images, or all of them if there are fewer.
    pub fn head(&self, n: usize) -> Self {
        let [count, height, width, channels] = self.shape;
        let n = n.min(count);
        let len = n * height * width * channels;

        Self {
            values: self.values[..len].to_vec(),
            shape: [n, height, width, channels],
        }
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(self.values.clone(), self.shape), device)
    }
}

/// Divide every intensity by 255.
pub fn rescale(bytes: &[u8]) -> Vec<f32> {
    bytes
        .iter()
        .map(|byte| *byte as f32 / MAX_INTENSITY)
        .collect()
}

/// Append a trailing channel dimension of size 1.
pub fn expand_channel(shape: [usize; 3]) -> [usize; 4] {
    let [count, height, width] = shape;
    [count, height, width, 1]
}
