use burn::config::Config;

use crate::data::DataSource;

/// Hyperparameters of the convolutional network.
#[derive(Config, Debug, PartialEq)]
pub struct ConvNetConfig {
    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,
    /// Input image shape, channel last: `[height, width, channels]`.
    #[config(default = "[28, 28, 1]")]
    pub input_shape: [usize; 3],
    /// Filters of the first and second convolution.
    #[config(default = "[32, 64]")]
    pub conv_channels: [usize; 2],
    /// Kernel size shared by both convolutions.
    #[config(default = "[3, 3]")]
    pub kernel_size: [usize; 2],
    /// Window of both max pooling layers. The stride equals the window.
    #[config(default = "[2, 2]")]
    pub pool_size: [usize; 2],
    /// Dropout probability applied before the classifier.
    #[config(default = 0.5)]
    pub dropout: f64,
}

/// Everything the binary needs for one run.
#[derive(Config, Debug)]
pub struct RunConfig {
    pub model: ConvNetConfig,
    /// Directory with the uncompressed IDX files. Downloads when unset.
    #[config(default = "None")]
    pub data_dir: Option<String>,
    /// Number of test images pushed through the model after the summary, 0 to skip.
    #[config(default = 8)]
    pub probe_size: usize,
}

impl RunConfig {
    pub fn data_source(&self) -> DataSource {
        match &self.data_dir {
            Some(dir) => DataSource::Directory(dir.into()),
            None => DataSource::Download,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(ConvNetConfig::new())
    }
}
