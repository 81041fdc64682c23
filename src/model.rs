use burn::{
    module::Module,
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, activation::softmax, backend::Backend},
};

use crate::{
    config::ConvNetConfig,
    summary::{ShapeError, infer_shapes},
};

/// Activation applied at the end of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Softmax,
}

/// One stage of the sequential network and its hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerSpec {
    /// Shape of a single sample, channel last.
    Input { shape: [usize; 3] },
    /// Valid-padded convolution with unit stride.
    Conv2d {
        filters: usize,
        kernel_size: [usize; 2],
        activation: Activation,
    },
    /// Max pooling with stride equal to the window.
    MaxPool2d { pool_size: [usize; 2] },
    Flatten,
    Dropout { prob: f64 },
    Dense { units: usize, activation: Activation },
}

impl ConvNetConfig {
    /// The network as an ordered list of layer descriptors.
    pub fn layers(&self) -> Vec<LayerSpec> {
        let [first, second] = self.conv_channels;

        vec![
            LayerSpec::Input {
                shape: self.input_shape,
            },
            LayerSpec::Conv2d {
                filters: first,
                kernel_size: self.kernel_size,
                activation: Activation::Relu,
            },
            LayerSpec::MaxPool2d {
                pool_size: self.pool_size,
            },
            LayerSpec::Conv2d {
                filters: second,
                kernel_size: self.kernel_size,
                activation: Activation::Relu,
            },
            LayerSpec::MaxPool2d {
                pool_size: self.pool_size,
            },
            LayerSpec::Flatten,
            LayerSpec::Dropout { prob: self.dropout },
            LayerSpec::Dense {
                units: self.num_classes,
                activation: Activation::Softmax,
            },
        ]
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ConvNet<B>, ShapeError> {
        let summary = infer_shapes(&self.layers())?;
        let in_features = summary
            .flatten_size()
            .ok_or_else(|| ShapeError::NotFlattened {
                layer: "dense".to_string(),
            })?;

        let channels_in = self.input_shape[2];
        let [first, second] = self.conv_channels;

        log::info!(
            "Building convnet with {} parameters",
            summary.total_params()
        );

        Ok(ConvNet {
            conv1: Conv2dConfig::new([channels_in, first], self.kernel_size)
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            pool1: MaxPool2dConfig::new(self.pool_size)
                .with_strides(self.pool_size)
                .init(),
            conv2: Conv2dConfig::new([first, second], self.kernel_size)
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            pool2: MaxPool2dConfig::new(self.pool_size)
                .with_strides(self.pool_size)
                .init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(in_features, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// Two convolution and pooling stages followed by a softmax classifier.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: MaxPool2d,
    dropout: Dropout,
    dense: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ConvNet<B> {
    /// # Shapes
    ///   - Images `[batch_size, height, width, channels]`
    ///   - Output `[batch_size, num_classes]`, rows summing to one
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // Convolutions expect channels first.
        let x = images.permute([0, 3, 1, 2]);

        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(x);
        let x = self.dense.forward(x);

        softmax(x, 1)
    }
}
