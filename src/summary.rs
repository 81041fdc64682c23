//! Shape inference and the printed summary of a sequential network.

use std::collections::HashMap;
use std::fmt::{self, Display};

use thiserror::Error;

use crate::model::{Activation, LayerSpec};

const RULE_WIDTH: usize = 65;
const NAME_WIDTH: usize = 28;
const SHAPE_WIDTH: usize = 26;

/// Error raised when a layer list does not describe a valid network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("the network has no layers")]
    Empty,

    #[error("the first layer must be an input, found {found}")]
    MissingInput { found: String },

    #[error("unexpected input layer at position {index}")]
    DuplicateInput { index: usize },

    #[error("{layer}: window {window:?} is larger than its input {input:?}")]
    WindowTooLarge {
        layer: String,
        window: [usize; 2],
        input: [usize; 2],
    },

    #[error("{layer}: spatial layer applied after flatten")]
    SpatialAfterFlatten { layer: String },

    #[error("{layer}: expects a flattened input")]
    NotFlattened { layer: String },

    #[error("{layer}: dropout probability {prob} is outside [0, 1)")]
    InvalidDropout { layer: String, prob: f64 },

    #[error("{layer}: {activation:?} activation is not supported, expected {expected:?}")]
    UnsupportedActivation {
        layer: String,
        activation: Activation,
        expected: Activation,
    },

    #[error("{layer}: sizes must be non-zero")]
    ZeroSize { layer: String },
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Spatial([usize; 3]),
    Flat(usize),
}

impl Shape {
    fn dims(&self) -> Vec<usize> {
        match self {
            Shape::Spatial(dims) => dims.to_vec(),
            Shape::Flat(size) => vec![*size],
        }
    }

    fn spatial(&self, layer: &str) -> Result<[usize; 3], ShapeError> {
        match self {
            Shape::Spatial(dims) => Ok(*dims),
            Shape::Flat(_) => Err(ShapeError::SpatialAfterFlatten {
                layer: layer.to_string(),
            }),
        }
    }
}

/// One row of the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: &'static str,
    /// Output shape without the batch dimension.
    pub output_shape: Vec<usize>,
    pub params: usize,
}

/// Per-layer output shapes and parameter counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSummary>,
}

impl ModelSummary {
    pub fn total_params(&self) -> usize {
        self.layers.iter().map(|layer| layer.params).sum()
    }

    /// Every parameter of this network is trainable.
    pub fn trainable_params(&self) -> usize {
        self.total_params()
    }

    /// Output size of the first flatten layer.
    pub fn flatten_size(&self) -> Option<usize> {
        self.layers
            .iter()
            .find(|layer| layer.kind == "Flatten")
            .and_then(|layer| layer.output_shape.first().copied())
    }
}

struct Namer {
    seen: HashMap<&'static str, usize>,
}

impl Namer {
    fn next(&mut self, base: &'static str) -> String {
        let count = self.seen.entry(base).or_insert(0);
        let name = match *count {
            0 => base.to_string(),
            n => format!("{base}_{n}"),
        };
        *count += 1;
        name
    }
}

fn check_activation(
    layer: &str,
    activation: Activation,
    expected: Activation,
) -> Result<(), ShapeError> {
    if activation != expected {
        return Err(ShapeError::UnsupportedActivation {
            layer: layer.to_string(),
            activation,
            expected,
        });
    }

    Ok(())
}

fn windowed(
    layer: &str,
    input: [usize; 2],
    window: [usize; 2],
    stride: [usize; 2],
) -> Result<[usize; 2], ShapeError> {
    if window.contains(&0) {
        return Err(ShapeError::ZeroSize {
            layer: layer.to_string(),
        });
    }
    if window[0] > input[0] || window[1] > input[1] {
        return Err(ShapeError::WindowTooLarge {
            layer: layer.to_string(),
            window,
            input,
        });
    }

    Ok([
        (input[0] - window[0]) / stride[0] + 1,
        (input[1] - window[1]) / stride[1] + 1,
    ])
}

/// Walk the layer list, checking each layer against its input shape.
pub fn infer_shapes(layers: &[LayerSpec]) -> Result<ModelSummary, ShapeError> {
    let (input_shape, rest) = match layers.split_first() {
        None => return Err(ShapeError::Empty),
        Some((LayerSpec::Input { shape }, rest)) => (*shape, rest),
        Some((other, _)) => {
            return Err(ShapeError::MissingInput {
                found: format!("{other:?}"),
            });
        }
    };
    if input_shape.contains(&0) {
        return Err(ShapeError::ZeroSize {
            layer: "input".to_string(),
        });
    }

    let mut namer = Namer {
        seen: HashMap::new(),
    };
    let mut shape = Shape::Spatial(input_shape);
    let mut rows = Vec::with_capacity(rest.len());

    for (position, layer) in rest.iter().enumerate() {
        let (name, kind, params, output) = match layer {
            LayerSpec::Input { .. } => {
                return Err(ShapeError::DuplicateInput {
                    index: position + 1,
                });
            }
            LayerSpec::Conv2d {
                filters,
                kernel_size,
                activation,
            } => {
                let name = namer.next("conv2d");
                check_activation(&name, *activation, Activation::Relu)?;
                let [height, width, channels] = shape.spatial(&name)?;
                if *filters == 0 {
                    return Err(ShapeError::ZeroSize { layer: name });
                }
                let [height, width] = windowed(&name, [height, width], *kernel_size, [1, 1])?;
                let params = kernel_size[0] * kernel_size[1] * channels * filters + filters;

                (name, "Conv2D", params, Shape::Spatial([height, width, *filters]))
            }
            LayerSpec::MaxPool2d { pool_size } => {
                let name = namer.next("max_pooling2d");
                let [height, width, channels] = shape.spatial(&name)?;
                let [height, width] = windowed(&name, [height, width], *pool_size, *pool_size)?;

                (name, "MaxPooling2D", 0, Shape::Spatial([height, width, channels]))
            }
            LayerSpec::Flatten => {
                let name = namer.next("flatten");
                let [height, width, channels] = shape.spatial(&name)?;

                (name, "Flatten", 0, Shape::Flat(height * width * channels))
            }
            LayerSpec::Dropout { prob } => {
                let name = namer.next("dropout");
                if !(0.0..1.0).contains(prob) {
                    return Err(ShapeError::InvalidDropout {
                        layer: name,
                        prob: *prob,
                    });
                }

                (name, "Dropout", 0, shape)
            }
            LayerSpec::Dense { units, activation } => {
                let name = namer.next("dense");
                check_activation(&name, *activation, Activation::Softmax)?;
                let Shape::Flat(features) = shape else {
                    return Err(ShapeError::NotFlattened { layer: name });
                };
                if *units == 0 {
                    return Err(ShapeError::ZeroSize { layer: name });
                }

                (name, "Dense", features * units + units, Shape::Flat(*units))
            }
        };

        log::debug!("{name} ({kind}) -> {:?}, {params} params", output.dims());

        rows.push(LayerSummary {
            name,
            kind,
            output_shape: output.dims(),
            params,
        });
        shape = output;
    }

    Ok(ModelSummary {
        input_shape,
        layers: rows,
    })
}

/// `1234567` -> `1,234,567`
fn thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }

    out
}

impl Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "_".repeat(RULE_WIDTH);
        let double_rule = "=".repeat(RULE_WIDTH);

        writeln!(f, "Model: \"sequential\"")?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            " {:<NAME_WIDTH$}{:<SHAPE_WIDTH$}Param #",
            "Layer (type)", "Output Shape"
        )?;
        writeln!(f, "{double_rule}")?;

        for (i, layer) in self.layers.iter().enumerate() {
            let dims: Vec<String> = layer.output_shape.iter().map(usize::to_string).collect();
            let shape = format!("(None, {})", dims.join(", "));
            let label = format!("{} ({})", layer.name, layer.kind);

            writeln!(
                f,
                " {label:<NAME_WIDTH$}{shape:<SHAPE_WIDTH$}{}",
                thousands(layer.params)
            )?;
            if i + 1 < self.layers.len() {
                writeln!(f)?;
            }
        }

        let total = self.total_params();
        let trainable = self.trainable_params();

        writeln!(f, "{double_rule}")?;
        writeln!(f, "Total params: {}", thousands(total))?;
        writeln!(f, "Trainable params: {}", thousands(trainable))?;
        writeln!(f, "Non-trainable params: {}", thousands(total - trainable))?;
        write!(f, "{rule}")
    }
}
