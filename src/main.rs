use std::error::Error;
use std::path::PathBuf;

use burn::{config::Config, prelude::Backend};
use clap::Parser;
use mnist_convnet::{
    RunConfig,
    data::{MnistData, NormalizedImages},
    infer_shapes,
};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "ndarray")]
type SelectedBackend = burn::backend::NdArray<f32>;
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
type SelectedBackend = burn::backend::Wgpu;
#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("enable the `ndarray` or `wgpu` feature to select a backend");

/// Declare the MNIST convnet, load and normalize the dataset, and print the model summary.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Run configuration to load (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the uncompressed IDX files. Overrides the configuration.
    #[arg(long)]
    data_dir: Option<String>,

    /// Write the effective configuration to this path.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Only declare and summarize the model.
    #[arg(long)]
    skip_data: bool,
}

fn describe(name: &str, images: &NormalizedImages, labels: usize) {
    println!("{name}: images {:?}, {labels} labels", images.shape());
}

fn run<B: Backend>(
    args: &Args,
    config: &RunConfig,
    device: B::Device,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let summary = infer_shapes(&config.model.layers())?;
    let model = config.model.init::<B>(&device)?;
    log::debug!("{model}");

    if args.skip_data {
        println!("{summary}");
        return Ok(());
    }

    let data = MnistData::load(&config.data_source())?;
    let train = data.train.normalize();
    let test = data.test.normalize();
    train.check_input_shape(config.model.input_shape)?;
    test.check_input_shape(config.model.input_shape)?;

    describe("train", &train, data.train.labels.len());
    describe("test", &test, data.test.labels.len());
    println!("{summary}");

    let probe = test.head(config.probe_size);
    if probe.shape()[0] > 0 {
        let output = model.forward(probe.to_tensor::<B>(&device));
        log::info!(
            "Forward pass on {:?} produced {:?}",
            probe.shape(),
            output.dims()
        );
    }

    Ok(())
}

/// Load the configuration, apply command line overrides and save it if asked to.
fn resolve_config(args: &Args) -> Result<RunConfig, Box<dyn Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .map_err(|err| format!("could not load {}: {err}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }

    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Saved configuration to {}", path.display());
    }

    Ok(config)
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    let config = resolve_config(&args)?;

    run::<SelectedBackend>(&args, &config, Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnist_convnet::data::{
        DataError, TEST_IMAGES, TEST_LABELS, TRAIN_IMAGES, TRAIN_LABELS,
    };
    use std::path::Path;

    type TestBackend = burn::backend::NdArray<f32>;

    fn args(flags: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mnist-convnet").chain(flags.iter().copied()))
            .unwrap()
    }

    fn write_split(dir: &Path, images: &str, labels: &str, count: u32, side: u32) {
        let mut bytes = Vec::new();
        for word in [0x0000_0803u32, count, side, side] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.resize(bytes.len() + (count * side * side) as usize, 128);
        std::fs::write(dir.join(images), bytes).unwrap();

        let mut bytes = Vec::new();
        for word in [0x0000_0801u32, count] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.resize(bytes.len() + count as usize, 3);
        std::fs::write(dir.join(labels), bytes).unwrap();
    }

    fn dataset_dir(side: u32) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), TRAIN_IMAGES, TRAIN_LABELS, 4, side);
        write_split(dir.path(), TEST_IMAGES, TEST_LABELS, 2, side);
        dir
    }

    #[test]
    fn skip_data_only_summarizes() {
        let args = args(&["--skip-data", "--data-dir", "/definitely/not/here"]);
        let config = resolve_config(&args).unwrap();

        run::<TestBackend>(&args, &config, Default::default()).unwrap();
    }

    #[test]
    fn save_config_writes_effective_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let path_arg = path.to_str().unwrap();
        let args = args(&["--data-dir", "/data/mnist", "--save-config", path_arg]);

        resolve_config(&args).unwrap();
        let saved = RunConfig::load(&path).unwrap();

        assert_eq!(saved.data_dir.as_deref(), Some("/data/mnist"));
        assert_eq!(saved.probe_size, 8);
    }

    #[test]
    fn config_file_is_loaded_before_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        RunConfig::default()
            .with_probe_size(2)
            .with_data_dir(Some("/from/file".to_string()))
            .save(&path)
            .unwrap();
        let path_arg = path.to_str().unwrap();

        let config = resolve_config(&args(&["--config", path_arg, "--data-dir", "/cli"])).unwrap();

        assert_eq!(config.probe_size, 2);
        assert_eq!(config.data_dir.as_deref(), Some("/cli"));
    }

    #[test]
    fn runs_on_local_dataset() {
        let data = dataset_dir(28);
        let args = args(&["--data-dir", data.path().to_str().unwrap()]);
        let config = resolve_config(&args).unwrap();

        run::<TestBackend>(&args, &config, Default::default()).unwrap();
    }

    #[test]
    fn rejects_images_the_model_cannot_take() {
        let data = dataset_dir(20);
        let args = args(&["--data-dir", data.path().to_str().unwrap()]);
        let config = resolve_config(&args).unwrap();

        let err = run::<TestBackend>(&args, &config, Default::default()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::ShapeMismatch {
                expected: [28, 28, 1],
                found: [20, 20, 1]
            })
        ));
    }
}
