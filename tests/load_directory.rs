use std::path::Path;

use mnist_convnet::{
    ConvNetConfig,
    data::{
        DataError, DataSource, MnistData, TEST_IMAGES, TEST_LABELS, TRAIN_IMAGES, TRAIN_LABELS,
    },
    idx::IdxError,
};

pub type TestBackend = burn::backend::NdArray<f32>;

const SIDE: u32 = 28;

fn write_images(path: &Path, count: u32) {
    let mut bytes = Vec::new();
    for word in [0x0000_0803u32, count, SIDE, SIDE] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.extend((0..count * SIDE * SIDE).map(|i| (i % 256) as u8));
    std::fs::write(path, bytes).unwrap();
}

fn write_labels(path: &Path, labels: &[u8]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x0000_0801u32.to_be_bytes());
    bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    bytes.extend_from_slice(labels);
    std::fs::write(path, bytes).unwrap();
}

fn dataset_dir(train: &[u8], test: &[u8]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_images(&dir.path().join(TRAIN_IMAGES), train.len() as u32);
    write_labels(&dir.path().join(TRAIN_LABELS), train);
    write_images(&dir.path().join(TEST_IMAGES), test.len() as u32);
    write_labels(&dir.path().join(TEST_LABELS), test);
    dir
}

#[test]
fn loads_normalizes_and_feeds_the_model() {
    let dir = dataset_dir(&[5, 0, 4, 1, 9], &[7, 2, 1]);
    let data = MnistData::load(&DataSource::Directory(dir.path().to_path_buf())).unwrap();

    assert_eq!(data.train.shape(), [5, 28, 28]);
    assert_eq!(data.test.labels, vec![7, 2, 1]);

    let test = data.test.normalize();
    assert_eq!(test.shape(), [3, 28, 28, 1]);
    assert_eq!(test.values()[0], 0.0);
    assert_eq!(test.values()[255], 1.0);

    let device = Default::default();
    let model = ConvNetConfig::new().init::<TestBackend>(&device).unwrap();
    let output = model.forward(test.head(2).to_tensor::<TestBackend>(&device));

    assert_eq!(output.dims(), [2, 10]);
}

#[test]
fn missing_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();

    let err = MnistData::load(&DataSource::Directory(dir.path().to_path_buf())).unwrap_err();

    assert!(matches!(err, DataError::Idx(IdxError::Io { .. })));
}

#[test]
fn label_out_of_range_is_rejected() {
    let dir = dataset_dir(&[3, 12], &[0]);

    let err = MnistData::load(&DataSource::Directory(dir.path().to_path_buf())).unwrap_err();

    assert!(matches!(
        err,
        DataError::LabelOutOfRange { index: 1, label: 12 }
    ));
}
