//! End-to-end tests for the single-sample loader pipeline.

mod common;

use common::Fixture;
use cxr_vision::pipeline::{run, LoaderConfig, REPORT_FILE_NAME};
use cxr_vision::{get_transforms, Error, RadiologyDataset};

fn config(fixture: &Fixture) -> LoaderConfig {
    LoaderConfig {
        xml_dir: fixture.xml_dir(),
        image_dir: fixture.image_dir(),
        save_dir: fixture.save_dir(),
        ..Default::default()
    }
}

#[test]
fn run_exports_first_sample_as_jpegs_and_report() {
    let fixture = Fixture::new();
    fixture.add_report(1, "Heart size normal.", &["CXR1_1_IM-0001-3001", "CXR1_1_IM-0001-4001"]);
    fixture.add_report(2, "Lungs clear.", &["CXR2_IM-0652-1001"]);

    let summary = run(&config(&fixture)).unwrap();

    assert!(summary.source.ends_with("1.xml"));
    assert_eq!(summary.image_files.len(), 2);
    for (i, file) in summary.image_files.iter().enumerate() {
        assert_eq!(file, &fixture.save_dir().join(format!("sample_image_{}.jpg", i + 1)));
        let decoded = image::open(file).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (224, 224));
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture.save_dir().join(REPORT_FILE_NAME)).unwrap())
            .unwrap();
    assert_eq!(json["text"], "Chest pain Heart size normal. No acute disease.");
    assert_eq!(json["sections"][1]["label"], "FINDINGS");
    assert_eq!(json["metadata"]["article_date"], "2013-08-01");
    assert_eq!(json["metadata"]["specialty"], "pulmonary diseases");
    assert_eq!(json["images"][0]["shape"], serde_json::json!([3, 224, 224]));
}

#[test]
fn exported_images_are_denormalised() {
    let fixture = Fixture::new();
    fixture.add_report(1, "Normal.", &["white"]);
    image::RgbImage::from_pixel(300, 300, image::Rgb([255, 255, 255]))
        .save(fixture.image_dir().join("white.jpg"))
        .unwrap();

    let summary = run(&config(&fixture)).unwrap();
    let exported = image::open(&summary.image_files[0]).unwrap().to_rgb8();
    let centre = exported.get_pixel(112, 112);
    assert!(centre.0.iter().all(|&c| c > 240), "expected white, got {centre:?}");
}

#[test]
fn seeded_augmentation_is_reproducible() {
    let fixture = Fixture::new();
    fixture.add_report(1, "Normal.", &["a"]);

    let load = |seed| {
        RadiologyDataset::new(fixture.xml_dir(), fixture.image_dir(), Some(get_transforms(true)))
            .unwrap()
            .with_seed(seed)
            .get(0)
            .unwrap()
    };

    let first = load(42);
    let second = load(42);
    assert_eq!(first.images, second.images);
    assert_eq!(first.images[0].shape(), (3, 224, 224));
}

#[test]
fn missing_image_dir_stops_the_run() {
    let fixture = Fixture::new();
    let mut config = config(&fixture);
    config.image_dir = fixture.root.path().join("missing");
    assert!(matches!(run(&config), Err(Error::MissingDirectory { kind: "Image", .. })));
    assert!(!fixture.save_dir().exists());
}

#[test]
fn index_past_the_end_is_an_error() {
    let fixture = Fixture::new();
    fixture.add_report(1, "Normal.", &[]);
    let config = LoaderConfig {
        index: 5,
        ..config(&fixture)
    };
    assert!(matches!(run(&config), Err(Error::IndexOutOfRange { index: 5, len: 1 })));
}
