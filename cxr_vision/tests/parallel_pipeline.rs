//! Tests for the batch exporter.

mod common;

use std::sync::Arc;

use common::Fixture;
use cxr_vision::parallel_pipeline::ParallelExporter;
use cxr_vision::pipeline::REPORT_FILE_NAME;
use cxr_vision::{get_transforms, Error, RadiologyDataset};

fn dataset(fixture: &Fixture, augment: bool) -> Arc<RadiologyDataset> {
    Arc::new(
        RadiologyDataset::new(fixture.xml_dir(), fixture.image_dir(), Some(get_transforms(augment)))
            .unwrap()
            .with_seed(7),
    )
}

fn populated() -> Fixture {
    let fixture = Fixture::new();
    for n in 1..=5 {
        fixture.add_report(n, &format!("Finding {n}."), &[format!("CXR{n}_IM-0001-1001").as_str()]);
    }
    fixture
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exports_each_report_into_its_own_directory_in_order() {
    let fixture = populated();
    let exporter = ParallelExporter::new(dataset(&fixture, false), 3);
    assert_eq!(exporter.worker_count(), 3);

    let summaries = exporter.export_range(0..5, &fixture.save_dir()).await.unwrap();
    exporter.shutdown().await;

    let sources: Vec<_> = summaries
        .iter()
        .map(|s| s.source.file_name().unwrap().to_str().unwrap().to_owned())
        .collect();
    assert_eq!(sources, ["1.xml", "2.xml", "3.xml", "4.xml", "5.xml"]);

    for stem in ["1", "2", "3", "4", "5"] {
        let dir = fixture.save_dir().join(stem);
        assert!(dir.join("sample_image_1.jpg").is_file());
        assert!(dir.join(REPORT_FILE_NAME).is_file());
    }
}

#[tokio::test]
async fn batch_output_does_not_depend_on_worker_count() {
    let fixture = populated();

    let single = ParallelExporter::new(dataset(&fixture, true), 1);
    let out_a = fixture.root.path().join("a");
    single.export_range(0..5, &out_a).await.unwrap();

    let many = ParallelExporter::new(dataset(&fixture, true), 4);
    let out_b = fixture.root.path().join("b");
    many.export_range(0..5, &out_b).await.unwrap();

    for stem in ["1", "2", "3", "4", "5"] {
        let a = std::fs::read(out_a.join(stem).join("sample_image_1.jpg")).unwrap();
        let b = std::fs::read(out_b.join(stem).join("sample_image_1.jpg")).unwrap();
        assert_eq!(a, b, "sample {stem} differs between runs");
    }
}

#[tokio::test]
async fn range_beyond_dataset_is_rejected() {
    let fixture = populated();
    let exporter = ParallelExporter::new(dataset(&fixture, false), 2);
    let result = exporter.export_range(3..9, &fixture.save_dir()).await;
    assert!(matches!(result, Err(Error::IndexOutOfRange { index: 8, len: 5 })));
}

#[tokio::test]
async fn start_past_the_last_report_is_rejected() {
    let fixture = populated();
    let exporter = ParallelExporter::new(dataset(&fixture, false), 2);

    // What the CLI builds for `--index 9 --count 3` on five reports.
    let result = exporter.export_range(9..5, &fixture.save_dir()).await;
    assert!(matches!(result, Err(Error::IndexOutOfRange { index: 9, len: 5 })));

    let result = exporter.export_range(5..5, &fixture.save_dir()).await;
    assert!(matches!(result, Err(Error::IndexOutOfRange { index: 5, len: 5 })));
    assert!(!fixture.save_dir().exists());
}

#[tokio::test]
async fn first_failure_is_returned() {
    let fixture = populated();
    std::fs::remove_file(fixture.image_dir().join("CXR3_IM-0001-1001.jpg")).unwrap();

    let exporter = ParallelExporter::new(dataset(&fixture, false), 2);
    let result = exporter.export_range(0..5, &fixture.save_dir()).await;
    match result {
        Err(Error::Image { path, .. }) => assert!(path.ends_with("CXR3_IM-0001-1001.jpg")),
        other => panic!("expected image error, got {other:?}"),
    }
}
