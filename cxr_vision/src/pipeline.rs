// THEORY:
// The `pipeline` module is the top-level API for loading a single sample and
// writing it to disk for inspection. It strings the whole stack together:
//
//     check paths -> index dataset -> parse report -> decode + transform images
//                 -> export JPEGs + report JSON
//
// The exported JPEGs are denormalised first when the transform standardised the
// tensor, so what lands on disk is the augmented image a person would recognise,
// not the raw model input.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::core_modules::dataset::{RadiologyDataset, Sample};
use crate::core_modules::report::{Metadata, ReportSection};
use crate::core_modules::transforms::{get_transforms, Normalize};
use crate::error::{Error, Result};

pub const DEFAULT_XML_DIR: &str = "data/ecgen-radiology";
pub const DEFAULT_IMAGE_DIR: &str = "data/radiology/extract";
pub const DEFAULT_SAVE_DIR: &str = "data/samples";

pub const REPORT_FILE_NAME: &str = "sample_report.json";

/// Configuration for a loader run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub xml_dir: PathBuf,
    pub image_dir: PathBuf,
    pub save_dir: PathBuf,
    pub augment: bool,
    /// Index of the sample to export.
    pub index: usize,
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            xml_dir: DEFAULT_XML_DIR.into(),
            image_dir: DEFAULT_IMAGE_DIR.into(),
            save_dir: DEFAULT_SAVE_DIR.into(),
            augment: false,
            index: 0,
            seed: None,
        }
    }
}

impl LoaderConfig {
    /// Builds the dataset described by this configuration.
    pub fn open_dataset(&self) -> Result<RadiologyDataset> {
        if self.augment {
            debug!("Initializing and augmenting the dataset...");
        } else {
            debug!("Initializing the dataset...");
        }
        let dataset = RadiologyDataset::new(
            &self.xml_dir,
            &self.image_dir,
            Some(get_transforms(self.augment)),
        )?;
        if dataset.is_empty() {
            return Err(Error::EmptyDataset(self.xml_dir.clone()));
        }
        Ok(match self.seed {
            Some(seed) => dataset.with_seed(seed),
            None => dataset,
        })
    }
}

/// What `export_sample` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub source: PathBuf,
    pub image_files: Vec<PathBuf>,
    pub report_file: PathBuf,
}

#[derive(Serialize)]
struct ExportedReport<'a> {
    source: &'a Path,
    text: String,
    sections: &'a [ReportSection],
    metadata: &'a Metadata,
    images: Vec<ExportedImage<'a>>,
}

#[derive(Serialize)]
struct ExportedImage<'a> {
    original: &'a Path,
    file: PathBuf,
    shape: (usize, usize, usize),
}

/// Fails if either input directory is missing; creates the save directory.
pub fn check_create_paths(config: &LoaderConfig) -> Result<()> {
    for (kind, path) in [("XML", &config.xml_dir), ("Image", &config.image_dir)] {
        if !path.is_dir() {
            return Err(Error::MissingDirectory {
                kind,
                path: path.clone(),
            });
        }
    }
    std::fs::create_dir_all(&config.save_dir).map_err(|e| Error::io(&config.save_dir, e))?;

    debug!("All directories are present and correct.");
    Ok(())
}

/// Writes `sample_image_{n}.jpg` for every image and `sample_report.json`.
pub fn export_sample(
    sample: &Sample,
    save_dir: &Path,
    normalize: Option<&Normalize>,
) -> Result<ExportSummary> {
    debug!("Dataset sample metadata: \n{:#?}", sample.metadata);

    let mut image_files = Vec::with_capacity(sample.images.len());
    let mut exported_images = Vec::with_capacity(sample.images.len());
    for (i, (tensor, original)) in sample.images.iter().zip(&sample.image_paths).enumerate() {
        let image = match normalize {
            Some(params) => {
                let mut restored = tensor.clone();
                restored.denormalize(params);
                restored.to_rgb_image()
            }
            None => tensor.to_rgb_image(),
        };

        let file = save_dir.join(format!("sample_image_{}.jpg", i + 1));
        image.save(&file).map_err(|e| Error::image(&file, e))?;

        exported_images.push(ExportedImage {
            original,
            file: file.clone(),
            shape: tensor.shape(),
        });
        image_files.push(file);
    }

    debug!("Sample report:");
    for section in &sample.report.sections {
        debug!("{}: {}", section.label.as_deref().unwrap_or("TEXT"), section.text);
    }

    let report_file = save_dir.join(REPORT_FILE_NAME);
    let exported = ExportedReport {
        source: &sample.source,
        text: sample.report.text(),
        sections: &sample.report.sections,
        metadata: &sample.metadata,
        images: exported_images,
    };
    let json = serde_json::to_string_pretty(&exported)?;
    std::fs::write(&report_file, json).map_err(|e| Error::io(&report_file, e))?;

    Ok(ExportSummary {
        source: sample.source.clone(),
        image_files,
        report_file,
    })
}

/// Checks paths, loads `config.index` and exports it into `config.save_dir`.
pub fn run(config: &LoaderConfig) -> Result<ExportSummary> {
    check_create_paths(config)?;
    let dataset = config.open_dataset()?;

    let sample = dataset.get(config.index)?;
    let summary = export_sample(
        &sample,
        &config.save_dir,
        dataset.transform().and_then(|t| t.normalization()),
    )?;

    info!(
        source = %summary.source.display(),
        images = summary.image_files.len(),
        save_dir = %config.save_dir.display(),
        "exported sample"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_collection_layout() {
        let config = LoaderConfig::default();
        assert_eq!(config.xml_dir, Path::new("data/ecgen-radiology"));
        assert_eq!(config.image_dir, Path::new("data/radiology/extract"));
        assert_eq!(config.save_dir, Path::new("data/samples"));
        assert!(!config.augment);
    }

    #[test]
    fn missing_directories_are_reported_by_kind() {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig {
            xml_dir: dir.path().join("xml"),
            image_dir: dir.path().to_path_buf(),
            save_dir: dir.path().join("out"),
            ..Default::default()
        };
        match check_create_paths(&config) {
            Err(Error::MissingDirectory { kind, .. }) => assert_eq!(kind, "XML"),
            other => panic!("unexpected {other:?}"),
        }

        let config = LoaderConfig {
            xml_dir: dir.path().to_path_buf(),
            image_dir: dir.path().join("img"),
            ..config
        };
        match check_create_paths(&config) {
            Err(Error::MissingDirectory { kind, .. }) => assert_eq!(kind, "Image"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn save_dir_is_created_recursively() {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig {
            xml_dir: dir.path().to_path_buf(),
            image_dir: dir.path().to_path_buf(),
            save_dir: dir.path().join("a/b/c"),
            ..Default::default()
        };
        check_create_paths(&config).unwrap();
        assert!(config.save_dir.is_dir());
    }

    #[test]
    fn empty_xml_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig {
            xml_dir: dir.path().to_path_buf(),
            image_dir: dir.path().to_path_buf(),
            save_dir: dir.path().join("out"),
            ..Default::default()
        };
        assert!(matches!(run(&config), Err(Error::EmptyDataset(_))));
    }
}
