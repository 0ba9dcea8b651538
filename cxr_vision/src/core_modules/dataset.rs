// THEORY:
// `RadiologyDataset` is the indexed view over the OpenI collection on disk:
//
//     <xml_dir>/1.xml, 2.xml, ...          one report per file
//     <image_dir>/CXR2_IM-0652-1001.jpg    the radiographs the reports reference
//
// Construction only lists the report files (sorted by path, so indices are stable
// across runs). Nothing is parsed or decoded until a sample is requested, which
// keeps opening a dataset of several thousand reports instant.
//
// Random transforms are driven by a per-index generator. With a base seed the same
// index always yields the same augmentation, regardless of the order or the thread
// that loads it. This is what lets the parallel exporter stay reproducible.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, instrument};

use crate::core_modules::report::{parse_report_file, Metadata, Report, ReportRecord};
use crate::core_modules::tensor::ImageTensor;
use crate::core_modules::transforms::Compose;
use crate::error::{Error, Result};

const REPORT_EXTENSION: &str = "xml";

/// A fully loaded sample: transformed images plus the report they belong to.
#[derive(Debug, Clone)]
pub struct Sample {
    pub source: PathBuf,
    pub images: Vec<ImageTensor>,
    pub image_paths: Vec<PathBuf>,
    pub report: Report,
    pub metadata: Metadata,
}

#[derive(Debug)]
pub struct RadiologyDataset {
    xml_dir: PathBuf,
    image_dir: PathBuf,
    transform: Option<Compose>,
    xml_files: Vec<PathBuf>,
    seed: Option<u64>,
}

impl RadiologyDataset {
    /// Indexes every `*.xml` file directly inside `xml_dir`.
    pub fn new(
        xml_dir: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
        transform: Option<Compose>,
    ) -> Result<Self> {
        let xml_dir = xml_dir.into();
        let entries = std::fs::read_dir(&xml_dir).map_err(|e| Error::io(&xml_dir, e))?;

        let mut xml_files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io(&xml_dir, e))?.path();
            let is_report = path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == REPORT_EXTENSION);
            if is_report {
                xml_files.push(path);
            }
        }
        xml_files.sort();

        debug!(xml_dir = %xml_dir.display(), reports = xml_files.len(), "indexed dataset");

        Ok(Self {
            xml_dir,
            image_dir: image_dir.into(),
            transform,
            xml_files,
            seed: None,
        })
    }

    /// Makes random transforms reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.xml_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xml_files.is_empty()
    }

    pub fn xml_dir(&self) -> &Path {
        &self.xml_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn xml_files(&self) -> &[PathBuf] {
        &self.xml_files
    }

    pub fn transform(&self) -> Option<&Compose> {
        self.transform.as_ref()
    }

    /// Parses the report at `index` without touching its images.
    pub fn record(&self, index: usize) -> Result<ReportRecord> {
        let path = self.xml_files.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        parse_report_file(path, &self.image_dir)
    }

    /// Loads the sample at `index`: parses the report, decodes every referenced
    /// image as RGB and runs the transform (plain ToTensor when there is none).
    #[instrument(level = "debug", skip(self))]
    pub fn get(&self, index: usize) -> Result<Sample> {
        let record = self.record(index)?;
        let mut rng = self.rng_for(index);

        let mut images = Vec::with_capacity(record.images.len());
        for path in record.image_paths() {
            let image = image::open(path)
                .map_err(|e| Error::image(path, e))?
                .to_rgb8();
            let tensor = match &self.transform {
                Some(transform) => transform.apply(image, &mut rng)?,
                None => ImageTensor::from_rgb(&image),
            };
            images.push(tensor);
        }

        debug!(
            source = %record.source.display(),
            images = images.len(),
            "loaded sample"
        );

        Ok(Sample {
            image_paths: record.image_paths().map(Path::to_path_buf).collect(),
            source: record.source,
            images,
            report: record.report,
            metadata: record.metadata,
        })
    }

    fn rng_for(&self, index: usize) -> StdRng {
        match self.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            }
            None => StdRng::from_entropy(),
        }
    }
}
