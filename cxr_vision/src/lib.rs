// THEORY:
// This file is the main entry point for the `cxr_vision` library crate.
// It exposes the data-loading front end for the OpenI (Indiana University) Chest
// X-ray Collection: report parsing, dataset indexing, image transforms, and the
// single-sample and parallel export pipelines.
//
// The `cxr_inspector` binary is the primary consumer. Everything it needs is
// re-exported from here so it never has to reach into `core_modules`.

pub mod core_modules;
pub mod error;
pub mod logging;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::dataset::{RadiologyDataset, Sample};
pub use core_modules::report::{ImageRef, Metadata, Report, ReportRecord, ReportSection};
pub use core_modules::tensor::ImageTensor;
pub use core_modules::transforms::{get_transforms, Compose, Normalize};
pub use error::{Error, Result};
