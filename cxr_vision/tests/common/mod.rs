//! Fixture builder for cxr_vision integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

/// A miniature copy of the collection layout inside a temporary directory.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("ecgen-radiology")).unwrap();
        std::fs::create_dir_all(root.path().join("radiology/extract")).unwrap();
        Self { root }
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.root.path().join("ecgen-radiology")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.path().join("radiology/extract")
    }

    pub fn save_dir(&self) -> PathBuf {
        self.root.path().join("samples")
    }

    /// Writes `<n>.xml` referencing `images`, and a JPEG for each image.
    pub fn add_report(&self, n: usize, findings: &str, images: &[&str]) {
        std::fs::write(self.xml_dir().join(format!("{n}.xml")), report_xml(n, findings, images)).unwrap();
        for (i, name) in images.iter().enumerate() {
            write_radiograph(&self.image_dir().join(format!("{name}.jpg")), 64 + 16 * i as u32, 48);
        }
    }
}

pub fn report_xml(n: usize, findings: &str, images: &[&str]) -> String {
    let parent_images: String = images
        .iter()
        .map(|name| {
            format!(
                r#"<parentImage id="{name}"><caption>Xray Chest PA and Lateral</caption><panel type="single"><url>/hadoop/storage/radiology/extract/{name}.jpg</url></panel></parentImage>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<eCitation>
  <uId id="CXR{n}"/>
  <specialty>pulmonary diseases</specialty>
  <MedlineCitation>
    <Article>
      <ArticleTitle>Indiana University Chest X-ray Collection</ArticleTitle>
      <Abstract>
        <AbstractText Label="INDICATION">Chest pain</AbstractText>
        <AbstractText Label="FINDINGS">{findings}</AbstractText>
        <AbstractText Label="IMPRESSION">No acute disease.</AbstractText>
      </Abstract>
      <ArticleDate><Year>2013</Year><Month>08</Month><Day>01</Day></ArticleDate>
    </Article>
  </MedlineCitation>
  <MeSH><major>normal</major></MeSH>
  {parent_images}
</eCitation>"#
    )
}

/// A grey radiograph-like gradient with a bright "rib" band.
pub fn write_radiograph(path: &Path, width: u32, height: u32) {
    RgbImage::from_fn(width, height, |x, y| {
        let v = if y % 12 < 3 { 230 } else { ((x * 255) / width.max(1)) as u8 };
        Rgb([v, v, v])
    })
    .save(path)
    .unwrap();
}
