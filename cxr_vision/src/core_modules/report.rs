// THEORY:
// The `report` module turns one OpenI `ecgen-radiology` XML file into a typed
// `ReportRecord`. Every record carries three things:
//
// 1.  **Report text**: the `AbstractText` sections of the first `Abstract` element.
//     Each section keeps its `Label` (COMPARISON, INDICATION, FINDINGS, IMPRESSION)
//     so callers can read a single section or the combined text.
// 2.  **Metadata**: article date, title, specialty and the MeSH terms.
// 3.  **Image references**: one per top-level `parentImage`. Only the basename of
//     the panel URL is used; it is re-rooted under the local image directory
//     because the URLs in the collection point at the original storage host.
//
// Parsing is two-phase. `quick_xml` events are folded into a small element tree,
// then the tree is queried with "first child" / "first descendant" lookups. The
// tree keeps the lookups readable and makes document order explicit.

use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::trace;

use crate::error::{Error, Result};

/// One labelled `AbstractText` section of a radiology report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub label: Option<String>,
    pub text: String,
}

/// The free-text part of a report, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub sections: Vec<ReportSection>,
}

impl Report {
    /// All section texts joined by a single space.
    pub fn text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text of the first section carrying `label`, compared case-insensitively.
    pub fn section(&self, label: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)))
            .map(|s| s.text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub article_date: Option<String>,
    pub title: Option<String>,
    pub specialty: Option<String>,
    pub mesh_major: Vec<String>,
    pub mesh_minor: Vec<String>,
}

/// A radiograph referenced by a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    /// The `parentImage` id, e.g. `CXR1_1_IM-0001-3001`.
    pub id: Option<String>,
    pub caption: Option<String>,
    /// The panel URL exactly as written in the XML.
    pub url: String,
    /// `url`'s basename joined onto the local image directory.
    pub path: PathBuf,
}

/// Everything extracted from a single report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub source: PathBuf,
    pub report: Report,
    pub metadata: Metadata,
    pub images: Vec<ImageRef>,
}

impl ReportRecord {
    pub fn image_paths(&self) -> impl Iterator<Item = &Path> {
        self.images.iter().map(|i| i.path.as_path())
    }
}

/// Reads and parses a report file.
pub fn parse_report_file(path: &Path, image_dir: &Path) -> Result<ReportRecord> {
    let xml = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut record = parse_report(&xml, image_dir)?;
    record.source = path.to_path_buf();
    Ok(record)
}

/// Parses report XML. The returned record has an empty `source`.
pub fn parse_report(xml: &str, image_dir: &Path) -> Result<ReportRecord> {
    let root = Element::parse(xml)?;

    let report = Report {
        sections: root
            .descendant("Abstract")
            .map(|abstract_el| {
                abstract_el
                    .children_named("AbstractText")
                    .filter_map(|el| {
                        let text = el.text.trim();
                        (!text.is_empty()).then(|| ReportSection {
                            label: el.attribute("Label").map(str::to_owned),
                            text: text.to_owned(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    let article_date = root.descendant("ArticleDate").map(|date| {
        let part = |name: &str| date.child(name).map(|e| e.text.trim()).unwrap_or("");
        format!("{}-{}-{}", part("Year"), part("Month"), part("Day"))
            .trim_matches('-')
            .to_owned()
    });

    let mesh_terms = |name: &str| -> Vec<String> {
        root.child("MeSH")
            .map(|mesh| {
                mesh.children_named(name)
                    .filter_map(|e| non_empty(&e.text))
                    .collect()
            })
            .unwrap_or_default()
    };

    let metadata = Metadata {
        article_date,
        title: root.descendant("ArticleTitle").and_then(|e| non_empty(&e.text)),
        specialty: root.descendant("specialty").and_then(|e| non_empty(&e.text)),
        mesh_major: mesh_terms("major"),
        mesh_minor: mesh_terms("minor"),
    };

    let images = root
        .children_named("parentImage")
        .filter_map(|parent| {
            let url = parent
                .child("panel")?
                .child("url")
                .and_then(|u| non_empty(&u.text))?;
            let file_name = url.rsplit('/').next().filter(|n| !n.is_empty())?;
            Some(ImageRef {
                id: parent.attribute("id").map(str::to_owned),
                caption: parent.child("caption").and_then(|c| non_empty(&c.text)),
                path: image_dir.join(file_name),
                url,
            })
        })
        .collect::<Vec<_>>();

    trace!(
        sections = report.sections.len(),
        images = images.len(),
        "parsed report"
    );

    Ok(ReportRecord {
        source: PathBuf::new(),
        report,
        metadata,
        images,
    })
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

/// A minimal owned XML element: name, attributes, direct text and children.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let mut open: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => open.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    Self::close(&mut open, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = open.pop() {
                        Self::close(&mut open, &mut root, element);
                    }
                }
                // Only text before an element's first child counts, like
                // ElementTree's `.text`.
                Event::Text(text) => {
                    if let Some(top) = open.last_mut().filter(|e| e.children.is_empty()) {
                        top.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = open.last_mut().filter(|e| e.children.is_empty()) {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(Error::IncompleteXml(format!(
                "element <{}> is never closed",
                unclosed.name
            )));
        }
        root.ok_or_else(|| Error::IncompleteXml("document has no root element".into()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        })
    }

    fn close(open: &mut [Element], root: &mut Option<Element>, element: Element) {
        match open.last_mut() {
            Some(parent) => parent.children.push(element),
            // Anything after the first root is ignored.
            None => {
                root.get_or_insert(element);
            }
        }
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First matching descendant in document order, excluding `self`.
    fn descendant(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|c| {
            if c.name == name {
                Some(c)
            } else {
                c.descendant(name)
            }
        })
    }
}
