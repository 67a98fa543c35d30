use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

const MIME_TEXT: &str = "text/plain";
const MIME_WORD: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MIME_SLIDE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const MIME_SHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MIME_PDF: &str = "application/pdf";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Text,
    Word,
    Slide,
    Sheet,
    Pdf,
    ChatTurn,
    /// Health-endpoint GET standing in for browse/download traffic.
    Browse,
}

impl ContentKind {
    #[must_use]
    pub fn is_file(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Word | Self::Slide | Self::Sheet | Self::Pdf
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFile {
    pub name: Arc<str>,
    pub kind: ContentKind,
    pub content_type: &'static str,
    pub size_bytes: u64,
}

/// The documents uploads are drawn from. Content is loaded by the transport; the catalog only
/// carries names, kinds and nominal sizes.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    files: Arc<[CatalogFile]>,
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl FileCatalog {
    #[must_use]
    pub fn standard() -> Self {
        let f = |name: &str, kind, content_type, size_bytes| CatalogFile {
            name: Arc::from(name),
            kind,
            content_type,
            size_bytes,
        };

        Self::new(vec![
            f("very-small-10KB.txt", ContentKind::Text, MIME_TEXT, 10 * KIB),
            f("small-100KB.txt", ContentKind::Text, MIME_TEXT, 100 * KIB),
            f("medium-1MB.txt", ContentKind::Text, MIME_TEXT, MIB),
            f("document-50KB.docx", ContentKind::Word, MIME_WORD, 50 * KIB),
            f("document-100KB.docx", ContentKind::Word, MIME_WORD, 100 * KIB),
            f(
                "presentation-50KB.pptx",
                ContentKind::Slide,
                MIME_SLIDE,
                50 * KIB,
            ),
            f(
                "presentation-100KB.pptx",
                ContentKind::Slide,
                MIME_SLIDE,
                100 * KIB,
            ),
            f(
                "spreadsheet-50KB.xlsx",
                ContentKind::Sheet,
                MIME_SHEET,
                50 * KIB,
            ),
            f(
                "spreadsheet-100KB.xlsx",
                ContentKind::Sheet,
                MIME_SHEET,
                100 * KIB,
            ),
            f("Data Science.pdf", ContentKind::Pdf, MIME_PDF, 111 * KIB),
            f(
                "Software Development Engineer.pdf",
                ContentKind::Pdf,
                MIME_PDF,
                104 * KIB,
            ),
            f("Resume.pdf", ContentKind::Pdf, MIME_PDF, 94 * KIB),
            f("Cyber-Security.pdf", ContentKind::Pdf, MIME_PDF, 113 * KIB),
        ])
    }

    #[must_use]
    pub fn new(files: Vec<CatalogFile>) -> Self {
        Self {
            files: Arc::from(files),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogFile> {
        self.files.iter().find(|f| f.name.as_ref() == name)
    }

    #[must_use]
    pub fn all(&self) -> &[CatalogFile] {
        &self.files
    }

    pub fn of_kind(&self, kind: ContentKind) -> impl Iterator<Item = &CatalogFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }
}

/// How an upload generator chooses its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePick {
    Named(String),
    /// Kind uniformly from the list, then a file of that kind uniformly.
    Kinds(Vec<ContentKind>),
    Any,
}

impl FilePick {
    /// Returns `None` when nothing in the catalog matches; validated at configuration time.
    pub fn pick<'a, R: Rng + ?Sized>(
        &self,
        catalog: &'a FileCatalog,
        rng: &mut R,
    ) -> Option<&'a CatalogFile> {
        match self {
            Self::Named(name) => catalog.get(name),
            Self::Any => pick_uniform(catalog.all().iter(), rng),
            Self::Kinds(kinds) => {
                if kinds.is_empty() {
                    return None;
                }
                let kind = kinds[rng.gen_range(0..kinds.len())];
                pick_uniform(catalog.of_kind(kind), rng)
            }
        }
    }

    /// Every file this pick can return.
    #[must_use]
    pub fn candidates<'a>(&self, catalog: &'a FileCatalog) -> Vec<&'a CatalogFile> {
        match self {
            Self::Named(name) => catalog.get(name).into_iter().collect(),
            Self::Any => catalog.all().iter().collect(),
            Self::Kinds(kinds) => catalog
                .all()
                .iter()
                .filter(|f| kinds.contains(&f.kind))
                .collect(),
        }
    }
}

fn pick_uniform<'a, R: Rng + ?Sized>(
    iter: impl Iterator<Item = &'a CatalogFile>,
    rng: &mut R,
) -> Option<&'a CatalogFile> {
    let items: Vec<&CatalogFile> = iter.collect();
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())])
}
