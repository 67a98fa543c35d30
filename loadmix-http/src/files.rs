use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use loadmix_core::FileCatalog;

use super::{Error, Result};

const FILLER: &[u8] = b"loadmix synthetic upload payload. ";

/// Upload contents keyed by catalog file name, loaded once and shared by every session.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    files: Arc<HashMap<Arc<str>, Bytes>>,
}

impl FileStore {
    /// Filler content with each file's nominal size, for runs without a files directory.
    #[must_use]
    pub fn synthesized(catalog: &FileCatalog) -> Self {
        let files = catalog
            .all()
            .iter()
            .map(|f| (f.name.clone(), filler(f.size_bytes)))
            .collect();
        Self {
            files: Arc::new(files),
        }
    }

    /// Reads every catalog file from `dir`. A missing file is an error.
    pub async fn load(dir: &Path, catalog: &FileCatalog) -> Result<Self> {
        let mut files = HashMap::with_capacity(catalog.all().len());
        for f in catalog.all() {
            let path = dir.join(f.name.as_ref());
            let data = tokio::fs::read(&path)
                .await
                .map_err(|source| Error::MissingFile {
                    name: f.name.to_string(),
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(file = %f.name, bytes = data.len(), "loaded upload payload");
            files.insert(f.name.clone(), Bytes::from(data));
        }
        Ok(Self {
            files: Arc::new(files),
        })
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.files.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn filler(size: u64) -> Bytes {
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    Bytes::from(FILLER.iter().copied().cycle().take(size).collect::<Vec<u8>>())
}
