//! Document repository. Observers get immutable snapshots; every mutation
//! goes through the library and is written back to the store.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context as _;
use folio_core::{Document, DocumentFormat, DocumentId, DocumentStore, Thumbnail};
use log::{info, warn};

/// A file handed to the import boundary.
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub name: String,
    pub source: String,
    pub bytes: Vec<u8>,
}

impl ImportFile {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            source: path.display().to_string(),
            bytes,
        })
    }
}

pub struct DocumentLibrary {
    store: Box<dyn DocumentStore>,
    documents: Arc<[Document]>,
}

impl DocumentLibrary {
    /// Loads every stored record. An unreadable store yields an empty library.
    pub fn load(store: Box<dyn DocumentStore>) -> Self {
        let documents = match store.get_all() {
            Ok(documents) => documents,
            Err(err) => {
                warn!("failed to load library, starting empty: {err:#}");
                Vec::new()
            }
        };
        info!("library loaded: {} documents", documents.len());
        Self {
            store,
            documents: documents.into(),
        }
    }

    pub fn snapshot(&self) -> Arc<[Document]> {
        Arc::clone(&self.documents)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| &doc.id == id)
    }

    pub fn favorites(&self) -> Vec<Document> {
        self.visible(true)
    }

    pub fn visible(&self, favorites_only: bool) -> Vec<Document> {
        self.documents
            .iter()
            .filter(|doc| !favorites_only || doc.favorite)
            .cloned()
            .collect()
    }

    /// Detects each file's format, builds its thumbnail and appends the
    /// batch with a single store write. Returns the new ids in input order.
    pub fn import_files<F>(&mut self, files: Vec<ImportFile>, mut thumbnail: F) -> Vec<DocumentId>
    where
        F: FnMut(DocumentFormat, &[u8]) -> Option<Thumbnail>,
    {
        if files.is_empty() {
            return Vec::new();
        }

        let added: Vec<Document> = files
            .into_iter()
            .map(|file| {
                let mut document = Document::new(file.name, file.source);
                document.thumbnail = thumbnail(document.format, &file.bytes);
                document
            })
            .collect();

        if let Err(err) = self.store.put_batch(&added) {
            warn!("failed to persist {} imported documents: {err:#}", added.len());
        }
        info!("imported {} documents", added.len());

        let ids = added.iter().map(|doc| doc.id.clone()).collect();
        let mut documents = self.documents.to_vec();
        documents.extend(added);
        self.documents = documents.into();
        ids
    }

    /// Flips the favorite flag. Returns the new value.
    pub fn toggle_favorite(&mut self, id: &DocumentId) -> Option<bool> {
        let updated = self.update(id, |doc| doc.favorite = !doc.favorite)?;
        Some(updated.favorite)
    }

    pub fn mark_opened(&mut self, id: &DocumentId, now: i64) -> Option<Document> {
        self.update(id, |doc| doc.last_opened = Some(now))
    }

    fn update(&mut self, id: &DocumentId, change: impl FnOnce(&mut Document)) -> Option<Document> {
        let index = self.documents.iter().position(|doc| &doc.id == id)?;
        let mut documents = self.documents.to_vec();
        change(&mut documents[index]);
        let updated = documents[index].clone();

        if let Err(err) = self.store.put(&updated) {
            warn!("failed to persist {}: {err:#}", updated.name);
        }
        self.documents = documents.into();
        Some(updated)
    }
}

#[derive(Debug, Default)]
struct MemoryRecords {
    documents: Vec<Document>,
    puts: usize,
    batches: usize,
    failing: bool,
}

/// In-process store. Clones share the same records, so a caller can keep a
/// handle for inspection after giving one to a library.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::default();
        store.inner.borrow_mut().documents = documents;
        store
    }

    pub fn documents(&self) -> Vec<Document> {
        self.inner.borrow().documents.clone()
    }

    /// Single-record writes so far.
    pub fn puts(&self) -> usize {
        self.inner.borrow().puts
    }

    pub fn batches(&self) -> usize {
        self.inner.borrow().batches
    }

    /// Makes every later call fail, as an unavailable store would.
    pub fn set_failing(&self, failing: bool) {
        self.inner.borrow_mut().failing = failing;
    }

    fn upsert(records: &mut MemoryRecords, document: &Document) {
        match records.documents.iter_mut().find(|doc| doc.id == document.id) {
            Some(existing) => *existing = document.clone(),
            None => records.documents.push(document.clone()),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn get_all(&self) -> anyhow::Result<Vec<Document>> {
        let records = self.inner.borrow();
        if records.failing {
            anyhow::bail!("memory store unavailable");
        }
        Ok(records.documents.clone())
    }

    fn put(&mut self, document: &Document) -> anyhow::Result<()> {
        let mut records = self.inner.borrow_mut();
        records.puts += 1;
        if records.failing {
            anyhow::bail!("memory store unavailable");
        }
        Self::upsert(&mut records, document);
        Ok(())
    }

    fn put_batch(&mut self, documents: &[Document]) -> anyhow::Result<()> {
        let mut records = self.inner.borrow_mut();
        records.batches += 1;
        if records.failing {
            anyhow::bail!("memory store unavailable");
        }
        for document in documents {
            Self::upsert(&mut records, document);
        }
        Ok(())
    }
}
