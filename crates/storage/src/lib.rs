//! Sqlite-backed persistence.

use std::path::Path;

use anyhow::Context as _;
use folio_core::{Document, DocumentFormat, DocumentId, DocumentStore, Settings, Thumbnail};
use rusqlite::{Connection, OptionalExtension as _, Row};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                settings_json TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, settings_json) VALUES (1, '{}');

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                format TEXT NOT NULL,
                source TEXT NOT NULL,
                thumbnail_mime TEXT,
                thumbnail BLOB,
                favorite INTEGER NOT NULL DEFAULT 0,
                last_opened INTEGER,
                added_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
        )?;
        Ok(())
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT settings_json FROM settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let mut settings = json
            .and_then(|json| serde_json::from_str::<Settings>(&json).ok())
            .unwrap_or_default();
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();
        let json = serde_json::to_string(&settings)?;
        self.conn.execute(
            r#"
            INSERT INTO settings (id, settings_json) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET settings_json = excluded.settings_json
            "#,
            [json],
        )?;
        Ok(())
    }

    fn upsert(conn: &Connection, document: &Document) -> anyhow::Result<()> {
        let (mime, bytes) = match &document.thumbnail {
            Some(thumbnail) => (Some(thumbnail.mime.as_str()), Some(thumbnail.bytes.as_slice())),
            None => (None, None),
        };
        conn.execute(
            r#"
            INSERT INTO documents (id, name, format, source, thumbnail_mime, thumbnail, favorite, last_opened)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                format = excluded.format,
                source = excluded.source,
                thumbnail_mime = excluded.thumbnail_mime,
                thumbnail = excluded.thumbnail,
                favorite = excluded.favorite,
                last_opened = excluded.last_opened
            "#,
            (
                document.id.as_str(),
                &document.name,
                document.format.as_str(),
                &document.source,
                mime,
                bytes,
                document.favorite,
                document.last_opened,
            ),
        )
        .with_context(|| format!("upsert document {}", document.id))?;
        Ok(())
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let format: String = row.get(2)?;
    let mime: Option<String> = row.get(4)?;
    let bytes: Option<Vec<u8>> = row.get(5)?;
    Ok(Document {
        id: DocumentId(row.get(0)?),
        name: row.get(1)?,
        format: format
            .parse::<DocumentFormat>()
            .unwrap_or(DocumentFormat::Paginated),
        source: row.get(3)?,
        thumbnail: mime
            .zip(bytes)
            .map(|(mime, bytes)| Thumbnail { mime, bytes }),
        favorite: row.get(6)?,
        last_opened: row.get(7)?,
    })
}

impl DocumentStore for Storage {
    fn get_all(&self) -> anyhow::Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, format, source, thumbnail_mime, thumbnail, favorite, last_opened \
             FROM documents ORDER BY added_at, rowid",
        )?;
        let rows = stmt.query_map([], document_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn put(&mut self, document: &Document) -> anyhow::Result<()> {
        Self::upsert(&self.conn, document)
    }

    fn put_batch(&mut self, documents: &[Document]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        for document in documents {
            Self::upsert(&tx, document)?;
        }
        tx.commit()?;
        Ok(())
    }
}
