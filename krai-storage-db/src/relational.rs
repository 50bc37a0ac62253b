//! `images`, `links`, `videos`: backs [`krai_core::storage::RelationalStore`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::storage::{ImageRow, LinkRow, RelationalStore, UpsertOutcome, VideoRow};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlRelationalStore {
    store: LibsqlStore,
}

impl LibsqlRelationalStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn image_type_to_str(t: krai_core::types::ImageType) -> &'static str {
    use krai_core::types::ImageType;
    match t {
        ImageType::Photo => "photo",
        ImageType::Diagram => "diagram",
        ImageType::Screenshot => "screenshot",
        ImageType::VectorGraphic => "vector_graphic",
    }
}

#[async_trait]
impl RelationalStore for LibsqlRelationalStore {
    async fn upsert_image(&self, row: ImageRow) -> Result<(Uuid, UpsertOutcome)> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id FROM images WHERE document_id = ? AND file_hash = ?",
                libsql::params![row.document_id.to_string(), row.file_hash.clone()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if let Some(existing) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = existing.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            return Ok((Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?, UpsertOutcome::AlreadyExists));
        }

        let id = Uuid::new_v4();
        let bbox = row.bbox.map(|b| serde_json::to_string(&b)).transpose().map_err(Error::Serialization)?;
        let related_error_codes = serde_json::to_string(&row.related_error_codes).map_err(Error::Serialization)?;
        let related_products = serde_json::to_string(&row.related_products).map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO images (id, document_id, storage_url, filename, page_number, bbox, image_type, file_hash,
                context_caption, related_error_codes, related_products, svg_storage_url, has_png_derivative)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                id.to_string(),
                row.document_id.to_string(),
                row.storage_url,
                row.filename,
                row.page_number,
                bbox,
                image_type_to_str(row.image_type),
                row.file_hash,
                row.context_caption,
                related_error_codes,
                related_products,
                row.svg_storage_url,
                row.has_png_derivative,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "images", id.to_string()))?;
        Ok((id, UpsertOutcome::Inserted))
    }

    async fn upsert_link(&self, row: LinkRow) -> Result<(Uuid, UpsertOutcome)> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id FROM links WHERE document_id = ? AND url = ?",
                libsql::params![row.document_id.to_string(), row.url.clone()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if let Some(existing) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = existing.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            return Ok((Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?, UpsertOutcome::AlreadyExists));
        }

        let id = Uuid::new_v4();
        let related_error_codes = serde_json::to_string(&row.related_error_codes).map_err(Error::Serialization)?;
        let related_products = serde_json::to_string(&row.related_products).map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO links (id, document_id, url, page_number, context_description, related_error_codes, related_products)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                id.to_string(),
                row.document_id.to_string(),
                row.url,
                row.page_number,
                row.context_description,
                related_error_codes,
                related_products,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "links", id.to_string()))?;
        Ok((id, UpsertOutcome::Inserted))
    }

    async fn upsert_video(&self, row: VideoRow) -> Result<(Uuid, UpsertOutcome)> {
        let conn = self.store.connection()?;

        let existing = if let Some(youtube_id) = &row.youtube_id {
            conn.query(
                "SELECT id FROM videos WHERE platform = ? AND youtube_id = ?",
                libsql::params![row.platform.clone(), youtube_id.clone()],
            )
            .await
        } else {
            conn.query(
                "SELECT id FROM videos WHERE document_id = ? AND url = ?",
                libsql::params![row.document_id.to_string(), row.url.clone()],
            )
            .await
        };
        let mut rows = existing.map_err(|e| Error::Storage(e.to_string()))?;
        if let Some(existing) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = existing.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            return Ok((Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?, UpsertOutcome::AlreadyExists));
        }

        let id = Uuid::new_v4();
        let related_error_codes = serde_json::to_string(&row.related_error_codes).map_err(Error::Serialization)?;
        let related_products = serde_json::to_string(&row.related_products).map_err(Error::Serialization)?;
        let metadata = serde_json::to_string(&row.metadata).map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO videos (id, document_id, url, page_number, context_description, related_error_codes,
                related_products, platform, youtube_id, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                id.to_string(),
                row.document_id.to_string(),
                row.url,
                row.page_number,
                row.context_description,
                related_error_codes,
                related_products,
                row.platform,
                row.youtube_id,
                metadata,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "videos", id.to_string()))?;
        Ok((id, UpsertOutcome::Inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krai_core::types::{ImageType, VideoMetadata};

    async fn fixture() -> LibsqlRelationalStore {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlRelationalStore::new(store)
    }

    fn image_row(document_id: Uuid, file_hash: &str) -> ImageRow {
        ImageRow {
            document_id,
            storage_url: "s3://bucket/a.png".to_string(),
            filename: "a.png".to_string(),
            page_number: 1,
            bbox: None,
            image_type: ImageType::Diagram,
            file_hash: file_hash.to_string(),
            context_caption: None,
            related_error_codes: vec![],
            related_products: vec![],
            svg_storage_url: None,
            has_png_derivative: false,
        }
    }

    #[tokio::test]
    async fn upsert_image_dedups_on_document_and_hash() {
        let relational = fixture().await;
        let document_id = Uuid::new_v4();
        let (first_id, first_outcome) = relational.upsert_image(image_row(document_id, "hash1")).await.unwrap();
        assert_eq!(first_outcome, UpsertOutcome::Inserted);

        let (second_id, second_outcome) = relational.upsert_image(image_row(document_id, "hash1")).await.unwrap();
        assert_eq!(second_outcome, UpsertOutcome::AlreadyExists);
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn upsert_video_dedups_on_youtube_id_across_documents() {
        let relational = fixture().await;
        let row = VideoRow {
            document_id: Uuid::new_v4(),
            url: "https://youtube.com/watch?v=abc".to_string(),
            page_number: 2,
            context_description: None,
            related_error_codes: vec![],
            related_products: vec![],
            platform: "youtube".to_string(),
            youtube_id: Some("abc".to_string()),
            metadata: VideoMetadata { needs_enrichment: false, credentials_missing: None },
        };
        let (first_id, _) = relational.upsert_video(row.clone()).await.unwrap();

        let other_document = VideoRow { document_id: Uuid::new_v4(), ..row };
        let (second_id, outcome) = relational.upsert_video(other_document).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::AlreadyExists);
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn upsert_link_dedups_on_document_and_url() {
        let relational = fixture().await;
        let document_id = Uuid::new_v4();
        let row = LinkRow {
            document_id,
            url: "https://example.com/manual".to_string(),
            page_number: 3,
            context_description: None,
            related_error_codes: vec![],
            related_products: vec![],
        };
        let (first_id, _) = relational.upsert_link(row.clone()).await.unwrap();
        let (second_id, outcome) = relational.upsert_link(row).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::AlreadyExists);
        assert_eq!(first_id, second_id);
    }
}
