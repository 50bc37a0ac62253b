//! `manufacturers`, `product_series`, `products`, `parts_catalog`,
//! `error_code_parts`: backs [`krai_core::classification::CatalogStore`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::classification::CatalogStore;
use krai_core::error::{Error, Result};
use krai_core::types::{ExtractionSource, Part, PartCategory};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlCatalogStore {
    store: LibsqlStore,
}

impl LibsqlCatalogStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn category_to_str(category: PartCategory) -> &'static str {
    match category {
        PartCategory::Consumable => "consumable",
        PartCategory::Assembly => "assembly",
        PartCategory::Component => "component",
        PartCategory::Mechanical => "mechanical",
        PartCategory::Electrical => "electrical",
    }
}

fn category_from_str(s: &str) -> Option<PartCategory> {
    match s {
        "consumable" => Some(PartCategory::Consumable),
        "assembly" => Some(PartCategory::Assembly),
        "component" => Some(PartCategory::Component),
        "mechanical" => Some(PartCategory::Mechanical),
        "electrical" => Some(PartCategory::Electrical),
        _ => None,
    }
}

fn source_to_str(source: ExtractionSource) -> &'static str {
    match source {
        ExtractionSource::SolutionText => "solution_text",
        ExtractionSource::Chunk => "chunk",
    }
}

#[async_trait]
impl CatalogStore for LibsqlCatalogStore {
    async fn upsert_manufacturer(&self, name: &str) -> Result<Uuid> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query("SELECT id FROM manufacturers WHERE name = ?", libsql::params![name.to_string()])
            .await
            .map_err(|e| map_libsql_error(e, "manufacturers", name.to_string()))?;
        if let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            return Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()));
        }

        let id = Uuid::new_v4();
        match conn
            .execute(
                "INSERT INTO manufacturers (id, name) VALUES (?, ?)",
                libsql::params![id.to_string(), name.to_string()],
            )
            .await
        {
            Ok(_) => Ok(id),
            Err(e) => match map_libsql_error(e, "manufacturers", name.to_string()) {
                Error::UniqueViolation { .. } => {
                    let mut rows = conn
                        .query("SELECT id FROM manufacturers WHERE name = ?", libsql::params![name.to_string()])
                        .await
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    let row = rows
                        .next()
                        .await
                        .map_err(|e| Error::Storage(e.to_string()))?
                        .ok_or_else(|| Error::ContractViolation("manufacturer disappeared after unique violation".to_string()))?;
                    let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
                    Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))
                }
                other => Err(other),
            },
        }
    }

    async fn upsert_product(&self, manufacturer_id: Uuid, model_number: &str) -> Result<Uuid> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id FROM products WHERE manufacturer_id = ? AND model_number = ?",
                libsql::params![manufacturer_id.to_string(), model_number.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            return Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()));
        }

        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO products (id, manufacturer_id, model_number, series_id) VALUES (?, ?, ?, NULL)",
            libsql::params![id.to_string(), manufacturer_id.to_string(), model_number.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "products", format!("{manufacturer_id}/{model_number}")))?;
        Ok(id)
    }

    async fn insert_series(&self, manufacturer_id: Uuid, series_name: &str, model_pattern: &str) -> Result<Uuid> {
        let conn = self.store.connection()?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO product_series (id, manufacturer_id, series_name, model_pattern) VALUES (?, ?, ?, ?)",
            libsql::params![id.to_string(), manufacturer_id.to_string(), series_name.to_string(), model_pattern.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "product_series", format!("{manufacturer_id}/{series_name}/{model_pattern}")))?;
        Ok(id)
    }

    async fn find_series(&self, manufacturer_id: Uuid, series_name: &str, model_pattern: &str) -> Result<Option<Uuid>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id FROM product_series WHERE manufacturer_id = ? AND series_name = ? AND model_pattern = ?",
                libsql::params![manufacturer_id.to_string(), series_name.to_string(), model_pattern.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Some(Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?))
    }

    async fn link_product_to_series(&self, product_id: Uuid, series_id: Uuid) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "UPDATE products SET series_id = ? WHERE id = ?",
            libsql::params![series_id.to_string(), product_id.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "products", product_id.to_string()))?;
        Ok(())
    }

    async fn find_part(&self, manufacturer_id: Uuid, part_number: &str) -> Result<Option<Part>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, name, description, category FROM parts_catalog WHERE manufacturer_id = ? AND part_number = ?",
                libsql::params![manufacturer_id.to_string(), part_number.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let name: Option<String> = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        let description: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
        let category: Option<String> = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Some(Part {
            id: Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?,
            part_number: part_number.to_string(),
            manufacturer_id,
            name,
            description,
            category: category.and_then(|c| category_from_str(&c)),
        }))
    }

    async fn insert_part(
        &self,
        manufacturer_id: Uuid,
        part_number: &str,
        name: Option<&str>,
        description: &str,
        category: Option<PartCategory>,
    ) -> Result<Uuid> {
        let conn = self.store.connection()?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO parts_catalog (id, part_number, manufacturer_id, name, description, category) VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                id.to_string(),
                part_number.to_string(),
                manufacturer_id.to_string(),
                name.map(ToString::to_string),
                description.to_string(),
                category.map(category_to_str),
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "parts_catalog", format!("{part_number}/{manufacturer_id}")))?;
        Ok(id)
    }

    async fn update_part_description(&self, part_id: Uuid, description: &str) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "UPDATE parts_catalog SET description = ? WHERE id = ?",
            libsql::params![description.to_string(), part_id.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "parts_catalog", part_id.to_string()))?;
        Ok(())
    }

    async fn link_error_code_to_part(&self, error_code_id: Uuid, part_id: Uuid, relevance_score: f32, source: ExtractionSource) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO error_code_parts (error_code_id, part_id, relevance_score, extraction_source) VALUES (?, ?, ?, ?)",
            libsql::params![error_code_id.to_string(), part_id.to_string(), relevance_score, source_to_str(source)],
        )
        .await
        .map_err(|e| map_libsql_error(e, "error_code_parts", format!("{error_code_id}/{part_id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> LibsqlCatalogStore {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlCatalogStore::new(store)
    }

    #[tokio::test]
    async fn upsert_manufacturer_is_idempotent() {
        let catalog = fixture().await;
        let first = catalog.upsert_manufacturer("HP").await.unwrap();
        let second = catalog.upsert_manufacturer("HP").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn insert_series_twice_raises_unique_violation_recovered_by_find() {
        let catalog = fixture().await;
        let manufacturer_id = catalog.upsert_manufacturer("HP").await.unwrap();
        let first = catalog.insert_series(manufacturer_id, "LaserJet M400", "M40[0-9]").await.unwrap();

        let err = catalog.insert_series(manufacturer_id, "LaserJet M400", "M40[0-9]").await.unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { table: "product_series", .. }));

        let found = catalog.find_series(manufacturer_id, "LaserJet M400", "M40[0-9]").await.unwrap().unwrap();
        assert_eq!(first, found);
    }

    #[tokio::test]
    async fn linking_an_error_code_to_a_part_twice_is_a_unique_violation() {
        let catalog = fixture().await;
        let manufacturer_id = catalog.upsert_manufacturer("HP").await.unwrap();
        let part_id = catalog
            .insert_part(manufacturer_id, "RM2-5399", Some("Fuser Unit"), "fuser unit", Some(PartCategory::Assembly))
            .await
            .unwrap();
        let error_code_id = Uuid::new_v4();

        catalog.link_error_code_to_part(error_code_id, part_id, 0.8, ExtractionSource::SolutionText).await.unwrap();
        let err = catalog
            .link_error_code_to_part(error_code_id, part_id, 0.8, ExtractionSource::SolutionText)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { table: "error_code_parts", .. }));
    }

    #[tokio::test]
    async fn find_part_round_trips_category() {
        let catalog = fixture().await;
        let manufacturer_id = catalog.upsert_manufacturer("Canon").await.unwrap();
        catalog
            .insert_part(manufacturer_id, "FM3-1234-000", Some("Transfer Belt"), "transfer belt", Some(PartCategory::Mechanical))
            .await
            .unwrap();
        let found = catalog.find_part(manufacturer_id, "FM3-1234-000").await.unwrap().unwrap();
        assert_eq!(found.category, Some(PartCategory::Mechanical));
        assert_eq!(found.name, Some("Transfer Belt".to_string()));
    }
}
