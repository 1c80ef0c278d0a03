//! # Category Repository
//!
//! CRUD operations for medicine categories.
//!
//! Deleting a category orphans its medicines (their `category_id` goes
//! NULL via the FK's ON DELETE SET NULL); it never cascades.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use dawa_core::validation::validate_category_name;
use dawa_core::Category;

/// Repository for category database operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    /// Creates a new CategoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Lists all categories, ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, description, created_at
            FROM categories
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Gets a category by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, description, created_at
            FROM categories
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    /// Creates a new category.
    pub async fn create(&self, name: &str, description: Option<&str>) -> DbResult<Category> {
        validate_category_name(name)?;

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description: description.map(|d| d.to_string()),
            created_at: Utc::now(),
        };

        debug!(id = %category.id, name = %category.name, "Creating category");

        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("name", name.trim()),
            other => other,
        })?;

        Ok(category)
    }

    /// Updates a category's name and description.
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> DbResult<Category> {
        validate_category_name(name)?;

        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = ?2, description = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(name.trim())
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("name", name.trim()),
            other => other,
        })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }

    /// Deletes a category. Medicines in it are orphaned, not deleted.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        debug!(id = %id, "Deleted category");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_category_crud() {
        let db = test_db().await;
        let repo = db.categories();

        let created = repo
            .create("Antibiotics", Some("Bacterial infections"))
            .await
            .unwrap();
        assert_eq!(created.name, "Antibiotics");

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Antibiotics");

        let updated = repo.update(&created.id, "Antibiotics (Rx)", None).await.unwrap();
        assert_eq!(updated.name, "Antibiotics (Rx)");

        repo.delete(&created.id).await.unwrap();
        assert!(repo.get_by_id(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = test_db().await;
        let repo = db.categories();

        repo.create("Painkillers", None).await.unwrap();
        let err = repo.create("Painkillers", None).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::DbError::UniqueViolation { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = test_db().await;
        let err = db.categories().delete("missing").await.unwrap_err();
        assert!(matches!(err, crate::error::DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let db = test_db().await;
        let repo = db.categories();

        repo.create("Vitamins", None).await.unwrap();
        repo.create("Antacids", None).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Antacids");
    }
}
