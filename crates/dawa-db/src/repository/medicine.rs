//! # Medicine Repository
//!
//! Catalog CRUD, POS search and stock adjustment.
//!
//! ## Stock Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock_quantity is NEVER negative                                       │
//! │                                                                         │
//! │  Three layers enforce this:                                             │
//! │  1. adjust_stock() clamps the result at zero                            │
//! │  2. Sale creation decrements conditionally (AND stock >= qty)           │
//! │  3. The schema carries CHECK (stock_quantity >= 0)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use dawa_core::validation::{
    validate_barcode, validate_medicine_name, validate_price_cents, validate_stock_quantity,
};
use dawa_core::{Medicine, MedicineUnit};

// =============================================================================
// Input Contracts
// =============================================================================

/// Input for creating a medicine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    pub generic_name: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub unit: MedicineUnit,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_price_cents: i64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_reorder_level")]
    pub reorder_level: i64,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub requires_prescription: bool,
}

fn default_reorder_level() -> i64 {
    10
}

/// Input for updating a medicine. Every field is replaced.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMedicine {
    pub name: String,
    pub generic_name: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub barcode: Option<String>,
    pub unit: MedicineUnit,
    pub price_cents: i64,
    pub cost_price_cents: i64,
    pub reorder_level: i64,
    pub expiry_date: Option<NaiveDate>,
    pub requires_prescription: bool,
    pub is_active: bool,
}

const SELECT_COLUMNS: &str = r#"
    id, name, generic_name, category_id, description, manufacturer,
    barcode, unit, price_cents, cost_price_cents, stock_quantity,
    reorder_level, expiry_date, requires_prescription, is_active,
    created_at, updated_at
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for medicine database operations.
#[derive(Debug, Clone)]
pub struct MedicineRepository {
    pool: SqlitePool,
}

impl MedicineRepository {
    /// Creates a new MedicineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MedicineRepository { pool }
    }

    /// Lists medicines, newest first.
    ///
    /// ## Arguments
    /// * `include_inactive` - Whether soft-deleted medicines are included
    /// * `category_id` - Restrict to one category when given
    pub async fn list(
        &self,
        include_inactive: bool,
        category_id: Option<&str>,
    ) -> DbResult<Vec<Medicine>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM medicines
            WHERE (?1 OR is_active = 1)
              AND (?2 IS NULL OR category_id = ?2)
            ORDER BY created_at DESC
            "#
        );

        let medicines = sqlx::query_as::<_, Medicine>(&sql)
            .bind(include_inactive)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(medicines)
    }

    /// Gets a medicine by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM medicines WHERE id = ?1");

        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(medicine)
    }

    /// Gets a medicine by barcode (exact match).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM medicines WHERE barcode = ?1");

        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;

        Ok(medicine)
    }

    /// POS search: active, in-stock medicines matching the query.
    ///
    /// Matches name or generic name as a substring, or barcode exactly.
    /// A blank query returns nothing (the POS shows no suggestions until
    /// the cashier types).
    pub async fn pos_search(&self, query: &str, limit: i64) -> DbResult<Vec<Medicine>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", query);
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM medicines
            WHERE is_active = 1
              AND stock_quantity > 0
              AND (name LIKE ?1 OR generic_name LIKE ?1 OR barcode = ?2)
            ORDER BY name
            LIMIT ?3
            "#
        );

        let medicines = sqlx::query_as::<_, Medicine>(&sql)
            .bind(&pattern)
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(medicines)
    }

    /// Lists active medicines at or below their reorder level.
    pub async fn low_stock(&self) -> DbResult<Vec<Medicine>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM medicines
            WHERE is_active = 1 AND stock_quantity <= reorder_level
            ORDER BY stock_quantity
            "#
        );

        let medicines = sqlx::query_as::<_, Medicine>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(medicines)
    }

    /// Creates a new medicine.
    pub async fn create(&self, input: NewMedicine) -> DbResult<Medicine> {
        validate_medicine_name(&input.name)?;
        validate_price_cents(input.price_cents)?;
        validate_price_cents(input.cost_price_cents)?;
        validate_stock_quantity(input.stock_quantity)?;
        if let Some(barcode) = input.barcode.as_deref() {
            validate_barcode(barcode)?;
        }

        let now = Utc::now();
        let medicine = Medicine {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            generic_name: input.generic_name,
            category_id: input.category_id,
            description: input.description,
            manufacturer: input.manufacturer,
            barcode: input.barcode.map(|b| b.trim().to_string()),
            unit: input.unit,
            price_cents: input.price_cents,
            cost_price_cents: input.cost_price_cents,
            stock_quantity: input.stock_quantity,
            reorder_level: input.reorder_level,
            expiry_date: input.expiry_date,
            requires_prescription: input.requires_prescription,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %medicine.id, name = %medicine.name, "Creating medicine");

        sqlx::query(
            r#"
            INSERT INTO medicines (
                id, name, generic_name, category_id, description, manufacturer,
                barcode, unit, price_cents, cost_price_cents, stock_quantity,
                reorder_level, expiry_date, requires_prescription, is_active,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17
            )
            "#,
        )
        .bind(&medicine.id)
        .bind(&medicine.name)
        .bind(&medicine.generic_name)
        .bind(&medicine.category_id)
        .bind(&medicine.description)
        .bind(&medicine.manufacturer)
        .bind(&medicine.barcode)
        .bind(medicine.unit)
        .bind(medicine.price_cents)
        .bind(medicine.cost_price_cents)
        .bind(medicine.stock_quantity)
        .bind(medicine.reorder_level)
        .bind(medicine.expiry_date)
        .bind(medicine.requires_prescription)
        .bind(medicine.is_active)
        .bind(medicine.created_at)
        .bind(medicine.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("barcode") => DbError::duplicate(
                "barcode",
                medicine.barcode.clone().unwrap_or_default(),
            ),
            other => other,
        })?;

        Ok(medicine)
    }

    /// Updates a medicine. Stock is NOT touched here; use [`Self::adjust_stock`].
    pub async fn update(&self, id: &str, input: UpdateMedicine) -> DbResult<Medicine> {
        validate_medicine_name(&input.name)?;
        validate_price_cents(input.price_cents)?;
        validate_price_cents(input.cost_price_cents)?;
        if let Some(barcode) = input.barcode.as_deref() {
            validate_barcode(barcode)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE medicines SET
                name = ?2, generic_name = ?3, category_id = ?4, description = ?5,
                manufacturer = ?6, barcode = ?7, unit = ?8, price_cents = ?9,
                cost_price_cents = ?10, reorder_level = ?11, expiry_date = ?12,
                requires_prescription = ?13, is_active = ?14, updated_at = ?15
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.generic_name)
        .bind(&input.category_id)
        .bind(&input.description)
        .bind(&input.manufacturer)
        .bind(input.barcode.as_deref().map(str::trim))
        .bind(input.unit)
        .bind(input.price_cents)
        .bind(input.cost_price_cents)
        .bind(input.reorder_level)
        .bind(input.expiry_date)
        .bind(input.requires_prescription)
        .bind(input.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Medicine", id))
    }

    /// Soft-deletes a medicine (sets is_active = 0).
    ///
    /// Hard deletion is deliberately not offered: sale history references
    /// medicines, and the snapshot pattern only covers name and price.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE medicines SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", id));
        }

        debug!(id = %id, "Deactivated medicine");
        Ok(())
    }

    /// Adjusts stock by a signed delta, clamping the result at zero.
    ///
    /// Used by the manual stock-adjustment endpoint (deliveries, spoilage
    /// write-offs). A delta that would take stock negative lands at zero
    /// rather than failing - the physical count is the source of truth.
    ///
    /// ## Returns
    /// The medicine after adjustment.
    pub async fn adjust_stock(&self, id: &str, delta: i64) -> DbResult<Medicine> {
        let result = sqlx::query(
            r#"
            UPDATE medicines
            SET stock_quantity = MAX(0, stock_quantity + ?2),
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", id));
        }

        debug!(id = %id, delta = delta, "Adjusted stock");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Medicine", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_medicine(name: &str, stock: i64) -> NewMedicine {
        NewMedicine {
            name: name.to_string(),
            generic_name: None,
            category_id: None,
            description: None,
            manufacturer: None,
            barcode: None,
            unit: MedicineUnit::Tablet,
            price_cents: 2000,
            cost_price_cents: 1200,
            stock_quantity: stock,
            reorder_level: 10,
            expiry_date: None,
            requires_prescription: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = test_db().await;
        let repo = db.medicines();

        let created = repo.create(new_medicine("Paracetamol 500mg", 50)).await.unwrap();
        assert!(created.is_active);

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Paracetamol 500mg");
        assert_eq!(fetched.stock_quantity, 50);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_rejected() {
        let db = test_db().await;
        let repo = db.medicines();

        let mut a = new_medicine("Med A", 10);
        a.barcode = Some("6161100310014".to_string());
        repo.create(a).await.unwrap();

        let mut b = new_medicine("Med B", 10);
        b.barcode = Some("6161100310014".to_string());
        let err = repo.create(b).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_pos_search() {
        let db = test_db().await;
        let repo = db.medicines();

        repo.create(new_medicine("Paracetamol 500mg", 50)).await.unwrap();
        repo.create(new_medicine("Amoxicillin 250mg", 30)).await.unwrap();
        // Out of stock: must not appear in POS search
        repo.create(new_medicine("Paracetamol Syrup", 0)).await.unwrap();

        let hits = repo.pos_search("para", 20).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Paracetamol 500mg");

        // Blank query returns nothing
        assert!(repo.pos_search("   ", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pos_search_by_barcode() {
        let db = test_db().await;
        let repo = db.medicines();

        let mut med = new_medicine("Cetirizine 10mg", 15);
        med.barcode = Some("6161100310021".to_string());
        repo.create(med).await.unwrap();

        let hits = repo.pos_search("6161100310021", 20).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Cetirizine 10mg");
    }

    #[tokio::test]
    async fn test_adjust_stock_clamps_at_zero() {
        let db = test_db().await;
        let repo = db.medicines();

        let med = repo.create(new_medicine("Ibuprofen 400mg", 5)).await.unwrap();

        let after = repo.adjust_stock(&med.id, -100).await.unwrap();
        assert_eq!(after.stock_quantity, 0);

        let after = repo.adjust_stock(&med.id, 25).await.unwrap();
        assert_eq!(after.stock_quantity, 25);
    }

    #[tokio::test]
    async fn test_deactivate_hides_from_search() {
        let db = test_db().await;
        let repo = db.medicines();

        let med = repo.create(new_medicine("Loratadine 10mg", 20)).await.unwrap();
        repo.deactivate(&med.id).await.unwrap();

        assert!(repo.pos_search("lora", 20).await.unwrap().is_empty());
        assert!(repo.list(false, None).await.unwrap().is_empty());
        assert_eq!(repo.list(true, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_category() {
        let db = test_db().await;
        let repo = db.medicines();

        let painkillers = db
            .categories()
            .create("Painkillers", None)
            .await
            .unwrap();

        let mut med = new_medicine("Aspirin 300mg", 10);
        med.category_id = Some(painkillers.id.clone());
        repo.create(med).await.unwrap();
        repo.create(new_medicine("Uncategorized Med", 10))
            .await
            .unwrap();

        let in_category = repo.list(false, Some(&painkillers.id)).await.unwrap();
        assert_eq!(in_category.len(), 1);
        assert_eq!(in_category[0].name, "Aspirin 300mg");
    }

    #[tokio::test]
    async fn test_low_stock() {
        let db = test_db().await;
        let repo = db.medicines();

        let mut low = new_medicine("Low Med", 3);
        low.reorder_level = 10;
        repo.create(low).await.unwrap();

        let mut fine = new_medicine("Fine Med", 50);
        fine.reorder_level = 10;
        repo.create(fine).await.unwrap();

        let low_stock = repo.low_stock().await.unwrap();
        assert_eq!(low_stock.len(), 1);
        assert_eq!(low_stock[0].name, "Low Med");
    }
}
