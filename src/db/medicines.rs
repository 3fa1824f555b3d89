use sqlx::SqlitePool;

use super::models::Medicine;
use super::now;

#[derive(Debug, Clone, Default)]
pub struct MedicineInput {
    pub name: String,
    pub sku: Option<String>,
    pub stock: i64,
    pub unit: Option<String>,
}

/// Looks up a medicine by primary key.
pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Medicine>, sqlx::Error> {
    sqlx::query_as::<_, Medicine>("SELECT * FROM medicines WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// The whole catalogue, sorted by name.
pub async fn list(pool: &SqlitePool) -> Result<Vec<Medicine>, sqlx::Error> {
    sqlx::query_as::<_, Medicine>("SELECT * FROM medicines ORDER BY name ASC")
        .fetch_all(pool)
        .await
}

/// Medicines a patient can ask for: those with at least one unit on the shelf.
pub async fn list_in_stock(pool: &SqlitePool) -> Result<Vec<Medicine>, sqlx::Error> {
    sqlx::query_as::<_, Medicine>("SELECT * FROM medicines WHERE stock > 0 ORDER BY name ASC")
        .fetch_all(pool)
        .await
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM medicines")
        .fetch_one(pool)
        .await
}

/// Counts medicines running low.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `threshold` - Stock at or below this level counts as low
///
/// # Returns
///
/// The number of medicines with `stock <= threshold`
pub async fn count_low_stock(pool: &SqlitePool, threshold: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM medicines WHERE stock <= ?")
        .bind(threshold)
        .fetch_one(pool)
        .await
}

/// Adds a medicine to the catalogue.
pub async fn create(pool: &SqlitePool, input: &MedicineInput) -> Result<Medicine, sqlx::Error> {
    let now = now();
    sqlx::query_as::<_, Medicine>(
        "INSERT INTO medicines (name, sku, stock, unit, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(&input.name)
    .bind(&input.sku)
    .bind(input.stock)
    .bind(&input.unit)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Fields an edit may change. `None` leaves the stored column as it is.
#[derive(Debug, Clone, Default)]
pub struct MedicineChanges {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub stock: Option<i64>,
    pub unit: Option<String>,
}

/// Applies `changes` to a medicine in a single statement.
///
/// Columns left as `None` are never written, so a concurrent dispense is not
/// undone by an edit that only renames the medicine. A new stock value is
/// only written while the shelf still holds `seen_stock`.
///
/// # Returns
///
/// The updated row, or `None` when the medicine is gone or its stock moved
/// away from `seen_stock` before the write.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    changes: &MedicineChanges,
    seen_stock: i64,
) -> Result<Option<Medicine>, sqlx::Error> {
    sqlx::query_as::<_, Medicine>(
        "UPDATE medicines
         SET name = COALESCE(?1, name), sku = COALESCE(?2, sku), stock = COALESCE(?3, stock),
             unit = COALESCE(?4, unit), updated_at = ?5
         WHERE id = ?6 AND (?3 IS NULL OR stock = ?7) RETURNING *",
    )
    .bind(&changes.name)
    .bind(&changes.sku)
    .bind(changes.stock)
    .bind(&changes.unit)
    .bind(now())
    .bind(id)
    .bind(seen_stock)
    .fetch_optional(pool)
    .await
}

/// Removes a medicine. Callers check [`handout_count`] first, since handouts reference it.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM medicines WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of handouts, in any status, that reference the medicine.
pub async fn handout_count(pool: &SqlitePool, id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM handouts WHERE medicine_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
pub(crate) async fn seed(pool: &SqlitePool, name: &str, stock: i64) -> Medicine {
    create(
        pool,
        &MedicineInput {
            name: name.to_string(),
            sku: None,
            stock,
            unit: Some("tablet".to_string()),
        },
    )
    .await
    .expect("seed medicine")
}
