//! Handout stock adjustment.
//!
//! Stock leaves the shelf in exactly two ways: staff issue a handout directly
//! ([`dispense`]) or approve a patient's request ([`approve`]). Both decrement
//! `medicines.stock` and settle the handout inside one transaction, and both
//! use conditional updates so that concurrent callers can neither overdraw a
//! medicine nor process the same handout twice.

use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::models::{Handout, HandoutStatus, Medicine};
use crate::db::{handouts, medicines, now};

#[derive(Error, Debug)]
pub enum StockError {
    #[error("Medicine not found")]
    MedicineNotFound,
    #[error("Handout not found")]
    HandoutNotFound,
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },
    #[error("Handout has already been processed")]
    AlreadyProcessed,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewDispense {
    pub medicine_id: i64,
    pub user_id: Option<i64>,
    pub quantity: i64,
    pub notes: Option<String>,
}

/// Issues a handout immediately, taking the stock out in the same transaction.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `request` - Medicine, optional patient, quantity and notes
/// * `processor` - The staff member handing the medicine out
///
/// # Returns
///
/// The processed `Handout` and the medicine as it was read before the
/// decrement, or a `StockError` explaining why nothing was written
pub async fn dispense(
    pool: &SqlitePool,
    request: NewDispense,
    processor: i64,
) -> Result<(Handout, Medicine), StockError> {
    if request.quantity < 1 {
        return Err(StockError::InvalidQuantity);
    }
    let medicine = medicines::find(pool, request.medicine_id)
        .await?
        .ok_or(StockError::MedicineNotFound)?;
    ensure_available(&medicine, request.quantity)?;

    let mut tx = pool.begin().await?;

    let taken = take_stock(&mut tx, medicine.id, request.quantity).await?;
    if !taken {
        drop(tx);
        return Err(insufficient(pool, medicine.id, request.quantity).await);
    }

    let now = now();
    let handout = sqlx::query_as::<_, Handout>(
        "INSERT INTO handouts
            (medicine_id, user_id, quantity, notes, status, processed_by, processed_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(medicine.id)
    .bind(request.user_id)
    .bind(request.quantity)
    .bind(&request.notes)
    .bind(HandoutStatus::Processed)
    .bind(processor)
    .bind(now)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Dispensed {} x {} (handout {}) by user {}",
        handout.quantity,
        medicine.name,
        handout.id,
        processor
    );
    Ok((handout, medicine))
}

/// Approves a requested handout: marks it processed and takes the stock out.
///
/// Of several callers approving the same handout, exactly one succeeds; the
/// others get [`StockError::AlreadyProcessed`].
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `handout_id` - The requested handout to approve
/// * `processor` - The staff member approving it
///
/// # Returns
///
/// The processed `Handout` and its medicine, or a `StockError` with the
/// handout and stock left as they were
pub async fn approve(
    pool: &SqlitePool,
    handout_id: i64,
    processor: i64,
) -> Result<(Handout, Medicine), StockError> {
    let handout = handouts::find(pool, handout_id)
        .await?
        .ok_or(StockError::HandoutNotFound)?;
    if handout.status != HandoutStatus::Requested {
        return Err(StockError::AlreadyProcessed);
    }
    let medicine = medicines::find(pool, handout.medicine_id)
        .await?
        .ok_or(StockError::MedicineNotFound)?;
    ensure_available(&medicine, handout.quantity)?;

    let mut tx = pool.begin().await?;

    let now = now();
    let processed = sqlx::query_as::<_, Handout>(
        "UPDATE handouts SET status = ?, processed_by = ?, processed_at = ?, updated_at = ?
         WHERE id = ? AND status = ? RETURNING *",
    )
    .bind(HandoutStatus::Processed)
    .bind(processor)
    .bind(now)
    .bind(now)
    .bind(handout.id)
    .bind(HandoutStatus::Requested)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StockError::AlreadyProcessed)?;

    // dropping `tx` on the error path rolls the status change back
    let taken = take_stock(&mut tx, medicine.id, processed.quantity).await?;
    if !taken {
        drop(tx);
        return Err(insufficient(pool, medicine.id, processed.quantity).await);
    }

    tx.commit().await?;

    log::info!(
        "Approved handout {} ({} x {}) by user {}",
        processed.id,
        processed.quantity,
        medicine.name,
        processor
    );
    Ok((processed, medicine))
}

fn ensure_available(medicine: &Medicine, quantity: i64) -> Result<(), StockError> {
    if medicine.stock < quantity {
        return Err(StockError::InsufficientStock {
            available: medicine.stock,
            requested: quantity,
        });
    }
    Ok(())
}

/// Decrements stock only if enough is on hand. Returns false otherwise.
async fn take_stock(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    medicine_id: i64,
    quantity: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE medicines SET stock = stock - ?1, updated_at = ?2 WHERE id = ?3 AND stock >= ?1",
    )
    .bind(quantity)
    .bind(now())
    .bind(medicine_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn insufficient(pool: &SqlitePool, medicine_id: i64, requested: i64) -> StockError {
    match medicines::find(pool, medicine_id).await {
        Ok(Some(medicine)) => StockError::InsufficientStock {
            available: medicine.stock,
            requested,
        },
        Ok(None) => StockError::MedicineNotFound,
        Err(e) => StockError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::db::{test_pool, users, FileDb};

    async fn patient(pool: &SqlitePool) -> i64 {
        users::create(
            pool,
            users::NewUser {
                name: "Pat",
                email: "pat@clinic.test",
                password_hash: "x",
                role: Role::User,
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn stock_of(pool: &SqlitePool, id: i64) -> i64 {
        medicines::find(pool, id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn dispense_takes_stock_and_marks_processed() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Aspirin", 10).await;
        let user_id = patient(&pool).await;

        let (handout, _) = dispense(
            &pool,
            NewDispense {
                medicine_id: med.id,
                user_id: Some(user_id),
                quantity: 4,
                notes: None,
            },
            99,
        )
        .await
        .unwrap();

        assert_eq!(handout.status, HandoutStatus::Processed);
        assert_eq!(handout.processed_by, Some(99));
        assert!(handout.processed_at.is_some());
        assert_eq!(stock_of(&pool, med.id).await, 6);
    }

    #[tokio::test]
    async fn dispense_refuses_to_overdraw() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Aspirin", 3).await;

        let err = dispense(
            &pool,
            NewDispense {
                medicine_id: med.id,
                user_id: None,
                quantity: 4,
                notes: None,
            },
            1,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            StockError::InsufficientStock {
                available: 3,
                requested: 4
            }
        ));
        assert_eq!(stock_of(&pool, med.id).await, 3);
        assert_eq!(handouts::count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dispense_rejects_bad_input() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Aspirin", 3).await;
        let zero = NewDispense {
            medicine_id: med.id,
            user_id: None,
            quantity: 0,
            notes: None,
        };
        assert!(matches!(
            dispense(&pool, zero, 1).await,
            Err(StockError::InvalidQuantity)
        ));
        let missing = NewDispense {
            medicine_id: 4242,
            user_id: None,
            quantity: 1,
            notes: None,
        };
        assert!(matches!(
            dispense(&pool, missing, 1).await,
            Err(StockError::MedicineNotFound)
        ));
    }

    #[tokio::test]
    async fn approve_is_one_way() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Lisinopril", 10).await;
        let user_id = patient(&pool).await;
        let request = handouts::create_request(&pool, med.id, user_id, 3, None)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, med.id).await, 10);

        let (processed, _) = approve(&pool, request.id, 7).await.unwrap();
        assert_eq!(processed.status, HandoutStatus::Processed);
        assert_eq!(stock_of(&pool, med.id).await, 7);

        let again = approve(&pool, request.id, 7).await.unwrap_err();
        assert!(matches!(again, StockError::AlreadyProcessed));
        assert_eq!(stock_of(&pool, med.id).await, 7);
    }

    #[tokio::test]
    async fn approve_with_short_stock_changes_nothing() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Gabapentin", 2).await;
        let user_id = patient(&pool).await;
        let request = handouts::create_request(&pool, med.id, user_id, 5, None)
            .await
            .unwrap();

        let err = approve(&pool, request.id, 7).await.unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));

        let still = handouts::find(&pool, request.id).await.unwrap().unwrap();
        assert_eq!(still.status, HandoutStatus::Requested);
        assert_eq!(still.processed_by, None);
        assert_eq!(stock_of(&pool, med.id).await, 2);
    }

    #[tokio::test]
    async fn unknown_handout() {
        let pool = test_pool().await;
        assert!(matches!(
            approve(&pool, 31337, 1).await,
            Err(StockError::HandoutNotFound)
        ));
    }

    #[tokio::test]
    async fn approvals_stop_when_stock_runs_out() {
        let pool = test_pool().await;
        let med = medicines::seed(&pool, "Metoprolol", 10).await;
        let user_id = patient(&pool).await;

        let mut ids = Vec::new();
        for quantity in [4, 4, 4, 1, 3] {
            ids.push(
                handouts::create_request(&pool, med.id, user_id, quantity, None)
                    .await
                    .unwrap()
                    .id,
            );
        }

        let results =
            futures::future::join_all(ids.iter().map(|id| approve(&pool, *id, 2))).await;

        let approved: i64 = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|(h, _)| h.quantity)
            .sum();
        let remaining = stock_of(&pool, med.id).await;
        assert!(remaining >= 0);
        assert_eq!(remaining, 10 - approved);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StockError::InsufficientStock { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_of_same_handout_process_once() {
        let db = FileDb::open().await;
        let med = medicines::seed(&db.pool, "Amlodipine", 10).await;
        let user_id = patient(&db.pool).await;
        let request = handouts::create_request(&db.pool, med.id, user_id, 2, None)
            .await
            .unwrap();

        let tasks: Vec<_> = (1..=4)
            .map(|approver| {
                let pool = db.pool.clone();
                tokio::spawn(async move { approve(&pool, request.id, approver).await })
            })
            .collect();
        let mut processed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => processed += 1,
                Err(StockError::AlreadyProcessed) => {}
                Err(e) => panic!("unexpected approval error: {e}"),
            }
        }

        assert_eq!(processed, 1);
        assert_eq!(stock_of(&db.pool, med.id).await, 8);
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_approvals_and_dispenses_never_overdraw() {
        let db = FileDb::open().await;
        let med = medicines::seed(&db.pool, "Paracetamol", 50).await;
        let user_id = patient(&db.pool).await;

        let mut requests = Vec::new();
        for i in 0..40 {
            let request = handouts::create_request(&db.pool, med.id, user_id, 1 + i % 3, None)
                .await
                .unwrap();
            requests.push(request.id);
        }

        let mut tasks = Vec::new();
        for id in requests.iter().copied() {
            for approver in [2, 3] {
                let pool = db.pool.clone();
                tasks.push(tokio::spawn(async move {
                    approve(&pool, id, approver).await.map(|(h, _)| h)
                }));
            }
        }
        for _ in 0..20 {
            let pool = db.pool.clone();
            let medicine_id = med.id;
            tasks.push(tokio::spawn(async move {
                let request = NewDispense {
                    medicine_id,
                    user_id: None,
                    quantity: 2,
                    notes: None,
                };
                dispense(&pool, request, 4).await.map(|(h, _)| h)
            }));
        }

        let mut taken = 0;
        let mut approved = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(handout) => {
                    taken += handout.quantity;
                    if requests.contains(&handout.id) {
                        approved.push(handout.id);
                    }
                }
                Err(StockError::InsufficientStock { .. }) | Err(StockError::AlreadyProcessed) => {}
                Err(e) => panic!("unexpected stock error: {e}"),
            }
        }

        let approvals = approved.len();
        approved.sort_unstable();
        approved.dedup();
        assert_eq!(approved.len(), approvals, "a handout was approved twice");

        let remaining = stock_of(&db.pool, med.id).await;
        assert!(remaining >= 0);
        assert_eq!(remaining, 50 - taken);

        let recorded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM handouts WHERE medicine_id = ? AND status = ?",
        )
        .bind(med.id)
        .bind(HandoutStatus::Processed)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(recorded, taken);
        db.close().await;
    }
}
