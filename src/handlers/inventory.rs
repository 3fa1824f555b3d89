use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{current_user, page, redirect_with};
use crate::auth::session::Flash;
use crate::auth::{SessionUser, StaffOnly, StaffUser};
use crate::db::handouts::{self, HandoutRow};
use crate::db::models::{Action, HandoutStatus, Role};
use crate::db::notifications::NewNotification;
use crate::db::{medicines, users};
use crate::error::AppError;
use crate::services::stock::{self, NewDispense, StockError};
use crate::services::{self, actor_label};
use crate::utils::{non_empty, parse_id, parse_quantity};
use crate::view::Page;
use crate::AppState;

pub async fn list_medicines(State(state): State<AppState>, staff: StaffOnly) -> Result<Page, AppError> {
    log::info!("Listing inventory for user {}", staff.user_id);
    let user = current_user(&state, &staff).await?;
    let medicines = medicines::list(&state.pool).await?;
    Ok(page(&state, &staff, "inventory/medicines", "Medicines")
        .await
        .data(json!({ "user": user, "medicines": medicines, "isAdmin": false, "isStaff": true })))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HandoutView {
    #[serde(flatten)]
    row: HandoutRow,
    is_requested: bool,
}

async fn handouts_page(state: &AppState, session: &SessionUser) -> Result<Page, AppError> {
    let user = current_user(state, session).await?;
    let (rows, medicines, patients) = futures::try_join!(
        handouts::list_all(&state.pool),
        medicines::list(&state.pool),
        users::list_by_role(&state.pool, Role::User),
    )?;
    let rows: Vec<HandoutView> = rows
        .into_iter()
        .map(|row| HandoutView {
            is_requested: row.handout.status == HandoutStatus::Requested,
            row,
        })
        .collect();
    Ok(page(state, session, "inventory/handouts", "Handouts")
        .await
        .data(json!({
            "user": user,
            "handouts": rows,
            "medicines": medicines,
            "users": patients,
        })))
}

/// Every handout, with requested ones flagged for approval.
pub async fn list_handouts(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    handouts_page(&state, &staff).await
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DispenseForm {
    medicine_id: Option<String>,
    user_id: Option<String>,
    quantity: Option<String>,
    notes: Option<String>,
}

/// Hands medicine out directly, without a prior patient request.
pub async fn dispense(
    State(state): State<AppState>,
    staff: StaffUser,
    Form(form): Form<DispenseForm>,
) -> Result<Response, AppError> {
    let Some(medicine_id) = parse_id(form.medicine_id.as_deref()) else {
        return refuse(&state, &staff, "Please select a medicine").await;
    };
    let patient = match parse_id(form.user_id.as_deref()) {
        Some(id) => match users::find(&state.pool, id).await? {
            Some(patient) => Some(patient),
            None => return refuse(&state, &staff, "Patient not found").await,
        },
        None => None,
    };

    let request = NewDispense {
        medicine_id,
        user_id: patient.as_ref().map(|p| p.id),
        quantity: parse_quantity(form.quantity.as_deref()),
        notes: non_empty(form.notes),
    };
    let (handout, medicine) = match stock::dispense(&state.pool, request, staff.user_id).await {
        Ok(done) => done,
        Err(StockError::Database(e)) => return Err(e.into()),
        Err(e) => {
            log::warn!("Dispense by user {} refused: {}", staff.user_id, e);
            return refuse(&state, &staff, refusal(&e)).await;
        }
    };

    let actor = users::find(&state.pool, staff.user_id).await?;
    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(staff.user_id),
            target_user_id: handout.user_id,
            action: Some(Action::HandoutCreate),
            title: "Medicine handed out".into(),
            message: format!(
                "{} handed out {} x {}",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                handout.quantity,
                medicine.name
            ),
            details: Some(json!({
                "handoutId": handout.id,
                "medicineId": medicine.id,
                "quantity": handout.quantity,
            })),
            ..Default::default()
        },
    )
    .await;

    Ok(redirect_with(&state, &staff, "/inventory/handouts", Flash::success("Handout created")).await)
}

/// Approves a patient's request, taking the medicine out of stock.
pub async fn process(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let back = "/inventory/handouts";
    let (handout, medicine) = match stock::approve(&state.pool, id, staff.user_id).await {
        Ok(done) => done,
        Err(StockError::Database(e)) => return Err(e.into()),
        Err(e) => {
            log::warn!("Approval of handout {} by user {} refused: {}", id, staff.user_id, e);
            return Ok(redirect_with(&state, &staff, back, Flash::error(refusal(&e))).await);
        }
    };

    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(staff.user_id),
            target_user_id: handout.user_id,
            action: Some(Action::HandoutProcessed),
            title: "Medicine ready".into(),
            message: format!(
                "Your request for {} x {} has been processed.",
                handout.quantity, medicine.name
            ),
            details: Some(json!({ "handoutId": handout.id, "medicineId": medicine.id })),
            ..Default::default()
        },
    )
    .await;

    Ok(redirect_with(&state, &staff, back, Flash::success("Handout processed")).await)
}

/// Re-renders the handouts page with the reason a dispense was refused.
async fn refuse(state: &AppState, session: &SessionUser, message: &str) -> Result<Response, AppError> {
    Ok(handouts_page(state, session)
        .await?
        .error(message)
        .status(StatusCode::UNPROCESSABLE_ENTITY)
        .into_response())
}

fn refusal(err: &StockError) -> &'static str {
    match err {
        StockError::MedicineNotFound => "Medicine not found",
        StockError::HandoutNotFound => "Handout not found",
        StockError::InvalidQuantity => "Quantity must be at least 1",
        StockError::InsufficientStock { .. } => "Insufficient stock",
        StockError::AlreadyProcessed => "Handout has already been processed",
        StockError::Database(_) => "Server error",
    }
}
