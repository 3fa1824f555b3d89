use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::{current_user, page, redirect_with, NotificationView};
use crate::auth::session::Flash;
use crate::auth::{ApiUser, SessionUser, StaffUser};
use crate::db::appointments::{self, AppointmentRow};
use crate::db::models::{Action, AppointmentStatus, Role, STAFF_FEED};
use crate::db::notifications::{self, NewNotification};
use crate::db::{handouts, users};
use crate::error::{ApiError, AppError};
use crate::services;
use crate::utils::format_date;
use crate::view::Page;
use crate::AppState;

pub async fn dashboard(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    let user = current_user(&state, &staff).await?;
    let (patient_count, appointment_count) = futures::try_join!(
        users::count_by_role(&state.pool, Role::User),
        appointments::count(&state.pool),
    )?;
    Ok(page(&state, &staff, "staff/dashboard", "Staff Dashboard")
        .await
        .data(json!({
            "user": user,
            "patientCount": patient_count,
            "appointmentCount": appointment_count,
        })))
}

pub async fn patients(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    let user = current_user(&state, &staff).await?;
    let patients = users::list_by_role(&state.pool, Role::User).await?;
    Ok(page(&state, &staff, "staff/patients", "Patients")
        .await
        .data(json!({ "user": user, "patients": patients })))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AppointmentView {
    #[serde(flatten)]
    row: AppointmentRow,
    date_readable: String,
    is_pending: bool,
}

pub async fn appointments(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    appointment_list(&state, &staff).await
}

/// Every appointment with its patient; shared with the admin page.
pub(crate) async fn appointment_list(state: &AppState, session: &SessionUser) -> Result<Page, AppError> {
    let user = current_user(state, session).await?;
    let rows: Vec<AppointmentView> = appointments::list_all(&state.pool)
        .await?
        .into_iter()
        .map(|row| AppointmentView {
            date_readable: format_date(row.appointment.date),
            is_pending: row.appointment.status == AppointmentStatus::Pending,
            row,
        })
        .collect();
    Ok(page(state, session, "staff/appointments", "Appointments")
        .await
        .data(json!({ "user": user, "appointments": rows })))
}

pub async fn notes(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    let user = current_user(&state, &staff).await?;
    let handouts = handouts::list_with_notes(&state.pool).await?;
    Ok(page(&state, &staff, "staff/notes", "Notes")
        .await
        .data(json!({ "user": user, "handouts": handouts })))
}

pub async fn settings(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    let user = current_user(&state, &staff).await?;
    Ok(page(&state, &staff, "staff/settings", "Settings")
        .await
        .data(json!({ "user": user })))
}

/// The staff request feed: handout and appointment requests from patients.
pub async fn notifications(State(state): State<AppState>, staff: StaffUser) -> Result<Page, AppError> {
    let user = current_user(&state, &staff).await?;
    let feed: Vec<NotificationView> = notifications::list_for_actions(&state.pool, STAFF_FEED, 500)
        .await?
        .into_iter()
        .map(NotificationView::from)
        .collect();
    Ok(page(&state, &staff, "staff/notifications", "Notifications")
        .await
        .data(json!({ "user": user, "notifications": feed })))
}

/// `GET /api/staff/notification-counts`.
///
/// # Returns
///
/// Unread handout requests, unread appointment requests and their total
pub async fn notification_counts(
    State(state): State<AppState>,
    user: ApiUser,
) -> Result<Json<Value>, ApiError> {
    if !user.role.is_staff_or_admin() {
        return Err(ApiError::Forbidden);
    }
    let (handout_requests, appointment_requests) = futures::try_join!(
        notifications::count_unread_actions(&state.pool, &[Action::HandoutRequest], None),
        notifications::count_unread_actions(&state.pool, &[Action::AppointmentRequest], None),
    )?;
    Ok(Json(json!({
        "handoutRequests": handout_requests,
        "appointmentRequests": appointment_requests,
        "total": handout_requests + appointment_requests,
    })))
}

/// pending -> confirmed
pub async fn confirm_appointment(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    move_appointment(&state, &staff, id, AppointmentStatus::Confirmed).await
}

/// pending or confirmed -> cancelled
pub async fn cancel_appointment(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    move_appointment(&state, &staff, id, AppointmentStatus::Cancelled).await
}

/// confirmed -> completed
pub async fn complete_appointment(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    move_appointment(&state, &staff, id, AppointmentStatus::Completed).await
}

async fn move_appointment(
    state: &AppState,
    session: &SessionUser,
    id: i64,
    next: AppointmentStatus,
) -> Result<Response, AppError> {
    let back = session.role.appointments_path();
    let Some(appointment) = appointments::find(&state.pool, id).await? else {
        return Ok(redirect_with(state, session, back, Flash::error("Appointment not found")).await);
    };
    let moved = appointment.status.can_move_to(next)
        && appointments::transition(&state.pool, id, appointment.status, next).await?;
    if !moved {
        log::warn!(
            "Refused to move appointment {} from {} to {}",
            id,
            appointment.status,
            next
        );
        return Ok(redirect_with(
            state,
            session,
            back,
            Flash::error(format!("Appointment is already {}", appointment.status)),
        )
        .await);
    }

    let (action, title) = match next {
        AppointmentStatus::Confirmed => (Action::AppointmentConfirmed, "Appointment confirmed"),
        AppointmentStatus::Cancelled => (Action::AppointmentCancelled, "Appointment cancelled"),
        AppointmentStatus::Completed => (Action::AppointmentCompleted, "Appointment completed"),
        AppointmentStatus::Pending => (Action::AppointmentUpdated, "Appointment updated"),
    };
    let when = match appointment.time.as_deref() {
        Some(time) => format!("{} at {}", format_date(appointment.date), time),
        None => format_date(appointment.date),
    };
    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(session.user_id),
            target_user_id: Some(appointment.user_id),
            action: Some(action),
            title: title.into(),
            message: format!("Your appointment on {} has been {}.", when, next),
            details: Some(json!({ "appointmentId": appointment.id, "status": next })),
            ..Default::default()
        },
    )
    .await;
    log::info!("User {} moved appointment {} to {}", session.user_id, id, next);

    Ok(redirect_with(state, session, back, Flash::success(title)).await)
}
