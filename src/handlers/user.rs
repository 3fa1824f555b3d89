use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Redirect, Response};
use axum::{Form, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{accept, change_password, current_user, page, redirect_with, reject, ChangePasswordForm, NotificationView};
use crate::auth::session::Flash;
use crate::auth::{ApiUser, SessionUser};
use crate::db::appointments::{self, NewAppointment};
use crate::db::handouts;
use crate::db::medicines;
use crate::db::models::{Action, Appointment, PATIENT_APPOINTMENT_UPDATES};
use crate::db::notifications::{self, NewNotification, Party, Scope};
use crate::db::users;
use crate::error::{ApiError, AppError};
use crate::services;
use crate::utils::{format_date, non_empty, parse_id, parse_quantity};
use crate::view::Page;
use crate::AppState;

const MIN_PASSWORD_LENGTH: usize = 6;
const DEFAULT_APPOINTMENT_TYPE: &str = "Consultation";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UpcomingView {
    #[serde(flatten)]
    appointment: Appointment,
    when_readable: String,
    staff_name: &'static str,
}

impl From<Appointment> for UpcomingView {
    fn from(appointment: Appointment) -> Self {
        let when_readable = match appointment.time.as_deref() {
            Some(time) => format!("{} at {}", format_date(appointment.date), time),
            None => format_date(appointment.date),
        };
        Self {
            appointment,
            when_readable,
            staff_name: "Clinic",
        }
    }
}

/// `GET /user/dashboard`: upcoming appointments, medicines on hold and recent activity.
pub async fn dashboard(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let today = Utc::now().date_naive();
    let (upcoming, on_hold, activity) = futures::try_join!(
        appointments::upcoming_for_user(&state.pool, user.id, today),
        handouts::count_for_user(&state.pool, user.id),
        notifications::list_for_user(&state.pool, user.id, 6),
    )?;

    let upcoming_count = upcoming.len();
    let upcoming: Vec<UpcomingView> = upcoming.into_iter().take(5).map(UpcomingView::from).collect();
    let next_summary = upcoming
        .first()
        .map(|a| {
            let kind = a.appointment.kind.as_deref().unwrap_or(DEFAULT_APPOINTMENT_TYPE);
            format!("{} ({})", a.when_readable, kind)
        })
        .unwrap_or_else(|| "None".to_string());
    let next = upcoming.first().map(|a| {
        json!({
            "whenReadable": a.when_readable,
            "type": a.appointment.kind,
            "status": a.appointment.status,
        })
    });
    let activity: Vec<String> = activity
        .into_iter()
        .map(|row| format!("{}: {}", row.notification.title, row.notification.message))
        .collect();

    Ok(page(&state, &session, "user/dashboard", "My Dashboard")
        .await
        .data(json!({
            "user": user,
            "upcoming": upcoming,
            "upcomingCount": upcoming_count,
            "next": next,
            "nextAppointmentSummary": next_summary,
            "medicinesOnHold": on_hold,
            "recentActivity": activity,
        })))
}

pub async fn appointments(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let list = appointments::list_for_user(&state.pool, user.id).await?;
    Ok(page(&state, &session, "user/appointments", "My Appointments")
        .await
        .data(json!({ "user": user, "appointments": list })))
}

pub async fn profile(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    Ok(page(&state, &session, "user/profile", "My Profile")
        .await
        .data(json!({ "user": user })))
}

#[derive(Deserialize, Debug)]
pub struct ProfileForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

/// Blank fields keep their current values; a new email must not belong to anyone else.
pub async fn update_profile(
    State(state): State<AppState>,
    session: SessionUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let user = current_user(&state, &session).await?;
    let back = "/user/profile";

    let name = non_empty(form.name).unwrap_or_else(|| user.name.clone());
    let email = non_empty(form.email).unwrap_or_else(|| user.email.clone());
    let password = form.password.filter(|p| !p.is_empty());

    if email != user.email {
        if let Some(owner) = users::find_by_email(&state.pool, &email).await? {
            if owner.id != user.id {
                return Ok(redirect_with(&state, &session, back, Flash::error("Email already in use")).await);
            }
        }
    }
    if password.as_ref().is_some_and(|p| p.chars().count() < MIN_PASSWORD_LENGTH) {
        return Ok(redirect_with(
            &state,
            &session,
            back,
            Flash::error("Password must be at least 6 characters"),
        )
        .await);
    }

    users::update_profile(&state.pool, user.id, &name, &email).await?;
    if let Some(password) = password {
        let hash = state.passwords.hash_off_thread(password).await?;
        users::update_password(&state.pool, user.id, &hash).await?;
    }
    log::info!("User {} updated their profile", user.id);
    Ok(redirect_with(&state, &session, back, Flash::success("Profile updated")).await)
}

pub async fn new_appointment_page(
    State(state): State<AppState>,
    session: SessionUser,
) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let today = Utc::now().date_naive();
    Ok(page(&state, &session, "user/new-appointment", "Book Appointment")
        .await
        .data(json!({ "user": user, "minDate": today.format("%Y-%m-%d").to_string() })))
}

#[derive(Deserialize, Debug)]
pub struct AppointmentForm {
    date: Option<String>,
    time: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    notes: Option<String>,
}

/// `POST /appointments/new`: books a pending appointment and tells staff.
///
/// Answers with JSON for XHR clients and with flash plus redirect otherwise.
pub async fn create_appointment(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
    Form(form): Form<AppointmentForm>,
) -> Result<Response, AppError> {
    let back = "/appointments/new";
    let user = current_user(&state, &session).await?;

    let Some(raw_date) = non_empty(form.date) else {
        return Ok(reject(&state, &session, &headers, StatusCode::BAD_REQUEST, back, "Date is required").await);
    };
    let Ok(date) = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d") else {
        return Ok(reject(&state, &session, &headers, StatusCode::BAD_REQUEST, back, "Invalid date").await);
    };
    if date < Utc::now().date_naive() {
        return Ok(reject(
            &state,
            &session,
            &headers,
            StatusCode::BAD_REQUEST,
            back,
            "Cannot book an appointment in the past",
        )
        .await);
    }
    let time = non_empty(form.time);
    let kind = non_empty(form.kind).unwrap_or_else(|| DEFAULT_APPOINTMENT_TYPE.to_string());
    let notes = non_empty(form.notes);

    let appointment = appointments::create(
        &state.pool,
        NewAppointment {
            user_id: user.id,
            date,
            time: time.as_deref(),
            kind: &kind,
            notes: notes.as_deref(),
        },
    )
    .await?;

    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(user.id),
            action: Some(Action::AppointmentRequest),
            title: "Appointment request".into(),
            message: format!("{} requested a {} appointment on {}", user.name, kind, format_date(date)),
            details: Some(json!({
                "appointmentId": appointment.id,
                "date": appointment.date,
                "time": appointment.time,
                "type": kind,
            })),
            ..Default::default()
        },
    )
    .await;
    log::info!("User {} booked appointment {}", user.id, appointment.id);

    Ok(accept(
        &state,
        &session,
        &headers,
        "/user/appointments",
        "Appointment requested",
        json!({ "success": true, "appointment": appointment }),
    )
    .await)
}

pub async fn handouts(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let list = handouts::list_for_user(&state.pool, user.id).await?;
    Ok(page(&state, &session, "user/handouts", "My Handouts")
        .await
        .data(json!({ "user": user, "handouts": list })))
}

pub async fn new_handout_page(
    State(state): State<AppState>,
    session: SessionUser,
) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let available = medicines::list_in_stock(&state.pool).await?;
    Ok(page(&state, &session, "user/new-handout", "Request Medicine")
        .await
        .data(json!({ "user": user, "medicines": available })))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HandoutRequestForm {
    medicine_id: Option<String>,
    quantity: Option<String>,
    notes: Option<String>,
}

/// `POST /handouts/new`: asks staff for a medicine.
///
/// Stock is not touched here. It is checked and taken when staff approve
/// the request.
pub async fn request_handout(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
    Form(form): Form<HandoutRequestForm>,
) -> Result<Response, AppError> {
    let back = "/handouts/new";
    let user = current_user(&state, &session).await?;

    let Some(medicine_id) = parse_id(form.medicine_id.as_deref()) else {
        return Ok(reject(&state, &session, &headers, StatusCode::BAD_REQUEST, back, "Please select a medicine").await);
    };
    let Some(medicine) = medicines::find(&state.pool, medicine_id).await? else {
        return Ok(reject(&state, &session, &headers, StatusCode::NOT_FOUND, back, "Medicine not found").await);
    };
    let quantity = parse_quantity(form.quantity.as_deref());
    if quantity < 1 {
        return Ok(reject(
            &state,
            &session,
            &headers,
            StatusCode::BAD_REQUEST,
            back,
            "Quantity must be at least 1",
        )
        .await);
    }
    let notes = non_empty(form.notes);

    let handout = handouts::create_request(&state.pool, medicine.id, user.id, quantity, notes.as_deref()).await?;

    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(user.id),
            action: Some(Action::HandoutRequest),
            title: "Medicine request".into(),
            message: format!("{} requested {} x {}", user.name, quantity, medicine.name),
            details: Some(json!({
                "handoutId": handout.id,
                "medicineId": medicine.id,
                "quantity": quantity,
                "notes": notes,
            })),
            ..Default::default()
        },
    )
    .await;
    log::info!(
        "User {} requested {} x medicine {} (handout {})",
        user.id,
        quantity,
        medicine.id,
        handout.id
    );

    let message = "Your request has been sent. Staff will process it soon.";
    Ok(accept(
        &state,
        &session,
        &headers,
        "/user/handouts",
        message,
        json!({ "success": true, "redirect": "/user/handouts", "message": message }),
    )
    .await)
}

pub async fn notifications(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    let (rows, notif_count) = futures::try_join!(
        notifications::list_for_user(&state.pool, user.id, 200),
        notifications::count_unread(&state.pool, user.id, Scope::Involved),
    )?;
    let rows: Vec<NotificationView> = rows.into_iter().map(NotificationView::from).collect();
    Ok(page(&state, &session, "user/notifications", "Notifications")
        .await
        .data(json!({ "user": user, "notifications": rows, "notifCount": notif_count })))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    session: SessionUser,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    notifications::mark_read(&state.pool, id, session.user_id, Scope::Involved).await?;
    Ok(Redirect::to("/user/notifications"))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    session: SessionUser,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    notifications::delete(&state.pool, id, session.user_id, Scope::Involved).await?;
    Ok(Redirect::to("/user/notifications"))
}

pub async fn settings(State(state): State<AppState>, session: SessionUser) -> Result<Page, AppError> {
    let user = current_user(&state, &session).await?;
    Ok(page(&state, &session, "user/settings", "Settings")
        .await
        .data(json!({ "user": user })))
}

pub async fn change_password_submit(
    State(state): State<AppState>,
    session: SessionUser,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, AppError> {
    let flash = match change_password(&state, &session, form).await? {
        Ok(flash) | Err(flash) => flash,
    };
    Ok(redirect_with(&state, &session, "/user/settings", flash).await)
}

/// Unread appointment updates and password notices for the signed-in patient.
pub async fn notification_counts(
    State(state): State<AppState>,
    user: ApiUser,
) -> Result<Json<Value>, ApiError> {
    let (appointment_updates, password_changes) = futures::try_join!(
        notifications::count_unread_actions(
            &state.pool,
            PATIENT_APPOINTMENT_UPDATES,
            Some((Party::Target, user.user_id)),
        ),
        notifications::count_unread_actions(
            &state.pool,
            &[Action::UserPasswordChanged],
            Some((Party::Recipient, user.user_id)),
        ),
    )?;
    Ok(Json(json!({
        "appointmentNotifications": appointment_updates,
        "passwordNotifications": password_changes,
        "total": appointment_updates + password_changes,
    })))
}
