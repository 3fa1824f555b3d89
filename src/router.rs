use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_cookies::CookieManagerLayer;

use crate::error::AppError;
use crate::handlers::{admin, auth, inventory, inventory_admin, staff, user};
use crate::AppState;

pub fn build(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(auth::home))
        .route("/contact", get(auth::contact))
        .route("/forgot-password", get(auth::forgot_password))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", get(auth::logout))
        .route("/dashboard", get(auth::dashboard))
        .route("/appointments", get(auth::appointments));

    let admin = Router::new()
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::users))
        .route("/admin/users/:id/edit", post(admin::edit_user))
        .route("/admin/users/:id/delete", post(admin::delete_user))
        .route("/admin/settings", get(admin::settings))
        .route("/admin/profile", get(admin::profile))
        .route("/admin/appointments", get(admin::appointments))
        .route("/admin/reports", get(admin::reports))
        .route("/admin/notifications", get(admin::notifications))
        .route("/admin/notifications/:id/mark-read", post(admin::mark_notification_read))
        .route("/admin/notifications/:id/delete", post(admin::delete_notification))
        .route(
            "/admin/change-password",
            get(admin::change_password_page).post(admin::change_password_submit),
        )
        .route("/admin/inventory/medicines", get(inventory_admin::list))
        .route("/admin/inventory/medicines/new", post(inventory_admin::create))
        .route("/admin/inventory/medicines/:id/edit", post(inventory_admin::update))
        .route("/admin/inventory/medicines/:id/delete", post(inventory_admin::delete));

    let staff = Router::new()
        .route("/staff/dashboard", get(staff::dashboard))
        .route("/staff/patients", get(staff::patients))
        .route("/staff/appointments", get(staff::appointments))
        .route("/staff/appointments/:id/confirm", post(staff::confirm_appointment))
        .route("/staff/appointments/:id/cancel", post(staff::cancel_appointment))
        .route("/staff/appointments/:id/complete", post(staff::complete_appointment))
        .route("/staff/notes", get(staff::notes))
        .route("/staff/settings", get(staff::settings))
        .route("/staff/notifications", get(staff::notifications))
        .route("/api/staff/notification-counts", get(staff::notification_counts));

    let patient = Router::new()
        .route("/user/dashboard", get(user::dashboard))
        .route("/user/appointments", get(user::appointments))
        .route("/user/profile", get(user::profile).post(user::update_profile))
        .route(
            "/appointments/new",
            get(user::new_appointment_page).post(user::create_appointment),
        )
        .route("/user/handouts", get(user::handouts))
        .route("/handouts/new", get(user::new_handout_page).post(user::request_handout))
        .route("/user/notifications", get(user::notifications))
        .route("/user/notifications/:id/mark-read", post(user::mark_notification_read))
        .route("/user/notifications/:id/delete", post(user::delete_notification))
        .route("/user/settings", get(user::settings))
        .route("/user/settings/password", post(user::change_password_submit))
        .route("/api/user/notification-counts", get(user::notification_counts));

    let inventory = Router::new()
        .route("/inventory/medicines", get(inventory::list_medicines))
        .route("/inventory/handouts", get(inventory::list_handouts))
        .route("/inventory/new", post(inventory::dispense))
        .route("/inventory/handouts/:id/process", post(inventory::process));

    Router::new()
        .merge(public)
        .merge(admin)
        .merge(staff)
        .merge(patient)
        .merge(inventory)
        .fallback(not_found)
        .layer(middleware::from_fn(log_requests))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Page not found".into())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
