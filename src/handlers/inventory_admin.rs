use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Form;
use serde::Deserialize;
use serde_json::json;

use super::{accept, current_user, page, reject};
use crate::auth::AdminUser;
use crate::db::medicines::{self, MedicineChanges, MedicineInput};
use crate::db::models::Action;
use crate::db::notifications::NewNotification;
use crate::db::users;
use crate::error::AppError;
use crate::services::{self, actor_label};
use crate::utils::{non_empty, parse_stock};
use crate::view::Page;
use crate::AppState;

const LIST: &str = "/admin/inventory/medicines";

pub async fn list(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    let medicines = medicines::list(&state.pool).await?;
    Ok(page(&state, &admin, "inventory/medicines", "Manage Medicines")
        .await
        .data(json!({
            "user": user,
            "medicines": medicines,
            "isAdmin": true,
            "isStaff": false,
            "lowStockThreshold": state.low_stock_threshold,
        })))
}

#[derive(Deserialize, Debug)]
pub struct MedicineForm {
    name: Option<String>,
    sku: Option<String>,
    stock: Option<String>,
    unit: Option<String>,
}

/// `POST /admin/inventory/medicines/new`. Stock defaults to zero when left blank.
pub async fn create(
    State(state): State<AppState>,
    admin: AdminUser,
    headers: HeaderMap,
    Form(form): Form<MedicineForm>,
) -> Result<Response, AppError> {
    let Some(name) = non_empty(form.name) else {
        return Ok(reject(&state, &admin, &headers, StatusCode::BAD_REQUEST, LIST, "Name is required").await);
    };
    let stock = match parse_stock(form.stock.as_deref()) {
        Ok(stock) => stock.unwrap_or(0),
        Err(message) => {
            return Ok(reject(&state, &admin, &headers, StatusCode::BAD_REQUEST, LIST, message).await)
        }
    };

    let medicine = medicines::create(
        &state.pool,
        &MedicineInput {
            name,
            sku: non_empty(form.sku),
            stock,
            unit: non_empty(form.unit),
        },
    )
    .await?;

    let actor = users::find(&state.pool, admin.user_id).await?;
    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(admin.user_id),
            action: Some(Action::MedicineCreate),
            title: "Medicine added".into(),
            message: format!(
                "{} added {} ({} in stock)",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                medicine.name,
                medicine.stock
            ),
            details: Some(json!({ "medicineId": medicine.id, "stock": medicine.stock })),
            ..Default::default()
        },
    )
    .await;
    log::info!("Admin {} added medicine {}", admin.user_id, medicine.id);

    Ok(accept(
        &state,
        &admin,
        &headers,
        LIST,
        "Medicine created",
        json!({ "success": true, "message": "Medicine created", "medicine": medicine }),
    )
    .await)
}

/// Blank fields keep their current values. A new stock figure is refused
/// with 409 if the shelf changed between the read and the write.
pub async fn update(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<MedicineForm>,
) -> Result<Response, AppError> {
    let Some(current) = medicines::find(&state.pool, id).await? else {
        return Ok(reject(&state, &admin, &headers, StatusCode::NOT_FOUND, LIST, "Medicine not found").await);
    };
    let stock = match parse_stock(form.stock.as_deref()) {
        Ok(stock) => stock,
        Err(message) => {
            return Ok(reject(&state, &admin, &headers, StatusCode::BAD_REQUEST, LIST, message).await)
        }
    };

    let changes = MedicineChanges {
        name: non_empty(form.name),
        sku: non_empty(form.sku),
        stock,
        unit: non_empty(form.unit),
    };
    let Some(medicine) = medicines::update(&state.pool, id, &changes, current.stock).await? else {
        let (status, message) = match medicines::find(&state.pool, id).await? {
            Some(_) => (StatusCode::CONFLICT, "Stock changed while you were editing. Please try again."),
            None => (StatusCode::NOT_FOUND, "Medicine not found"),
        };
        log::warn!("Admin {} edit of medicine {} refused: {}", admin.user_id, id, message);
        return Ok(reject(&state, &admin, &headers, status, LIST, message).await);
    };

    let actor = users::find(&state.pool, admin.user_id).await?;
    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(admin.user_id),
            action: Some(Action::MedicineUpdate),
            title: "Medicine updated".into(),
            message: format!(
                "{} updated {}",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                medicine.name
            ),
            details: Some(json!({
                "medicineId": medicine.id,
                "oldStock": current.stock,
                "newStock": medicine.stock,
            })),
            ..Default::default()
        },
    )
    .await;
    log::info!(
        "Admin {} updated medicine {} (stock {} -> {})",
        admin.user_id,
        medicine.id,
        current.stock,
        medicine.stock
    );

    Ok(accept(
        &state,
        &admin,
        &headers,
        LIST,
        "Medicine updated",
        json!({ "success": true, "message": "Medicine updated", "medicine": medicine }),
    )
    .await)
}

/// Refused with 409 while any handout still references the medicine.
pub async fn delete(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(medicine) = medicines::find(&state.pool, id).await? else {
        return Ok(reject(&state, &admin, &headers, StatusCode::NOT_FOUND, LIST, "Medicine not found").await);
    };
    if medicines::handout_count(&state.pool, id).await? > 0 {
        return Ok(reject(
            &state,
            &admin,
            &headers,
            StatusCode::CONFLICT,
            LIST,
            "Medicine has handout records and cannot be deleted",
        )
        .await);
    }
    medicines::delete(&state.pool, id).await?;

    let actor = users::find(&state.pool, admin.user_id).await?;
    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(admin.user_id),
            action: Some(Action::MedicineDelete),
            title: "Medicine removed".into(),
            message: format!(
                "{} removed {}",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                medicine.name
            ),
            details: Some(json!({ "medicineId": medicine.id, "name": medicine.name })),
            ..Default::default()
        },
    )
    .await;
    log::info!("Admin {} removed medicine {}", admin.user_id, medicine.id);

    Ok(accept(
        &state,
        &admin,
        &headers,
        LIST,
        "Medicine deleted",
        json!({ "success": true, "message": "Medicine deleted" }),
    )
    .await)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::models::{Action, Role};
    use crate::db::{handouts, medicines, notifications};
    use crate::services::stock::{self, NewDispense};
    use crate::testing;

    #[tokio::test]
    async fn create_validates_and_records() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;

        let response = testing::send(
            &state,
            testing::post_xhr("/admin/inventory/medicines/new", &cookie, "name=&stock=3"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(testing::json(response).await["error"], "Name is required");

        let response = testing::send(
            &state,
            testing::post_xhr("/admin/inventory/medicines/new", &cookie, "name=Aspirin&stock=-1"),
        )
        .await;
        assert_eq!(testing::json(response).await["error"], "Stock cannot be negative");

        let response = testing::send(
            &state,
            testing::post_xhr(
                "/admin/inventory/medicines/new",
                &cookie,
                "name=Aspirin&sku=ASP-100&stock=40&unit=tablet",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = testing::json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["medicine"]["stock"], 40);

        let log = notifications::list_log(&state.pool, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].notification.action.as_deref(), Some(Action::MedicineCreate.as_str()));
    }

    #[tokio::test]
    async fn form_posts_redirect_with_flash() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;

        let response = testing::send(
            &state,
            testing::post("/admin/inventory/medicines/new", Some(&cookie), "name=Zinc"),
        )
        .await;
        assert_eq!(testing::redirected_to(&response), "/admin/inventory/medicines");

        let page = testing::page(&state, "/admin/inventory/medicines", &cookie).await;
        assert_eq!(page["flash"][0]["message"], "Medicine created");
        assert_eq!(page["data"]["medicines"][0]["stock"], 0);
        assert_eq!(page["data"]["isAdmin"], true);
    }

    #[tokio::test]
    async fn update_keeps_blank_fields() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;
        let med = medicines::seed(&state.pool, "Aspirin", 12).await;

        testing::send(
            &state,
            testing::post_xhr(
                &format!("/admin/inventory/medicines/{}/edit", med.id),
                &cookie,
                "name=Aspirin+Forte&stock=",
            ),
        )
        .await;
        let stored = medicines::find(&state.pool, med.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Aspirin Forte");
        assert_eq!(stored.stock, 12);
        assert_eq!(stored.unit.as_deref(), Some("tablet"));

        let response = testing::send(
            &state,
            testing::post_xhr(
                &format!("/admin/inventory/medicines/{}/edit", med.id),
                &cookie,
                "stock=-4",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(medicines::find(&state.pool, med.id).await.unwrap().unwrap().stock, 12);
    }

    #[tokio::test]
    async fn rename_does_not_restore_dispensed_stock() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;
        let med = medicines::seed(&state.pool, "Aspirin", 10).await;
        stock::dispense(
            &state.pool,
            NewDispense {
                medicine_id: med.id,
                user_id: None,
                quantity: 4,
                notes: None,
            },
            admin.id,
        )
        .await
        .unwrap();

        let response = testing::send(
            &state,
            testing::post_xhr(
                &format!("/admin/inventory/medicines/{}/edit", med.id),
                &cookie,
                "name=Aspirin+Forte&stock=",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(testing::json(response).await["medicine"]["stock"], 6);
        assert_eq!(medicines::find(&state.pool, med.id).await.unwrap().unwrap().stock, 6);
    }

    #[tokio::test]
    async fn medicines_with_history_are_kept() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let pat = testing::user(&state, "Pat", Role::User).await;
        let cookie = testing::login(&state, &admin).await;
        let used = medicines::seed(&state.pool, "Used", 5).await;
        let unused = medicines::seed(&state.pool, "Unused", 5).await;
        handouts::create_request(&state.pool, used.id, pat.id, 1, None)
            .await
            .unwrap();

        let response = testing::send(
            &state,
            testing::post_xhr(&format!("/admin/inventory/medicines/{}/delete", used.id), &cookie, ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(medicines::find(&state.pool, used.id).await.unwrap().is_some());

        let response = testing::send(
            &state,
            testing::post_xhr(&format!("/admin/inventory/medicines/{}/delete", unused.id), &cookie, ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(medicines::find(&state.pool, unused.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn staff_cannot_manage_medicines() {
        let state = testing::state().await;
        let staff = testing::user(&state, "Sam", Role::Staff).await;
        let cookie = testing::login(&state, &staff).await;
        let response = testing::send(
            &state,
            testing::post("/admin/inventory/medicines/new", Some(&cookie), "name=Zinc"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(medicines::count(&state.pool).await.unwrap(), 0);
    }
}
