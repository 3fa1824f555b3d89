use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use phf::phf_map;
use serde::{Deserialize, Serialize};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::User => "user",
        }
    }

    /// Landing page after login or when hitting a generic entrypoint.
    pub fn dashboard_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Staff => "/staff/dashboard",
            Role::User => "/user/dashboard",
        }
    }

    pub fn appointments_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin/appointments",
            Role::Staff => "/staff/appointments",
            Role::User => "/user/appointments",
        }
    }

    pub fn is_staff_or_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "user" => Ok(Role::User),
            _ => Err("Allowed roles: admin, staff, user"),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub stock: i64,
    pub unit: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HandoutStatus {
    Requested,
    Processed,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Handout {
    pub id: i64,
    pub medicine_id: i64,
    pub user_id: Option<i64>,
    pub quantity: i64,
    pub notes: Option<String>,
    pub status: HandoutStatus,
    pub processed_by: Option<i64>,
    pub processed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Statuses an appointment may be in before moving to `self`.
    pub fn allowed_from(self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Pending => &[],
            AppointmentStatus::Confirmed => &[AppointmentStatus::Pending],
            AppointmentStatus::Cancelled => {
                &[AppointmentStatus::Pending, AppointmentStatus::Confirmed]
            }
            AppointmentStatus::Completed => &[AppointmentStatus::Confirmed],
        }
    }

    pub fn can_move_to(self, next: AppointmentStatus) -> bool {
        next.allowed_from().contains(&self)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub target_user_id: Option<i64>,
    pub action: Option<String>,
    pub title: String,
    pub message: String,
    pub details: Option<String>,
    #[sqlx(rename = "is_read")]
    pub read: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Keys written to `notifications.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    UserCreate,
    UserUpdateRole,
    UserDelete,
    UserPasswordChanged,
    MedicineCreate,
    MedicineUpdate,
    MedicineDelete,
    HandoutRequest,
    HandoutCreate,
    HandoutProcessed,
    AppointmentRequest,
    AppointmentConfirmed,
    AppointmentCancelled,
    AppointmentCompleted,
    AppointmentUpdated,
}

static ACTIONS: phf::Map<&'static str, Action> = phf_map! {
    "user.create" => Action::UserCreate,
    "user.update.role" => Action::UserUpdateRole,
    "user.delete" => Action::UserDelete,
    "user.password.changed" => Action::UserPasswordChanged,
    "medicine.create" => Action::MedicineCreate,
    "medicine.update" => Action::MedicineUpdate,
    "medicine.delete" => Action::MedicineDelete,
    "handout.request" => Action::HandoutRequest,
    "handout.create" => Action::HandoutCreate,
    "handout.processed" => Action::HandoutProcessed,
    "appointment.request" => Action::AppointmentRequest,
    "appointment.confirmed" => Action::AppointmentConfirmed,
    "appointment.cancelled" => Action::AppointmentCancelled,
    "appointment.completed" => Action::AppointmentCompleted,
    "appointment.updated" => Action::AppointmentUpdated,
};

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::UserCreate => "user.create",
            Action::UserUpdateRole => "user.update.role",
            Action::UserDelete => "user.delete",
            Action::UserPasswordChanged => "user.password.changed",
            Action::MedicineCreate => "medicine.create",
            Action::MedicineUpdate => "medicine.update",
            Action::MedicineDelete => "medicine.delete",
            Action::HandoutRequest => "handout.request",
            Action::HandoutCreate => "handout.create",
            Action::HandoutProcessed => "handout.processed",
            Action::AppointmentRequest => "appointment.request",
            Action::AppointmentConfirmed => "appointment.confirmed",
            Action::AppointmentCancelled => "appointment.cancelled",
            Action::AppointmentCompleted => "appointment.completed",
            Action::AppointmentUpdated => "appointment.updated",
        }
    }

    pub fn parse(key: &str) -> Option<Action> {
        ACTIONS.get(key).copied()
    }
}

/// Actions shown on the staff request feed.
pub const STAFF_FEED: &[Action] = &[
    Action::HandoutRequest,
    Action::AppointmentRequest,
    Action::AppointmentConfirmed,
    Action::AppointmentCancelled,
];

/// Actions counted as appointment updates on a patient's badge.
pub const PATIENT_APPOINTMENT_UPDATES: &[Action] = &[
    Action::AppointmentConfirmed,
    Action::AppointmentUpdated,
    Action::AppointmentCancelled,
];
