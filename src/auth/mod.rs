//! Sessions, password hashing and the role gates applied to routes.

pub mod extract;
pub mod password;
pub mod session;

pub use extract::{AdminUser, ApiUser, SessionUser, StaffOnly, StaffUser};
