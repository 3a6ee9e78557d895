//! `gemstock-auth` — back-office users and role-based access control.

pub mod permissions;
pub mod policy;
pub mod roles;
pub mod user;

pub use permissions::Permission;
pub use policy::{AuthzError, authorize, role_permissions};
pub use roles::Role;
pub use user::{User, UserCommand, UserEvent, UserStatus};
