//! Role-to-permission policy.
//!
//! A fixed mapping is enough for a single-shop back office; no policy storage.

use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Permissions granted by a role.
///
/// `admin` gets the wildcard; unknown roles grant nothing.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::new("*")],
        "manager" => vec![
            Permission::new("catalog.read"),
            Permission::new("catalog.write"),
            Permission::new("stock.read"),
            Permission::new("stock.move"),
            Permission::new("stock.configure"),
            Permission::new("reports.export"),
            Permission::new("users.read"),
        ],
        "clerk" => vec![
            Permission::new("catalog.read"),
            Permission::new("stock.read"),
            Permission::new("stock.move"),
        ],
        "viewer" => vec![
            Permission::new("catalog.read"),
            Permission::new("stock.read"),
        ],
        _ => vec![],
    }
}

/// Check whether a set of roles grants a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(roles: &[Role], required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<String> = roles
        .iter()
        .flat_map(|r| role_permissions(r))
        .map(|p| p.as_str().to_string())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_wildcard_allows_everything() {
        let roles = vec![Role::new("admin")];
        assert!(authorize(&roles, &Permission::new("stock.move")).is_ok());
        assert!(authorize(&roles, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn clerk_can_move_stock_but_not_export_reports() {
        let roles = vec![Role::new("clerk")];
        assert!(authorize(&roles, &Permission::new("stock.move")).is_ok());

        let err = authorize(&roles, &Permission::new("reports.export")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("reports.export".to_string()));
    }

    #[test]
    fn viewer_is_read_only() {
        let roles = vec![Role::new("viewer")];
        assert!(authorize(&roles, &Permission::new("stock.read")).is_ok());
        assert!(authorize(&roles, &Permission::new("stock.move")).is_err());
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let roles = vec![Role::new("janitor")];
        assert!(authorize(&roles, &Permission::new("stock.read")).is_err());
    }

    #[test]
    fn permissions_accumulate_across_roles() {
        let roles = vec![Role::new("viewer"), Role::new("clerk")];
        assert!(authorize(&roles, &Permission::new("stock.move")).is_ok());
    }
}
