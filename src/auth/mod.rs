//! Authentication (provider-issued JWTs) and role-based authorization.

pub mod extract;
pub mod jwt;
pub mod rbac;

pub use extract::{AuthUser, MaybeAuthUser};
pub use rbac::{can_access, can_manage_role, extract_user_role, has_permission, is_valid_role, AccessRequest, Action, Role};

use crate::audit::{self, AuditEntry};
use crate::error::AppError;
use crate::state::AppState;

/// Checks `user` against the permission table. A denial is written to the audit
/// log in the background and surfaces as the static 403.
pub fn authorize(state: &AppState, user: &AuthUser, resource: &str, action: Action) -> Result<(), AppError> {
    let allowed = can_access(&AccessRequest {
        user_role: user.role,
        resource,
        action,
        user_id: Some(&user.user_id),
    });
    if allowed {
        return Ok(());
    }
    tracing::warn!(
        user_id = %user.user_id,
        role = %user.role,
        resource,
        action = action.as_str(),
        "access denied"
    );
    audit::record_detached(
        state,
        AuditEntry::new(audit::ACTION_ACCESS_DENIED, resource)
            .actor(user)
            .details(serde_json::json!({ "attempted": action.as_str(), "role": user.role })),
    );
    Err(AppError::insufficient_permissions())
}
