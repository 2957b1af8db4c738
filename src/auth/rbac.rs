//! Role-based access control: a static permission table plus a role hierarchy.
//!
//! Four roles exist: `admin`, `editor`, `viewer` and `user`. Each maps to a
//! fixed list of `category:verb` permission strings. [`can_access`] turns a
//! `(resource, action)` request into the permissions that would satisfy it and
//! checks the role's list for any of them; `admin` is always allowed.
//! [`can_manage_role`] guards user-management operations: only an admin may
//! act on another role, and only on roles at or below its own level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";
pub const ROLE_USER: &str = "user";

/// Granted to `user` (anonymous-equivalent) so public content stays readable.
pub const PUBLIC_READ: &str = "public:read";
pub const ADMIN_ACCESS: &str = "admin:access";

const ADMIN_PERMISSIONS: &[&str] = &[
    "content:read",
    "content:write",
    "content:delete",
    "media:read",
    "media:write",
    "media:delete",
    "seo:read",
    "seo:write",
    "seo:delete",
    "contact:read",
    "contact:write",
    "contact:delete",
    "users:read",
    "users:write",
    "users:delete",
    "security:read",
    "security:write",
    "analytics:read",
    PUBLIC_READ,
    ADMIN_ACCESS,
];

const EDITOR_PERMISSIONS: &[&str] = &[
    "content:read",
    "content:write",
    "content:delete",
    "media:read",
    "media:write",
    "seo:read",
    "seo:write",
    "analytics:read",
    "contact:read",
    "contact:write",
    PUBLIC_READ,
];

const VIEWER_PERMISSIONS: &[&str] = &[
    "content:read",
    "media:read",
    "seo:read",
    "analytics:read",
    "contact:read",
    PUBLIC_READ,
];

const USER_PERMISSIONS: &[&str] = &[PUBLIC_READ];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Editor, Role::Viewer, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Editor => ROLE_EDITOR,
            Role::Viewer => ROLE_VIEWER,
            Role::User => ROLE_USER,
        }
    }

    /// Position in the hierarchy; lower is more privileged.
    pub fn level(&self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::Editor => 1,
            Role::Viewer => 2,
            Role::User => 3,
        }
    }

    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Editor => EDITOR_PERMISSIONS,
            Role::Viewer => VIEWER_PERMISSIONS,
            Role::User => USER_PERMISSIONS,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Admin => "Full access including user management and security",
            Role::Editor => "Create, edit and delete site content",
            Role::Viewer => "Read-only access to the admin area",
            Role::User => "Public site access",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid role '{}' (expected admin, editor, viewer or user)", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_ADMIN => Ok(Role::Admin),
            ROLE_EDITOR => Ok(Role::Editor),
            ROLE_VIEWER => Ok(Role::Viewer),
            ROLE_USER => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// What the caller wants to do with a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
    Admin,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Admin => "admin",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "delete" => Ok(Action::Delete),
            "admin" => Ok(Action::Admin),
            other => Err(format!("invalid action '{}'", other)),
        }
    }
}

/// Permission family a resource name belongs to. Anything unrecognized is site content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceCategory {
    Content,
    Media,
    Seo,
    Contact,
    Users,
    Security,
    Analytics,
}

impl ResourceCategory {
    pub fn of(resource: &str) -> ResourceCategory {
        match resource {
            "media" | "images" | "uploads" => ResourceCategory::Media,
            "seo" | "page-seo" | "seo-defaults" => ResourceCategory::Seo,
            "contact" | "contact-submissions" => ResourceCategory::Contact,
            "users" | "roles" => ResourceCategory::Users,
            "security" | "audit-logs" => ResourceCategory::Security,
            "analytics" => ResourceCategory::Analytics,
            _ => ResourceCategory::Content,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceCategory::Content => "content",
            ResourceCategory::Media => "media",
            ResourceCategory::Seo => "seo",
            ResourceCategory::Contact => "contact",
            ResourceCategory::Users => "users",
            ResourceCategory::Security => "security",
            ResourceCategory::Analytics => "analytics",
        }
    }
}

/// One access decision's inputs.
#[derive(Clone, Debug)]
pub struct AccessRequest<'a> {
    pub user_role: Role,
    pub resource: &'a str,
    pub action: Action,
    /// Carried for audit records; the decision does not depend on it.
    pub user_id: Option<&'a str>,
}

/// Permissions that satisfy `action` on `resource`; holding any one of them is enough.
pub fn required_permissions(resource: &str, action: Action) -> Vec<String> {
    let category = ResourceCategory::of(resource);
    let prefix = category.prefix();
    match action {
        Action::Read if category == ResourceCategory::Content => {
            vec![format!("{}:read", prefix), PUBLIC_READ.to_string()]
        }
        Action::Read => vec![format!("{}:read", prefix)],
        Action::Write => vec![format!("{}:write", prefix)],
        Action::Delete => vec![format!("{}:delete", prefix)],
        Action::Admin => vec![ADMIN_ACCESS.to_string()],
    }
}

pub fn has_permission(role: Role, permission: &str) -> bool {
    role.permissions().contains(&permission)
}

/// String-typed variant of [`has_permission`]; unknown roles hold nothing.
pub fn role_has_permission(role: &str, permission: &str) -> bool {
    role.parse::<Role>().map(|r| has_permission(r, permission)).unwrap_or(false)
}

pub fn role_permissions(role: Role) -> &'static [&'static str] {
    role.permissions()
}

pub fn can_access(req: &AccessRequest<'_>) -> bool {
    if req.user_role == Role::Admin {
        return true;
    }
    required_permissions(req.resource, req.action)
        .iter()
        .any(|p| has_permission(req.user_role, p))
}

/// Only admins manage roles, and only roles at or below their own level.
pub fn can_manage_role(manager: Role, target: Role) -> bool {
    if manager != Role::Admin {
        return false;
    }
    manager.level() <= target.level()
}

pub fn is_valid_role(role: &str) -> bool {
    role.parse::<Role>().is_ok()
}

/// Role from a user record or token claims: `user_metadata.role`, then `app_metadata.role`,
/// else `user`. Unknown role strings also fall back to `user`.
pub fn extract_user_role(user: &serde_json::Value) -> Role {
    ["user_metadata", "app_metadata"]
        .iter()
        .filter_map(|key| user.get(key)?.get("role")?.as_str())
        .find_map(|s| s.parse::<Role>().ok())
        .unwrap_or(Role::User)
}
