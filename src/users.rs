//! Admin user management over the `users` table, guarded by the role hierarchy.

use crate::auth::{can_manage_role, AuthUser, Role};
use crate::error::AppError;
use crate::store::{system_table, USERS_TABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: uuid::Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub user_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// The auth provider's user id; generated when absent.
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// What an update changed, for the audit trail.
#[derive(Debug)]
pub struct UpdatedUser {
    pub user: UserRecord,
    pub previous_role: Role,
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse::<Role>().map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Stored role strings are constrained by a CHECK; anything else reads as `user`.
fn stored_role(raw: &str) -> Role {
    raw.parse().unwrap_or(Role::User)
}

fn ensure_can_manage(actor: Role, target: Role) -> Result<(), AppError> {
    if can_manage_role(actor, target) {
        Ok(())
    } else {
        Err(AppError::insufficient_permissions())
    }
}

/// Role transition rules: the actor must manage both roles, and the last admin keeps the role.
pub fn check_role_change(actor: Role, from: Role, to: Role, admin_count: i64) -> Result<(), AppError> {
    ensure_can_manage(actor, from)?;
    ensure_can_manage(actor, to)?;
    if from == Role::Admin && to != Role::Admin && admin_count <= 1 {
        return Err(AppError::Conflict("cannot demote the last admin".into()));
    }
    Ok(())
}

/// Deletion rules: nobody deletes themself, and the last admin stays.
pub fn check_delete(actor: &AuthUser, target_id: uuid::Uuid, target_role: Role, admin_count: i64) -> Result<(), AppError> {
    if actor.user_id == target_id.to_string() {
        return Err(AppError::Conflict("cannot delete your own account".into()));
    }
    ensure_can_manage(actor.role, target_role)?;
    if target_role == Role::Admin && admin_count <= 1 {
        return Err(AppError::Conflict("cannot delete the last admin".into()));
    }
    Ok(())
}

const COLUMNS: &str = "id, email, full_name, role, user_metadata, created_at, updated_at, last_sign_in_at";

pub async fn list(pool: &PgPool, schema: &str, query: &UserQuery) -> Result<Vec<UserRecord>, AppError> {
    let role = query.role.as_deref().map(parse_role).transpose()?;
    let rows = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM {} WHERE ($1::text IS NULL OR role = $1) ORDER BY created_at DESC, email LIMIT $2 OFFSET $3",
        COLUMNS,
        system_table(schema, USERS_TABLE)
    ))
    .bind(role.map(|r| r.as_str()))
    .bind(query.limit.unwrap_or(100).clamp(1, 1000))
    .bind(query.offset.unwrap_or(0).max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get(pool: &PgPool, schema: &str, id: uuid::Uuid) -> Result<Option<UserRecord>, AppError> {
    let row = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM {} WHERE id = $1",
        COLUMNS,
        system_table(schema, USERS_TABLE)
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create(pool: &PgPool, schema: &str, actor: &AuthUser, new: NewUser) -> Result<UserRecord, AppError> {
    let role = new.role.as_deref().map(parse_role).transpose()?.unwrap_or(Role::User);
    ensure_can_manage(actor.role, role)?;
    let email = new.email.trim().to_ascii_lowercase();
    if !crate::service::is_valid_email(&email) {
        return Err(AppError::Validation("email must be a valid email address".into()));
    }
    let row = sqlx::query_as::<_, UserRecord>(&format!(
        "INSERT INTO {} (id, email, full_name, role, user_metadata) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        system_table(schema, USERS_TABLE),
        COLUMNS
    ))
    .bind(new.id.unwrap_or_else(uuid::Uuid::new_v4))
    .bind(&email)
    .bind(new.full_name.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(role.as_str())
    .bind(serde_json::json!({ "role": role.as_str() }))
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_db_conflict(e, "user with this email"))?;
    Ok(row)
}

/// Admin rows are locked for the duration of the check so two concurrent demotions cannot both pass.
async fn locked_admin_count(tx: &mut sqlx::PgConnection, schema: &str) -> Result<i64, AppError> {
    let ids: Vec<(uuid::Uuid,)> = sqlx::query_as(&format!(
        "SELECT id FROM {} WHERE role = 'admin' FOR UPDATE",
        system_table(schema, USERS_TABLE)
    ))
    .fetch_all(&mut *tx)
    .await?;
    Ok(ids.len() as i64)
}

pub async fn update(
    pool: &PgPool,
    schema: &str,
    actor: &AuthUser,
    id: uuid::Uuid,
    changes: UserUpdate,
) -> Result<Option<UpdatedUser>, AppError> {
    let new_role = changes.role.as_deref().map(parse_role).transpose()?;
    let mut tx = pool.begin().await?;
    let admins = locked_admin_count(&mut *tx, schema).await?;
    let current = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
        COLUMNS,
        system_table(schema, USERS_TABLE)
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(current) = current else {
        return Ok(None);
    };
    let previous_role = stored_role(&current.role);
    let role = match new_role {
        Some(to) => {
            check_role_change(actor.role, previous_role, to, admins)?;
            to
        }
        None => previous_role,
    };
    let row = sqlx::query_as::<_, UserRecord>(&format!(
        "UPDATE {} SET full_name = COALESCE($2, full_name), role = $3,
             user_metadata = user_metadata || jsonb_build_object('role', $3::text), updated_at = NOW()
         WHERE id = $1 RETURNING {}",
        system_table(schema, USERS_TABLE),
        COLUMNS
    ))
    .bind(id)
    .bind(changes.full_name.as_deref().map(str::trim))
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(Some(UpdatedUser { user: row, previous_role }))
}

/// Returns the deleted user, or None when the id is unknown.
pub async fn delete(pool: &PgPool, schema: &str, actor: &AuthUser, id: uuid::Uuid) -> Result<Option<UserRecord>, AppError> {
    let mut tx = pool.begin().await?;
    let admins = locked_admin_count(&mut *tx, schema).await?;
    let target = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
        COLUMNS,
        system_table(schema, USERS_TABLE)
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(target) = target else {
        return Ok(None);
    };
    check_delete(actor, id, stored_role(&target.role), admins)?;
    sqlx::query(&format!("DELETE FROM {} WHERE id = $1", system_table(schema, USERS_TABLE)))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: "0b9f3a52-7c1e-4d0a-8a55-3c2d1e0f9a10".into(),
            email: None,
            role,
        }
    }

    #[test]
    fn admin_may_change_any_role_while_another_admin_remains() {
        assert!(check_role_change(Role::Admin, Role::Viewer, Role::Editor, 1).is_ok());
        assert!(check_role_change(Role::Admin, Role::Admin, Role::Editor, 2).is_ok());
    }

    #[test]
    fn last_admin_cannot_be_demoted() {
        let err = check_role_change(Role::Admin, Role::Admin, Role::Viewer, 1).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn non_admins_cannot_change_roles() {
        for role in [Role::Editor, Role::Viewer, Role::User] {
            let err = check_role_change(role, Role::User, Role::Viewer, 3).unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
    }

    #[test]
    fn self_delete_is_refused() {
        let a = actor(Role::Admin);
        let own_id = uuid::Uuid::parse_str(&a.user_id).unwrap();
        assert!(matches!(check_delete(&a, own_id, Role::Admin, 5), Err(AppError::Conflict(_))));
    }

    #[test]
    fn last_admin_cannot_be_deleted() {
        let a = actor(Role::Admin);
        let other = uuid::Uuid::new_v4();
        assert!(matches!(check_delete(&a, other, Role::Admin, 1), Err(AppError::Conflict(_))));
        assert!(check_delete(&a, other, Role::Admin, 2).is_ok());
        assert!(check_delete(&a, other, Role::Editor, 1).is_ok());
    }

    #[test]
    fn invalid_role_is_bad_request() {
        assert!(matches!(parse_role("superuser"), Err(AppError::BadRequest(_))));
        assert_eq!(stored_role("garbage"), Role::User);
    }
}
