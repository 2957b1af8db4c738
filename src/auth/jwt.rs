//! Validation of access tokens issued by the hosted auth provider.
//!
//! Tokens are HS256 JWTs signed with the project's shared secret. The role is
//! not a top-level claim; it lives in `user_metadata`/`app_metadata` and is read
//! with [`extract_user_role`].

use crate::auth::rbac::{extract_user_role, Role};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims the auth provider puts in every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's uuid.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    pub fn role(&self) -> Role {
        extract_user_role(&serde_json::json!({
            "user_metadata": self.user_metadata,
            "app_metadata": self.app_metadata,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    /// Expected `aud`; `None` skips the audience check.
    pub audience: Option<String>,
}

pub fn validate_token(token: &str, settings: &JwtSettings) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    match &settings.audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }
    let data = decode::<Claims>(token, &DecodingKey::from_secret(settings.secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

    pub(crate) fn settings() -> JwtSettings {
        JwtSettings {
            secret: TEST_SECRET.into(),
            audience: Some("authenticated".into()),
        }
    }

    pub(crate) fn token_for(sub: &str, role: &str, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.into(),
            email: Some(format!("{}@example.com", role)),
            user_metadata: serde_json::json!({ "role": role }),
            app_metadata: serde_json::json!({}),
            exp: now + exp_offset_secs,
            iat: Some(now),
            aud: Some("authenticated".into()),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_role_from_metadata() {
        let token = token_for("2d6a4f9e-58a1-4c47-9d0b-0c5a8f3e2b11", "editor", 3600);
        let claims = validate_token(&token, &settings()).unwrap();
        assert_eq!(claims.role(), Role::Editor);
        assert_eq!(claims.email.as_deref(), Some("editor@example.com"));
    }

    #[test]
    fn expired_token_fails() {
        // Well past the default 60-second leeway.
        let token = token_for("x", "admin", -600);
        assert!(validate_token(&token, &settings()).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let token = token_for("x", "admin", 3600);
        let other = JwtSettings {
            secret: "another-secret".into(),
            audience: None,
        };
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn wrong_audience_fails() {
        let token = token_for("x", "admin", 3600);
        let other = JwtSettings {
            secret: TEST_SECRET.into(),
            audience: Some("service_role".into()),
        };
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn missing_metadata_defaults_to_user() {
        let claims: Claims = serde_json::from_value(serde_json::json!({"sub": "x", "exp": 1})).unwrap();
        assert_eq!(claims.role(), Role::User);
    }
}
