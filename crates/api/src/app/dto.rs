use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use orgwarden_auth::{SignedToken, User, UserProfile};
use orgwarden_organizations::{Organization, OrganizationMember, Role};

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
//
// Unknown fields are rejected, never ignored.
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
}

/// `version`, when sent, must match the stored row (lost-update check).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub version: Option<i64>,
}

/// The user is named by email, as in an invitation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub email: String,
    pub role_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemberRequest {
    pub role_id: String,
    pub version: Option<i64>,
}

/// `?permission=a,b` on the access explanation route.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessQuery {
    pub permission: String,
}

// -------------------------
// Response envelope
// -------------------------

/// `{ "data": ... }` with the given status.
pub fn data(status: StatusCode, value: serde_json::Value) -> axum::response::Response {
    (status, Json(serde_json::json!({ "data": value }))).into_response()
}

pub fn ok(value: serde_json::Value) -> Result<axum::response::Response, ApiError> {
    Ok(data(StatusCode::OK, value))
}

pub fn created(value: serde_json::Value) -> Result<axum::response::Response, ApiError> {
    Ok(data(StatusCode::CREATED, value))
}

/// Reject a client-supplied version that no longer matches the stored row.
pub fn check_version(expected: Option<i64>, current: i64) -> Result<(), ApiError> {
    match expected {
        Some(v) if v != current => Err(ApiError::Conflict),
        _ => Ok(()),
    }
}

// -------------------------
// JSON mapping
// -------------------------

pub fn user_to_json(user: &User, profile: Option<&UserProfile>) -> serde_json::Value {
    serde_json::json!({
        "id": user.id.to_string(),
        "email": user.email,
        "role": user.role.as_str(),
        "is_active": user.is_active,
        "first_name": profile.map(|p| p.first_name.as_str()),
        "last_name": profile.map(|p| p.last_name.as_str()),
        "created_at": user.created_at.to_rfc3339(),
        "deactivated_at": user.deleted_at.map(|t| t.to_rfc3339()),
    })
}

pub fn session_to_json(session: &SignedToken, user: &User, profile: Option<&UserProfile>) -> serde_json::Value {
    serde_json::json!({
        "token": session.token,
        "token_type": "Bearer",
        "expires_at": session.expires_at.to_rfc3339(),
        "user": user_to_json(user, profile),
    })
}

pub fn organization_to_json(org: &Organization) -> serde_json::Value {
    serde_json::json!({
        "id": org.id.to_string(),
        "name": org.name,
        "description": org.description,
        "profile_pic": org.profile_pic,
        "is_active": org.is_active,
        "version": org.version,
        "created_at": org.created_at.to_rfc3339(),
        "updated_at": org.updated_at.to_rfc3339(),
        "deleted_at": org.deleted_at.map(|t| t.to_rfc3339()),
    })
}

pub fn role_to_json(role: &Role) -> serde_json::Value {
    serde_json::json!({
        "id": role.id.to_string(),
        "organization_id": role.organization_id.to_string(),
        "name": role.name,
        "description": role.description,
        "permissions": role.permissions.to_names(),
        "version": role.version,
        "created_at": role.created_at.to_rfc3339(),
        "updated_at": role.updated_at.to_rfc3339(),
        "deleted_at": role.deleted_at.map(|t| t.to_rfc3339()),
    })
}

pub fn member_to_json(member: &OrganizationMember) -> serde_json::Value {
    serde_json::json!({
        "id": member.id.to_string(),
        "organization_id": member.organization_id.to_string(),
        "user_id": member.user_id.to_string(),
        "role_id": member.role_id.to_string(),
        "version": member.version,
        "created_at": member.created_at.to_rfc3339(),
        "updated_at": member.updated_at.to_rfc3339(),
        "removed_at": member.deleted_at.map(|t| t.to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_version_is_a_conflict() {
        assert!(check_version(None, 3).is_ok());
        assert!(check_version(Some(3), 3).is_ok());
        assert!(matches!(check_version(Some(2), 3), Err(ApiError::Conflict)));
    }

    #[test]
    fn request_bodies_reject_unknown_fields() {
        let body = serde_json::json!({ "email": "a@example.com", "password": "pw", "role": "admin" });
        let err = serde_json::from_value::<LoginRequest>(body).unwrap_err();
        assert!(err.to_string().contains("unknown field `role`"), "{err}");

        let patch: UpdateRoleRequest = serde_json::from_value(serde_json::json!({ "version": 2 })).unwrap();
        assert_eq!(patch.version, Some(2));
        assert!(patch.permissions.is_none());
    }

    #[test]
    fn role_json_lists_permission_names() {
        let role = Role::sudo(orgwarden_core::OrganizationId::new(), chrono::Utc::now());
        let json = role_to_json(&role);
        assert_eq!(json["name"], "sudo");
        assert!(json["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "delete_org"));
    }
}
