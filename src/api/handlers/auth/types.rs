//! Request and response bodies for the auth routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::{ProfileRecord, UserRecord};

#[derive(ToSchema, Deserialize, Debug)]
pub struct InitiateRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
    pub full_name: String,
    pub username: String,
    pub branch: Option<String>,
    pub year: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh/logout accept the token in the body as a fallback to the cookie.
#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub branch: Option<String>,
    pub year: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for PublicUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            full_name: record.full_name,
            username: record.username,
            avatar_url: record.avatar_url,
            bio: record.bio,
            branch: record.branch,
            year: record.year,
            is_verified: record.is_verified,
            created_at: record.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ProfileCounts {
    pub posts: i64,
    pub followers: i64,
    pub following: i64,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub counts: ProfileCounts,
}

impl From<ProfileRecord> for ProfileResponse {
    fn from(record: ProfileRecord) -> Self {
        Self {
            counts: ProfileCounts {
                posts: record.posts,
                followers: record.followers,
                following: record.following,
            },
            user: record.user.into(),
        }
    }
}

/// Body of register-complete and login responses; the refresh token rides in
/// an HttpOnly cookie, never in the JSON.
#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: PublicUser,
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_record() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "a@example.edu".to_string(),
            password_hash: Some("$2b$12$secret".to_string()),
            full_name: "A B".to_string(),
            username: "ab1".to_string(),
            avatar_url: None,
            bio: None,
            branch: Some("CSE".to_string()),
            year: Some("2".to_string()),
            is_verified: true,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn public_user_excludes_password_hash() {
        let public: PublicUser = user_record().into();
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["fullName"], "A B");
        assert_eq!(json["isVerified"], true);
    }

    #[test]
    fn profile_response_flattens_user_fields() {
        let profile = ProfileResponse::from(ProfileRecord {
            user: user_record(),
            posts: 3,
            followers: 2,
            following: 5,
        });
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["username"], "ab1");
        assert_eq!(json["counts"]["posts"], 3);
        assert_eq!(json["counts"]["followers"], 2);
        assert_eq!(json["counts"]["following"], 5);
    }

    #[test]
    fn complete_request_accepts_camel_case() {
        let request: CompleteRequest = serde_json::from_str(
            r#"{"email":"a@example.edu","otp":"123456","password":"Abcd1234",
                "fullName":"A B","username":"ab1","branch":"CSE"}"#,
        )
        .unwrap();
        assert_eq!(request.full_name, "A B");
        assert_eq!(request.branch.as_deref(), Some("CSE"));
        assert!(request.year.is_none());
    }
}
