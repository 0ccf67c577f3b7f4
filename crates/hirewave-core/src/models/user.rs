use std::fmt;

use serde::{Deserialize, Serialize};

/// Account identifier. The backend issues UUIDs, older fixtures and
/// some proxies still hand out integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Uuid(String),
}

impl PartialEq<i64> for UserId {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, UserId::Int(id) if id == other)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{}", id),
            UserId::Uuid(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Jobseeker,
    Recruiter,
    Admin,
    #[serde(other)]
    Other,
}

impl UserType {
    pub fn display_name(&self) -> &'static str {
        match self {
            UserType::Jobseeker => "Job Seeker",
            UserType::Recruiter => "Recruiter",
            UserType::Admin => "Admin",
            UserType::Other => "Member",
        }
    }
}

/// The account returned by `GET /users/me/` and by the sign-in endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_joined: Option<String>,
}

impl User {
    /// Full name if known, otherwise the best identifier available
    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("User {}", self.id))
    }

    /// Whether the profile says anything about the account's role.
    pub fn has_role_info(&self) -> bool {
        self.user_type.is_some() || self.is_superuser.is_some() || self.is_admin.is_some()
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser.unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
            || self.is_superuser()
            || self.user_type == Some(UserType::Admin)
    }

    /// Admin status, or `None` when the profile carries no role information
    pub fn admin_role(&self) -> Option<bool> {
        self.has_role_info().then(|| self.is_admin())
    }
}

/// Email/password pair posted to the login endpoint
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up request. The account is activated by verifying the emailed code.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    /// Sent as "NEW" when left empty
    #[serde(rename = "referralCode")]
    pub referral_code: String,
}
