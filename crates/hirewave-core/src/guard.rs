//! Route-level access decisions.
//!
//! These are plain functions a routing layer calls with the current session
//! snapshot. Checks run in a fixed order: loading, then authentication, then
//! authorization.

use tracing::debug;

use crate::auth::SessionSnapshot;
use crate::flags::FeatureFlags;
use crate::models::{User, UserType};

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// What a protected route needs from the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRequirement {
    Authenticated,
    Admin,
    /// Any of these account types; superusers always pass
    UserTypes(Vec<UserType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth state not settled yet; show a neutral loading indicator
    Loading,
    Render,
    RedirectToLogin { return_to: String },
    RedirectUnauthorized,
}

impl GuardDecision {
    /// Where to navigate, if the decision is a redirect
    pub fn redirect_path(&self) -> Option<String> {
        match self {
            GuardDecision::RedirectToLogin { return_to } => Some(login_redirect_path(return_to)),
            GuardDecision::RedirectUnauthorized => Some(UNAUTHORIZED_PATH.to_string()),
            GuardDecision::Loading | GuardDecision::Render => None,
        }
    }
}

/// `/login?returnUrl=<path>` for sending the user back after sign-in
pub fn login_redirect_path(return_to: &str) -> String {
    format!("{}?returnUrl={}", LOGIN_PATH, urlencoding::encode(return_to))
}

/// Decide whether `requested_path` may render.
///
/// `cached_admin` reads the locally cached admin hint. It is only called when
/// an admin check is needed and the user profile carries no role
/// information; it is a best-effort fallback, not a security boundary.
pub fn decide(
    session: &SessionSnapshot,
    requirement: &AccessRequirement,
    requested_path: &str,
    cached_admin: impl FnOnce() -> bool,
) -> GuardDecision {
    if session.loading {
        return GuardDecision::Loading;
    }

    if !session.is_authenticated {
        debug!(path = requested_path, "Not authenticated, redirecting to login");
        return GuardDecision::RedirectToLogin {
            return_to: requested_path.to_string(),
        };
    }

    let user = session.user.as_ref();
    let allowed = match requirement {
        AccessRequirement::Authenticated => true,
        AccessRequirement::Admin => is_admin(user, cached_admin),
        AccessRequirement::UserTypes(types) => has_user_type(user, types, cached_admin),
    };

    if allowed {
        GuardDecision::Render
    } else {
        debug!(path = requested_path, ?requirement, "Access denied");
        GuardDecision::RedirectUnauthorized
    }
}

fn is_admin(user: Option<&User>, cached_admin: impl FnOnce() -> bool) -> bool {
    match user.and_then(User::admin_role) {
        Some(is_admin) => is_admin,
        None => cached_admin(),
    }
}

fn has_user_type(
    user: Option<&User>,
    types: &[UserType],
    cached_admin: impl FnOnce() -> bool,
) -> bool {
    let Some(user) = user.filter(|u| u.has_role_info()) else {
        return types.contains(&UserType::Admin) && cached_admin();
    };
    if user.is_superuser() || (types.contains(&UserType::Admin) && user.is_admin()) {
        return true;
    }
    user.user_type.is_some_and(|user_type| types.contains(&user_type))
}

/// Outcome for a feature-flagged route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureDecision {
    Render,
    Redirect { to: String },
}

/// Render the route only while `flag` is enabled, otherwise send the user to
/// `fallback_path`.
pub fn gate_feature(flags: &FeatureFlags, flag: &str, fallback_path: &str) -> FeatureDecision {
    if flags.is_enabled(flag) {
        FeatureDecision::Render
    } else {
        debug!(flag, "Feature disabled, redirecting");
        FeatureDecision::Redirect {
            to: fallback_path.to_string(),
        }
    }
}
