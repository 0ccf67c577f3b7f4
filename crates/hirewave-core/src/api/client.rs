//! API client for communicating with the HireWave REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests. The bearer header is whatever the shared `TokenStore` currently
//! applies, so a token stored, retrieved or cleared anywhere in the process
//! is reflected in the next request.

use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::config::Config;
use crate::models::{
    BlogCategory, BlogPost, BlogPostDraft, Credentials, Job, JobUpdate, NewCategory,
    Registration, User,
};

use super::pagination::{ListResponse, Page};
use super::{ApiError, ApiResult};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds when none is configured.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Referral code the backend expects when the user has none
const DEFAULT_REFERRAL_CODE: &str = "NEW";

/// Token grant returned by the sign-in endpoints. The password login answers
/// `{token, user}`, OTP verification answers `{access, refresh, user}`.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: Option<String>,
    access: Option<String>,
    refresh: Option<String>,
    user: User,
}

/// Credential and profile issued by a successful sign-in
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    pub refresh: Option<String>,
    pub user: User,
}

impl TryFrom<AuthResponse> for AuthGrant {
    type Error = ApiError;

    fn try_from(response: AuthResponse) -> ApiResult<Self> {
        let token = response
            .access
            .or(response.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Sign-in response has no token".to_string()))?;
        Ok(Self {
            token,
            refresh: response.refresh,
            user: response.user,
        })
    }
}

/// Acknowledgement for OTP requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtpReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

#[derive(Debug, Serialize)]
struct OtpVerification<'a> {
    email: &'a str,
    otp: &'a str,
    #[serde(rename = "referralCode", skip_serializing_if = "Option::is_none")]
    referral_code: Option<&'a str>,
}

/// API client for HireWave.
/// Clone is cheap - reqwest::Client and TokenStore both share their state.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Result<Self> {
        Self::with_timeout(base_url, tokens, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        tokens: TokenStore,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn from_config(config: &Config, tokens: TokenStore) -> Result<Self> {
        Self::with_timeout(config.api_base_url.clone(), tokens, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> ApiResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(value) = self.tokens.authorization() {
            let value = header::HeaderValue::from_str(&value).map_err(|_| {
                ApiError::Unauthorized(Some("Stored token is not a valid header value".to_string()))
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> ApiResult<Option<Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request built by `build`, retrying rate-limited attempts with
    /// exponential backoff. Validation, auth and transport failures are
    /// returned immediately.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> ApiResult<Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().headers(self.auth_headers()?).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> ApiResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.send(|| self.client.get(&url)).await?;
        Self::parse_json(response, &url).await
    }

    async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.send(|| self.client.get(&url).query(query)).await?;
        Self::parse_json(response, &url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self.send(|| self.client.post(&url).json(body)).await?;
        Self::parse_json(response, &url).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, "PUT");
        let response = self.send(|| self.client.put(&url).json(body)).await?;
        Self::parse_json(response, &url).await
    }

    /// POST whose response body is ignored
    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        self.send(|| self.client.post(&url).json(body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let url = self.url(path);
        debug!(url = %url, "DELETE");
        self.send(|| self.client.delete(&url)).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Exchange the applied bearer token for the account profile
    pub async fn current_user(&self) -> ApiResult<User> {
        self.get("users/me/").await
    }

    /// Sign in with email and password
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthGrant> {
        let response: AuthResponse = self.post("auth/login/", credentials).await?;
        response.try_into()
    }

    /// Ask the backend to email a one-time sign-in code
    pub async fn request_otp(&self, email: &str) -> ApiResult<OtpReceipt> {
        self.post("auth/request-otp/", &EmailRequest { email }).await
    }

    pub async fn resend_otp(&self, email: &str) -> ApiResult<OtpReceipt> {
        self.post("auth/resend-otp/", &EmailRequest { email }).await
    }

    /// Trade a one-time code for a token grant
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        referral_code: Option<&str>,
    ) -> ApiResult<AuthGrant> {
        let body = OtpVerification {
            email,
            otp,
            referral_code,
        };
        let response: AuthResponse = self.post("auth/verify-otp/", &body).await?;
        response.try_into()
    }

    /// Create an account. The backend emails a code that `verify_otp`
    /// exchanges for a token grant.
    pub async fn register(&self, registration: &Registration) -> ApiResult<OtpReceipt> {
        let mut body = registration.clone();
        if body.referral_code.trim().is_empty() {
            body.referral_code = DEFAULT_REFERRAL_CODE.to_string();
        }
        self.post("auth/register/", &body).await
    }

    /// Trade a refresh token for a new access token
    pub async fn refresh_access_token(&self, refresh: &str) -> ApiResult<String> {
        let response: RefreshResponse = self
            .post("auth/token/refresh/", &RefreshRequest { refresh })
            .await?;
        response.access.filter(|t| !t.is_empty()).ok_or_else(|| {
            ApiError::InvalidResponse("Refresh response has no access token".to_string())
        })
    }

    /// Revoke the session server-side. `refresh` may be absent when the
    /// sign-in used a plain token.
    pub async fn logout(&self, refresh: Option<&str>) -> ApiResult<()> {
        self.post_empty("auth/logout/", &serde_json::json!({ "refresh": refresh }))
            .await
    }

    // ===== Jobs =====

    pub async fn fetch_jobs(&self, page: u32, limit: u32) -> ApiResult<Page<Job>> {
        let response: ListResponse<Job> = self
            .get_with_query("jobs/", &[("page", page), ("limit", limit)])
            .await?;
        Ok(response.into())
    }

    pub async fn fetch_job(&self, job_id: i64) -> ApiResult<Job> {
        self.get(&format!("jobs/{}/", job_id)).await
    }

    pub async fn update_job(&self, job_id: i64, update: &JobUpdate) -> ApiResult<Job> {
        self.put(&format!("jobs/{}/", job_id), update).await
    }

    pub async fn delete_job(&self, job_id: i64) -> ApiResult<()> {
        self.delete(&format!("jobs/{}/", job_id)).await
    }

    // ===== Blog =====

    pub async fn fetch_blog_posts(&self) -> ApiResult<Page<BlogPost>> {
        let response: ListResponse<BlogPost> = self.get("blog/posts/").await?;
        Ok(response.into())
    }

    pub async fn fetch_blog_post(&self, slug: &str) -> ApiResult<BlogPost> {
        self.get(&format!("blog/posts/{}/", urlencoding::encode(slug)))
            .await
    }

    pub async fn create_blog_post(&self, draft: &BlogPostDraft) -> ApiResult<BlogPost> {
        self.post("blog/posts/", draft).await
    }

    pub async fn update_blog_post(
        &self,
        slug: &str,
        draft: &BlogPostDraft,
    ) -> ApiResult<BlogPost> {
        self.put(&format!("blog/posts/{}/", urlencoding::encode(slug)), draft)
            .await
    }

    pub async fn delete_blog_post(&self, post_id: i64) -> ApiResult<()> {
        self.delete(&format!("blog/posts/{}/", post_id)).await
    }

    pub async fn fetch_blog_categories(&self) -> ApiResult<Page<BlogCategory>> {
        let response: ListResponse<BlogCategory> = self.get("blog/categories/").await?;
        Ok(response.into())
    }

    pub async fn create_blog_category(&self, category: &NewCategory) -> ApiResult<BlogCategory> {
        self.post("blog/categories/", category).await
    }

    pub async fn delete_blog_category(&self, category_id: i64) -> ApiResult<()> {
        self.delete(&format!("blog/categories/{}/", category_id)).await
    }
}
