/// Entra ID token acquisition — silent first, interactive fallback.
///
/// The silent path serves an unexpired cached token or redeems the cached
/// refresh token; on any silent failure the provider falls back to the OAuth
/// device authorization flow, the terminal stand-in for a browser popup. The
/// sign-in instructions are surfaced through an injected callback so the
/// caller decides how to display them.
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::AgentConfig;
use crate::error::AuthError;

/// One broad Power Platform API scope, plus offline_access so the silent
/// path has a refresh token to redeem.
const SCOPE: &str = "https://api.powerplatform.com/.default offline_access";

/// Cached tokens count as expired this many seconds early.
const EXPIRY_SKEW_SECS: i64 = 60;

// ── Trait seam ────────────────────────────────────────────────────────────────

/// Anything that can produce a bearer token for the agent boundary. The
/// session state machine depends on this seam, never on Entra directly.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, config: &AgentConfig) -> Result<String, AuthError>;
}

/// Sign-in instructions raised during interactive acquisition.
#[derive(Debug, Clone)]
pub struct SignInPrompt {
    pub verification_uri: String,
    pub user_code: String,
    /// Ready-made one-line instruction for display.
    pub message: String,
}

type PromptSink = Box<dyn Fn(SignInPrompt) + Send + Sync>;

// ── Cached account ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedAccount {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl CachedAccount {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: i64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Token provider over the Entra ID v2.0 endpoints.
///
/// Owned and injected explicitly; the authority is bound from the first
/// config seen and reused for the provider's lifetime, as is the in-process
/// token cache.
pub struct EntraTokenProvider {
    http: reqwest::Client,
    /// (client_id, authority URL), captured once on first use.
    context: Mutex<Option<(String, String)>>,
    cache: Mutex<Option<CachedAccount>>,
    on_prompt: PromptSink,
}

impl EntraTokenProvider {
    pub fn new(on_prompt: impl Fn(SignInPrompt) + Send + Sync + 'static) -> Self {
        Self {
            http: reqwest::Client::new(),
            context: Mutex::new(None),
            cache: Mutex::new(None),
            on_prompt: Box::new(on_prompt),
        }
    }

    fn context_for(&self, config: &AgentConfig) -> (String, String) {
        let mut ctx = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        ctx.get_or_insert_with(|| {
            (
                config.client_id.clone(),
                format!("https://login.microsoftonline.com/{}", config.tenant_id),
            )
        })
        .clone()
    }

    fn cached_account(&self) -> Option<CachedAccount> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_token(&self, token: TokenResponse) -> String {
        let account = CachedAccount {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
            refresh_token: token.refresh_token,
        };
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(account);
        token.access_token
    }

    /// Silent acquisition: unexpired cached token, else refresh-token
    /// redemption. `None` when no account is cached at all.
    async fn try_silent(
        &self,
        client_id: &str,
        authority: &str,
    ) -> Option<Result<String, AuthError>> {
        let account = self.cached_account()?;
        if account.is_fresh(Utc::now()) {
            return Some(Ok(account.access_token));
        }
        let refresh = account.refresh_token?;
        Some(self.redeem_refresh_token(client_id, authority, &refresh).await)
    }

    async fn redeem_refresh_token(
        &self,
        client_id: &str,
        authority: &str,
        refresh_token: &str,
    ) -> Result<String, AuthError> {
        let resp = self
            .http
            .post(format!("{authority}/oauth2/v2.0/token"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("scope", SCOPE),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status().is_success() {
            let token: TokenResponse = resp.json().await.map_err(transport_error)?;
            Ok(self.store_token(token))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(classify_error_body(&body))
        }
    }

    /// Device authorization flow: request a user code, surface the sign-in
    /// prompt, poll the token endpoint until sign-in completes or the code
    /// expires. Cancelling the prompt is an ordinary classified failure.
    async fn acquire_interactive(
        &self,
        client_id: &str,
        authority: &str,
    ) -> Result<String, AuthError> {
        let resp = self
            .http
            .post(format!("{authority}/oauth2/v2.0/devicecode"))
            .form(&[("client_id", client_id), ("scope", SCOPE)])
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error_body(&body));
        }
        let device: DeviceCodeResponse = resp.json().await.map_err(transport_error)?;

        let message = device.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                device.verification_uri, device.user_code
            )
        });
        (self.on_prompt)(SignInPrompt {
            verification_uri: device.verification_uri.clone(),
            user_code: device.user_code.clone(),
            message,
        });

        let mut interval =
            std::time::Duration::from_secs(device.interval.unwrap_or(5).max(1));
        let deadline = Utc::now() + Duration::seconds(device.expires_in);
        loop {
            tokio::time::sleep(interval).await;
            if Utc::now() > deadline {
                return Err(AuthError::InteractionRequired(
                    "the sign-in code expired before it was used".to_string(),
                ));
            }
            let resp = self
                .http
                .post(format!("{authority}/oauth2/v2.0/token"))
                .form(&[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                    ("client_id", client_id),
                    ("device_code", device.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(transport_error)?;
            if resp.status().is_success() {
                let token: TokenResponse = resp.json().await.map_err(transport_error)?;
                return Ok(self.store_token(token));
            }
            let body = resp.text().await.unwrap_or_default();
            match poll_outcome(&body) {
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => {
                    interval += std::time::Duration::from_secs(5);
                }
                PollOutcome::Failed(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TokenSource for EntraTokenProvider {
    async fn access_token(&self, config: &AgentConfig) -> Result<String, AuthError> {
        let (client_id, authority) = self.context_for(config);
        // Silent first; any silent failure falls through to interactive.
        if let Some(Ok(token)) = self.try_silent(&client_id, &authority).await {
            return Ok(token);
        }
        self.acquire_interactive(&client_id, &authority).await
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> AuthError {
    AuthError::Unknown(e.to_string())
}

/// Parse an OAuth error body and classify it. Bodies that aren't the
/// expected JSON shape are kept verbatim (truncated) as unknown failures.
fn classify_error_body(body: &str) -> AuthError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) if !err.error.is_empty() => {
            AuthError::classify(&err.error, &err.error_description)
        }
        _ => AuthError::Unknown(body.chars().take(200).collect()),
    }
}

enum PollOutcome {
    Pending,
    SlowDown,
    Failed(AuthError),
}

fn poll_outcome(body: &str) -> PollOutcome {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) if err.error == "authorization_pending" => PollOutcome::Pending,
        Ok(err) if err.error == "slow_down" => PollOutcome::SlowDown,
        Ok(err) if err.error == "authorization_declined" || err.error == "access_denied" => {
            // The user dismissed the prompt — a normal failure, not fatal.
            PollOutcome::Failed(AuthError::InteractionRequired(
                "sign-in was declined or cancelled".to_string(),
            ))
        }
        Ok(err) if !err.error.is_empty() => {
            PollOutcome::Failed(AuthError::classify(&err.error, &err.error_description))
        }
        _ => PollOutcome::Failed(AuthError::Unknown(body.chars().take(200).collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_classification() {
        let body = r#"{"error":"consent_required","error_description":"AADSTS65001: consent needed"}"#;
        let err = classify_error_body(body);
        assert_eq!(err.class(), "consent_required");
        assert!(err.to_string().contains("AADSTS65001"));
    }

    #[test]
    fn malformed_error_body_is_unknown() {
        assert_eq!(classify_error_body("<html>gateway</html>").class(), "unknown");
        assert_eq!(classify_error_body("{}").class(), "unknown");
    }

    #[test]
    fn pending_and_slow_down_keep_polling() {
        assert!(matches!(
            poll_outcome(r#"{"error":"authorization_pending"}"#),
            PollOutcome::Pending
        ));
        assert!(matches!(
            poll_outcome(r#"{"error":"slow_down"}"#),
            PollOutcome::SlowDown
        ));
    }

    #[test]
    fn declined_sign_in_is_a_classified_failure() {
        let PollOutcome::Failed(err) = poll_outcome(r#"{"error":"authorization_declined"}"#)
        else {
            panic!("expected a failure");
        };
        assert_eq!(err.class(), "interaction_required");
    }

    #[test]
    fn cached_token_freshness_honors_skew() {
        let account = CachedAccount {
            access_token: "T".to_string(),
            expires_at: Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS + 30),
            refresh_token: None,
        };
        assert!(account.is_fresh(Utc::now()));

        let stale = CachedAccount {
            expires_at: Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS - 30),
            ..account
        };
        assert!(!stale.is_fresh(Utc::now()));
    }
}
