//! Authorization-server client.
//!
//! Intuit's token endpoint takes form-encoded bodies and authenticates the
//! application with HTTP Basic (`client_id:client_secret`). Both the
//! authorization-code exchange and the refresh-token exchange return the same
//! JSON shape, parsed into [`TokenGrant`].

use async_trait::async_trait;
use tally_core::config::IntuitConfig;
use tracing::{debug, info, warn};

use crate::error::{CredentialError, Result};
use crate::types::TokenGrant;

/// OAuth 2.0 operations the credential store depends on.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Consent URL the user's browser is redirected to.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for tokens. Errors are `Exchange`.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Exchange a refresh token for a new access token. Errors are `RefreshFailed`.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

pub struct IntuitOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    scope: String,
}

impl IntuitOAuthClient {
    pub fn from_config(config: &IntuitConfig) -> tally_core::Result<Self> {
        let (client_id, client_secret) = config.client_credentials()?;
        Ok(Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            scope: config.scope.clone(),
        })
    }

    /// POST a grant request to the token endpoint.
    ///
    /// Returns the HTTP status and body on rejection so callers can wrap it in
    /// the error variant that fits their flow.
    async fn request_token(
        &self,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenGrant, String> {
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| format!("token endpoint unreachable: {e}"))?;

        log_intuit_tid(&resp);

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token endpoint rejected the request");
            return Err(format!("HTTP {}: {}", status.as_u16(), text));
        }

        resp.json::<TokenGrant>()
            .await
            .map_err(|e| format!("invalid token response: {e}"))
    }
}

#[async_trait]
impl OAuthClient for IntuitOAuthClient {
    fn authorize_url(&self, state: &str) -> String {
        // Configured auth URLs sometimes already carry a query string
        // (e.g. `?environment=production`).
        let sep = if self.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{base}{sep}client_id={client_id}&response_type=code&scope={scope}&redirect_uri={redirect_uri}&state={state}",
            base = self.auth_url,
            client_id = urlencoding::encode(&self.client_id),
            scope = urlencoding::encode(&self.scope),
            redirect_uri = urlencoding::encode(&self.redirect_uri),
            state = urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        debug!("exchanging authorization code");
        let grant = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await
            .map_err(CredentialError::Exchange)?;
        info!(expires_in = grant.expires_in, "authorization code exchanged");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let grant = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(CredentialError::RefreshFailed)?;
        debug!(
            expires_in = grant.expires_in,
            rotated = grant.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(grant)
    }
}

/// Intuit support asks for the `intuit_tid` header when tracing a request.
fn log_intuit_tid(resp: &reqwest::Response) {
    match resp.headers().get("intuit_tid").and_then(|v| v.to_str().ok()) {
        Some(tid) => debug!(intuit_tid = %tid, status = resp.status().as_u16(), "token endpoint response"),
        None => debug!(status = resp.status().as_u16(), "token endpoint response without intuit_tid"),
    }
}
