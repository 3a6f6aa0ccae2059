use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CredentialError, Result};
use crate::oauth::OAuthClient;
use crate::store::TokenStore;
use crate::types::{ConnectedCompany, TokenGrant, TokenRecord};

/// Default safety margin before access-token expiry at which we refresh.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::seconds(60);

/// Consent redirect plus the `state` value the callback must echo back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Owns the token lifecycle: store on consent, refresh lazily before use,
/// forget on disconnect.
///
/// Refresh happens only inside [`CredentialManager::get_valid_access_token`]
/// (or an explicit [`CredentialManager::refresh`]), right before the token is
/// used, so nothing else can swap a token out from under a running job.
pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    oauth: Arc<dyn OAuthClient>,
    refresh_margin: Duration,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn TokenStore>, oauth: Arc<dyn OAuthClient>) -> Self {
        Self {
            store,
            oauth,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Write the grant for `company_id`, replacing any existing record.
    ///
    /// When a record already exists the grant is merged onto it, so a grant
    /// without a refresh token keeps the current one and expiries never move
    /// backwards. A brand-new company needs a refresh token in the grant.
    pub fn store(
        &self,
        company_id: &str,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        let record = match self.store.get(company_id)? {
            Some(existing) => existing.merged_with(grant, now),
            None => TokenRecord::from_grant(company_id, grant, now).ok_or_else(|| {
                CredentialError::Exchange("authorization server returned no refresh token".into())
            })?,
        };
        self.store.put(&record)?;
        Ok(record)
    }

    /// Return an access token that is valid at `now`, refreshing first if it
    /// has expired or expires within the safety margin.
    ///
    /// `Unauthorized` when there is no record or the refresh token has expired;
    /// `RefreshFailed` when the refresh exchange fails. Neither is retried here.
    pub async fn get_valid_access_token(
        &self,
        company_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let record = self.load_refreshable(company_id, now)?;
        if record.access_token_usable(now, self.refresh_margin) {
            return Ok(record.access_token);
        }

        info!(
            company_id,
            expired_at = %record.access_token_expiry,
            "access token expired or expiring; refreshing"
        );
        let refreshed = self.refresh_record(record, now).await?;
        Ok(refreshed.access_token)
    }

    /// Exchange the stored refresh token for a new access token and persist it.
    pub async fn refresh(&self, company_id: &str, now: DateTime<Utc>) -> Result<TokenRecord> {
        let record = self.load_refreshable(company_id, now)?;
        self.refresh_record(record, now).await
    }

    /// Build the consent URL with a fresh random `state`.
    pub fn authorize_url(&self) -> AuthorizationRequest {
        let state = format!("auth_{}", Uuid::new_v4().simple());
        AuthorizationRequest {
            url: self.oauth.authorize_url(&state),
            state,
        }
    }

    /// OAuth callback: exchange `code` and store the tokens for `company_id`.
    pub async fn complete_authorization(
        &self,
        code: &str,
        company_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        let grant = self.oauth.exchange_code(code).await?;
        // A fresh consent replaces whatever was on file, including an expired
        // refresh token.
        let record = TokenRecord::from_grant(company_id, &grant, now).ok_or_else(|| {
            CredentialError::Exchange("authorization server returned no refresh token".into())
        })?;
        let record = match self.store.get(company_id)? {
            Some(existing) => TokenRecord {
                created_at: existing.created_at,
                ..record
            },
            None => record,
        };
        self.store.put(&record)?;
        info!(company_id, "company connected");
        Ok(record)
    }

    /// All connected companies with their token status.
    pub fn companies(&self, now: DateTime<Utc>) -> Result<Vec<ConnectedCompany>> {
        Ok(self
            .store
            .list()?
            .iter()
            .map(|r| ConnectedCompany::from_record(r, now))
            .collect())
    }

    /// True if a record exists whose refresh token is still valid, i.e. a
    /// report can be fetched without new user consent.
    pub fn is_connected(&self, company_id: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .store
            .get(company_id)?
            .is_some_and(|r| !r.refresh_token_expired(now)))
    }

    /// Forget a company's tokens. Returns `false` if it was not connected.
    pub fn disconnect(&self, company_id: &str) -> Result<bool> {
        let removed = self.store.delete(company_id)?;
        if removed {
            info!(company_id, "company disconnected");
        }
        Ok(removed)
    }

    fn load_refreshable(&self, company_id: &str, now: DateTime<Utc>) -> Result<TokenRecord> {
        let record = self
            .store
            .get(company_id)?
            .ok_or_else(|| CredentialError::unauthorized(company_id, "no credentials on file"))?;
        if record.refresh_token_expired(now) {
            warn!(
                company_id,
                expired_at = %record.refresh_token_expiry,
                "refresh token expired; re-authorization required"
            );
            return Err(CredentialError::unauthorized(
                company_id,
                format!("refresh token expired at {}", record.refresh_token_expiry),
            ));
        }
        Ok(record)
    }

    async fn refresh_record(&self, record: TokenRecord, now: DateTime<Utc>) -> Result<TokenRecord> {
        let grant = match self.oauth.refresh(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(company_id = %record.company_id, error = %e, "token refresh failed");
                return Err(match e {
                    CredentialError::RefreshFailed(_) => e,
                    other => CredentialError::RefreshFailed(other.to_string()),
                });
            }
        };

        let refreshed = record.merged_with(&grant, now);
        if !refreshed.access_token_usable(now, Duration::zero()) {
            return Err(CredentialError::RefreshFailed(
                "authorization server returned an already-expired access token".into(),
            ));
        }

        self.store.put(&refreshed)?;
        info!(
            company_id = %refreshed.company_id,
            expires_at = %refreshed.access_token_expiry,
            "refreshed access token stored"
        );
        Ok(refreshed)
    }
}
