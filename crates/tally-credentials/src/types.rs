use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Intuit's documented access token lifetime, used when a grant omits `expires_in`.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 3600;
/// Intuit's documented refresh token lifetime (100 days), used when a grant
/// carries a new refresh token but omits `x_refresh_token_expires_in`.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 8_726_400;

/// Token response from the authorization server (code exchange or refresh).
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when the server does not rotate the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default, rename = "x_refresh_token_expires_in")]
    pub refresh_expires_in: Option<u64>,
}

fn default_expires_in() -> u64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

/// Persisted OAuth credentials for one connected company.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// QuickBooks realm id, primary key.
    pub company_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("company_id", &self.company_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl TokenRecord {
    /// Build a fresh record from a grant. Returns `None` when the grant has no
    /// refresh token, which a first-time exchange must always include.
    pub fn from_grant(company_id: &str, grant: &TokenGrant, now: DateTime<Utc>) -> Option<Self> {
        let refresh_token = grant.refresh_token.clone()?;
        let refresh_ttl = grant
            .refresh_expires_in
            .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECS);
        Some(Self {
            company_id: company_id.to_string(),
            access_token: grant.access_token.clone(),
            refresh_token,
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| "bearer".to_string()),
            access_token_expiry: now + secs(grant.expires_in),
            refresh_token_expiry: now + secs(refresh_ttl),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a newer grant on top of this record.
    ///
    /// A new token takes the lifetime the server reported for it. A token
    /// that is unchanged keeps whichever expiry is later. A missing refresh
    /// token in the grant keeps the current one (and its expiry, unless the
    /// grant states one).
    pub fn merged_with(&self, grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        let rotated = grant
            .refresh_token
            .as_ref()
            .filter(|rt| **rt != self.refresh_token);

        let refresh_token_expiry = match (rotated, grant.refresh_expires_in) {
            (Some(_), ttl) => now + secs(ttl.unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECS)),
            (None, Some(ttl)) => self.refresh_token_expiry.max(now + secs(ttl)),
            (None, None) => self.refresh_token_expiry,
        };

        let access_token_expiry = if grant.access_token == self.access_token {
            self.access_token_expiry.max(now + secs(grant.expires_in))
        } else {
            now + secs(grant.expires_in)
        };

        Self {
            company_id: self.company_id.clone(),
            access_token: grant.access_token.clone(),
            refresh_token: rotated
                .cloned()
                .unwrap_or_else(|| self.refresh_token.clone()),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| self.token_type.clone()),
            access_token_expiry,
            refresh_token_expiry,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    /// True when the access token is still valid `margin` from now.
    pub fn access_token_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.access_token_expiry
    }

    pub fn refresh_token_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_token_expiry
    }

    pub fn status(&self, now: DateTime<Utc>) -> CompanyStatus {
        if self.refresh_token_expired(now) {
            CompanyStatus::ReauthorizationRequired
        } else if now >= self.access_token_expiry {
            CompanyStatus::AccessExpired
        } else {
            CompanyStatus::Valid
        }
    }
}

/// Lifetimes reported by the server are clamped to ten years.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

fn secs(n: u64) -> Duration {
    Duration::seconds(n.min(MAX_TTL_SECS) as i64)
}

/// Connection health of a company as seen by the setup flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// Access token is currently valid.
    Valid,
    /// Access token expired; the next use refreshes it.
    AccessExpired,
    /// Refresh token expired; the user must redo the OAuth consent.
    ReauthorizationRequired,
}

impl std::fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompanyStatus::Valid => "valid",
            CompanyStatus::AccessExpired => "access_expired",
            CompanyStatus::ReauthorizationRequired => "reauthorization_required",
        };
        write!(f, "{s}")
    }
}

/// Token-free summary of a connected company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedCompany {
    pub company_id: String,
    pub status: CompanyStatus,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ConnectedCompany {
    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            company_id: record.company_id.clone(),
            status: record.status(now),
            access_token_expiry: record.access_token_expiry,
            refresh_token_expiry: record.refresh_token_expiry,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn grant(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenGrant {
        TokenGrant {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            token_type: None,
            expires_in,
            refresh_expires_in: None,
        }
    }

    #[test]
    fn grant_parses_intuit_field_names() {
        let json = r#"{
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "bearer",
            "expires_in": 3600,
            "x_refresh_token_expires_in": 8726400
        }"#;
        let g: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(g.refresh_expires_in, Some(8_726_400));
        assert_eq!(g.expires_in, 3600);
    }

    #[test]
    fn from_grant_requires_refresh_token() {
        assert!(TokenRecord::from_grant("r1", &grant("at", None, 3600), t0()).is_none());
        let rec = TokenRecord::from_grant("r1", &grant("at", Some("rt"), 3600), t0()).unwrap();
        assert_eq!(rec.access_token_expiry, t0() + Duration::hours(1));
        assert_eq!(rec.token_type, "bearer");
    }

    #[test]
    fn merge_keeps_refresh_token_when_not_rotated() {
        let rec = TokenRecord::from_grant("r1", &grant("at", Some("rt"), 3600), t0()).unwrap();
        let later = t0() + Duration::hours(2);
        let merged = rec.merged_with(&grant("at2", None, 3600), later);
        assert_eq!(merged.refresh_token, "rt");
        assert_eq!(merged.refresh_token_expiry, rec.refresh_token_expiry);
        assert_eq!(merged.access_token, "at2");
        assert_eq!(merged.created_at, rec.created_at);
        assert_eq!(merged.updated_at, later);
    }

    #[test]
    fn merge_keeps_later_expiry_for_unchanged_tokens() {
        let rec = TokenRecord::from_grant("r1", &grant("at", Some("rt"), 3600), t0()).unwrap();
        // Same tokens echoed back with shorter lifetimes than what is on file.
        let mut short = grant("at", Some("rt"), 10);
        short.refresh_expires_in = Some(60);
        let merged = rec.merged_with(&short, t0());
        assert_eq!(merged.access_token_expiry, rec.access_token_expiry);
        assert_eq!(merged.refresh_token_expiry, rec.refresh_token_expiry);
    }

    #[test]
    fn rotated_tokens_take_the_reported_lifetime() {
        let mut first = grant("at", Some("rt"), 3600);
        first.refresh_expires_in = Some(30 * 86_400);
        let rec = TokenRecord::from_grant("r1", &first, t0()).unwrap();

        let mut rotated = grant("at2", Some("rt2"), 600);
        rotated.refresh_expires_in = Some(86_400);
        let merged = rec.merged_with(&rotated, t0());
        assert_eq!(merged.refresh_token, "rt2");
        assert_eq!(merged.refresh_token_expiry, t0() + Duration::days(1));
        assert_eq!(merged.access_token_expiry, t0() + Duration::minutes(10));
        assert!(merged.refresh_token_expired(t0() + Duration::days(5)));
    }

    #[test]
    fn status_reflects_expiries() {
        let rec = TokenRecord::from_grant("r1", &grant("at", Some("rt"), 3600), t0()).unwrap();
        assert_eq!(rec.status(t0()), CompanyStatus::Valid);
        assert_eq!(
            rec.status(t0() + Duration::hours(2)),
            CompanyStatus::AccessExpired
        );
        assert_eq!(
            rec.status(t0() + Duration::days(101)),
            CompanyStatus::ReauthorizationRequired
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rec = TokenRecord::from_grant("r1", &grant("secret-at", Some("secret-rt"), 3600), t0())
            .unwrap();
        let out = format!("{rec:?}");
        assert!(!out.contains("secret-at"));
        assert!(!out.contains("secret-rt"));
    }
}
