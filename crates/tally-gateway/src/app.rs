use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tally_core::TallyConfig;
use tally_credentials::CredentialManager;
use tally_scheduler::{JobStore, Runner};

/// How long a `state` handed out by /connect stays valid.
const OAUTH_STATE_TTL: Duration = Duration::minutes(10);

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: TallyConfig,
    pub credentials: Arc<CredentialManager>,
    pub jobs: Arc<dyn JobStore>,
    pub runner: Runner,
    /// Outstanding OAuth `state` values -> issue time.
    pub pending_states: DashMap<String, DateTime<Utc>>,
}

impl AppState {
    pub fn new(
        config: TallyConfig,
        credentials: Arc<CredentialManager>,
        jobs: Arc<dyn JobStore>,
        runner: Runner,
    ) -> Self {
        Self {
            config,
            credentials,
            jobs,
            runner,
            pending_states: DashMap::new(),
        }
    }

    /// Remember a freshly issued OAuth `state`, dropping any that have expired.
    pub fn issue_state(&self, state: String, now: DateTime<Utc>) {
        self.pending_states
            .retain(|_, issued| now - *issued < OAUTH_STATE_TTL);
        self.pending_states.insert(state, now);
    }

    /// Consume `state`. True only if it was issued by us and has not expired.
    pub fn take_state(&self, state: &str, now: DateTime<Utc>) -> bool {
        self.pending_states
            .remove(state)
            .is_some_and(|(_, issued)| now - issued < OAUTH_STATE_TTL)
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/connect", get(crate::http::oauth::connect))
        .route("/callback", get(crate::http::oauth::callback))
        .route("/companies", get(crate::http::companies::list_companies))
        .route(
            "/companies/{company_id}",
            delete(crate::http::companies::disconnect_company),
        )
        .route(
            "/companies/{company_id}/jobs",
            get(crate::http::jobs::list_company_jobs),
        )
        .route("/jobs", post(crate::http::jobs::save_job))
        .route("/jobs/{job_id}", delete(crate::http::jobs::delete_job))
        .route("/jobs/{job_id}/run", post(crate::http::jobs::run_job))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory wiring with scripted collaborators for handler tests.

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use serde_json::Value;
    use tally_credentials::{
        CredentialError, MemoryTokenStore, OAuthClient, TokenGrant,
    };
    use tally_reports::{
        DeliveryError, RawReport, ReportEmail, ReportError, ReportMailer, ReportSource,
    };
    use tally_scheduler::MemoryJobStore;
    use tower::ServiceExt;

    use super::*;

    pub struct FakeOAuth;

    #[async_trait]
    impl OAuthClient for FakeOAuth {
        fn authorize_url(&self, state: &str) -> String {
            format!("https://appcenter.test/connect?state={state}")
        }

        async fn exchange_code(&self, code: &str) -> tally_credentials::Result<TokenGrant> {
            if code == "bad" {
                return Err(CredentialError::Exchange("invalid_grant".into()));
            }
            Ok(TokenGrant {
                access_token: format!("at-{code}"),
                refresh_token: Some(format!("rt-{code}")),
                token_type: Some("bearer".into()),
                expires_in: 3600,
                refresh_expires_in: Some(8_726_400),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> tally_credentials::Result<TokenGrant> {
            Err(CredentialError::RefreshFailed("not scripted".into()))
        }
    }

    pub struct FakeReports;

    #[async_trait]
    impl ReportSource for FakeReports {
        async fn fetch(
            &self,
            _access_token: &str,
            _company_id: &str,
            _as_of: NaiveDate,
        ) -> Result<RawReport, ReportError> {
            Ok(RawReport::default())
        }
    }

    #[derive(Default)]
    pub struct FakeMailer {
        pub sent: Mutex<Vec<ReportEmail>>,
    }

    #[async_trait]
    impl ReportMailer for FakeMailer {
        async fn send(&self, email: &ReportEmail) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub mailer: Arc<FakeMailer>,
    }

    impl TestApp {
        pub fn new() -> Self {
            let credentials = Arc::new(CredentialManager::new(
                Arc::new(MemoryTokenStore::new()),
                Arc::new(FakeOAuth),
            ));
            let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let mailer = Arc::new(FakeMailer::default());
            let runner = Runner::new(
                jobs.clone(),
                credentials.clone(),
                Arc::new(FakeReports),
                mailer.clone(),
            );
            let state = Arc::new(AppState::new(
                TallyConfig::default(),
                credentials,
                jobs,
                runner,
            ));
            Self { state, mailer }
        }

        /// Store tokens for `company_id` as if the OAuth callback had run.
        pub async fn connect(&self, company_id: &str) {
            self.state
                .credentials
                .complete_authorization("code", company_id, Utc::now())
                .await
                .unwrap();
        }

        pub async fn request(
            &self,
            method: &str,
            uri: &str,
            body: Option<Value>,
        ) -> (StatusCode, Option<String>, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let req = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let resp = build_router(self.state.clone()).oneshot(req).await.unwrap();
            let status = resp.status();
            let location = resp
                .headers()
                .get("location")
                .map(|v| v.to_str().unwrap().to_string());
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, location, json)
        }
    }
}
