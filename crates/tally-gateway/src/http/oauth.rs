//! QuickBooks consent flow: GET /connect sends the operator to Intuit,
//! GET /callback receives the authorization code and stores the tokens.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tally_credentials::ConnectedCompany;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use crate::app::AppState;

/// GET /connect
pub async fn connect(State(state): State<Arc<AppState>>) -> Redirect {
    let request = state.credentials.authorize_url();
    state.issue_state(request.state, Utc::now());
    info!("redirecting to Intuit consent page");
    Redirect::to(&request.url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /callback?code=..&realmId=..&state=..
///
/// The `state` must be one we issued from /connect in the last ten minutes,
/// and each value is accepted once.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Json<ConnectedCompany>> {
    let now = Utc::now();

    if let Some(error) = params.error {
        warn!(%error, "authorization declined");
        return Err(ApiError::BadRequest(format!("authorization declined: {error}")));
    }

    let issued = params
        .state
        .as_deref()
        .is_some_and(|s| state.take_state(s, now));
    if !issued {
        warn!("callback with unknown or expired state");
        return Err(ApiError::InvalidState);
    }

    let (Some(code), Some(company_id)) = (params.code, params.realm_id) else {
        return Err(ApiError::BadRequest(
            "callback requires code and realmId".into(),
        ));
    };

    let record = state
        .credentials
        .complete_authorization(&code, &company_id, now)
        .await?;
    Ok(Json(ConnectedCompany::from_record(&record, now)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    use crate::app::test_support::TestApp;

    fn state_from(location: &str) -> String {
        location
            .split("state=")
            .nth(1)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn connect_then_callback_stores_tokens() {
        let app = TestApp::new();
        let (status, location, _) = app.request("GET", "/connect", None).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let state = state_from(&location.unwrap());
        assert!(state.starts_with("auth_"));

        let uri = format!("/callback?code=abc&realmId=9130&state={state}");
        let (status, _, body) = app.request("GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["company_id"], "9130");
        assert_eq!(body["status"], "valid");
        assert!(app.state.credentials.is_connected("9130", Utc::now()).unwrap());

        // The same state cannot be replayed.
        let (status, _, body) = app.request("GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_state");
    }

    #[tokio::test]
    async fn callback_rejects_unknown_or_expired_state() {
        let app = TestApp::new();
        let (status, _, body) = app
            .request("GET", "/callback?code=abc&realmId=1&state=forged", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_state");

        app.state
            .issue_state("auth_old".into(), Utc::now() - Duration::minutes(15));
        let (status, _, _) = app
            .request("GET", "/callback?code=abc&realmId=1&state=auth_old", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!app.state.credentials.is_connected("1", Utc::now()).unwrap());
    }

    #[tokio::test]
    async fn callback_surfaces_denial_and_exchange_failure() {
        let app = TestApp::new();
        let (status, _, body) = app
            .request("GET", "/callback?error=access_denied&state=x", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        app.state.issue_state("auth_1".into(), Utc::now());
        let (status, _, body) = app
            .request("GET", "/callback?code=bad&realmId=1&state=auth_1", None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "exchange_failed");
    }
}
