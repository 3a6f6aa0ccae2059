use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::app::AppState;

/// GET /companies: every connected company with its token status.
pub async fn list_companies(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let companies = state.credentials.companies(Utc::now())?;
    Ok(Json(json!({ "companies": companies })))
}

/// DELETE /companies/{company_id}
///
/// Forgets the company's tokens and removes its report jobs.
pub async fn disconnect_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let had_tokens = state.credentials.disconnect(&company_id)?;
    let jobs_removed = state.jobs.delete_by_company(&company_id)?;
    if !had_tokens && jobs_removed == 0 {
        return Err(ApiError::NotFound(format!("company {company_id}")));
    }

    info!(%company_id, jobs_removed, "company disconnected");
    Ok(Json(json!({
        "company_id": company_id,
        "disconnected": had_tokens,
        "jobs_removed": jobs_removed,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    use crate::app::test_support::TestApp;

    #[tokio::test]
    async fn lists_connected_companies() {
        let app = TestApp::new();
        app.connect("c1").await;
        app.connect("c2").await;

        let (status, _, body) = app.request("GET", "/companies", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body["companies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["company_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"c1".to_string()));
        assert!(ids.contains(&"c2".to_string()));
    }

    #[tokio::test]
    async fn disconnect_removes_tokens_and_jobs() {
        let app = TestApp::new();
        app.connect("c1").await;
        let job = json!({
            "company_id": "c1",
            "recipient_email": "ops@example.com",
            "schedule_time": "09:00",
        });
        let (status, _, _) = app.request("POST", "/jobs", Some(job)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = app.request("DELETE", "/companies/c1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["disconnected"], true);
        assert_eq!(body["jobs_removed"], 1);
        assert!(!app.state.credentials.is_connected("c1", Utc::now()).unwrap());
        assert!(app.state.jobs.find_by_company("c1").unwrap().is_empty());

        let (status, _, _) = app.request("DELETE", "/companies/c1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
