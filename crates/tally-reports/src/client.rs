use async_trait::async_trait;
use chrono::NaiveDate;
use tally_core::config::IntuitConfig;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::types::RawReport;

/// QuickBooks Online API minor version the report shape is parsed against.
pub const MINOR_VERSION: &str = "65";

/// Source of balance-sheet reports for a connected company.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fetch the balance sheet as of `as_of`. One request, no retries.
    async fn fetch(
        &self,
        access_token: &str,
        company_id: &str,
        as_of: NaiveDate,
    ) -> Result<RawReport, ReportError>;
}

pub struct QboClient {
    client: reqwest::Client,
    base_url: String,
}

impl QboClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &IntuitConfig) -> Self {
        Self::new(config.api_base_url())
    }

    fn report_url(&self, company_id: &str) -> String {
        format!(
            "{}/v3/company/{}/reports/BalanceSheet",
            self.base_url,
            urlencoding::encode(company_id)
        )
    }
}

#[async_trait]
impl ReportSource for QboClient {
    async fn fetch(
        &self,
        access_token: &str,
        company_id: &str,
        as_of: NaiveDate,
    ) -> Result<RawReport, ReportError> {
        let as_of = as_of.format("%Y-%m-%d").to_string();
        debug!(company_id, as_of = %as_of, "requesting balance sheet");

        let resp = self
            .client
            .get(self.report_url(company_id))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&[
                ("as_of_date", as_of.as_str()),
                ("accounting_method", "Accrual"),
                ("minorversion", MINOR_VERSION),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        let intuit_tid = resp
            .headers()
            .get("intuit_tid")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(
                company_id,
                status,
                intuit_tid = intuit_tid.as_deref().unwrap_or("-"),
                "balance sheet request failed"
            );
            return Err(ReportError::Api {
                status,
                message: text,
            });
        }

        debug!(
            company_id,
            intuit_tid = intuit_tid.as_deref().unwrap_or("-"),
            "balance sheet received"
        );
        resp.json::<RawReport>()
            .await
            .map_err(|e| ReportError::Parse(e.to_string()))
    }
}
