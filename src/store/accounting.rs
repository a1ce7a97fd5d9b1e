use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Invoice lifecycle as reported by the accounting system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalInvoiceState {
    Draft,
    Submitted,
    Authorised,
    Paid,
    Voided,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalInvoice {
    pub status: ExternalInvoiceState,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Why an invoice lookup produced no answer. These never reach end users as
/// errors; the caller keeps the last known status and flags it stale.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncFailure {
    #[error("invoice {0} not found in accounting system")]
    NotFound(String),

    #[error("accounting system unavailable: {0}")]
    Unavailable(String),

    #[error("accounting lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed accounting response: {0}")]
    Malformed(String),
}

impl SyncFailure {
    pub fn label(&self) -> &'static str {
        match self {
            SyncFailure::NotFound(_) => "not_found",
            SyncFailure::Unavailable(_) => "unavailable",
            SyncFailure::Timeout(_) => "timeout",
            SyncFailure::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait AccountingLookup: Send + Sync {
    async fn fetch_invoice(&self, reference: &str) -> Result<ExternalInvoice, SyncFailure>;
}

/// Accounting lookup backed by a map; used when no external system is
/// configured and in tests.
#[derive(Default)]
pub struct InMemoryAccounting {
    invoices: DashMap<String, ExternalInvoice>,
}

impl InMemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, reference: &str, invoice: ExternalInvoice) {
        self.invoices.insert(reference.to_string(), invoice);
    }

    pub fn remove(&self, reference: &str) {
        self.invoices.remove(reference);
    }
}

#[async_trait]
impl AccountingLookup for InMemoryAccounting {
    async fn fetch_invoice(&self, reference: &str) -> Result<ExternalInvoice, SyncFailure> {
        self.invoices
            .get(reference)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncFailure::NotFound(reference.to_string()))
    }
}

/// Looks invoices up over HTTP at `GET {base_url}/invoices/{reference}`.
pub struct HttpAccounting {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAccounting {
    pub fn new(
        base_url: &str,
        auth_bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|err| AppError::Internal(format!("invalid accounting url: {err}")))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| AppError::Internal(format!("invalid accounting token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    fn invoice_url(&self, reference: &str) -> Result<Url, SyncFailure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncFailure::Malformed("accounting url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("invoices")
            .push(reference);
        Ok(url)
    }
}

#[async_trait]
impl AccountingLookup for HttpAccounting {
    async fn fetch_invoice(&self, reference: &str) -> Result<ExternalInvoice, SyncFailure> {
        let url = self.invoice_url(reference)?;

        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                SyncFailure::Timeout(self.timeout)
            } else {
                SyncFailure::Unavailable(err.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => response
                .json::<ExternalInvoice>()
                .await
                .map_err(|err| SyncFailure::Malformed(err.to_string())),
            StatusCode::NOT_FOUND => Err(SyncFailure::NotFound(reference.to_string())),
            status => Err(SyncFailure::Unavailable(format!(
                "unexpected status {status} for invoice {reference}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        AccountingLookup, ExternalInvoice, ExternalInvoiceState, HttpAccounting,
        InMemoryAccounting, SyncFailure,
    };

    #[test]
    fn parses_accounting_payload() {
        let invoice: ExternalInvoice =
            serde_json::from_str(r#"{"status":"AUTHORISED","due_date":"2026-10-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(invoice.status, ExternalInvoiceState::Authorised);
        assert!(invoice.due_date.is_some());

        let bare: ExternalInvoice = serde_json::from_str(r#"{"status":"PAID"}"#).unwrap();
        assert_eq!(bare.due_date, None);
    }

    #[test]
    fn invoice_reference_is_path_encoded() {
        let client =
            HttpAccounting::new("https://books.example.com/api/", None, Duration::from_secs(1))
                .unwrap();
        let url = client.invoice_url("INV 0042/a").unwrap();
        assert_eq!(
            url.as_str(),
            "https://books.example.com/api/invoices/INV%200042%2Fa"
        );
    }

    #[tokio::test]
    async fn missing_invoice_is_reported_not_found() {
        let accounting = InMemoryAccounting::new();
        let result = accounting.fetch_invoice("INV-404").await;
        assert_eq!(result, Err(SyncFailure::NotFound("INV-404".to_string())));
    }
}
