//! A [`PaymentGateway`] that talks to the gateway's JSON REST API.
//!
//! | Operation               | Request                                   |
//! |-------------------------|-------------------------------------------|
//! | create authorization    | `POST /authorizations`                    |
//! | confirm authorization   | `POST /authorizations/{id}/confirm`       |
//! | cancel authorization    | `POST /authorizations/{id}/cancel`        |
//! | retrieve authorization  | `GET /authorizations/{id}`                |
//! | create refund           | `POST /refunds`                           |
//! | cancel refund           | `POST /refunds/{id}/cancel`               |
//!
//! Mutating requests carry the engine's idempotency key in the `Idempotency-Key` header. Statuses are accepted in
//! any case (`requires_confirmation`, `SUCCEEDED`, ...). Refunds may also be reported as `pending`.
use std::{collections::BTreeMap, sync::Arc};

use log::*;
use orderpay_common::MinorUnits;
use orderpay_engine::{
    db_types::{AuthorizationStatus, RefundStatus},
    traits::{
        CreateAuthorizationRequest,
        CreateRefundRequest,
        GatewayAuthorization,
        GatewayError,
        GatewayRefund,
        PaymentGateway,
    },
};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{config::GatewayConfig, errors::ServerError};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Clone)]
pub struct HttpPaymentGateway {
    base_url: String,
    client: Arc<Client>,
}

#[derive(Debug, Clone, Serialize)]
struct AuthorizationBody<'a> {
    amount: MinorUnits,
    currency: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct RefundBody<'a> {
    authorization_id: &'a str,
    amount: MinorUnits,
}

#[derive(Debug, Clone, Deserialize)]
struct GatewayObject {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        if !config.api_key.reveal().is_empty() {
            let mut val = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway API key. {e}")))?;
            val.set_sensitive(true);
            headers.insert("Authorization", val);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { base_url: config.base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        idempotency_key: Option<&str>,
        body: Option<B>,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("💳️ Sending gateway request: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(send_error)?;
        if response.status().is_success() {
            trace!("💳️ Gateway request successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(status_error(status, message))
        }
    }
}

impl PaymentGateway for HttpPaymentGateway {
    async fn create_authorization(
        &self,
        request: &CreateAuthorizationRequest,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let body = AuthorizationBody { amount: request.amount, currency: &request.currency, metadata: &request.metadata };
        let obj: GatewayObject =
            self.rest_query(Method::POST, "/authorizations", Some(&request.idempotency_key), Some(body)).await?;
        debug!("💳️ Gateway created authorization {}", obj.id);
        let status = authorization_status(&obj.status)?;
        Ok(GatewayAuthorization { authorization_id: obj.id, status, client_secret: obj.client_secret })
    }

    async fn confirm_authorization(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationStatus, GatewayError> {
        let path = format!("/authorizations/{authorization_id}/confirm");
        let obj: GatewayObject = self.rest_query(Method::POST, &path, Some(idempotency_key), None::<()>).await?;
        authorization_status(&obj.status)
    }

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError> {
        let path = format!("/authorizations/{authorization_id}/cancel");
        let obj: GatewayObject = self.rest_query(Method::POST, &path, None, None::<()>).await?;
        authorization_status(&obj.status)
    }

    async fn retrieve_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError> {
        let path = format!("/authorizations/{authorization_id}");
        let obj: GatewayObject = self.rest_query(Method::GET, &path, None, None::<()>).await?;
        authorization_status(&obj.status)
    }

    async fn create_refund(&self, request: &CreateRefundRequest) -> Result<GatewayRefund, GatewayError> {
        let body = RefundBody { authorization_id: &request.authorization_id, amount: request.amount };
        let obj: GatewayObject =
            self.rest_query(Method::POST, "/refunds", Some(&request.idempotency_key), Some(body)).await?;
        debug!("💳️ Gateway created refund {}", obj.id);
        let status = refund_status(&obj.status)?;
        Ok(GatewayRefund { refund_id: obj.id, status })
    }

    async fn cancel_refund(&self, refund_id: &str) -> Result<RefundStatus, GatewayError> {
        let path = format!("/refunds/{refund_id}/cancel");
        let obj: GatewayObject = self.rest_query(Method::POST, &path, None, None::<()>).await?;
        refund_status(&obj.status)
    }
}

fn send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

/// Server-side failures and rate limiting may succeed on retry. Everything else is a rejection of the request.
fn status_error(status: u16, message: String) -> GatewayError {
    match status {
        408 | 504 => GatewayError::Timeout,
        429 | 500..=599 => GatewayError::Unavailable(format!("HTTP {status}: {message}")),
        _ => GatewayError::Rejected { code: status, message },
    }
}

fn authorization_status(s: &str) -> Result<AuthorizationStatus, GatewayError> {
    s.parse().map_err(|e| GatewayError::InvalidResponse(format!("{e}")))
}

fn refund_status(s: &str) -> Result<RefundStatus, GatewayError> {
    if s.eq_ignore_ascii_case("pending") {
        return Ok(RefundStatus::Requested);
    }
    s.parse().map_err(|e| GatewayError::InvalidResponse(format!("{e}")))
}
