use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use cinebook_core::payment::{
    to_minor_units, validate_secret_key, CheckoutRequest, CheckoutSession, PaymentError,
    PaymentProvider,
};
use cinebook_core::webhook::booking_id_from_metadata;

const GENERIC_UPSTREAM_MESSAGE: &str = "Payment gateway error. Please try again.";

/// Stripe Checkout over its form-encoded REST API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
    timeout_seconds: u64,
}

impl StripeClient {
    pub fn new(secret_key: &str, api_base: &str, timeout_seconds: u64) -> Result<Self, PaymentError> {
        let secret_key = validate_secret_key(secret_key)?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        Ok(Self {
            http,
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout_seconds,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::Timeout(self.timeout_seconds)
        } else {
            warn!(error = %err, "Stripe request failed");
            PaymentError::Upstream(GENERIC_UPSTREAM_MESSAGE.to_string())
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response) -> Result<T, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| GENERIC_UPSTREAM_MESSAGE.to_string());
            warn!(%status, %message, "Stripe rejected request");
            return Err(PaymentError::Upstream(message));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_intent: Option<String>,
    metadata: Option<serde_json::Value>,
    expires_at: Option<i64>,
}

impl From<StripeSession> for CheckoutSession {
    fn from(raw: StripeSession) -> Self {
        CheckoutSession {
            booking_id: booking_id_from_metadata(raw.metadata.as_ref()),
            expires_at: raw.expires_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            id: raw.id,
            url: raw.url,
            payment_intent: raw.payment_intent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

fn session_form(request: &CheckoutRequest) -> Result<Vec<(&'static str, String)>, PaymentError> {
    let unit_amount = to_minor_units(request.amount)?;
    Ok(vec![
        ("mode", "payment".to_string()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("line_items[0][price_data][currency]", request.currency.clone()),
        ("line_items[0][price_data][product_data][name]", request.product_name.clone()),
        ("line_items[0][price_data][unit_amount]", unit_amount.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("metadata[bookingId]", request.booking_id.to_string()),
        ("expires_at", request.expires_at.timestamp().to_string()),
    ])
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = session_form(request)?;
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let session: StripeSession = self.read(response).await?;
        debug!(session_id = %session.id, booking_id = %request.booking_id, "Checkout session created");
        Ok(session.into())
    }

    async fn find_session_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .query(&[("payment_intent", payment_intent)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let list: StripeList<StripeSession> = self.read(response).await?;
        Ok(list.data.into_iter().next().map(CheckoutSession::from))
    }
}
