use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signatures found matching the expected signature for payload")]
    NoMatch,

    #[error("Missing signature header")]
    MissingHeader,

    #[error("Unable to extract timestamp and signatures from header")]
    Malformed,

    #[error("Timestamp outside the tolerance zone")]
    OutsideTolerance,

    #[error("Webhook secret is not configured")]
    MissingSecret,
}

/// Checks `t=<unix>,v1=<hex>` signatures: HMAC-SHA256 of `"<t>.<body>"` under the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::MissingSecret);
        }
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed);
        }

        let expected = compute_signature(&self.secret, timestamp, payload);
        let matched = candidates
            .iter()
            .any(|candidate| constant_time_eq::constant_time_eq(candidate.as_bytes(), expected.as_bytes()));
        if !matched {
            return Err(SignatureError::NoMatch);
        }

        if (now.timestamp() - timestamp).abs() > self.tolerance_seconds {
            return Err(SignatureError::OutsideTolerance);
        }
        Ok(())
    }
}

/// Hex HMAC-SHA256 over `"<timestamp>.<payload>"`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    // HMAC takes keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a full signature header value; used by the mock provider and tests.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, compute_signature(secret, timestamp, payload))
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    id: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// The provider events this system acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    PaymentIntentSucceeded { event_id: String, payment_intent: String },
    CheckoutSessionCompleted { event_id: String, session_id: String, booking_id: Option<Uuid> },
    Ignored { event_id: String, event_type: String },
}

impl PaymentEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_slice(payload)?;
        Ok(match raw.event_type.as_str() {
            "payment_intent.succeeded" => PaymentEvent::PaymentIntentSucceeded {
                event_id: raw.id,
                payment_intent: raw.data.object.id,
            },
            "checkout.session.completed" => PaymentEvent::CheckoutSessionCompleted {
                event_id: raw.id,
                session_id: raw.data.object.id,
                booking_id: booking_id_from_metadata(raw.data.object.metadata.as_ref()),
            },
            _ => PaymentEvent::Ignored {
                event_id: raw.id,
                event_type: raw.event_type,
            },
        })
    }
}

/// Reads `metadata.bookingId`, tolerating a missing or malformed value.
pub fn booking_id_from_metadata(metadata: Option<&serde_json::Value>) -> Option<Uuid> {
    metadata?
        .get("bookingId")?
        .as_str()
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
