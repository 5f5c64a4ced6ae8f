use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SECRET_KEY_PREFIXES: [&str; 2] = ["sk_test_", "sk_live_"];
const DEFAULT_CURRENCY: &str = "inr";

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid payment provider credential: {0}")]
    InvalidCredential(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Payment provider did not answer within {0} seconds")]
    Timeout(u64),

    #[error("Unreadable payment provider response: {0}")]
    Decode(String),
}

/// Everything needed to open a hosted checkout page for one booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent: Option<String>,
    /// Booking id carried in the session metadata.
    pub booking_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a hosted checkout session for the booking
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Find the checkout session that produced a payment intent
    async fn find_session_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError>;
}

/// Accepts only `sk_test_` / `sk_live_` keys, returning the trimmed key.
pub fn validate_secret_key(raw: &str) -> Result<&str, PaymentError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(PaymentError::InvalidCredential("secret key is empty".to_string()));
    }
    if !SECRET_KEY_PREFIXES.iter().any(|p| key.starts_with(p) && key.len() > p.len()) {
        return Err(PaymentError::InvalidCredential(
            "secret key must start with sk_test_ or sk_live_".to_string(),
        ));
    }
    Ok(key)
}

/// Maps a configured currency symbol or code to the provider's lowercase code.
pub fn currency_code(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "₹" | "inr" => "inr",
        "$" | "usd" => "usd",
        "€" | "eur" => "eur",
        "£" | "gbp" => "gbp",
        _ => DEFAULT_CURRENCY,
    }
}

pub fn currency_symbol(code: &str) -> &'static str {
    match currency_code(code) {
        "usd" => "$",
        "eur" => "€",
        "gbp" => "£",
        _ => "₹",
    }
}

/// Amount in the currency's minor unit (paise, cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.round().to_i64())
        .ok_or_else(|| PaymentError::Upstream(format!("amount {} out of range", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_secret_key_validation() {
        assert_eq!(validate_secret_key(" sk_test_abc ").unwrap(), "sk_test_abc");
        assert!(validate_secret_key("sk_live_xyz").is_ok());
        assert!(validate_secret_key("pk_test_abc").is_err());
        assert!(validate_secret_key("sk_test_").is_err());
        assert!(validate_secret_key("").is_err());
    }

    #[test]
    fn test_currency_mapping() {
        assert_eq!(currency_code("₹"), "inr");
        assert_eq!(currency_code("USD"), "usd");
        assert_eq!(currency_code("€"), "eur");
        assert_eq!(currency_code("£"), "gbp");
        assert_eq!(currency_code("yen"), "inr");
        assert_eq!(currency_symbol("usd"), "$");
        assert_eq!(currency_symbol("inr"), "₹");
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Decimal::from_str("400.00").unwrap()).unwrap(), 40000);
        assert_eq!(to_minor_units(Decimal::from_str("149.99").unwrap()).unwrap(), 14999);
    }

    #[test]
    fn test_minor_units_out_of_range() {
        let huge = Decimal::from_str("1000000000000000000000000000").unwrap();
        assert!(matches!(to_minor_units(huge), Err(PaymentError::Upstream(_))));
        assert!(matches!(to_minor_units(Decimal::MAX), Err(PaymentError::Upstream(_))));
    }
}
