use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Redirect origin when a request carries neither `Origin` nor `Referer`.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Absent or blank means bookings are confirmed without payment.
    pub secret_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_seconds: i64,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl PaymentsConfig {
    pub fn configured_key(&self) -> Option<&str> {
        self.secret_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    #[serde(default = "default_max_seats")]
    pub max_seats: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,
    #[serde(default = "default_reminder_lead")]
    pub reminder_lead_hours: i64,
    #[serde(default = "default_reminder_window")]
    pub reminder_window_minutes: i64,
    #[serde(default = "default_paid_recheck")]
    pub paid_recheck_seconds: u64,
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            hold_minutes: default_hold_minutes(),
            max_seats: default_max_seats(),
            sweep_interval_seconds: default_sweep_interval(),
            session_ttl_minutes: default_session_ttl(),
            reminder_lead_hours: default_reminder_lead(),
            reminder_window_minutes: default_reminder_window(),
            paid_recheck_seconds: default_paid_recheck(),
            display_timezone: default_display_timezone(),
        }
    }
}

impl BookingRules {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn paid_recheck(&self) -> Duration {
        Duration::from_secs(self.paid_recheck_seconds)
    }
}

fn default_frontend_url() -> String { "http://localhost:5173".into() }
fn default_max_connections() -> u32 { 5 }
fn default_lock_ttl_ms() -> u64 { 30_000 }
fn default_lock_wait_ms() -> u64 { 5_000 }
fn default_notifications_topic() -> String { "notifications".into() }
fn default_group_id() -> String { "cinebook-notifications".into() }
fn default_currency() -> String { "inr".into() }
fn default_webhook_tolerance() -> i64 { 300 }
fn default_stripe_api_base() -> String { "https://api.stripe.com".into() }
fn default_request_timeout() -> u64 { 10 }
fn default_smtp_port() -> u16 { 587 }
fn default_from_name() -> String { "CineBook".into() }
fn default_hold_minutes() -> i64 { 10 }
fn default_max_seats() -> usize { 10 }
fn default_sweep_interval() -> u64 { 300 }
fn default_session_ttl() -> i64 { 30 }
fn default_reminder_lead() -> i64 { 8 }
fn default_reminder_window() -> i64 { 10 }
fn default_paid_recheck() -> u64 { 2 }
fn default_display_timezone() -> String { "Asia/Kolkata".into() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. CINEBOOK__PAYMENTS__SECRET_KEY=sk_test_...
            .add_source(config::Environment::with_prefix("CINEBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_secret_key_means_no_provider() {
        let mut payments = PaymentsConfig {
            secret_key: Some("   ".into()),
            webhook_secret: String::new(),
            currency: default_currency(),
            webhook_tolerance_seconds: 300,
            api_base: default_stripe_api_base(),
            request_timeout_seconds: 10,
        };
        assert_eq!(payments.configured_key(), None);

        payments.secret_key = Some(" sk_test_abc ".into());
        assert_eq!(payments.configured_key(), Some("sk_test_abc"));
    }

    #[test]
    fn test_booking_rule_defaults() {
        let rules = BookingRules::default();
        assert_eq!(rules.hold_minutes, 10);
        assert_eq!(rules.max_seats, 10);
        assert_eq!(rules.sweep_interval(), Duration::from_secs(300));
        assert_eq!(rules.reminder_lead_hours, 8);
        assert_eq!(rules.display_timezone, "Asia/Kolkata");
    }
}
