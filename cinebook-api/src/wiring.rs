//! Builds the object graph from configuration: which adapters back the
//! repositories, lock, mailer and payment provider.

use anyhow::{anyhow, Context};
use chrono::Duration;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{error, info, warn};

use cinebook_catalog::ShowCatalog;
use cinebook_core::notify::{DeliveryStrategy, Mailer, NotificationDispatcher};
use cinebook_core::payment::{currency_code, currency_symbol, PaymentProvider};
use cinebook_core::repository::{BookingRepository, ShowLock, ShowRepository, UserDirectory};
use cinebook_core::webhook::WebhookVerifier;
use cinebook_order::{
    BookingSettings, BookingWorkflow, DirectDelivery, ExpirationReaper, PaymentConfirmationListener,
    PaymentMode, ReminderScanner, TokioExpiryScheduler,
};
use cinebook_store::app_config::Config;
use cinebook_store::{
    DbClient, EventProducer, InMemoryBookingRepository, InMemoryShowLock, InMemoryShowRepository,
    InMemoryUserDirectory, OutboxMailer, PgBookingRepository, PgShowRepository, PgUserDirectory,
    QueuedDelivery, RedisClient, RedisShowLock, SmtpMailer, StripeClient,
};

use crate::metrics::{Metrics, UndeliveredCounter};
use crate::state::{AppState, AuthConfig};

/// The swappable edges of the system.
pub struct Backends {
    pub shows: Arc<dyn ShowRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub lock: Arc<dyn ShowLock>,
    pub mailer: Arc<dyn Mailer>,
    /// Queue strategy tried before direct delivery, when a broker is configured.
    pub queue: Option<Arc<dyn DeliveryStrategy>>,
    pub payments: PaymentMode,
}

impl Backends {
    /// Everything in process; bookings are confirmed without payment.
    pub fn in_memory() -> Self {
        Self {
            shows: Arc::new(InMemoryShowRepository::new()),
            bookings: Arc::new(InMemoryBookingRepository::new()),
            users: Arc::new(InMemoryUserDirectory::new()),
            lock: Arc::new(InMemoryShowLock::default()),
            mailer: Arc::new(OutboxMailer::new()),
            queue: None,
            payments: PaymentMode::Disabled,
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut backends = Self::in_memory();

        match &config.database {
            Some(db) => {
                let client = DbClient::new(&db.url, db.max_connections)
                    .await
                    .context("Failed to connect to Postgres")?;
                client.migrate().await.context("Failed to run migrations")?;
                backends.shows = Arc::new(PgShowRepository::new(client.pool.clone()));
                backends.bookings = Arc::new(PgBookingRepository::new(client.pool.clone()));
                backends.users = Arc::new(PgUserDirectory::new(client.pool));
                info!("Using Postgres storage");
            }
            None => warn!("No [database] configured; bookings are kept in memory"),
        }

        if let Some(redis) = &config.redis {
            let client = RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?;
            backends.lock = Arc::new(RedisShowLock::new(
                client,
                redis.lock_ttl_ms,
                std::time::Duration::from_millis(redis.lock_wait_ms),
            ));
            info!("Using Redis show locks");
        }

        if let Some(kafka) = &config.kafka {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            backends.queue = Some(Arc::new(QueuedDelivery::new(producer, kafka.notifications_topic.clone())));
            info!(topic = %kafka.notifications_topic, "Queueing notifications through Kafka");
        }

        match &config.mail {
            Some(mail) => {
                backends.mailer = Arc::new(SmtpMailer::new(mail).context("Failed to configure SMTP")?);
            }
            None => warn!("No [mail] configured; emails are only logged"),
        }

        backends.payments = payment_mode(config);
        Ok(backends)
    }
}

/// A malformed key does not stop the server; booking requests report it instead.
pub fn payment_mode(config: &Config) -> PaymentMode {
    let Some(key) = config.payments.configured_key() else {
        info!("No payment provider key; bookings are confirmed immediately");
        return PaymentMode::Disabled;
    };

    match StripeClient::new(key, &config.payments.api_base, config.payments.request_timeout_seconds) {
        Ok(client) => PaymentMode::Provider(Arc::new(client)),
        Err(e) => {
            error!("Payment provider key rejected: {}", e);
            PaymentMode::Misconfigured(e.to_string())
        }
    }
}

/// Long-lived services the background workers need alongside the router state.
pub struct Services {
    pub state: AppState,
    pub reaper: Arc<ExpirationReaper>,
    pub reminders: Arc<ReminderScanner>,
    pub direct: Arc<DirectDelivery>,
}

pub fn assemble(config: &Config, backends: Backends, metrics: Arc<Metrics>) -> anyhow::Result<Services> {
    let rules = &config.booking_rules;
    let timezone: Tz = rules
        .display_timezone
        .parse()
        .map_err(|e| anyhow!("Invalid display_timezone {:?}: {}", rules.display_timezone, e))?;
    let currency = currency_code(&config.payments.currency);
    let hold = Duration::minutes(rules.hold_minutes);

    let direct = Arc::new(DirectDelivery::new(
        backends.bookings.clone(),
        backends.shows.clone(),
        backends.users.clone(),
        backends.mailer.clone(),
        timezone,
        currency_symbol(currency),
        rules.paid_recheck(),
    ));

    let mut strategies: Vec<Arc<dyn DeliveryStrategy>> = Vec::new();
    if let Some(queue) = backends.queue {
        strategies.push(queue);
    }
    strategies.push(direct.clone());
    strategies.push(Arc::new(UndeliveredCounter::new(metrics.clone())));
    let dispatcher = Arc::new(NotificationDispatcher::new(strategies));
    info!(strategies = ?dispatcher.strategy_names(), "Notification dispatcher ready");

    let reaper = Arc::new(
        ExpirationReaper::new(
            backends.bookings.clone(),
            backends.shows.clone(),
            backends.lock.clone(),
            hold,
        )
        .with_observer(metrics.clone()),
    );

    let provider: Option<Arc<dyn PaymentProvider>> = match &backends.payments {
        PaymentMode::Provider(provider) => Some(provider.clone()),
        _ => None,
    };

    let workflow = Arc::new(BookingWorkflow::new(
        backends.shows.clone(),
        backends.bookings.clone(),
        backends.lock.clone(),
        backends.payments,
        Arc::new(TokioExpiryScheduler::new(reaper.clone())),
        reaper.clone(),
        dispatcher.clone(),
        BookingSettings {
            hold,
            max_seats: rules.max_seats,
            session_ttl: Duration::minutes(rules.session_ttl_minutes),
            currency: currency.to_string(),
        },
    ));

    let confirmations = Arc::new(PaymentConfirmationListener::new(
        WebhookVerifier::new(config.payments.webhook_secret.clone(), config.payments.webhook_tolerance_seconds),
        provider,
        backends.bookings.clone(),
        dispatcher.clone(),
    ));

    let catalog = Arc::new(ShowCatalog::new(backends.shows.clone(), dispatcher.clone(), timezone));

    let reminders = Arc::new(ReminderScanner::new(
        backends.shows.clone(),
        dispatcher,
        Duration::hours(rules.reminder_lead_hours),
        Duration::minutes(rules.reminder_window_minutes),
    ));

    let state = AppState {
        workflow,
        confirmations,
        catalog,
        bookings: backends.bookings,
        users: backends.users,
        metrics,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        frontend_url: config.server.frontend_url.clone(),
    };

    Ok(Services {
        state,
        reaper,
        reminders,
        direct,
    })
}
