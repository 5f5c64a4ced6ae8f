pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod mailer;
pub mod memory;
pub mod redis_repo;
pub mod show_repo;
pub mod stripe;
pub mod user_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::{EventProducer, QueuedDelivery};
pub use mailer::SmtpMailer;
pub use memory::{
    InMemoryBookingRepository, InMemoryShowLock, InMemoryShowRepository, InMemoryUserDirectory,
    MockPaymentProvider, OutboxMailer,
};
pub use redis_repo::{RedisClient, RedisShowLock};
pub use show_repo::PgShowRepository;
pub use stripe::StripeClient;
pub use user_repo::PgUserDirectory;
