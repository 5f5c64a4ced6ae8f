use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use cinebook_core::notify::{Delivery, DeliveryStrategy, Mailer, Notification, NotifyError, OutgoingEmail};
use cinebook_core::repository::{BookingRepository, ShowRepository, UserDirectory};
use cinebook_core::{BookingRecord, SeatId, Show, User};

/// Composes mail from the stores and sends it straight through the mailer.
pub struct DirectDelivery {
    bookings: Arc<dyn BookingRepository>,
    shows: Arc<dyn ShowRepository>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    timezone: Tz,
    currency_symbol: &'static str,
    paid_recheck: Duration,
}

impl DirectDelivery {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        shows: Arc<dyn ShowRepository>,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        timezone: Tz,
        currency_symbol: &'static str,
        paid_recheck: Duration,
    ) -> Self {
        Self {
            bookings,
            shows,
            users,
            mailer,
            timezone,
            currency_symbol,
            paid_recheck,
        }
    }

    /// A paid booking, waiting once for a late payment before giving up.
    async fn paid_booking(&self, booking_id: Uuid) -> Result<Option<BookingRecord>, NotifyError> {
        match self.bookings.get_booking(booking_id).await? {
            Some(booking) if booking.is_paid => return Ok(Some(booking)),
            Some(_) => {}
            None => return Ok(None),
        }

        tokio::time::sleep(self.paid_recheck).await;
        Ok(self
            .bookings
            .get_booking(booking_id)
            .await?
            .filter(|booking| booking.is_paid))
    }

    async fn booking_confirmed(&self, booking_id: Uuid) -> Result<Delivery, NotifyError> {
        let Some(booking) = self.paid_booking(booking_id).await? else {
            warn!(%booking_id, "Booking not paid or gone, skipping confirmation");
            return Ok(Delivery::Declined("booking is not paid".into()));
        };
        let Some(show) = self.shows.get_show(booking.show_id).await? else {
            return Ok(Delivery::Declined(format!("show {} not found", booking.show_id)));
        };
        let Some(user) = self.users.get_user(&booking.user_id).await? else {
            return Ok(Delivery::Declined(format!("user {} not found", booking.user_id)));
        };

        let email = confirmation_email(&booking, &show, &user, self.timezone, self.currency_symbol);
        self.mailer.send(&email).await?;
        info!(%booking_id, token = %booking.booking_token, to = %user.email, "Booking confirmation sent");
        Ok(Delivery::Sent)
    }

    async fn show_added(&self, movie_title: &str) -> Result<Delivery, NotifyError> {
        let users = self.users.list_users().await?;
        if users.is_empty() {
            return Ok(Delivery::Declined("no users to notify".into()));
        }

        let mut sent = 0;
        let mut last_error = None;
        for user in &users {
            match self.mailer.send(&show_added_email(user, movie_title)).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(to = %user.email, error = %e, "Show-added mail failed");
                    last_error = Some(e);
                }
            }
        }
        info!(movie_title, sent, total = users.len(), "Show-added broadcast finished");

        match last_error {
            Some(e) if sent == 0 => Err(e),
            _ => Ok(Delivery::Sent),
        }
    }

    async fn show_reminder(&self, show_id: Uuid, user_id: &str) -> Result<Delivery, NotifyError> {
        let Some(show) = self.shows.get_show(show_id).await? else {
            return Ok(Delivery::Declined(format!("show {} not found", show_id)));
        };
        let Some(user) = self.users.get_user(user_id).await? else {
            return Ok(Delivery::Declined(format!("user {} not found", user_id)));
        };

        self.mailer.send(&reminder_email(&show, &user, self.timezone)).await?;
        Ok(Delivery::Sent)
    }
}

#[async_trait]
impl DeliveryStrategy for DirectDelivery {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn deliver(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
        match notification {
            Notification::BookingConfirmed { booking_id } => self.booking_confirmed(*booking_id).await,
            Notification::ShowAdded { movie_title } => self.show_added(movie_title).await,
            Notification::ShowReminder { show_id, user_id } => self.show_reminder(*show_id, user_id).await,
        }
    }
}

fn show_date(show: &Show, tz: Tz) -> String {
    show.show_date_time.with_timezone(&tz).format("%A, %B %-d, %Y").to_string()
}

fn show_time(show: &Show, tz: Tz) -> String {
    show.show_date_time.with_timezone(&tz).format("%I:%M %p").to_string()
}

fn seat_list(seats: &[SeatId]) -> String {
    seats.iter().map(SeatId::to_string).collect::<Vec<_>>().join(", ")
}

pub fn confirmation_email(
    booking: &BookingRecord,
    show: &Show,
    user: &User,
    tz: Tz,
    currency_symbol: &str,
) -> OutgoingEmail {
    let seats = booking.sorted_seats();
    let body = format!(
        "Hi {name},\n\n\
         Your booking for \"{title}\" is confirmed.\n\n\
         Date: {date}\n\
         Time: {time}\n\
         Seats: {seats}\n\
         Tickets: {count}\n\
         Total: {symbol}{amount:.2}\n\
         Confirmation: {token}\n\n\
         Show this confirmation code at the theater entrance.\n\
         Enjoy the show!\n",
        name = user.name,
        title = show.movie_title,
        date = show_date(show, tz),
        time = show_time(show, tz),
        seats = seat_list(&seats),
        count = seats.len(),
        symbol = currency_symbol,
        amount = booking.amount,
        token = booking.booking_token,
    );

    OutgoingEmail {
        to: user.email.expose().clone(),
        subject: format!("Booking Confirmed: \"{}\" - {}", show.movie_title, booking.booking_token),
        body,
    }
}

pub fn show_added_email(user: &User, movie_title: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: user.email.expose().clone(),
        subject: format!("New Show Added: {}", movie_title),
        body: format!(
            "Hi {},\n\nWe've just added a new show to our library: \"{}\".\n\nBook your seats before they are gone.\n",
            user.name, movie_title
        ),
    }
}

pub fn reminder_email(show: &Show, user: &User, tz: Tz) -> OutgoingEmail {
    OutgoingEmail {
        to: user.email.expose().clone(),
        subject: format!("Reminder: Your movie \"{}\" starts soon!", show.movie_title),
        body: format!(
            "Hello {},\n\nThis is a quick reminder that your movie \"{}\" starts on {} at {}.\n\n\
             It starts in approximately 8 hours. Make sure you're ready!\n",
            user.name,
            show.movie_title,
            show_date(show, tz),
            show_time(show, tz),
        ),
    }
}
