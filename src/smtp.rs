use crate::config::SmtpConfig;
use lettre::{message::Mailbox, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::{
    sync::Mutex,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, error};

/// Type alias for the SMTP transport used to send reject/verification emails.
pub type SmtpTransport = AsyncSmtpTransport<Tokio1Executor>;

/// SMTP utilities: a thin, throttled wrapper around the `lettre` transport. Unlike the HTTP
/// self-callback client, outbound email here is always best-effort - callers log and swallow
/// send errors rather than letting them affect the primary response.
pub struct Smtp {
    /// SMTP configuration.
    pub config: SmtpConfig,
    /// The SMTP transport.
    transport: SmtpTransport,
    /// Timestamp bookkeeping used to respect `throttle_delay` between two consecutive sends.
    throttle_interval: Mutex<Interval>,
}

impl Smtp {
    /// Creates a new `Smtp` utilities instance.
    pub fn new(transport: SmtpTransport, config: SmtpConfig) -> Self {
        let mut throttle_interval = interval(config.throttle_delay);
        throttle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            transport,
            config,
            throttle_interval: Mutex::new(throttle_interval),
        }
    }

    /// Sends the specified email message, respecting the configured throttle delay.
    pub async fn send(&self, message: Message) -> anyhow::Result<()> {
        let mut interval = self.throttle_interval.lock().await;
        interval.tick().await;

        let smtp_response = self.transport.send(message).await;
        interval.reset();

        let smtp_response = smtp_response?;
        if smtp_response.is_positive() {
            debug!(
                "SMTP server accepted email with {}: {:?}",
                smtp_response.code(),
                smtp_response.first_line()
            );
        } else {
            error!(
                "SMTP server rejected email with {}: {:?}",
                smtp_response.code(),
                smtp_response.first_line()
            );
        }

        Ok(())
    }

    /// Sends a best-effort notification email, logging (never propagating) any failure. Used by
    /// the rate-limit/whitelist rejection paths and the scheduler executor's warnings, all of
    /// which must never change the primary HTTP response.
    pub async fn send_best_effort(&self, to: Mailbox, subject: String, body: String) {
        let from = match self.config.username.parse::<Mailbox>() {
            Ok(from) => from,
            Err(err) => {
                error!("Cannot parse configured SMTP sender address: {err:?}");
                return;
            }
        };

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body);
        match message {
            Ok(message) => {
                if let Err(err) = self.send(message).await {
                    error!("Failed to send best-effort email: {err:?}");
                }
            }
            Err(err) => error!("Failed to build best-effort email: {err:?}"),
        }
    }
}
