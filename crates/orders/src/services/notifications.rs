//! Notification events and delivery.
//!
//! The fulfillment core produces classified events; how they reach people
//! is this module's concern alone. Production delivery is SMTP via lettre
//! (admin alerts to the configured ops address, customer notices to the
//! order's email). Every event is also logged at the severity the ops
//! escalation expects: full failures and abandonments are `error!`,
//! partial failures `warn!`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{error, info, warn};

use kivu_core::OrderId;

use crate::config::EmailConfig;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid recipient address.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
}

/// A domain that failed to register, with the registrar's error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDomain {
    /// Domain name.
    pub domain: String,
    /// Registrar error text.
    pub message: String,
}

/// Order fields every notification carries.
#[derive(Debug, Clone)]
pub struct OrderSummary {
    /// Order ID.
    pub order_id: OrderId,
    /// Human-readable order number.
    pub order_number: String,
    /// Customer email for the customer-facing variants.
    pub customer_email: String,
}

/// Classified events produced by the fulfillment core.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// Every domain registered; the customer gets a confirmation.
    OrderConfirmation {
        /// The order.
        order: OrderSummary,
        /// Registered domains.
        domains: Vec<String>,
    },
    /// Some domains registered, some did not; admins get the detail, the
    /// customer is told the rest are processing with automatic retry.
    PartialRegistrationFailure {
        /// The order.
        order: OrderSummary,
        /// Domains that registered.
        successful: Vec<String>,
        /// Domains that failed, with error detail.
        failed: Vec<FailedDomain>,
    },
    /// No domain registered.
    FullRegistrationFailure {
        /// The order.
        order: OrderSummary,
        /// Every domain, with error detail.
        failed: Vec<FailedDomain>,
    },
    /// Retry budget exhausted for one domain; manual registration or
    /// refund required. Admin and customer variants are both delivered.
    RegistrationAbandoned {
        /// The order.
        order: OrderSummary,
        /// The abandoned domain.
        domain: String,
        /// Attempts made.
        retry_count: i32,
        /// Last registrar error.
        failure_reason: String,
    },
    /// Unexpected fault outside the per-domain retry path; the order is
    /// parked in `requires_attention`.
    CriticalOrderFailure {
        /// The order.
        order: OrderSummary,
        /// Fault text.
        error: String,
    },
}

/// Delivery capability for notification events.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one event.
    async fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// SMTP-backed dispatcher.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_address: String,
}

impl EmailNotifier {
    /// Create a notifier from email configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_owned(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            admin_address: config.admin_address.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_owned()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(message).await?;
        Ok(())
    }

    fn failed_lines(failed: &[FailedDomain]) -> String {
        failed
            .iter()
            .map(|f| format!("  - {}: {}", f.domain, f.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl NotificationDispatcher for EmailNotifier {
    async fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        match event {
            NotificationEvent::OrderConfirmation { order, domains } => {
                info!(order_id = %order.order_id, count = domains.len(), "order completed");
                self.send(
                    &order.customer_email,
                    &format!("Order {} confirmed", order.order_number),
                    format!(
                        "Your order {} is complete. Registered domains:\n{}\n",
                        order.order_number,
                        domains
                            .iter()
                            .map(|d| format!("  - {d}"))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    ),
                )
                .await
            }
            NotificationEvent::PartialRegistrationFailure {
                order,
                successful,
                failed,
            } => {
                warn!(
                    order_id = %order.order_id,
                    successful = successful.len(),
                    failed = failed.len(),
                    "partial domain registration failure"
                );
                self.send(
                    &self.admin_address,
                    &format!(
                        "[action] Partial registration failure on order {}",
                        order.order_number
                    ),
                    format!(
                        "Order {} registered {} domain(s) but failed on:\n{}\n\n\
                         Retries are scheduled automatically.\n",
                        order.order_number,
                        successful.len(),
                        Self::failed_lines(&failed),
                    ),
                )
                .await
            }
            NotificationEvent::FullRegistrationFailure { order, failed } => {
                error!(
                    order_id = %order.order_id,
                    failed = failed.len(),
                    "all domain registrations failed"
                );
                self.send(
                    &self.admin_address,
                    &format!(
                        "[action] All registrations failed on order {}",
                        order.order_number
                    ),
                    format!(
                        "Payment succeeded on order {} but every domain failed to register:\n{}\n\n\
                         Retries are scheduled automatically.\n",
                        order.order_number,
                        Self::failed_lines(&failed),
                    ),
                )
                .await
            }
            NotificationEvent::RegistrationAbandoned {
                order,
                domain,
                retry_count,
                failure_reason,
            } => {
                error!(
                    order_id = %order.order_id,
                    domain = %domain,
                    retry_count,
                    "domain registration abandoned after all retries"
                );
                // Admin variant carries the raw error; the customer variant
                // carries the action promise.
                self.send(
                    &self.admin_address,
                    &format!("[manual] Registration abandoned: {domain}"),
                    format!(
                        "Registration of {domain} (order {}) was abandoned after \
                         {retry_count} attempts.\nLast error: {failure_reason}\n\n\
                         Register the domain manually or refund the line item.\n",
                        order.order_number,
                    ),
                )
                .await?;
                self.send(
                    &order.customer_email,
                    &format!("Problem registering {domain}"),
                    format!(
                        "We were unable to register {domain} from your order {}.\n\
                         Our team has been notified and will either register the \
                         domain manually or refund you within one business day.\n",
                        order.order_number,
                    ),
                )
                .await
            }
            NotificationEvent::CriticalOrderFailure { order, error } => {
                error!(
                    order_id = %order.order_id,
                    error = %error,
                    "critical failure: payment succeeded but processing failed"
                );
                self.send(
                    &self.admin_address,
                    &format!(
                        "[urgent] Order {} requires attention",
                        order.order_number
                    ),
                    format!(
                        "Payment succeeded on order {} but processing hit an \
                         unexpected fault:\n\n{error}\n\nThe order is parked in \
                         requires_attention; the retry machinery will not touch it.\n",
                        order.order_number,
                    ),
                )
                .await
            }
        }
    }
}
