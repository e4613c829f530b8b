//! Notifier errors.

use trailpost_core::error::{DeliveryError, TrailpostError};

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// The primary (Slack) channel did not accept a notification.
    #[error("primary delivery failed: {0}")]
    PrimaryDelivery(#[source] DeliveryError),
}

impl From<NotifierError> for TrailpostError {
    fn from(err: NotifierError) -> Self {
        match err {
            NotifierError::PrimaryDelivery(e) => TrailpostError::Delivery(e),
        }
    }
}
