pub mod clock;
pub mod payment;
pub mod signature;

pub use clock::{Clock, FixedClock, SystemClock};
pub use payment::{ChargeIntent, GatewayError, IntentStatus, PaymentGateway, PaymentOutcome, WebhookEvent};
pub use signature::{SignatureError, WebhookVerifier};

use std::fmt;

/// Why a party could not be placed on an item for a given date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityReason {
    /// No availability slot covers the requested date.
    NoInventory { date: chrono::NaiveDate },
    /// A slot exists but cannot take the whole party.
    SoldOut { requested: u32, available: u32 },
}

impl CapacityReason {
    pub fn code(&self) -> &'static str {
        match self {
            CapacityReason::NoInventory { .. } => "NO_INVENTORY",
            CapacityReason::SoldOut { .. } => "CAPACITY_EXCEEDED",
        }
    }
}

impl fmt::Display for CapacityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityReason::NoInventory { date } => write!(f, "no availability defined for {}", date),
            CapacityReason::SoldOut { requested, available } => {
                write!(f, "requested {} places, {} available", requested, available)
            }
        }
    }
}

/// Error taxonomy shared by every booking operation.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Capacity unavailable: {0}")]
    Capacity(CapacityReason),
    #[error("Policy violation: {0}")]
    Policy(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Temporarily unavailable: {0}")]
    Retryable(String),
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::Capacity(reason) => reason.code(),
            BookingError::Policy(_) => "POLICY_VIOLATION",
            BookingError::InvalidState(_) => "INVALID_STATE",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::Signature(_) => "INVALID_SIGNATURE",
            BookingError::Conflict(_) => "CONFLICT",
            BookingError::Retryable(_) => "RETRY",
            BookingError::Gateway(_) => "PAYMENT_GATEWAY_UNAVAILABLE",
            BookingError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_codes_are_distinct_from_validation() {
        let date = chrono::NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        let none = BookingError::Capacity(CapacityReason::NoInventory { date });
        let full = BookingError::Capacity(CapacityReason::SoldOut { requested: 3, available: 1 });

        assert_eq!(none.code(), "NO_INVENTORY");
        assert_eq!(full.code(), "CAPACITY_EXCEEDED");
        assert_ne!(full.code(), BookingError::Validation("x".into()).code());
        assert_eq!(full.to_string(), "Capacity unavailable: requested 3 places, 1 available");
    }
}
