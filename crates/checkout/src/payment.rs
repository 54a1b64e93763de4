//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::CartId;
use domain::Money;
use thiserror::Error;

/// Outcome of a capture request the gateway processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCapture {
    /// False if the gateway declined the charge.
    pub approved: bool,
    /// Gateway reference for an approved capture.
    pub reference: Option<String>,
}

impl PaymentCapture {
    pub fn approved(reference: impl Into<String>) -> Self {
        Self {
            approved: true,
            reference: Some(reference.into()),
        }
    }

    pub fn declined() -> Self {
        Self {
            approved: false,
            reference: None,
        }
    }
}

/// The gateway could not process a request at all.
#[derive(Debug, Error)]
#[error("Payment gateway error: {0}")]
pub struct PaymentError(pub String);

/// Trait for capturing payment when an order is settled.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Captures `amount` for a cart, optionally with a client payment token.
    async fn capture(
        &self,
        cart_id: CartId,
        amount: Money,
        token: Option<&str>,
    ) -> Result<PaymentCapture, PaymentError>;

    /// Returns a previously captured payment.
    async fn refund(&self, reference: &str) -> Result<(), PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    captures: HashMap<String, (CartId, Money)>,
    next_id: u32,
    decline: bool,
}

/// In-memory payment gateway that approves every capture unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline captures.
    pub fn set_decline(&self, decline: bool) {
        self.lock().decline = decline;
    }

    /// Returns the number of captures not refunded.
    pub fn capture_count(&self) -> usize {
        self.lock().captures.len()
    }

    /// Returns the amount captured under `reference`, if any.
    pub fn captured_amount(&self, reference: &str) -> Option<Money> {
        self.lock().captures.get(reference).map(|(_, amount)| *amount)
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn capture(
        &self,
        cart_id: CartId,
        amount: Money,
        _token: Option<&str>,
    ) -> Result<PaymentCapture, PaymentError> {
        let mut state = self.lock();

        if state.decline {
            return Ok(PaymentCapture::declined());
        }

        state.next_id += 1;
        let reference = format!("PAY-{:04}", state.next_id);
        state
            .captures
            .insert(reference.clone(), (cart_id, amount));

        Ok(PaymentCapture::approved(reference))
    }

    async fn refund(&self, reference: &str) -> Result<(), PaymentError> {
        self.lock().captures.remove(reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_and_refund() {
        let gateway = InMemoryPaymentGateway::new();
        let amount = Money::from_cents(5000);

        let capture = gateway.capture(CartId::new(), amount, None).await.unwrap();
        assert!(capture.approved);
        let reference = capture.reference.unwrap();
        assert_eq!(gateway.captured_amount(&reference), Some(amount));

        gateway.refund(&reference).await.unwrap();
        assert_eq!(gateway.capture_count(), 0);
    }

    #[tokio::test]
    async fn test_declined_capture_records_nothing() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_decline(true);

        let capture = gateway
            .capture(CartId::new(), Money::from_cents(100), Some("tok_visa"))
            .await
            .unwrap();
        assert_eq!(capture, PaymentCapture::declined());
        assert_eq!(gateway.capture_count(), 0);
    }

    #[tokio::test]
    async fn test_sequential_references() {
        let gateway = InMemoryPaymentGateway::new();
        let amount = Money::from_cents(1000);

        let r1 = gateway.capture(CartId::new(), amount, None).await.unwrap();
        let r2 = gateway.capture(CartId::new(), amount, None).await.unwrap();

        assert_eq!(r1.reference.as_deref(), Some("PAY-0001"));
        assert_eq!(r2.reference.as_deref(), Some("PAY-0002"));
    }
}
