use crate::domain::ports::{PaymentGateway, PaymentSession, PaymentSessionRequest};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A payment gateway that issues sessions locally.
///
/// Stands in for the hosted checkout in development and tests. It can be put
/// into an outage to exercise the failure path of order creation.
#[derive(Debug)]
pub struct SandboxGateway {
    base_url: String,
    available: AtomicBool,
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self::new("https://sandbox.payments.local")
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_session(&self, request: PaymentSessionRequest) -> Result<PaymentSession> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BookingError::ExternalServiceFailure(
                "payment gateway unavailable".to_string(),
            ));
        }
        if request.gross_amount.is_zero() {
            return Err(BookingError::ExternalServiceFailure(
                "gateway rejected a zero amount".to_string(),
            ));
        }
        debug!(order_no = %request.order_no, amount = %request.gross_amount, "payment session issued");
        let token = format!("snap-{}", request.order_no);
        Ok(PaymentSession {
            redirect_url: format!("{}/snap/v2/vtweb/{}", self.base_url, token),
            token,
        })
    }
}
