use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::ports::{ChargeError, InvoiceRepositoryRef, PaymentProviderRef};
use crate::error::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How many times a charge is attempted and how long to wait between attempts.
///
/// Only network faults are retried. `max_attempts` counts provider calls, so the
/// default of 3 means one initial call plus two retries, each preceded by the
/// same fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(3_000);

    /// Creates a policy. A zero attempt budget is raised to a single attempt.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The invoice reached a terminal status.
    Settled(InvoiceStatus),
    /// Cancellation was observed, or the reservation was released, before the
    /// invoice could be settled.
    Interrupted,
}

/// Charges a single invoice against the payment provider and records the result.
///
/// Every provider fault is classified here and mapped to an invoice status;
/// only repository failures are returned to the caller.
#[derive(Clone)]
pub struct ChargeWorker {
    invoices: InvoiceRepositoryRef,
    provider: PaymentProviderRef,
}

impl ChargeWorker {
    pub fn new(invoices: InvoiceRepositoryRef, provider: PaymentProviderRef) -> Self {
        Self { invoices, provider }
    }

    pub async fn charge(
        &self,
        invoice: Invoice,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ChargeOutcome> {
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                debug!(invoice_id = invoice.id, "Charge skipped, cycle was cancelled");
                return Ok(ChargeOutcome::Interrupted);
            }

            if attempt == 1 {
                // Claim the reservation; a cancel sweep may already have released it.
                let claimed = self
                    .invoices
                    .transition(invoice.id, InvoiceStatus::InProgress, InvoiceStatus::ToBeChecked)
                    .await?;
                if claimed.is_none() {
                    debug!(
                        invoice_id = invoice.id,
                        "Charge skipped, invoice is no longer reserved"
                    );
                    return Ok(ChargeOutcome::Interrupted);
                }
            } else {
                self.invoices
                    .update(invoice.with_status(InvoiceStatus::ToBeChecked))
                    .await?;
            }

            let status = match self.provider.charge(&invoice).await {
                Ok(true) => {
                    info!(invoice_id = invoice.id, "Invoice was paid");
                    InvoiceStatus::Paid
                }
                Ok(false) => {
                    warn!(
                        invoice_id = invoice.id,
                        customer_id = invoice.customer_id,
                        "Customer account balance did not allow the charge"
                    );
                    InvoiceStatus::ErrUnavailableFunds
                }
                Err(ChargeError::CustomerNotFound(customer_id)) => {
                    error!(invoice_id = invoice.id, customer_id, "Customer not found");
                    InvoiceStatus::ErrCustomerNotFound
                }
                Err(err @ ChargeError::CurrencyMismatch { .. }) => {
                    error!(invoice_id = invoice.id, "{err}");
                    InvoiceStatus::ErrCurrencyMismatch
                }
                Err(ChargeError::Network(reason)) => {
                    if attempt < policy.max_attempts() {
                        warn!(
                            invoice_id = invoice.id,
                            attempt,
                            %reason,
                            "Network issue while charging, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                warn!(
                                    invoice_id = invoice.id,
                                    "Cancelled during retry backoff, invoice left to be checked"
                                );
                                return Ok(ChargeOutcome::Interrupted);
                            }
                            _ = tokio::time::sleep(policy.backoff()) => {}
                        }
                        attempt += 1;
                        continue;
                    }
                    error!(
                        invoice_id = invoice.id,
                        attempts = attempt,
                        %reason,
                        "Network issue persisted, giving up"
                    );
                    InvoiceStatus::ErrNetwork
                }
                Err(ChargeError::Unknown(source)) => {
                    error!(
                        invoice_id = invoice.id,
                        error = %source,
                        "Unexpected error while charging"
                    );
                    InvoiceStatus::ErrUnknown
                }
            };

            self.invoices.update(invoice.with_status(status)).await?;
            return Ok(ChargeOutcome::Settled(status));
        }
    }
}
