use super::money::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an invoice as seen by the billing engine.
///
/// `Pending` invoices are picked up by a reservation which flips them to
/// `InProgress`. The charge worker then moves them to `ToBeChecked` while the
/// provider call is in flight and finally to `Paid` or one of the `Err*`
/// states. Cancellation puts reserved invoices that were never charged back
/// to `Pending`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    InProgress,
    ToBeChecked,
    Cancelled,
    Paid,
    ErrUnavailableFunds,
    ErrCustomerNotFound,
    ErrCurrencyMismatch,
    ErrNetwork,
    ErrUnknown,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::InProgress => "IN_PROGRESS",
            InvoiceStatus::ToBeChecked => "TO_BE_CHECKED",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::ErrUnavailableFunds => "ERR_UNAVAILABLE_FUNDS",
            InvoiceStatus::ErrCustomerNotFound => "ERR_CUSTOMER_NOT_FOUND",
            InvoiceStatus::ErrCurrencyMismatch => "ERR_CURRENCY_MISMATCH",
            InvoiceStatus::ErrNetwork => "ERR_NETWORK",
            InvoiceStatus::ErrUnknown => "ERR_UNKNOWN",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::ErrUnavailableFunds
                | InvoiceStatus::ErrCustomerNotFound
                | InvoiceStatus::ErrCurrencyMismatch
                | InvoiceStatus::ErrNetwork
                | InvoiceStatus::ErrUnknown
        )
    }

    /// Terminal states are never left automatically by the engine.
    pub fn is_terminal(&self) -> bool {
        *self == InvoiceStatus::Paid || self.is_error()
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Invoice {
    pub id: u32,
    pub customer_id: u32,
    pub amount: Money,
    pub status: InvoiceStatus,
    /// Name of the agent that reserved the invoice for charging.
    #[serde(default)]
    pub processed_by: Option<String>,
}

impl Invoice {
    /// Returns a snapshot of this invoice carrying a different status.
    pub fn with_status(&self, status: InvoiceStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct Customer {
    pub id: u32,
    pub currency: Currency,
}

impl Customer {
    pub fn accepts(&self, amount: &Money) -> bool {
        self.currency == amount.currency()
    }
}

/// Share of invoices that have left the `Pending` state, as a whole percentage.
///
/// Uses integer division, so the result truncates toward zero. An empty
/// invoice set reports 0.
pub fn progress_percent(total: usize, pending: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let processed = total.saturating_sub(pending);
    (processed * 100 / total) as u8
}
