use super::invoice::{Customer, Invoice, InvoiceStatus};
use super::money::{Currency, Money};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Atomically picks up to `max_count` pending invoices, oldest id first,
    /// and flips them to `InProgress`. No two calls may return the same invoice.
    async fn reserve_next_batch(&self, max_count: usize) -> Result<Vec<Invoice>>;
    /// Persists the mutable fields of `invoice` and returns the stored row.
    async fn update(&self, invoice: Invoice) -> Result<Invoice>;
    /// Atomically moves invoice `id` from status `from` to `to`.
    ///
    /// Returns `Ok(None)` and writes nothing when the stored status is not
    /// `from`. Moving back to `Pending` also clears `processed_by`, since the
    /// invoice is no longer held by any agent.
    async fn transition(
        &self,
        id: u32,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>>;
    async fn fetch(&self, id: u32) -> Result<Invoice>;
    async fn fetch_all(&self) -> Result<Vec<Invoice>>;
    async fn create(&self, customer_id: u32, amount: Money, status: InvoiceStatus)
    -> Result<Invoice>;
    /// Percentage of invoices that are no longer pending.
    async fn progress_percent(&self) -> Result<u8>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, currency: Currency) -> Result<Customer>;
    async fn store(&self, customer: Customer) -> Result<()>;
    async fn fetch(&self, id: u32) -> Result<Customer>;
    async fn fetch_all(&self) -> Result<Vec<Customer>>;
}

/// Faults a payment provider may raise while charging an invoice.
#[derive(Error, Debug)]
pub enum ChargeError {
    #[error("Customer '{0}' was not found")]
    CustomerNotFound(u32),
    #[error("Currency of invoice '{invoice_id}' does not match customer '{customer_id}'")]
    CurrencyMismatch { invoice_id: u32, customer_id: u32 },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected provider error: {0}")]
    Unknown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Charges the customer's account for the invoice amount.
    ///
    /// Returns `Ok(false)` when the account balance did not allow the charge.
    async fn charge(&self, invoice: &Invoice) -> std::result::Result<bool, ChargeError>;
}

pub type InvoiceRepositoryRef = Arc<dyn InvoiceRepository>;
pub type CustomerRepositoryRef = Arc<dyn CustomerRepository>;
pub type PaymentProviderRef = Arc<dyn PaymentProvider>;
