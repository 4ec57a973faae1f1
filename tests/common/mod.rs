#![allow(dead_code)]

use async_trait::async_trait;
use biller::domain::invoice::{Invoice, InvoiceStatus};
use biller::domain::money::{Currency, Money};
use biller::domain::ports::{ChargeError, InvoiceRepository, PaymentProvider};
use biller::error::Result;
use biller::infrastructure::in_memory::InMemoryInvoiceStore;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory invoice store that remembers how it was used.
#[derive(Default)]
pub struct RecordingInvoiceStore {
    pub inner: InMemoryInvoiceStore,
    reservations: AtomicUsize,
    updates: Mutex<Vec<(u32, InvoiceStatus)>>,
    transition_delays: Mutex<HashMap<InvoiceStatus, Duration>>,
}

impl RecordingInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_pending(count: usize) -> Self {
        let store = Self::new();
        store.add(count, InvoiceStatus::Pending).await;
        store
    }

    pub async fn add(&self, count: usize, status: InvoiceStatus) {
        for _ in 0..count {
            self.inner
                .create(1, Money::new(dec!(10.0), Currency::Eur).unwrap(), status)
                .await
                .unwrap();
        }
    }

    /// Makes every status transition into `status` stall for `delay` before
    /// it reaches the store.
    pub fn delay_transitions_to(&self, status: InvoiceStatus, delay: Duration) {
        self.transition_delays.lock().unwrap().insert(status, delay);
    }

    pub fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }

    /// Every status written through `update` or a successful `transition`,
    /// in call order.
    pub fn updates(&self) -> Vec<(u32, InvoiceStatus)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_for(&self, id: u32) -> Vec<InvoiceStatus> {
        self.updates()
            .into_iter()
            .filter(|(invoice_id, _)| *invoice_id == id)
            .map(|(_, status)| status)
            .collect()
    }

    pub async fn status_of(&self, id: u32) -> InvoiceStatus {
        self.inner.fetch(id).await.unwrap().status
    }

    pub async fn statuses(&self) -> Vec<InvoiceStatus> {
        self.inner
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|invoice| invoice.status)
            .collect()
    }
}

#[async_trait]
impl InvoiceRepository for RecordingInvoiceStore {
    async fn reserve_next_batch(&self, max_count: usize) -> Result<Vec<Invoice>> {
        self.reservations.fetch_add(1, Ordering::SeqCst);
        self.inner.reserve_next_batch(max_count).await
    }

    async fn update(&self, invoice: Invoice) -> Result<Invoice> {
        self.updates
            .lock()
            .unwrap()
            .push((invoice.id, invoice.status));
        self.inner.update(invoice).await
    }

    async fn transition(
        &self,
        id: u32,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>> {
        let delay = self.transition_delays.lock().unwrap().get(&to).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let moved = self.inner.transition(id, from, to).await?;
        if moved.is_some() {
            self.updates.lock().unwrap().push((id, to));
        }
        Ok(moved)
    }

    async fn fetch(&self, id: u32) -> Result<Invoice> {
        self.inner.fetch(id).await
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        self.inner.fetch_all().await
    }

    async fn create(
        &self,
        customer_id: u32,
        amount: Money,
        status: InvoiceStatus,
    ) -> Result<Invoice> {
        self.inner.create(customer_id, amount, status).await
    }

    async fn progress_percent(&self) -> Result<u8> {
        self.inner.progress_percent().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Pay,
    Decline,
    Network,
    CustomerNotFound,
    CurrencyMismatch,
    Unknown,
}

/// Payment provider answering from a per-invoice script.
///
/// Invoices without a script (or whose script ran out) get the fallback reply.
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<u32, VecDeque<Reply>>>,
    fallback: Reply,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(fallback: Reply) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn paying() -> Self {
        Self::new(Reply::Pay)
    }

    pub fn with_script(self, invoice_id: u32, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(invoice_id, replies.into_iter().collect());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn charge(&self, invoice: &Invoice) -> std::result::Result<bool, ChargeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&invoice.id)
            .and_then(|replies| replies.pop_front())
            .unwrap_or(self.fallback);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Reply::Pay => Ok(true),
            Reply::Decline => Ok(false),
            Reply::Network => Err(ChargeError::Network("connection reset".to_string())),
            Reply::CustomerNotFound => Err(ChargeError::CustomerNotFound(invoice.customer_id)),
            Reply::CurrencyMismatch => Err(ChargeError::CurrencyMismatch {
                invoice_id: invoice.id,
                customer_id: invoice.customer_id,
            }),
            Reply::Unknown => Err(ChargeError::Unknown(Box::new(std::io::Error::other(
                "provider exploded",
            )))),
        }
    }
}
