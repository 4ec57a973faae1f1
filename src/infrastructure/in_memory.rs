use crate::domain::invoice::{Customer, Invoice, InvoiceStatus, progress_percent};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{CustomerRepository, InvoiceRepository};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for invoices.
///
/// Invoices live in a `BTreeMap` keyed by id, so a reservation walks them in
/// ascending id order. The whole reservation runs under the write lock, which
/// makes it atomic with respect to other reservations and updates.
#[derive(Default, Clone)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<RwLock<BTreeMap<u32, Invoice>>>,
    agent: Option<String>,
}

impl InMemoryInvoiceStore {
    /// Creates a new, empty in-memory invoice store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `agent` as `processed_by` on every invoice it reserves.
    pub fn with_agent(agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceStore {
    async fn reserve_next_batch(&self, max_count: usize) -> Result<Vec<Invoice>> {
        let mut invoices = self.invoices.write().await;
        let batch: Vec<Invoice> = invoices
            .values_mut()
            .filter(|invoice| invoice.status == InvoiceStatus::Pending)
            .take(max_count)
            .map(|invoice| {
                invoice.status = InvoiceStatus::InProgress;
                invoice.processed_by = self.agent.clone();
                invoice.clone()
            })
            .collect();
        Ok(batch)
    }

    async fn update(&self, invoice: Invoice) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or(BillingError::InvoiceNotFound(invoice.id))?;
        stored.customer_id = invoice.customer_id;
        stored.amount = invoice.amount;
        stored.status = invoice.status;
        Ok(stored.clone())
    }

    async fn transition(
        &self,
        id: u32,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound(id))?;
        if stored.status != from {
            return Ok(None);
        }
        stored.status = to;
        if to == InvoiceStatus::Pending {
            stored.processed_by = None;
        }
        Ok(Some(stored.clone()))
    }

    async fn fetch(&self, id: u32) -> Result<Invoice> {
        let invoices = self.invoices.read().await;
        invoices
            .get(&id)
            .cloned()
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.values().cloned().collect())
    }

    async fn create(
        &self,
        customer_id: u32,
        amount: Money,
        status: InvoiceStatus,
    ) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        let id = invoices.last_key_value().map_or(1, |(id, _)| id + 1);
        let invoice = Invoice {
            id,
            customer_id,
            amount,
            status,
            processed_by: None,
        };
        invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn progress_percent(&self) -> Result<u8> {
        let invoices = self.invoices.read().await;
        let pending = invoices
            .values()
            .filter(|invoice| invoice.status == InvoiceStatus::Pending)
            .count();
        Ok(progress_percent(invoices.len(), pending))
    }
}

/// A thread-safe in-memory store for customers.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<BTreeMap<u32, Customer>>>,
}

impl InMemoryCustomerStore {
    /// Creates a new, empty in-memory customer store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerStore {
    async fn create(&self, currency: Currency) -> Result<Customer> {
        let mut customers = self.customers.write().await;
        let id = customers.last_key_value().map_or(1, |(id, _)| id + 1);
        let customer = Customer { id, currency };
        customers.insert(id, customer);
        Ok(customer)
    }

    async fn store(&self, customer: Customer) -> Result<()> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id, customer);
        Ok(())
    }

    async fn fetch(&self, id: u32) -> Result<Customer> {
        let customers = self.customers.read().await;
        customers
            .get(&id)
            .copied()
            .ok_or(BillingError::CustomerNotFound(id))
    }

    async fn fetch_all(&self) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.values().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur(value: rust_decimal::Decimal) -> Money {
        Money::new(value, Currency::Eur).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_ascending_ids() {
        let store = InMemoryInvoiceStore::new();
        let first = store
            .create(1, eur(dec!(10.0)), InvoiceStatus::Pending)
            .await
            .unwrap();
        let second = store
            .create(1, eur(dec!(20.0)), InvoiceStatus::Pending)
            .await
            .unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.fetch(2).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_reserve_takes_oldest_pending_first() {
        let store = InMemoryInvoiceStore::with_agent("agent-7");
        store
            .create(1, eur(dec!(1)), InvoiceStatus::Paid)
            .await
            .unwrap();
        for _ in 0..4 {
            store
                .create(1, eur(dec!(1)), InvoiceStatus::Pending)
                .await
                .unwrap();
        }

        let batch = store.reserve_next_batch(3).await.unwrap();
        let ids: Vec<u32> = batch.iter().map(|invoice| invoice.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert!(
            batch
                .iter()
                .all(|invoice| invoice.status == InvoiceStatus::InProgress
                    && invoice.processed_by.as_deref() == Some("agent-7"))
        );

        let rest = store.reserve_next_batch(3).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, 5);
        assert!(store.reserve_next_batch(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overlap() {
        let store = InMemoryInvoiceStore::new();
        for _ in 0..100 {
            store
                .create(1, eur(dec!(1)), InvoiceStatus::Pending)
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.reserve_next_batch(15).await },
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for invoice in handle.await.unwrap().unwrap() {
                assert!(seen.insert(invoice.id), "invoice reserved twice");
            }
        }
        assert_eq!(seen.len(), 100);
    }

    #[tokio::test]
    async fn test_update_unknown_invoice_fails() {
        let store = InMemoryInvoiceStore::new();
        let invoice = Invoice {
            id: 42,
            customer_id: 1,
            amount: eur(dec!(1)),
            status: InvoiceStatus::Paid,
            processed_by: None,
        };
        assert!(matches!(
            store.update(invoice).await,
            Err(BillingError::InvoiceNotFound(42))
        ));
        assert!(matches!(
            store.fetch(42).await,
            Err(BillingError::InvoiceNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_transition_only_applies_to_expected_status() {
        let store = InMemoryInvoiceStore::with_agent("agent-7");
        for _ in 0..2 {
            store
                .create(1, eur(dec!(3)), InvoiceStatus::Pending)
                .await
                .unwrap();
        }
        store.reserve_next_batch(2).await.unwrap();
        store
            .update(store.fetch(2).await.unwrap().with_status(InvoiceStatus::Paid))
            .await
            .unwrap();

        let released = store
            .transition(1, InvoiceStatus::InProgress, InvoiceStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(released.status, InvoiceStatus::Pending);
        assert_eq!(released.processed_by, None);

        // Already settled: nothing is written.
        assert!(
            store
                .transition(2, InvoiceStatus::InProgress, InvoiceStatus::Pending)
                .await
                .unwrap()
                .is_none()
        );
        let settled = store.fetch(2).await.unwrap();
        assert_eq!(settled.status, InvoiceStatus::Paid);
        assert_eq!(settled.processed_by.as_deref(), Some("agent-7"));

        assert!(matches!(
            store
                .transition(9, InvoiceStatus::InProgress, InvoiceStatus::Pending)
                .await,
            Err(BillingError::InvoiceNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_progress_counts_non_pending() {
        let store = InMemoryInvoiceStore::new();
        assert_eq!(store.progress_percent().await.unwrap(), 0);

        for i in 0..100 {
            let status = if i < 37 {
                InvoiceStatus::Pending
            } else {
                InvoiceStatus::Paid
            };
            store.create(1, eur(dec!(1)), status).await.unwrap();
        }
        assert_eq!(store.progress_percent().await.unwrap(), 63);
    }

    #[tokio::test]
    async fn test_customer_store() {
        let store = InMemoryCustomerStore::new();
        let created = store.create(Currency::Dkk).await.unwrap();
        assert_eq!(created.id, 1);
        store
            .store(Customer {
                id: 10,
                currency: Currency::Usd,
            })
            .await
            .unwrap();

        assert_eq!(store.fetch(10).await.unwrap().currency, Currency::Usd);
        assert_eq!(store.fetch_all().await.unwrap().len(), 2);
        assert!(matches!(
            store.fetch(2).await,
            Err(BillingError::CustomerNotFound(2))
        ));
    }
}
