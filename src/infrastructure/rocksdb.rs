use crate::domain::invoice::{Customer, Invoice, InvoiceStatus, progress_percent};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{CustomerRepository, InvoiceRepository};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing invoices.
pub const CF_INVOICES: &str = "invoices";
/// Column Family for storing customers.
pub const CF_CUSTOMERS: &str = "customers";

/// A persistent store implementation using RocksDB.
///
/// Handles storage for both `Invoice` and `Customer` entities using separate
/// Column Families. Keys are big-endian ids, so iteration follows ascending id
/// order. Every read-modify-write runs under one async mutex, which is what
/// keeps two reservations from picking the same invoice.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    agent: Option<String>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("invoices" and "customers") exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    /// * `agent` - Name recorded on the invoices this process reserves.
    pub fn open<P: AsRef<Path>>(path: P, agent: Option<String>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_invoices = ColumnFamilyDescriptor::new(CF_INVOICES, Options::default());
        let cf_customers = ColumnFamilyDescriptor::new(CF_CUSTOMERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_invoices, cf_customers])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            agent,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BillingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn next_id(&self, cf: &ColumnFamily) -> Result<u32> {
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(decode_key(&key)? + 1)
            }
            None => Ok(1),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &ColumnFamily) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| BillingError::InternalError(Box::new(e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| BillingError::InternalError(Box::new(e)))
}

fn decode_key(bytes: &[u8]) -> Result<u32> {
    let key: [u8; 4] = bytes.try_into().map_err(|_| {
        BillingError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Malformed key of {} bytes", bytes.len()),
        )))
    })?;
    Ok(u32::from_be_bytes(key))
}

#[async_trait]
impl InvoiceRepository for RocksDBStore {
    async fn reserve_next_batch(&self, max_count: usize) -> Result<Vec<Invoice>> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_INVOICES)?;

        let mut batch = WriteBatch::default();
        let mut reserved = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            if reserved.len() >= max_count {
                break;
            }
            let (_key, value) = item?;
            let mut invoice: Invoice = decode(&value)?;
            if invoice.status != InvoiceStatus::Pending {
                continue;
            }
            invoice.status = InvoiceStatus::InProgress;
            invoice.processed_by = self.agent.clone();
            batch.put_cf(cf, invoice.id.to_be_bytes(), encode(&invoice)?);
            reserved.push(invoice);
        }

        self.db.write(batch)?;
        Ok(reserved)
    }

    async fn update(&self, invoice: Invoice) -> Result<Invoice> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_INVOICES)?;

        let key = invoice.id.to_be_bytes();
        let bytes = self
            .db
            .get_cf(cf, key)?
            .ok_or(BillingError::InvoiceNotFound(invoice.id))?;
        let mut stored: Invoice = decode(&bytes)?;
        stored.customer_id = invoice.customer_id;
        stored.amount = invoice.amount;
        stored.status = invoice.status;

        self.db.put_cf(cf, key, encode(&stored)?)?;
        Ok(stored)
    }

    async fn transition(
        &self,
        id: u32,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_INVOICES)?;

        let key = id.to_be_bytes();
        let bytes = self
            .db
            .get_cf(cf, key)?
            .ok_or(BillingError::InvoiceNotFound(id))?;
        let mut stored: Invoice = decode(&bytes)?;
        if stored.status != from {
            return Ok(None);
        }
        stored.status = to;
        if to == InvoiceStatus::Pending {
            stored.processed_by = None;
        }

        self.db.put_cf(cf, key, encode(&stored)?)?;
        Ok(Some(stored))
    }

    async fn fetch(&self, id: u32) -> Result<Invoice> {
        let cf = self.cf(CF_INVOICES)?;
        let bytes = self
            .db
            .get_cf(cf, id.to_be_bytes())?
            .ok_or(BillingError::InvoiceNotFound(id))?;
        decode(&bytes)
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        self.scan(self.cf(CF_INVOICES)?)
    }

    async fn create(
        &self,
        customer_id: u32,
        amount: Money,
        status: InvoiceStatus,
    ) -> Result<Invoice> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_INVOICES)?;

        let invoice = Invoice {
            id: self.next_id(cf)?,
            customer_id,
            amount,
            status,
            processed_by: None,
        };
        self.db
            .put_cf(cf, invoice.id.to_be_bytes(), encode(&invoice)?)?;
        Ok(invoice)
    }

    async fn progress_percent(&self) -> Result<u8> {
        let invoices: Vec<Invoice> = self.scan(self.cf(CF_INVOICES)?)?;
        let pending = invoices
            .iter()
            .filter(|invoice| invoice.status == InvoiceStatus::Pending)
            .count();
        Ok(progress_percent(invoices.len(), pending))
    }
}

#[async_trait]
impl CustomerRepository for RocksDBStore {
    async fn create(&self, currency: Currency) -> Result<Customer> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_CUSTOMERS)?;

        let customer = Customer {
            id: self.next_id(cf)?,
            currency,
        };
        self.db
            .put_cf(cf, customer.id.to_be_bytes(), encode(&customer)?)?;
        Ok(customer)
    }

    async fn store(&self, customer: Customer) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_CUSTOMERS)?;
        self.db
            .put_cf(cf, customer.id.to_be_bytes(), encode(&customer)?)?;
        Ok(())
    }

    async fn fetch(&self, id: u32) -> Result<Customer> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let bytes = self
            .db
            .get_cf(cf, id.to_be_bytes())?
            .ok_or(BillingError::CustomerNotFound(id))?;
        decode(&bytes)
    }

    async fn fetch_all(&self) -> Result<Vec<Customer>> {
        self.scan(self.cf(CF_CUSTOMERS)?)
    }
}
