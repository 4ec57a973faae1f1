use crate::domain::invoice::{Customer, InvoiceStatus};
use crate::domain::money::{Currency, Money};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Read;

/// One line of an invoice import file: `customer, amount, currency, status`.
///
/// The status column may be left empty, in which case the invoice is pending.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct InvoiceRecord {
    pub customer: u32,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: Option<InvoiceStatus>,
}

impl InvoiceRecord {
    pub fn money(&self) -> Result<Money> {
        Money::new(self.amount, self.currency)
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status.unwrap_or_default()
    }
}

/// Reads CSV records of type `T` from any `Read` source.
///
/// Wraps `csv::Reader`, trimming whitespace and tolerating short records.
/// Use [`InvoiceReader`] for invoice files and [`CustomerReader`] for
/// customer files (`id, currency`).
pub struct RecordReader<R: Read, T> {
    reader: csv::Reader<R>,
    _record: std::marker::PhantomData<T>,
}

pub type InvoiceReader<R> = RecordReader<R, InvoiceRecord>;
pub type CustomerReader<R> = RecordReader<R, Customer>;

impl<R: Read, T: DeserializeOwned> RecordReader<R, T> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self {
            reader,
            _record: std::marker::PhantomData,
        }
    }

    /// Returns an iterator that lazily reads and deserializes records.
    pub fn records(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
