use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::money::Currency;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct InvoiceRow {
    id: u32,
    customer: u32,
    amount: Decimal,
    currency: Currency,
    status: InvoiceStatus,
}

impl From<&Invoice> for InvoiceRow {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            customer: invoice.customer_id,
            amount: invoice.amount.value(),
            currency: invoice.amount.currency(),
            status: invoice.status,
        }
    }
}

/// Writes the final state of every invoice as CSV, one row per invoice.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_invoices(&mut self, invoices: &[Invoice]) -> Result<()> {
        for invoice in invoices {
            self.writer.serialize(InvoiceRow::from(invoice))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let invoices = vec![
            Invoice {
                id: 1,
                customer_id: 3,
                amount: Money::new(dec!(10.5), Currency::Eur).unwrap(),
                status: InvoiceStatus::Paid,
                processed_by: Some("agent-1".to_string()),
            },
            Invoice {
                id: 2,
                customer_id: 4,
                amount: Money::new(dec!(7), Currency::Dkk).unwrap(),
                status: InvoiceStatus::ErrNetwork,
                processed_by: None,
            },
        ];

        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer)
            .write_invoices(&invoices)
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "id,customer,amount,currency,status");
        assert_eq!(lines[1], "1,3,10.5,EUR,PAID");
        assert_eq!(lines[2], "2,4,7,DKK,ERR_NETWORK");
    }
}
