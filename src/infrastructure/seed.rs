use crate::domain::invoice::InvoiceStatus;
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{CustomerRepository, InvoiceRepository};
use crate::error::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use tracing::info;

/// Fills the stores with `customers` customers of random currency, each owning
/// `invoices_per_customer` invoices. Every fifth invoice starts out paid.
pub async fn seed_initial_data(
    customer_store: &dyn CustomerRepository,
    invoice_store: &dyn InvoiceRepository,
    customers: usize,
    invoices_per_customer: usize,
) -> Result<()> {
    for _ in 0..customers {
        let currency = *Currency::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&Currency::Eur);
        let customer = customer_store.create(currency).await?;

        for n in 1..=invoices_per_customer {
            // Cents between 10.00 and 500.00.
            let cents = rand::thread_rng().gen_range(1_000..50_000);
            let amount = Money::new(Decimal::new(cents, 2), customer.currency)?;
            let status = if n % 5 == 0 {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::Pending
            };
            invoice_store.create(customer.id, amount, status).await?;
        }
    }

    info!(customers, invoices_per_customer, "Seeded initial data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryInvoiceStore};

    #[tokio::test]
    async fn test_seed_every_fifth_invoice_paid() {
        let customers = InMemoryCustomerStore::new();
        let invoices = InMemoryInvoiceStore::new();

        seed_initial_data(&customers, &invoices, 3, 10).await.unwrap();

        let all_customers = customers.fetch_all().await.unwrap();
        let all_invoices = invoices.fetch_all().await.unwrap();
        assert_eq!(all_customers.len(), 3);
        assert_eq!(all_invoices.len(), 30);

        let paid = all_invoices
            .iter()
            .filter(|invoice| invoice.status == InvoiceStatus::Paid)
            .count();
        assert_eq!(paid, 6);
        assert_eq!(invoices.progress_percent().await.unwrap(), 20);

        for invoice in all_invoices {
            let owner = customers.fetch(invoice.customer_id).await.unwrap();
            assert!(owner.accepts(&invoice.amount));
        }
    }
}
