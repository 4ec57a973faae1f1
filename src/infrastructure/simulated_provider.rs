use crate::domain::invoice::Invoice;
use crate::domain::ports::{ChargeError, CustomerRepositoryRef, PaymentProvider};
use crate::error::BillingError;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// A stand-in for the external payment provider.
///
/// Looks the customer up to report missing customers and currency mismatches
/// like a real provider would, then declines or fails randomly according to
/// the configured rates.
pub struct SimulatedPaymentProvider {
    customers: CustomerRepositoryRef,
    decline_rate: f64,
    network_fault_rate: f64,
    latency: Duration,
}

impl SimulatedPaymentProvider {
    pub fn new(customers: CustomerRepositoryRef) -> Self {
        Self {
            customers,
            decline_rate: 0.5,
            network_fault_rate: 0.0,
            latency: Duration::ZERO,
        }
    }

    pub fn with_decline_rate(mut self, rate: f64) -> Self {
        self.decline_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_network_fault_rate(mut self, rate: f64) -> Self {
        self.network_fault_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl PaymentProvider for SimulatedPaymentProvider {
    async fn charge(&self, invoice: &Invoice) -> Result<bool, ChargeError> {
        debug!(invoice_id = invoice.id, amount = %invoice.amount, "Charging invoice");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let customer = match self.customers.fetch(invoice.customer_id).await {
            Ok(customer) => customer,
            Err(BillingError::CustomerNotFound(id)) => {
                return Err(ChargeError::CustomerNotFound(id));
            }
            Err(err) => return Err(ChargeError::Unknown(Box::new(err))),
        };
        if !customer.accepts(&invoice.amount) {
            return Err(ChargeError::CurrencyMismatch {
                invoice_id: invoice.id,
                customer_id: customer.id,
            });
        }

        let (network_fault, declined) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_bool(self.network_fault_rate),
                rng.gen_bool(self.decline_rate),
            )
        };
        if network_fault {
            return Err(ChargeError::Network(
                "simulated connection reset".to_string(),
            ));
        }
        Ok(!declined)
    }
}
