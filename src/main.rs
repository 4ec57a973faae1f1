use biller::application::dispatcher::BatchDispatcher;
use biller::config::BillingConfig;
use biller::domain::invoice::{Customer, InvoiceStatus};
use biller::domain::ports::{
    CustomerRepository, CustomerRepositoryRef, InvoiceRepository, InvoiceRepositoryRef,
    PaymentProviderRef,
};
use biller::error::BillingError;
use biller::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryInvoiceStore};
#[cfg(feature = "storage-rocksdb")]
use biller::infrastructure::rocksdb::RocksDBStore;
use biller::infrastructure::seed::seed_initial_data;
use biller::infrastructure::simulated_provider::SimulatedPaymentProvider;
use biller::interfaces::csv::invoice_reader::{CustomerReader, InvoiceReader};
use biller::interfaces::csv::report_writer::ReportWriter;
use biller::telemetry;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Csv,
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Invoices CSV file (`customer, amount, currency, status`).
    /// Random invoices are seeded when omitted.
    input: Option<PathBuf>,

    /// Customers CSV file (`id, currency`). When omitted, customers are
    /// derived from the currency of their first invoice.
    #[arg(long)]
    customers: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between two batches, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Total charge attempts per invoice on network errors.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Pause between two charge attempts, in milliseconds.
    #[arg(long)]
    backoff_ms: Option<u64>,

    #[arg(long)]
    agent_name: Option<String>,

    /// Probability that the simulated provider declines a charge.
    #[arg(long, default_value_t = 0.5)]
    decline_rate: f64,

    /// Probability that the simulated provider fails with a network error.
    #[arg(long, default_value_t = 0.0)]
    network_fault_rate: f64,

    /// Simulated provider latency, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    #[arg(long, default_value_t = 10)]
    seed_customers: usize,

    #[arg(long, default_value_t = 100)]
    seed_invoices: usize,

    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    format: ReportFormat,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn billing_config(&self) -> biller::error::Result<BillingConfig> {
        let mut config = match &self.config {
            Some(path) => BillingConfig::from_file(path)?,
            None => BillingConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(delay) = self.delay_ms {
            config.delay_between_batches_ms = delay;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(backoff) = self.backoff_ms {
            config.retry_backoff_ms = backoff;
        }
        if let Some(agent_name) = &self.agent_name {
            config.agent_name = agent_name.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn open_stores(
    db_path: Option<&Path>,
    config: &BillingConfig,
) -> biller::error::Result<(InvoiceRepositoryRef, CustomerRepositoryRef)> {
    if let Some(db_path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = RocksDBStore::open(db_path, Some(config.agent_name.clone()))?;
            let invoices: InvoiceRepositoryRef = Arc::new(store.clone());
            let customers: CustomerRepositoryRef = Arc::new(store);
            return Ok((invoices, customers));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        warn!(
            path = %db_path.display(),
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let invoices: InvoiceRepositoryRef =
        Arc::new(InMemoryInvoiceStore::with_agent(config.agent_name.clone()));
    let customers: CustomerRepositoryRef = Arc::new(InMemoryCustomerStore::new());
    Ok((invoices, customers))
}

async fn import(
    invoices_path: &Path,
    customers_path: Option<&Path>,
    invoices: &dyn InvoiceRepository,
    customers: &dyn CustomerRepository,
) -> biller::error::Result<()> {
    if let Some(path) = customers_path {
        for record in CustomerReader::new(File::open(path)?).records() {
            match record {
                Ok(customer) => customers.store(customer).await?,
                Err(e) => warn!(error = %e, "Error reading customer, skipping"),
            }
        }
    }

    for record in InvoiceReader::new(File::open(invoices_path)?).records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Error reading invoice, skipping");
                continue;
            }
        };
        let amount = match record.money() {
            Ok(amount) => amount,
            Err(e) => {
                warn!(error = %e, customer_id = record.customer, "Invalid invoice, skipping");
                continue;
            }
        };

        if customers_path.is_none()
            && let Err(BillingError::CustomerNotFound(id)) = customers.fetch(record.customer).await
        {
            customers
                .store(Customer {
                    id,
                    currency: record.currency,
                })
                .await?;
        }
        invoices
            .create(record.customer, amount, record.status())
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.json_logs);

    let config = cli.billing_config().into_diagnostic()?;
    let (invoices, customers) = open_stores(cli.db_path.as_deref(), &config).into_diagnostic()?;

    if let Some(path) = &cli.input {
        import(
            path,
            cli.customers.as_deref(),
            invoices.as_ref(),
            customers.as_ref(),
        )
        .await
        .into_diagnostic()?;
    } else if invoices.fetch_all().await.into_diagnostic()?.is_empty() {
        seed_initial_data(
            customers.as_ref(),
            invoices.as_ref(),
            cli.seed_customers,
            cli.seed_invoices,
        )
        .await
        .into_diagnostic()?;
    } else {
        info!("Resuming with stored invoices");
    }

    let provider: PaymentProviderRef = Arc::new(
        SimulatedPaymentProvider::new(Arc::clone(&customers))
            .with_decline_rate(cli.decline_rate)
            .with_network_fault_rate(cli.network_fault_rate)
            .with_latency(Duration::from_millis(cli.latency_ms)),
    );
    let dispatcher = BatchDispatcher::new(
        Arc::clone(&invoices),
        provider,
        config.dispatch_settings(),
    );

    dispatcher.start().await.into_diagnostic()?;

    let mut ticker = tokio::time::interval(config.progress_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = dispatcher.wait_idle() => break,
            _ = tokio::signal::ctrl_c() => {
                let reverted = dispatcher.shutdown().await.into_diagnostic()?;
                warn!(reverted, "Interrupted, unprocessed invoices are pending again");
                break;
            }
            _ = ticker.tick() => {
                let progress = dispatcher.progress().await.into_diagnostic()?;
                info!(progress, "Charging progress");
            }
        }
    }

    let all = invoices.fetch_all().await.into_diagnostic()?;
    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    for invoice in &all {
        *by_status.entry(invoice.status.as_str()).or_default() += 1;
    }
    let paid = by_status
        .get(InvoiceStatus::Paid.as_str())
        .copied()
        .unwrap_or_default();
    info!(total = all.len(), paid, ?by_status, "Charging finished");

    // Output final state
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.format {
        ReportFormat::Csv => ReportWriter::new(&mut out)
            .write_invoices(&all)
            .into_diagnostic()?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &all).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
    }

    Ok(())
}
