use super::charger::{ChargeOutcome, ChargeWorker, RetryPolicy};
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::ports::{InvoiceRepositoryRef, PaymentProviderRef};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub delay_between_batches: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            delay_between_batches: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

/// Tally of the charge outcomes of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub paid: usize,
    pub failed: usize,
    pub interrupted: usize,
    /// Charges whose outcome could not be written to the repository.
    pub unrecorded: usize,
}

struct ActiveCycle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RunState {
    running: bool,
    current_batch: Vec<Invoice>,
    active_cycle: Option<ActiveCycle>,
}

impl RunState {
    fn finish(&mut self) -> Option<ActiveCycle> {
        self.running = false;
        self.current_batch.clear();
        self.active_cycle.take()
    }
}

struct Shared {
    invoices: InvoiceRepositoryRef,
    worker: ChargeWorker,
    settings: DispatchSettings,
    state: Mutex<RunState>,
    running: watch::Sender<bool>,
}

/// Drives the "charge every pending invoice" workflow.
///
/// At most one charging cycle runs at a time. A cycle charges the reserved
/// batch concurrently, waits for every charge, sleeps for the configured
/// delay and reserves the next batch, until a reservation comes back empty.
/// Cloning the dispatcher yields another handle to the same run state.
#[derive(Clone)]
pub struct BatchDispatcher {
    inner: Arc<Shared>,
}

impl BatchDispatcher {
    pub fn new(
        invoices: InvoiceRepositoryRef,
        provider: PaymentProviderRef,
        settings: DispatchSettings,
    ) -> Self {
        let worker = ChargeWorker::new(Arc::clone(&invoices), provider);
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(Shared {
                invoices,
                worker,
                settings,
                state: Mutex::new(RunState::default()),
                running,
            }),
        }
    }

    /// Reserves the first batch and launches a charging cycle in the background.
    ///
    /// Returns `Ok(false)` without touching the repository when a cycle is
    /// already running, and also when there is nothing pending to charge.
    pub async fn start(&self) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if state.running {
            info!("Charging already in progress, ignoring start request");
            return Ok(false);
        }

        let batch = self
            .inner
            .invoices
            .reserve_next_batch(self.inner.settings.batch_size)
            .await?;
        if batch.is_empty() {
            info!("No pending invoices to charge");
            return Ok(false);
        }

        info!(batch_size = batch.len(), "Charging all pending invoices");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_cycle(
            Arc::clone(&self.inner),
            batch.clone(),
            cancel.clone(),
        ));

        state.running = true;
        state.current_batch = batch;
        state.active_cycle = Some(ActiveCycle { cancel, handle });
        self.inner.running.send_replace(true);
        Ok(true)
    }

    /// Stops the running cycle and puts every reserved invoice that was never
    /// charged back to `Pending`.
    ///
    /// Returns how many invoices were reverted; 0 when nothing is running.
    /// Charges already handed to the provider are allowed to finish in the
    /// background.
    pub async fn cancel(&self) -> Result<usize> {
        let (reverted, _detached) = self.cancel_cycle().await?;
        Ok(reverted)
    }

    /// Like [`BatchDispatcher::cancel`], but also waits for the cancelled cycle
    /// to wind down so that in-flight charges have recorded their outcome.
    pub async fn shutdown(&self) -> Result<usize> {
        let (reverted, cycle) = self.cancel_cycle().await?;
        if let Some(handle) = cycle
            && let Err(err) = handle.await
        {
            error!(error = %err, "Charging cycle ended abnormally");
        }
        Ok(reverted)
    }

    pub async fn progress(&self) -> Result<u8> {
        self.inner.invoices.progress_percent().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// Snapshot of the batch reserved by the running cycle.
    pub async fn current_batch(&self) -> Vec<Invoice> {
        self.inner.state.lock().await.current_batch.clone()
    }

    /// Resolves once no cycle is running.
    pub async fn wait_idle(&self) {
        let mut running = self.inner.running.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = running.wait_for(|running| !*running).await;
    }

    async fn cancel_cycle(&self) -> Result<(usize, Option<JoinHandle<()>>)> {
        let mut state = self.inner.state.lock().await;
        if !state.running {
            debug!("Cancel requested but no charging cycle is running");
            return Ok((0, None));
        }

        if let Some(cycle) = &state.active_cycle {
            cycle.cancel.cancel();
        }

        let swept = self.revert_unstarted(&state.current_batch).await;
        let cycle = state.finish();
        self.inner.running.send_replace(false);

        let reverted = swept?;
        info!(reverted, "Charging cancelled");
        Ok((reverted, cycle.map(|cycle| cycle.handle)))
    }

    async fn revert_unstarted(&self, batch: &[Invoice]) -> Result<usize> {
        let mut reverted = 0;
        for invoice in batch {
            // Anything past IN_PROGRESS may still be charged by the provider.
            let released = self
                .inner
                .invoices
                .transition(invoice.id, InvoiceStatus::InProgress, InvoiceStatus::Pending)
                .await?;
            if released.is_some() {
                reverted += 1;
            }
        }
        Ok(reverted)
    }
}

async fn run_cycle(shared: Arc<Shared>, mut batch: Vec<Invoice>, cancel: CancellationToken) {
    loop {
        let size = batch.len();
        let report = charge_batch(&shared, batch, &cancel).await;
        info!(
            batch_size = size,
            paid = report.paid,
            failed = report.failed,
            interrupted = report.interrupted,
            unrecorded = report.unrecorded,
            "Batch charged"
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.settings.delay_between_batches) => {}
        }

        let mut state = shared.state.lock().await;
        // `cancel` has already swept and reset the run state.
        if cancel.is_cancelled() {
            return;
        }

        match shared
            .invoices
            .reserve_next_batch(shared.settings.batch_size)
            .await
        {
            Ok(next) if !next.is_empty() => {
                debug!(batch_size = next.len(), "Reserved next batch");
                state.current_batch = next.clone();
                batch = next;
            }
            Ok(_) => {
                info!("All pending invoices processed");
                state.finish();
                shared.running.send_replace(false);
                return;
            }
            Err(err) => {
                error!(error = %err, "Could not reserve next batch, stopping");
                state.finish();
                shared.running.send_replace(false);
                return;
            }
        }
    }
}

async fn charge_batch(
    shared: &Shared,
    batch: Vec<Invoice>,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut tasks = JoinSet::new();
    for invoice in batch {
        let worker = shared.worker.clone();
        let policy = shared.settings.retry;
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let invoice_id = invoice.id;
            (invoice_id, worker.charge(invoice, policy, &cancel).await)
        });
    }

    let mut report = BatchReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(ChargeOutcome::Settled(InvoiceStatus::Paid)))) => report.paid += 1,
            Ok((_, Ok(ChargeOutcome::Settled(_)))) => report.failed += 1,
            Ok((_, Ok(ChargeOutcome::Interrupted))) => report.interrupted += 1,
            Ok((invoice_id, Err(err))) => {
                error!(invoice_id, error = %err, "Could not record charge result");
                report.unrecorded += 1;
            }
            Err(err) => {
                warn!(error = %err, "Charge task did not complete");
                report.unrecorded += 1;
            }
        }
    }
    report
}
