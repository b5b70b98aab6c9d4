//! Attach ledger.
//!
//! Every successful acquire publishes its fingerprint onto a bounded channel
//! drained by one background thread, which keeps cumulative attach totals.
//! The totals feed [`RegistryStats`](crate::RegistryStats) and are eventually
//! consistent. Live reference counts never depend on them.

use dbshare_core::Fingerprint;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

enum LedgerEvent {
    Attach(Fingerprint),
    /// Acknowledged once every earlier event has been applied
    Flush(SyncSender<()>),
}

/// Cumulative attach counts.
///
/// `per_fingerprint` keeps one entry for every target ever attached and is
/// never pruned, including after the connection closes.
#[derive(Debug, Default)]
struct Totals {
    per_fingerprint: HashMap<Fingerprint, u64>,
    total: u64,
}

pub(crate) struct AttachLedger {
    sender: Option<SyncSender<LedgerEvent>>,
    worker: Option<JoinHandle<()>>,
    totals: Arc<Mutex<Totals>>,
}

impl AttachLedger {
    /// Spawn the ledger worker.
    pub(crate) fn start(capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let totals = Arc::new(Mutex::new(Totals::default()));
        let worker_totals = Arc::clone(&totals);
        let worker = thread::Builder::new()
            .name("dbshare-ledger".to_string())
            .spawn(move || run(&receiver, &worker_totals))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            totals,
        })
    }

    /// Record one attach. Blocks while the channel is full.
    pub(crate) fn publish(&self, fingerprint: Fingerprint) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(LedgerEvent::Attach(fingerprint)).is_err() {
            tracing::warn!(fingerprint = %fingerprint, "attach ledger worker is gone; event dropped");
        }
    }

    /// Block until every event published before this call has been applied.
    pub(crate) fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if sender.send(LedgerEvent::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Cumulative attaches for one fingerprint.
    pub(crate) fn attaches(&self, fingerprint: &Fingerprint) -> u64 {
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.per_fingerprint.get(fingerprint).copied().unwrap_or(0)
    }

    /// Cumulative attaches across all fingerprints.
    pub(crate) fn total(&self) -> u64 {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total
    }
}

impl Drop for AttachLedger {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("attach ledger worker panicked");
            }
        }
    }
}

fn run(receiver: &Receiver<LedgerEvent>, totals: &Mutex<Totals>) {
    while let Ok(event) = receiver.recv() {
        match event {
            LedgerEvent::Attach(fingerprint) => {
                let mut totals = totals.lock().unwrap_or_else(PoisonError::into_inner);
                *totals.per_fingerprint.entry(fingerprint).or_insert(0) += 1;
                totals.total += 1;
            }
            LedgerEvent::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::trace!("attach ledger worker exiting");
}
