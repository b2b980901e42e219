//! The store lane: a dedicated thread that owns the SQLite connection.
//!
//! Writes are queued and applied one batch at a time, so a batch and its
//! eviction can never interleave with another batch. Completions go to the
//! coordinator inbox; reads reply on a per-request channel the caller awaits.

use super::TransactionStore;
use crate::{
    config::StoreConfig,
    error::{LedgerError, LedgerResult},
    message::{Lane, LaneMessage, LaneSender},
    transaction::{SortField, SortOrder, Transaction},
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

pub enum StoreCommand {
    Add {
        batch_id: u64,
        records: Vec<Transaction>,
    },
    Count {
        reply: Sender<LedgerResult<usize>>,
    },
    Page {
        offset: usize,
        limit: usize,
        field: SortField,
        order: SortOrder,
        reply: Sender<LedgerResult<Vec<Transaction>>>,
    },
    Search {
        query: String,
        limit: Option<usize>,
        reply: Sender<LedgerResult<Vec<Transaction>>>,
    },
    Shutdown,
}

pub struct StoreLane {
    commands: Sender<StoreCommand>,
    handle: Option<JoinHandle<()>>,
    next_batch: u64,
}

impl StoreLane {
    /// Start the lane and wait for `init` to finish on it.
    /// An init failure is returned here and the lane is torn down.
    pub fn spawn(config: StoreConfig, outbox: LaneSender) -> LedgerResult<Self> {
        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("ledger-store".to_string())
            .spawn(move || {
                let mut store = TransactionStore::new(config);
                if let Err(err) = store.init() {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                run(store, inbox, outbox);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands,
                handle: Some(handle),
                next_batch: 0,
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(LedgerError::LaneDisconnected { lane: "store" })
            }
        }
    }

    /// Queue a batch for persistence. Returns the batch id echoed in
    /// the `BatchStored` completion.
    pub fn submit(&mut self, records: Vec<Transaction>) -> LedgerResult<u64> {
        let batch_id = self.next_batch;
        self.next_batch += 1;
        self.commands
            .send(StoreCommand::Add { batch_id, records })
            .map_err(|_| disconnected())?;
        Ok(batch_id)
    }

    pub fn count(&self) -> LedgerResult<usize> {
        self.request(|reply| StoreCommand::Count { reply })
    }

    pub fn page(
        &self,
        offset: usize,
        limit: usize,
        field: SortField,
        order: SortOrder,
    ) -> LedgerResult<Vec<Transaction>> {
        self.request(|reply| StoreCommand::Page { offset, limit, field, order, reply })
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> LedgerResult<Vec<Transaction>> {
        let query = query.to_string();
        self.request(|reply| StoreCommand::Search { query, limit, reply })
    }

    /// Reads queue behind pending writes, so they observe every batch
    /// submitted before them.
    fn request<T>(
        &self,
        build: impl FnOnce(Sender<LedgerResult<T>>) -> StoreCommand,
    ) -> LedgerResult<T> {
        let (reply, response) = mpsc::channel();
        self.commands.send(build(reply)).map_err(|_| disconnected())?;
        response.recv().map_err(|_| disconnected())?
    }

    /// Flush queued writes, close the connection, and join the thread.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(StoreCommand::Shutdown);
            if handle.join().is_err() {
                log::error!("store lane panicked during shutdown");
            }
        }
    }
}

impl Drop for StoreLane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn disconnected() -> LedgerError {
    LedgerError::LaneDisconnected { lane: "store" }
}

fn run(mut store: TransactionStore, inbox: Receiver<StoreCommand>, outbox: LaneSender) {
    for command in inbox {
        match command {
            StoreCommand::Add { batch_id, records } => {
                let message = match store.add(&records) {
                    Ok(outcome) => LaneMessage::BatchStored { batch_id, outcome },
                    Err(err) => {
                        log::error!("store: batch {batch_id} ({} records) failed: {err}", records.len());
                        LaneMessage::LaneFailed {
                            lane: Lane::Store,
                            error: err.to_string(),
                        }
                    }
                };
                // The coordinator may already be gone; its writes still land.
                let _ = outbox.send(message);
            }
            StoreCommand::Count { reply } => {
                let _ = reply.send(store.count());
            }
            StoreCommand::Page { offset, limit, field, order, reply } => {
                let _ = reply.send(store.page(offset, limit, field, order));
            }
            StoreCommand::Search { query, limit, reply } => {
                let _ = reply.send(store.search(&query, limit));
            }
            StoreCommand::Shutdown => break,
        }
    }
    if let Err(err) = store.close() {
        log::warn!("store: close failed: {err}");
    }
}
