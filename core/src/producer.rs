//! Background generation lanes.
//!
//! `Producer` is the polling lane: once started it generates a batch
//! immediately and then on every interval, until stopped. Stopping joins
//! the thread, so no lane outlives `stop()`. Batches already sent before
//! the stop may still arrive at the coordinator.
//!
//! `BulkGeneration` streams the initial dataset in fixed-size chunks, in
//! increasing index order, and stops early when its handle is dropped.

use crate::{
    generator::TransactionGenerator,
    message::{panic_message, Lane, LaneMessage, LaneSender},
    rng::{LaneSlot, RngBank},
};
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum ProducerCommand {
    GenerateNow,
    Stop,
}

struct PollingWorker {
    commands: Sender<ProducerCommand>,
    handle: JoinHandle<()>,
}

pub struct Producer {
    bank: RngBank,
    currency: String,
    batch_size: usize,
    outbox: LaneSender,
    worker: Option<PollingWorker>,
    one_shot: Option<JoinHandle<()>>,
    /// Number of lanes started so far; picks a fresh RNG stream per lane.
    generation: u64,
}

impl Producer {
    pub fn new(bank: RngBank, currency: impl Into<String>, batch_size: usize, outbox: LaneSender) -> Self {
        Self {
            bank,
            currency: currency.into(),
            batch_size,
            outbox,
            worker: None,
            one_shot: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start polling every `interval`. A running lane is stopped first.
    pub fn start(&mut self, interval: Duration) -> std::io::Result<()> {
        self.stop();

        let generator = self.next_generator(LaneSlot::Producer);
        let batch_size = self.batch_size;
        let outbox = self.outbox.clone();
        let (commands, inbox) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("ledger-producer".to_string())
            .spawn(move || poll_loop(generator, batch_size, interval, inbox, outbox))?;

        self.worker = Some(PollingWorker { commands, handle });
        log::info!("producer started (interval={}ms, batch={})", interval.as_millis(), self.batch_size);
        Ok(())
    }

    /// Cancel the interval and join the lane. No-op when not running.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(ProducerCommand::Stop);
            if worker.handle.join().is_err() {
                log::error!("producer lane panicked");
            }
            log::info!("producer stopped");
        }
    }

    /// Generate one batch out of band. Uses the polling lane when it is
    /// running, otherwise a short-lived lane of its own.
    pub fn generate_now(&mut self) -> std::io::Result<()> {
        if let Some(worker) = &self.worker {
            if worker.commands.send(ProducerCommand::GenerateNow).is_ok() {
                return Ok(());
            }
        }

        if let Some(previous) = self.one_shot.take() {
            let _ = previous.join();
        }
        let mut generator = self.next_generator(LaneSlot::OneShot);
        let batch_size = self.batch_size;
        let outbox = self.outbox.clone();
        let handle = thread::Builder::new()
            .name("ledger-one-shot".to_string())
            .spawn(move || {
                let _ = emit_batch(&mut generator, batch_size, &outbox);
            })?;
        self.one_shot = Some(handle);
        Ok(())
    }

    fn next_generator(&mut self, slot: LaneSlot) -> TransactionGenerator {
        let rng = self.bank.for_lane(slot, self.generation);
        self.generation += 1;
        TransactionGenerator::new(rng, self.currency.clone())
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.one_shot.take() {
            let _ = handle.join();
        }
    }
}

fn poll_loop(
    mut generator: TransactionGenerator,
    batch_size: usize,
    interval: Duration,
    inbox: mpsc::Receiver<ProducerCommand>,
    outbox: LaneSender,
) {
    if outbox.send(LaneMessage::PollingStarted { interval }).is_err() {
        return;
    }
    if !emit_batch(&mut generator, batch_size, &outbox) {
        return;
    }

    let mut next_tick = Instant::now() + interval;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match inbox.recv_timeout(wait) {
            Ok(ProducerCommand::GenerateNow) => {
                if !emit_batch(&mut generator, batch_size, &outbox) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !emit_batch(&mut generator, batch_size, &outbox) {
                    return;
                }
                next_tick += interval;
            }
            Ok(ProducerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = outbox.send(LaneMessage::PollingStopped);
}

/// Generate and deliver one batch. Returns false once the coordinator
/// inbox is gone and the lane should exit.
fn emit_batch(generator: &mut TransactionGenerator, batch_size: usize, outbox: &LaneSender) -> bool {
    let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(batch_size)));
    let message = match result {
        Ok(records) => LaneMessage::NewTransactions {
            records,
            generated_at: Utc::now(),
        },
        Err(payload) => {
            let error = panic_message(payload.as_ref());
            log::error!("producer: generation failed: {error}");
            LaneMessage::LaneFailed { lane: Lane::Producer, error }
        }
    };
    outbox.send(message).is_ok()
}

// ── Bulk generation ──────────────────────────────────────────────────────────

pub struct BulkGeneration {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BulkGeneration {
    pub fn spawn(
        mut generator: TransactionGenerator,
        total: usize,
        chunk_size: usize,
        outbox: LaneSender,
    ) -> std::io::Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("ledger-bulk".to_string())
            .spawn(move || {
                let anchor = Utc::now();
                let mut index = 0;
                while index < total {
                    match cancelled.try_recv() {
                        Err(TryRecvError::Empty) => {}
                        _ => {
                            log::info!("bulk generation cancelled at {index}/{total}");
                            return;
                        }
                    }
                    let size = chunk_size.min(total - index);
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| generator.generate_at(size, anchor)));
                    let message = match result {
                        Ok(records) => LaneMessage::TransactionChunk { index, total, records },
                        Err(payload) => {
                            let _ = outbox.send(LaneMessage::LaneFailed {
                                lane: Lane::Bulk,
                                error: panic_message(payload.as_ref()),
                            });
                            return;
                        }
                    };
                    if outbox.send(message).is_err() {
                        return;
                    }
                    index += size;
                }
                let _ = outbox.send(LaneMessage::GenerationCompleted { total });
            })?;
        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    /// Stop after the chunk in progress and join the lane.
    pub fn cancel(&mut self) {
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BulkGeneration {
    fn drop(&mut self) {
        self.cancel();
    }
}
