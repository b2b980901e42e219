//! The analytics lane: runs risk scoring off the interactive lane.
//!
//! Requests carry a `RequestId`. When several requests are queued the lane
//! skips straight to the newest one, so superseded runs that have not
//! started yet are never computed. A run that is already executing when a
//! newer request arrives still completes; the coordinator discards it.

use crate::{
    message::{panic_message, LaneMessage, LaneSender},
    risk::run_analytics,
    transaction::Transaction,
    types::RequestId,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

pub struct AnalyticsRequest {
    pub request_id: RequestId,
    pub records: Vec<Transaction>,
}

enum AnalyticsCommand {
    Run(AnalyticsRequest),
    Shutdown,
}

pub struct AnalyticsLane {
    commands: Sender<AnalyticsCommand>,
    handle: Option<JoinHandle<()>>,
}

impl AnalyticsLane {
    pub fn spawn(outbox: LaneSender) -> std::io::Result<Self> {
        let (commands, inbox) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("ledger-analytics".to_string())
            .spawn(move || run(inbox, outbox))?;
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    /// Queue a run. Returns false if the lane has already exited.
    pub fn dispatch(&self, request: AnalyticsRequest) -> bool {
        self.commands.send(AnalyticsCommand::Run(request)).is_ok()
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(AnalyticsCommand::Shutdown);
            if handle.join().is_err() {
                log::error!("analytics lane panicked during shutdown");
            }
        }
    }
}

impl Drop for AnalyticsLane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(inbox: Receiver<AnalyticsCommand>, outbox: LaneSender) {
    while let Ok(command) = inbox.recv() {
        let mut request = match command {
            AnalyticsCommand::Run(request) => request,
            AnalyticsCommand::Shutdown => return,
        };

        // Coalesce: only the newest queued request is worth computing.
        loop {
            match inbox.try_recv() {
                Ok(AnalyticsCommand::Run(newer)) => {
                    log::debug!("analytics: {} superseded by {}", request.request_id, newer.request_id);
                    request = newer;
                }
                Ok(AnalyticsCommand::Shutdown) => return,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        let AnalyticsRequest { request_id, records } = request;
        let message = match panic::catch_unwind(AssertUnwindSafe(|| run_analytics(&records))) {
            Ok(analytics) => LaneMessage::AnalyticsCompleted { request_id, analytics },
            Err(payload) => {
                let error = panic_message(payload.as_ref());
                log::error!("analytics: {request_id} failed: {error}");
                LaneMessage::AnalyticsFailed { request_id, error }
            }
        };
        if outbox.send(message).is_err() {
            return;
        }
    }
}
