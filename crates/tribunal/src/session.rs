//! Shared handle to a running session.
//!
//! Transport tasks hold clones of a [`SessionHandle`]. Beat loops are
//! serialized twice over: the orchestrator sits behind an async mutex, and an
//! in-progress flag rejects a second loop outright instead of queueing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::case::CaseState;
use crate::channel::OutputChannel;
use crate::error::TribunalError;
use crate::orchestrator::{BeatOutcome, CaseOrchestrator};
use crate::persona::PersonaId;

/// Cloneable handle to one [`CaseOrchestrator`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    orchestrator: Arc<Mutex<CaseOrchestrator>>,
    busy: Arc<AtomicBool>,
}

/// Clears the in-progress flag when the loop ends, including on error.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, TribunalError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| TribunalError::BeatInProgress)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionHandle {
    pub fn new(orchestrator: CaseOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a beat loop is running right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Logs a human message and runs the AI window it opens.
    ///
    /// Fails with [`TribunalError::BeatInProgress`] while another loop runs;
    /// the message is not logged in that case.
    pub async fn handle_human_message(
        &self,
        text: impl Into<String>,
        budget: Option<usize>,
    ) -> Result<Vec<BeatOutcome>, TribunalError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let mut orchestrator = self.orchestrator.lock().await;
        orchestrator.receive_human_message(text, budget);
        orchestrator.run_window().await
    }

    /// Opens a system-initiated AI window and runs it.
    pub async fn open_window(
        &self,
        turns: usize,
        announcement: Option<String>,
    ) -> Result<Vec<BeatOutcome>, TribunalError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        debug!(target: "tribunal::session", turns, "opening system window");
        let mut orchestrator = self.orchestrator.lock().await;
        orchestrator.open_window(turns, announcement);
        orchestrator.run_window().await
    }

    pub async fn bind_persona_channel(
        &self,
        id: PersonaId,
        channel: Arc<dyn OutputChannel>,
    ) -> Result<(), TribunalError> {
        self.orchestrator.lock().await.bind_persona_channel(id, channel)
    }

    /// Snapshot of the case. Waits for a running loop to finish.
    pub async fn state(&self) -> CaseState {
        self.orchestrator.lock().await.get_case_state()
    }
}
