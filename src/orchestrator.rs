//! Orchestrator — the global shortcut dispatcher.
//!
//! One long-lived instance wires the whole reactive loop: hotkey → classify
//! → capture selection → drive the surface state machine → start/cancel
//! streaming generations → publish chunks to the display surface, or paste
//! the result back into the foreign application.
//!
//! Concurrency rules enforced here:
//!   - at most one live generation per surface; a new one cancels the old
//!     one before any state mutation
//!   - chunks apply strictly in arrival order for their session
//!   - chunks carrying a superseded session counter are dropped
//!     unconditionally, even when they arrive late

use crate::clipboard::{TransferChannel, TransferError};
use crate::config::Config;
use crate::llm::types::{GenerateError, PromptIntent, PromptReply, StreamEvent};
use crate::llm::GenerationBackend;
use crate::selection::SelectionService;
use crate::shortcuts::{Operation, ResultPolicy};
use crate::surface::{DisplaySurface, SurfaceId, SurfaceSession, TriggerPlan};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Shown while a generation is in flight, replaced by the first chunk.
const LOADING_PLACEHOLDER: &str = "Thinking…";

pub struct Orchestrator {
    config: Config,
    surfaces: Arc<dyn DisplaySurface>,
    backend: Arc<dyn GenerationBackend>,
    transfer: Arc<dyn TransferChannel>,
    selection: SelectionService,
    sessions: Mutex<HashMap<SurfaceId, SurfaceSession>>,
    /// PermissionDenied is reported once, not on every trigger.
    permission_reported: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        surfaces: Arc<dyn DisplaySurface>,
        backend: Arc<dyn GenerationBackend>,
        transfer: Arc<dyn TransferChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            surfaces,
            backend,
            selection: SelectionService::new(transfer.clone()),
            transfer,
            sessions: Mutex::new(HashMap::new()),
            permission_reported: AtomicBool::new(false),
        })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SurfaceId, SurfaceSession>> {
        // Sessions are only touched under this lock; a poisoned lock means
        // a panicked holder, and the map is still the best state we have.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry point for every recognized shortcut.
    pub async fn handle_trigger(self: &Arc<Self>, op: Operation) {
        log::info!("[ORCH] Trigger: {}", op.label());
        // CustomPrompt opens the prompt surface first; its reply decides
        // between display and replace later, in submit_prompt.
        if op == Operation::CustomPrompt {
            return self.run_prompt_trigger().await;
        }
        match op.policy() {
            ResultPolicy::Replace => self.run_replace(op).await,
            ResultPolicy::Display => self.run_display(op).await,
        }
    }

    /// The user closed a surface directly. Always forces Hidden and cancels
    /// in-flight work, but keeps the content for a later re-show.
    pub fn handle_surface_closed(&self, id: SurfaceId) {
        log::info!("[ORCH] Surface {} closed by user", id.name());
        let mut sessions = self.sessions();
        sessions.entry(id).or_default().hide();
        self.surfaces.hide(id);
    }

    // ── Display-style operations ─────────────────────────────────────

    async fn run_display(self: &Arc<Self>, op: Operation) {
        let Some(captured) = self.capture_selection().await else {
            // Permission failure, already reported.
            return;
        };
        let id = SurfaceId::Overlay;

        let plan = self
            .sessions()
            .entry(id)
            .or_default()
            .plan_trigger(captured.as_deref());

        match plan {
            TriggerPlan::Ignore => {
                log::debug!("[ORCH] Nothing selected and nothing to re-show");
            }
            TriggerPlan::Reshow => {
                log::info!("[ORCH] Re-showing retained content (no new request)");
                let mut sessions = self.sessions();
                let session = sessions.entry(id).or_default();
                session.reshow();
                if let Some(content) = session.content() {
                    self.surfaces.set_content(id, content);
                }
                self.surfaces.show(id);
            }
            TriggerPlan::Hide => {
                log::info!("[ORCH] Toggling {} off", id.name());
                self.sessions().entry(id).or_default().hide();
                self.surfaces.hide(id);
            }
            TriggerPlan::Regenerate(text) => {
                self.start_stream(id, op, text).await;
            }
        }
    }

    /// Begin a streaming generation for `id`, superseding any prior one.
    async fn start_stream(self: &Arc<Self>, id: SurfaceId, op: Operation, text: String) {
        let handle = {
            let mut sessions = self.sessions();
            let handle = sessions.entry(id).or_default().begin_generation(text.clone());
            self.surfaces.set_content(id, LOADING_PLACEHOLDER);
            self.surfaces.show(id);
            handle
        };
        log::info!(
            "[ORCH] Session {} on {}: {} ({} chars)",
            handle.session,
            id.name(),
            op.label(),
            text.len()
        );

        let rx = match self
            .backend
            .stream(op, &text, handle.cancel.clone())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_session(id, handle.session, &e);
                return;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            this.pump_into_surface(id, handle.session, rx).await;
        });
    }

    /// Apply stream events to the surface in arrival order, dropping
    /// anything that belongs to a superseded session.
    async fn pump_into_surface(
        &self,
        id: SurfaceId,
        session: u64,
        mut rx: tokio::sync::mpsc::Receiver<StreamEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            let mut sessions = self.sessions();
            let state = sessions.entry(id).or_default();
            if state.is_stale(session) {
                log::debug!("[ORCH] Dropping event for stale session {}", session);
                return;
            }
            match event {
                StreamEvent::First(fragment) => {
                    state.apply_first(&fragment);
                    self.surfaces.set_content(id, &fragment);
                }
                StreamEvent::Chunk(fragment) => {
                    state.apply_chunk(&fragment);
                    self.surfaces.append_content(id, &fragment);
                }
                StreamEvent::Done => {
                    state.finish_generation(session);
                    log::info!("[ORCH] Session {} complete", session);
                    return;
                }
            }
        }
        // Channel closed without a done marker (stream died or cancelled).
        self.sessions().entry(id).or_default().finish_generation(session);
    }

    // ── Replace-style operations ─────────────────────────────────────

    /// Capture → non-streaming generate → paste back. No surface is shown
    /// at any point; feedback only on error.
    async fn run_replace(self: &Arc<Self>, op: Operation) {
        let Some(captured) = self.capture_selection().await else {
            return;
        };
        let Some(text) = captured else {
            log::info!("[ORCH] No selection — {} skipped", op.label());
            return;
        };

        match self
            .backend
            .generate(op, &text, None, CancellationToken::new())
            .await
        {
            Ok(result) => self.paste_result(result).await,
            Err(GenerateError::Cancelled) => {}
            Err(e) => {
                log::error!("[ORCH] {} failed: {}", op.label(), self.error_content(&e));
            }
        }
    }

    async fn paste_result(&self, text: String) {
        let transfer = self.transfer.clone();
        let outcome = tokio::task::spawn_blocking(move || transfer.paste_back(&text)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // The user has no surface to see this on; it must be loud
                // in the log and flashed by whoever owns notifications.
                log::error!("[PASTE] Paste-back failed: {}", e);
                self.report_permission(&e);
            }
            Err(e) => log::error!("[PASTE] Paste task panicked: {}", e),
        }
    }

    // ── CustomPrompt ─────────────────────────────────────────────────

    /// The CustomPrompt hotkey presents the prompt surface primed with the
    /// captured text; no network call happens until the user submits.
    async fn run_prompt_trigger(self: &Arc<Self>) {
        let Some(captured) = self.capture_selection().await else {
            return;
        };
        let id = SurfaceId::PromptOverlay;

        let plan = self
            .sessions()
            .entry(id)
            .or_default()
            .plan_trigger(captured.as_deref());

        match plan {
            TriggerPlan::Ignore => {}
            TriggerPlan::Reshow => {
                let mut sessions = self.sessions();
                let session = sessions.entry(id).or_default();
                session.reshow();
                if let Some(content) = session.content() {
                    self.surfaces.set_content(id, content);
                }
                self.surfaces.show(id);
            }
            TriggerPlan::Hide => {
                self.sessions().entry(id).or_default().hide();
                self.surfaces.hide(id);
            }
            TriggerPlan::Regenerate(text) => {
                log::info!("[ORCH] Prompt surface primed with {} chars", text.len());
                self.sessions().entry(id).or_default().present(text);
                self.surfaces.set_content(id, "");
                self.surfaces.show(id);
            }
        }
    }

    /// The user submitted a free-form prompt about the primed text.
    ///
    /// The model classifies its own reply: a "question" answer is displayed
    /// on the main overlay; a "generate" answer is pasted back. Either way
    /// the reply must satisfy the two-field schema first.
    pub async fn submit_prompt(self: &Arc<Self>, prompt: String) {
        let id = SurfaceId::PromptOverlay;
        let (source, handle) = {
            let mut sessions = self.sessions();
            let session = sessions.entry(id).or_default();
            let Some(source) = session.current_source() else {
                log::warn!("[ORCH] Prompt submitted with no primed text");
                return;
            };
            let handle = session.begin_generation(source.clone());
            self.surfaces.set_content(id, LOADING_PLACEHOLDER);
            (source, handle)
        };

        let reply = self
            .backend
            .generate(
                Operation::CustomPrompt,
                &source,
                Some(&prompt),
                handle.cancel.clone(),
            )
            .await
            .and_then(|raw| PromptReply::parse(&raw));

        // Anything that arrives for a superseded or cancelled submission is
        // dropped — a user-close mid-flight must suppress the paste-back.
        {
            let mut sessions = self.sessions();
            let session = sessions.entry(id).or_default();
            if session.is_stale(handle.session) {
                log::debug!("[ORCH] Dropping reply for stale prompt session");
                return;
            }
            session.finish_generation(handle.session);
        }

        match reply {
            Ok(PromptReply {
                intent: PromptIntent::Question,
                response,
            }) => {
                // Display-style result: close the prompt, show the answer
                // on the main overlay keyed to the same source text.
                let mut sessions = self.sessions();
                sessions.entry(id).or_default().hide();
                self.surfaces.hide(id);

                let overlay = sessions.entry(SurfaceId::Overlay).or_default();
                overlay.present(source);
                overlay.apply_first(&response);
                self.surfaces.set_content(SurfaceId::Overlay, &response);
                self.surfaces.show(SurfaceId::Overlay);
            }
            Ok(PromptReply {
                intent: PromptIntent::Generate,
                response,
            }) => {
                // Replace-style result: the prompt surface goes away and
                // the text lands in the foreign application.
                self.sessions().entry(id).or_default().hide();
                self.surfaces.hide(id);
                self.paste_result(response).await;
            }
            Err(GenerateError::Cancelled) => {}
            Err(e) => {
                // Schema violations and transport failures alike become
                // inline prompt-surface content; nothing is ever pasted.
                let message = self.error_content(&e);
                log::warn!("[ORCH] Prompt generation failed: {}", message);
                let mut sessions = self.sessions();
                sessions.entry(id).or_default().apply_first(&message);
                self.surfaces.set_content(id, &message);
            }
        }
    }

    // ── Shared plumbing ──────────────────────────────────────────────

    /// Capture the current selection. `None` (outer) means the pipeline
    /// must stop because of a permission failure; `Some(None)` means the
    /// capture worked but nothing was selected.
    async fn capture_selection(&self) -> Option<Option<String>> {
        match self.selection.capture().await {
            Ok(snapshot) => Some(snapshot.map(|s| s.text)),
            Err(e) => {
                self.report_permission(&e);
                None
            }
        }
    }

    fn report_permission(&self, e: &TransferError) {
        match e {
            TransferError::PermissionDenied => {
                if !self.permission_reported.swap(true, Ordering::Relaxed) {
                    log::error!("[ORCH] {}", e);
                }
            }
            other => log::error!("[ORCH] Clipboard failure: {}", other),
        }
    }

    /// Inline error text shown on the active surface, with enough of a
    /// remediation hint that the user can act on it.
    fn fail_session(&self, id: SurfaceId, session: u64, e: &GenerateError) {
        if matches!(e, GenerateError::Cancelled) {
            return;
        }
        let message = self.error_content(e);
        log::error!("[ORCH] Session {} failed: {}", session, message);
        let mut sessions = self.sessions();
        let state = sessions.entry(id).or_default();
        if state.is_stale(session) {
            return;
        }
        state.apply_first(&message);
        state.finish_generation(session);
        self.surfaces.set_content(id, &message);
    }

    fn error_content(&self, e: &GenerateError) -> String {
        match e {
            GenerateError::InvalidEndpoint(detail) => format!(
                "Invalid Ollama endpoint ({detail}). Check GLINT_OLLAMA_URL."
            ),
            GenerateError::Unreachable(_) | GenerateError::Timeout => format!(
                "Can't reach Ollama at {}. Is `ollama serve` running?",
                self.config.endpoint
            ),
            GenerateError::ServerError { status, body } => format!(
                "Ollama returned HTTP {status}: {}. Try `ollama pull {}`.",
                body.chars().take(200).collect::<String>(),
                self.config.model
            ),
            GenerateError::MalformedResponse(detail) => {
                format!("Ollama sent an unreadable response ({detail}).")
            }
            GenerateError::SchemaViolation(_) => {
                "The model's reply didn't match the expected format. Try rephrasing your request."
                    .to_string()
            }
            GenerateError::Cancelled => String::new(),
        }
    }
}
