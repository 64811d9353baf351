//! Surface sessions — the per-surface open/closed/busy state machine.
//!
//! A `DisplaySurface` is an opaque UI region owned by someone else; we only
//! show it, hide it, and feed it text. What this module owns is the state
//! machine that decides, for each new trigger, whether to show, hide, or
//! regenerate — so repeated triggers toggle visibility instead of
//! duplicating work. The planner is pure; all I/O happens in the
//! orchestrator.

use tokio_util::sync::CancellationToken;

/// Identity of a display surface. One `SurfaceSession` exists per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    /// The main explanation overlay.
    Overlay,
    /// The free-form prompt overlay (CustomPrompt input + its answers).
    PromptOverlay,
}

impl SurfaceId {
    pub fn name(self) -> &'static str {
        match self {
            SurfaceId::Overlay => "overlay",
            SurfaceId::PromptOverlay => "promptOverlay",
        }
    }
}

/// The consumed UI interface. Implementations must tolerate being called
/// from background tasks.
pub trait DisplaySurface: Send + Sync {
    fn show(&self, id: SurfaceId);
    fn hide(&self, id: SurfaceId);
    fn set_content(&self, id: SurfaceId, text: &str);
    fn append_content(&self, id: SurfaceId, fragment: &str);
}

/// An in-flight, cancellable streaming request. The session counter
/// distinguishes "results I should still apply" from results of a
/// superseded request.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    pub session: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceState {
    Hidden,
    Loading { source: String },
    Showing { source: String, content: String },
}

/// What a new trigger should do to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerPlan {
    /// Nothing to show and nothing retained.
    Ignore,
    /// Re-display the retained content without regenerating.
    Reshow,
    /// Toggle off; cancel any in-flight generation.
    Hide,
    /// Start a fresh generation for this source text.
    Regenerate(String),
}

/// Per-surface session. Mutated only by the orchestrator.
///
/// Invariant: at most one live `GenerationHandle` at any time — beginning a
/// new generation cancels the prior one first.
pub struct SurfaceSession {
    pub state: SurfaceState,
    last_source: Option<String>,
    last_content: Option<String>,
    counter: u64,
    generation: Option<GenerationHandle>,
}

impl Default for SurfaceSession {
    fn default() -> Self {
        Self {
            state: SurfaceState::Hidden,
            last_source: None,
            last_content: None,
            counter: 0,
            generation: None,
        }
    }
}

impl SurfaceSession {
    /// Decide what a trigger with captured text `captured` should do.
    ///
    /// Rules (in order):
    /// 1. Hidden, no capture, nothing retained  → Ignore
    /// 2. Hidden, no capture, retained content  → Reshow
    /// 3. Hidden, capture                       → Regenerate
    /// 4. Visible, capture equals current source → Hide (toggle off)
    /// 5. Visible, capture differs              → Regenerate
    /// A visible surface with no capture also toggles off.
    pub fn plan_trigger(&self, captured: Option<&str>) -> TriggerPlan {
        match (&self.state, captured) {
            (SurfaceState::Hidden, None) => {
                if self.last_content.is_some() {
                    TriggerPlan::Reshow
                } else {
                    TriggerPlan::Ignore
                }
            }
            (SurfaceState::Hidden, Some(text)) => TriggerPlan::Regenerate(text.to_string()),
            (SurfaceState::Loading { source }, Some(text))
            | (SurfaceState::Showing { source, .. }, Some(text)) => {
                if source == text {
                    TriggerPlan::Hide
                } else {
                    TriggerPlan::Regenerate(text.to_string())
                }
            }
            (_, None) => TriggerPlan::Hide,
        }
    }

    /// Cancel the in-flight generation, bump the session counter, and enter
    /// `Loading`. Returns the handle the new generation must carry.
    pub fn begin_generation(&mut self, source: String) -> GenerationHandle {
        self.cancel_generation();
        self.counter += 1;
        let handle = GenerationHandle {
            session: self.counter,
            cancel: CancellationToken::new(),
        };
        self.generation = Some(handle.clone());
        self.state = SurfaceState::Loading {
            source: source.clone(),
        };
        self.last_source = Some(source);
        handle
    }

    /// True when `session` no longer identifies the live generation: it was
    /// superseded, finished, or cancelled (hide and user-close both take the
    /// handle). Stale results are dropped unconditionally — session identity
    /// wins, not arrival time.
    pub fn is_stale(&self, session: u64) -> bool {
        self.generation.as_ref().map(|g| g.session) != Some(session)
    }

    /// First fragment: leave `Loading`, replace any placeholder content.
    pub fn apply_first(&mut self, fragment: &str) {
        let source = self.current_source().unwrap_or_default();
        self.state = SurfaceState::Showing {
            source,
            content: fragment.to_string(),
        };
    }

    /// Subsequent fragment: append, never replace.
    pub fn apply_chunk(&mut self, fragment: &str) {
        if let SurfaceState::Showing { content, .. } = &mut self.state {
            content.push_str(fragment);
        }
    }

    /// Show retained content again without a network call.
    pub fn reshow(&mut self) {
        self.state = SurfaceState::Showing {
            source: self.last_source.clone().unwrap_or_default(),
            content: self.last_content.clone().unwrap_or_default(),
        };
    }

    /// Show the surface for `source` without starting a generation (the
    /// prompt surface waits for user input before any network call).
    pub fn present(&mut self, source: String) {
        self.cancel_generation();
        self.last_source = Some(source.clone());
        self.state = SurfaceState::Showing {
            source,
            content: String::new(),
        };
    }

    /// Hide, cancelling any in-flight work but retaining content for a
    /// later reshow.
    pub fn hide(&mut self) {
        self.cancel_generation();
        if let SurfaceState::Showing { source, content } = &self.state {
            self.last_source = Some(source.clone());
            self.last_content = Some(content.clone());
        }
        self.state = SurfaceState::Hidden;
    }

    /// The stream for `session` ended; drop the handle if it is still ours.
    pub fn finish_generation(&mut self, session: u64) {
        if self
            .generation
            .as_ref()
            .map(|g| g.session == session)
            .unwrap_or(false)
        {
            self.generation = None;
        }
    }

    pub fn cancel_generation(&mut self) {
        if let Some(handle) = self.generation.take() {
            log::debug!("[ORCH] Cancelling generation session {}", handle.session);
            handle.cancel.cancel();
        }
    }

    pub fn current_source(&self) -> Option<String> {
        match &self.state {
            SurfaceState::Loading { source } => Some(source.clone()),
            SurfaceState::Showing { source, .. } => Some(source.clone()),
            SurfaceState::Hidden => self.last_source.clone(),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match &self.state {
            SurfaceState::Showing { content, .. } => Some(content),
            _ => None,
        }
    }
}
