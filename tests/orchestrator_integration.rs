//! Integration tests for the orchestrator — the full trigger pipeline with
//! fakes at every seam (surface, generation backend, clipboard channel).
//!
//! No network, no OS clipboard: these tests pin the state-machine laws the
//! app depends on — toggling, session monotonicity, streaming order, and
//! the replace-style paste-back path.

use async_trait::async_trait;
use glint::clipboard::{TransferChannel, TransferError};
use glint::llm::types::{GenerateError, StreamEvent};
use glint::llm::GenerationBackend;
use glint::orchestrator::Orchestrator;
use glint::shortcuts::Operation;
use glint::surface::{DisplaySurface, SurfaceId};
use glint::Config;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
struct SurfaceView {
    visible: bool,
    content: String,
}

#[derive(Default)]
struct FakeSurface {
    views: Mutex<HashMap<SurfaceId, SurfaceView>>,
    ever_shown: Mutex<HashSet<SurfaceId>>,
}

impl FakeSurface {
    fn content(&self, id: SurfaceId) -> String {
        self.views
            .lock()
            .unwrap()
            .get(&id)
            .map(|v| v.content.clone())
            .unwrap_or_default()
    }

    fn visible(&self, id: SurfaceId) -> bool {
        self.views
            .lock()
            .unwrap()
            .get(&id)
            .map(|v| v.visible)
            .unwrap_or(false)
    }

    fn was_ever_shown(&self, id: SurfaceId) -> bool {
        self.ever_shown.lock().unwrap().contains(&id)
    }
}

impl DisplaySurface for FakeSurface {
    fn show(&self, id: SurfaceId) {
        self.views.lock().unwrap().entry(id).or_default().visible = true;
        self.ever_shown.lock().unwrap().insert(id);
    }

    fn hide(&self, id: SurfaceId) {
        self.views.lock().unwrap().entry(id).or_default().visible = false;
    }

    fn set_content(&self, id: SurfaceId, text: &str) {
        self.views.lock().unwrap().entry(id).or_default().content = text.to_string();
    }

    fn append_content(&self, id: SurfaceId, fragment: &str) {
        self.views
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .content
            .push_str(fragment);
    }
}

/// Scripted clipboard channel: `selection` is what a synthetic copy would
/// pick up; pastes are recorded. The real save/restore bracket is covered
/// by the clipboard module's own tests.
#[derive(Default)]
struct FakeTransfer {
    selection: Mutex<Option<String>>,
    clipboard: Mutex<Option<String>>,
    pasted: Mutex<Vec<String>>,
}

impl FakeTransfer {
    fn select(&self, text: &str) {
        *self.selection.lock().unwrap() = Some(text.to_string());
    }

    fn clear_selection(&self) {
        *self.selection.lock().unwrap() = None;
    }

    fn pasted(&self) -> Vec<String> {
        self.pasted.lock().unwrap().clone()
    }

    fn clipboard(&self) -> Option<String> {
        self.clipboard.lock().unwrap().clone()
    }
}

impl TransferChannel for FakeTransfer {
    fn capture_via_copy(&self) -> Result<Option<String>, TransferError> {
        Ok(self.selection.lock().unwrap().clone())
    }

    fn paste_back(&self, text: &str) -> Result<(), TransferError> {
        self.pasted.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Clone)]
struct ScriptChunk {
    text: &'static str,
    delay: Duration,
}

fn chunks(texts: &[&'static str]) -> Vec<ScriptChunk> {
    texts
        .iter()
        .map(|t| ScriptChunk {
            text: t,
            delay: Duration::ZERO,
        })
        .collect()
}

fn slow_chunks(texts: &[&'static str], delay_ms: u64) -> Vec<ScriptChunk> {
    texts
        .iter()
        .map(|t| ScriptChunk {
            text: t,
            delay: Duration::from_millis(delay_ms),
        })
        .collect()
}

/// Generation backend with per-source-text stream scripts and a FIFO of
/// non-streaming replies.
#[derive(Default)]
struct FakeBackend {
    streams: Mutex<HashMap<String, Vec<ScriptChunk>>>,
    replies: Mutex<Vec<Result<String, GenerateError>>>,
    stream_error: Mutex<Option<GenerateError>>,
    reply_delay: Mutex<Duration>,
    /// Model a producer that never consults its cancellation token, so
    /// tests can prove the consumer side drops stale results on its own.
    ignore_cancel: AtomicBool,
    stream_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl FakeBackend {
    fn script_stream(&self, source: &str, script: Vec<ScriptChunk>) {
        self.streams.lock().unwrap().insert(source.to_string(), script);
    }

    fn push_reply(&self, reply: Result<String, GenerateError>) {
        self.replies.lock().unwrap().push(reply);
    }

    fn fail_next_stream(&self, e: GenerateError) {
        *self.stream_error.lock().unwrap() = Some(e);
    }

    fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    fn set_ignore_cancel(&self) {
        self.ignore_cancel.store(true, Ordering::SeqCst);
    }

    fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate(
        &self,
        _op: Operation,
        _text: &str,
        _user_prompt: Option<&str>,
        _cancel: CancellationToken,
    ) -> Result<String, GenerateError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reply_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(String::new());
        }
        replies.remove(0)
    }

    async fn stream(
        &self,
        _op: Operation,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, GenerateError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.stream_error.lock().unwrap().take() {
            return Err(e);
        }

        let script = self
            .streams
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_default();
        let ignore_cancel = self.ignore_cancel.load(Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut first = true;
            for chunk in script {
                if ignore_cancel {
                    tokio::time::sleep(chunk.delay).await;
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(chunk.delay) => {}
                    }
                }
                let event = if first {
                    first = false;
                    StreamEvent::First(chunk.text.to_string())
                } else {
                    StreamEvent::Chunk(chunk.text.to_string())
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });
        Ok(rx)
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    orchestrator: Arc<Orchestrator>,
    surface: Arc<FakeSurface>,
    backend: Arc<FakeBackend>,
    transfer: Arc<FakeTransfer>,
}

fn harness() -> Harness {
    let surface = Arc::new(FakeSurface::default());
    let backend = Arc::new(FakeBackend::default());
    let transfer = Arc::new(FakeTransfer::default());
    let orchestrator = Orchestrator::new(
        Config::default(),
        surface.clone(),
        backend.clone(),
        transfer.clone(),
    );
    Harness {
        orchestrator,
        surface,
        backend,
        transfer,
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for: {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Display-style pipeline ───────────────────────────────────────────

#[tokio::test]
async fn explain_streams_chunks_into_overlay_in_order() {
    let h = harness();
    *h.transfer.clipboard.lock().unwrap() = Some("prior clipboard".to_string());
    h.transfer.select("The quick brown fox");
    h.backend
        .script_stream("The quick brown fox", chunks(&["The", " fox", " jumps."]));

    h.orchestrator.handle_trigger(Operation::Explain).await;

    // Loading placeholder is set synchronously, before any chunk lands.
    assert!(h.surface.visible(SurfaceId::Overlay));

    wait_until("final overlay content", || {
        h.surface.content(SurfaceId::Overlay) == "The fox jumps."
    })
    .await;

    // Order preserved exactly, no reordering, no dedup.
    assert_eq!(h.surface.content(SurfaceId::Overlay), "The fox jumps.");
    assert_eq!(h.transfer.clipboard().as_deref(), Some("prior clipboard"));
    assert_eq!(h.transfer.pasted().len(), 0);
}

#[tokio::test]
async fn streaming_order_is_exact() {
    let h = harness();
    h.transfer.select("src");
    h.backend.script_stream("src", chunks(&["Hel", "lo, ", "world"]));

    h.orchestrator.handle_trigger(Operation::Summarize).await;
    wait_until("assembled greeting", || {
        h.surface.content(SurfaceId::Overlay) == "Hello, world"
    })
    .await;
}

#[tokio::test]
async fn same_text_toggles_off_and_reshows_without_new_request() {
    let h = harness();
    h.transfer.select("abc");
    h.backend.script_stream("abc", chunks(&["answer"]));

    h.orchestrator.handle_trigger(Operation::Explain).await;
    wait_until("first answer", || {
        h.surface.content(SurfaceId::Overlay) == "answer"
    })
    .await;
    assert_eq!(h.backend.stream_calls(), 1);

    // Same selection again: toggle off.
    h.orchestrator.handle_trigger(Operation::Explain).await;
    assert!(!h.surface.visible(SurfaceId::Overlay));

    // Nothing selected: re-show the retained content, no network call.
    h.transfer.clear_selection();
    h.orchestrator.handle_trigger(Operation::Explain).await;
    assert!(h.surface.visible(SurfaceId::Overlay));
    assert_eq!(h.surface.content(SurfaceId::Overlay), "answer");
    assert_eq!(h.backend.stream_calls(), 1);
}

#[tokio::test]
async fn hidden_with_no_selection_and_no_history_is_a_noop() {
    let h = harness();
    h.transfer.clear_selection();
    h.orchestrator.handle_trigger(Operation::Explain).await;

    assert!(!h.surface.was_ever_shown(SurfaceId::Overlay));
    assert_eq!(h.backend.stream_calls(), 0);
}

#[tokio::test]
async fn superseding_trigger_discards_stale_session_chunks() {
    let h = harness();
    h.backend.script_stream("a", slow_chunks(&["A1", "A2", "A3"], 30));
    h.backend.script_stream("b", chunks(&["B1", "B2"]));

    h.transfer.select("a");
    h.orchestrator.handle_trigger(Operation::Explain).await;
    h.transfer.select("b");
    h.orchestrator.handle_trigger(Operation::Explain).await;

    wait_until("b session output", || {
        h.surface.content(SurfaceId::Overlay) == "B1B2"
    })
    .await;

    // Give any straggling "a" chunks time to arrive; they must be dropped.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.surface.content(SurfaceId::Overlay), "B1B2");
    assert!(!h.surface.content(SurfaceId::Overlay).contains('A'));
}

#[tokio::test]
async fn generation_failure_becomes_inline_surface_content() {
    let h = harness();
    h.transfer.select("text");
    h.backend
        .fail_next_stream(GenerateError::Unreachable("connection refused".into()));

    h.orchestrator.handle_trigger(Operation::Explain).await;

    let content = h.surface.content(SurfaceId::Overlay);
    assert!(
        content.contains("Can't reach Ollama"),
        "unexpected content: {content}"
    );
    assert!(h.surface.visible(SurfaceId::Overlay));
}

#[tokio::test]
async fn toggling_off_mid_stream_suppresses_in_flight_fragments() {
    let h = harness();
    // The producer never looks at its cancellation token; the orchestrator
    // must drop the fragments on its own once the surface is hidden.
    h.backend.set_ignore_cancel();
    h.backend.script_stream("a", slow_chunks(&["A1", "A2", "A3"], 40));
    h.transfer.select("a");

    h.orchestrator.handle_trigger(Operation::Explain).await;
    wait_until("first fragment", || {
        h.surface.content(SurfaceId::Overlay) == "A1"
    })
    .await;

    // Same selection while streaming: toggle off.
    h.orchestrator.handle_trigger(Operation::Explain).await;
    assert!(!h.surface.visible(SurfaceId::Overlay));

    // The remaining fragments arrive anyway; none may touch the surface.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.surface.content(SurfaceId::Overlay), "A1");
    assert!(!h.surface.visible(SurfaceId::Overlay));
}

#[tokio::test]
async fn user_close_hides_but_preserves_content() {
    let h = harness();
    h.transfer.select("abc");
    h.backend.script_stream("abc", chunks(&["kept"]));

    h.orchestrator.handle_trigger(Operation::Explain).await;
    wait_until("content", || h.surface.content(SurfaceId::Overlay) == "kept").await;

    h.orchestrator.handle_surface_closed(SurfaceId::Overlay);
    assert!(!h.surface.visible(SurfaceId::Overlay));

    h.transfer.clear_selection();
    h.orchestrator.handle_trigger(Operation::Explain).await;
    assert!(h.surface.visible(SurfaceId::Overlay));
    assert_eq!(h.surface.content(SurfaceId::Overlay), "kept");
    assert_eq!(h.backend.stream_calls(), 1);
}

// ── Replace-style pipeline ───────────────────────────────────────────

#[tokio::test]
async fn revise_pastes_back_and_never_shows_a_surface() {
    let h = harness();
    *h.transfer.clipboard.lock().unwrap() = Some("user clipboard".to_string());
    h.transfer.select("typo hear");
    h.backend.push_reply(Ok("typo here".to_string()));

    h.orchestrator.handle_trigger(Operation::Revise).await;

    assert_eq!(h.transfer.pasted(), ["typo here"]);
    assert_eq!(h.transfer.clipboard().as_deref(), Some("user clipboard"));
    assert!(!h.surface.was_ever_shown(SurfaceId::Overlay));
    assert!(!h.surface.was_ever_shown(SurfaceId::PromptOverlay));
}

#[tokio::test]
async fn revise_without_selection_does_nothing() {
    let h = harness();
    h.transfer.clear_selection();

    h.orchestrator.handle_trigger(Operation::Revise).await;

    assert_eq!(h.backend.generate_calls(), 0);
    assert_eq!(h.transfer.pasted().len(), 0);
}

#[tokio::test]
async fn revise_failure_is_logged_not_displayed() {
    let h = harness();
    h.transfer.select("text");
    h.backend.push_reply(Err(GenerateError::Timeout));

    h.orchestrator.handle_trigger(Operation::Revise).await;

    assert_eq!(h.transfer.pasted().len(), 0);
    assert!(!h.surface.was_ever_shown(SurfaceId::Overlay));
}

// ── CustomPrompt ─────────────────────────────────────────────────────

#[tokio::test]
async fn custom_prompt_primes_the_prompt_surface() {
    let h = harness();
    h.transfer.select("some words");

    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;

    assert!(h.surface.visible(SurfaceId::PromptOverlay));
    assert_eq!(h.surface.content(SurfaceId::PromptOverlay), "");
    // No generation until the user submits a prompt.
    assert_eq!(h.backend.generate_calls(), 0);
    assert_eq!(h.backend.stream_calls(), 0);
}

#[tokio::test]
async fn question_reply_lands_on_the_main_overlay() {
    let h = harness();
    h.transfer.select("The fox");
    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;

    h.backend
        .push_reply(Ok(r#"{"type":"question","response":"It's a fox."}"#.to_string()));
    h.orchestrator.submit_prompt("what is this?".to_string()).await;

    assert!(!h.surface.visible(SurfaceId::PromptOverlay));
    assert!(h.surface.visible(SurfaceId::Overlay));
    assert_eq!(h.surface.content(SurfaceId::Overlay), "It's a fox.");
    assert_eq!(h.transfer.pasted().len(), 0);
}

#[tokio::test]
async fn generate_reply_is_pasted_back() {
    let h = harness();
    h.transfer.select("old sentence");
    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;

    h.backend
        .push_reply(Ok(r#"{"type":"generate","response":"new sentence"}"#.to_string()));
    h.orchestrator.submit_prompt("rewrite it".to_string()).await;

    assert_eq!(h.transfer.pasted(), ["new sentence"]);
    assert!(!h.surface.visible(SurfaceId::PromptOverlay));
    assert!(!h.surface.was_ever_shown(SurfaceId::Overlay));
}

#[tokio::test]
async fn schema_violation_never_triggers_a_paste() {
    let h = harness();
    h.transfer.select("text");
    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;

    h.backend
        .push_reply(Ok(r#"{"type":"unknown","response":"x"}"#.to_string()));
    h.orchestrator.submit_prompt("do something".to_string()).await;

    assert_eq!(h.transfer.pasted().len(), 0);
    let content = h.surface.content(SurfaceId::PromptOverlay);
    assert!(
        content.contains("didn't match the expected format"),
        "unexpected content: {content}"
    );
}

#[tokio::test]
async fn closing_the_prompt_surface_discards_the_in_flight_reply() {
    let h = harness();
    h.transfer.select("old sentence");
    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;

    h.backend.set_reply_delay(Duration::from_millis(100));
    h.backend
        .push_reply(Ok(r#"{"type":"generate","response":"new sentence"}"#.to_string()));

    let orchestrator = h.orchestrator.clone();
    let submission =
        tokio::spawn(async move { orchestrator.submit_prompt("rewrite it".to_string()).await });

    // The user closes the prompt overlay while the request is in flight.
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.orchestrator.handle_surface_closed(SurfaceId::PromptOverlay);

    submission.await.unwrap();
    // The late reply must never paste into the foreign application.
    assert_eq!(h.transfer.pasted().len(), 0);
    assert!(!h.surface.visible(SurfaceId::PromptOverlay));
}

#[tokio::test]
async fn custom_prompt_toggles_off_on_same_selection() {
    let h = harness();
    h.transfer.select("same text");
    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;
    assert!(h.surface.visible(SurfaceId::PromptOverlay));

    h.orchestrator.handle_trigger(Operation::CustomPrompt).await;
    assert!(!h.surface.visible(SurfaceId::PromptOverlay));
}
