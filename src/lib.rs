//! Glint — select text anywhere, hit a hotkey, get a streamed AI answer.
//!
//! This crate is the orchestration core: it captures the current selection
//! from whatever app has focus (copy simulation, clipboard round-tripped),
//! classifies the shortcut into an operation, streams a generation from a
//! local Ollama server into an opaque display surface, and for
//! replace-style operations pastes the result back where it came from.
//!
//! Window rendering, permission prompting, and packaging live outside this
//! crate; the seams are the `DisplaySurface`, `TransferChannel`, and
//! `GenerationBackend` traits.
//!
//! Module map:
//!   - config       — endpoint/model/settle-delay settings + onboarding flag
//!   - clipboard    — copy-simulation capture and paste-back (save/restore)
//!   - selection    — selection snapshots over the clipboard channel
//!   - shortcuts    — hotkey → Operation classification
//!   - llm          — prompt templates, Ollama client, streaming protocol
//!   - surface      — per-surface show/hide/regenerate state machine
//!   - orchestrator — wires all of the above into one reactive loop

pub mod clipboard;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod selection;
pub mod shortcuts;
pub mod surface;

pub use config::Config;
pub use orchestrator::Orchestrator;
pub use shortcuts::{classify, KeyCombo, Operation};
pub use surface::{DisplaySurface, SurfaceId};
