//! Shortcut classification — key combination → Operation.
//!
//! The classifier itself is a pure table lookup so it can be driven by any
//! key-event source. The macOS binary registers the same table with the
//! `global-hotkey` crate and maps hotkey ids back to Operations.

use serde::{Deserialize, Serialize};

/// One of the five supported text-transformation intents.
///
/// Each operation maps to exactly one prompt template and one result policy,
/// both fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Explain,
    Summarize,
    Revise,
    Translate,
    CustomPrompt,
}

/// What happens to a completed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPolicy {
    /// Streamed into a display surface.
    Display,
    /// Pasted back into the foreign application; no surface is shown.
    Replace,
}

impl Operation {
    pub fn policy(self) -> ResultPolicy {
        match self {
            Operation::Revise => ResultPolicy::Replace,
            // CustomPrompt routes per-reply (question vs generate), but the
            // trigger itself opens the prompt surface.
            _ => ResultPolicy::Display,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::Explain => "Explain",
            Operation::Summarize => "Summarize",
            Operation::Revise => "Revise",
            Operation::Translate => "Translate",
            Operation::CustomPrompt => "Ask",
        }
    }
}

/// A raw key press as delivered by the OS event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCombo {
    pub command: bool,
    pub control: bool,
    pub shift: bool,
    /// Lowercase ASCII of the non-modifier key.
    pub key: char,
}

/// Binding table: Cmd+Ctrl + letter. Shift must not be held.
pub const BINDINGS: &[(char, Operation)] = &[
    ('e', Operation::Explain),
    ('s', Operation::Summarize),
    ('r', Operation::Revise),
    ('t', Operation::Translate),
    ('a', Operation::CustomPrompt),
];

/// Map a key combination to an Operation.
///
/// Returns `None` for anything unrecognized — most keystrokes are not
/// shortcuts, and the caller ignores those silently.
pub fn classify(combo: &KeyCombo) -> Option<Operation> {
    if !combo.command || !combo.control || combo.shift {
        return None;
    }
    BINDINGS
        .iter()
        .find(|(key, _)| *key == combo.key)
        .map(|(_, op)| *op)
}

// ── macOS: global hotkey registration ────────────────────────────────

#[cfg(target_os = "macos")]
pub use macos::HotkeyListener;

#[cfg(target_os = "macos")]
mod macos {
    use super::{Operation, BINDINGS};
    use global_hotkey::{
        hotkey::{Code, HotKey, Modifiers},
        GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
    };
    use std::collections::HashMap;

    /// Registers the binding table system-wide and resolves incoming hotkey
    /// events back to Operations.
    pub struct HotkeyListener {
        _manager: GlobalHotKeyManager,
        by_id: HashMap<u32, Operation>,
    }

    impl HotkeyListener {
        pub fn new() -> Result<Self, global_hotkey::Error> {
            let manager = GlobalHotKeyManager::new()?;
            let mut by_id = HashMap::new();
            for (key, op) in BINDINGS {
                let hotkey =
                    HotKey::new(Some(Modifiers::META | Modifiers::CONTROL), code_for(*key));
                manager.register(hotkey)?;
                by_id.insert(hotkey.id(), *op);
                log::info!(
                    "[HOTKEY] Registered Cmd+Ctrl+{} → {}",
                    key.to_uppercase(),
                    op.label()
                );
            }
            Ok(Self {
                _manager: manager,
                by_id,
            })
        }

        /// Non-blocking poll for the next pressed shortcut.
        pub fn poll(&self) -> Option<Operation> {
            let event = GlobalHotKeyEvent::receiver().try_recv().ok()?;
            if event.state() != HotKeyState::Pressed {
                return None;
            }
            self.by_id.get(&event.id).copied()
        }
    }

    fn code_for(key: char) -> Code {
        match key {
            'e' => Code::KeyE,
            's' => Code::KeyS,
            'r' => Code::KeyR,
            't' => Code::KeyT,
            _ => Code::KeyA,
        }
    }
}
