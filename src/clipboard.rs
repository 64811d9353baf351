//! Clipboard transfer channel — copy-simulation capture and paste-back.
//!
//! The OS clipboard is a single shared resource. This module is the only
//! place allowed to mutate it, and every mutation is bracketed by a scoped
//! save/restore that runs on all exit paths: after any capture or paste-back
//! the user's clipboard is observably unchanged, except during the narrow
//! synthetic-keystroke window.
//!
//! There is no OS signal confirming that the foreign app processed a
//! synthetic Cmd+C/Cmd+V, so both operations wait a short tunable settle
//! delay before touching the clipboard again. Best-effort by design.

use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Synthetic event injection was refused by the OS (accessibility /
    /// input-monitoring permission revoked). Distinct from "nothing selected".
    #[error("synthetic input rejected — check Accessibility permission in System Settings")]
    PermissionDenied,
    #[error("clipboard error: {0}")]
    Clipboard(String),
}

/// Raw clipboard access. `read` returns `None` for an empty clipboard.
pub trait ClipboardOps: Send {
    fn read(&mut self) -> Result<Option<String>, TransferError>;
    fn write(&mut self, text: &str) -> Result<(), TransferError>;
    fn clear(&mut self) -> Result<(), TransferError>;
}

/// Synthetic keystroke injection into the focused foreign application.
pub trait Keystrokes: Send {
    fn synthesize_copy(&mut self) -> Result<(), TransferError>;
    fn synthesize_paste(&mut self) -> Result<(), TransferError>;
}

/// The two operations the rest of the crate is allowed to perform.
pub trait TransferChannel: Send + Sync {
    /// Snapshot the clipboard, synthesize a copy, wait for it to settle,
    /// read the result, restore the snapshot. `Ok(None)` means nothing was
    /// selected: the post-copy clipboard was empty or identical to the
    /// pre-copy contents.
    fn capture_via_copy(&self) -> Result<Option<String>, TransferError>;

    /// Snapshot the clipboard, write `text`, synthesize a paste into the
    /// foreign application, wait for it to settle, restore the snapshot.
    fn paste_back(&self, text: &str) -> Result<(), TransferError>;
}

struct Backing<C, K> {
    clipboard: C,
    keys: K,
}

/// Copy/paste bracket logic, generic over the raw backends so the
/// save/restore invariant is testable without touching the OS.
pub struct CopyPasteChannel<C, K> {
    backing: Mutex<Backing<C, K>>,
    copy_settle: Duration,
    paste_settle: Duration,
}

impl<C: ClipboardOps, K: Keystrokes> CopyPasteChannel<C, K> {
    pub fn new(clipboard: C, keys: K, copy_settle: Duration, paste_settle: Duration) -> Self {
        Self {
            backing: Mutex::new(Backing { clipboard, keys }),
            copy_settle,
            paste_settle,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Backing<C, K>>, TransferError> {
        self.backing
            .lock()
            .map_err(|_| TransferError::Clipboard("clipboard lock poisoned".into()))
    }
}

/// Put the saved contents back, or clear if there were none.
fn restore<C: ClipboardOps>(clipboard: &mut C, prior: Option<&str>) -> Result<(), TransferError> {
    match prior {
        Some(text) => clipboard.write(text),
        None => clipboard.clear(),
    }
}

impl<C: ClipboardOps, K: Keystrokes> TransferChannel for CopyPasteChannel<C, K> {
    fn capture_via_copy(&self) -> Result<Option<String>, TransferError> {
        let mut backing = self.lock()?;
        let prior = backing.clipboard.read()?;
        // Empty-string priors behave like an empty clipboard.
        let prior = prior.filter(|t| !t.is_empty());

        let copied = {
            let Backing { clipboard, keys } = &mut *backing;
            keys.synthesize_copy().and_then(|()| {
                std::thread::sleep(self.copy_settle);
                clipboard.read()
            })
        };

        // Restore runs before any error propagates; the first failure wins.
        let restored = restore(&mut backing.clipboard, prior.as_deref());
        let copied = copied?;
        restored?;

        match copied {
            Some(text) if !text.is_empty() && Some(text.as_str()) != prior.as_deref() => {
                log::debug!("[CAPTURE] Copied {} chars from selection", text.len());
                Ok(Some(text))
            }
            // Unchanged or empty clipboard: nothing was selected.
            _ => Ok(None),
        }
    }

    fn paste_back(&self, text: &str) -> Result<(), TransferError> {
        let mut backing = self.lock()?;
        let prior = backing.clipboard.read()?;
        let prior = prior.filter(|t| !t.is_empty());

        let pasted = {
            let Backing { clipboard, keys } = &mut *backing;
            clipboard.write(text).and_then(|()| {
                keys.synthesize_paste().map(|()| {
                    // Wait for the foreign app to consume the paste before
                    // swapping the clipboard back out from under it.
                    std::thread::sleep(self.paste_settle);
                })
            })
        };

        let restored = restore(&mut backing.clipboard, prior.as_deref());
        pasted?;
        restored?;
        log::info!("[PASTE] Pasted {} chars and restored clipboard", text.len());
        Ok(())
    }
}

// ── macOS backends: arboard + enigo ──────────────────────────────────

#[cfg(target_os = "macos")]
pub use macos::system_channel;

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use crate::config::Config;
    use enigo::{Direction, Enigo, Key, Keyboard, Settings};

    pub struct SystemClipboard(arboard::Clipboard);

    impl ClipboardOps for SystemClipboard {
        fn read(&mut self) -> Result<Option<String>, TransferError> {
            match self.0.get_text() {
                Ok(text) => Ok(Some(text)),
                Err(arboard::Error::ContentNotAvailable) => Ok(None),
                Err(e) => Err(TransferError::Clipboard(e.to_string())),
            }
        }

        fn write(&mut self, text: &str) -> Result<(), TransferError> {
            self.0
                .set_text(text)
                .map_err(|e| TransferError::Clipboard(e.to_string()))
        }

        fn clear(&mut self) -> Result<(), TransferError> {
            self.0
                .clear()
                .map_err(|e| TransferError::Clipboard(e.to_string()))
        }
    }

    pub struct SystemKeystrokes(Enigo);

    impl SystemKeystrokes {
        /// Cmd+<key> as discrete press/click/release events. An enigo
        /// refusal on macOS means the permission was revoked.
        fn chord(&mut self, key: char) -> Result<(), TransferError> {
            let enigo = &mut self.0;
            enigo
                .key(Key::Meta, Direction::Press)
                .and_then(|()| enigo.key(Key::Unicode(key), Direction::Click))
                .and_then(|()| enigo.key(Key::Meta, Direction::Release))
                .map_err(|_| TransferError::PermissionDenied)
        }
    }

    impl Keystrokes for SystemKeystrokes {
        fn synthesize_copy(&mut self) -> Result<(), TransferError> {
            self.chord('c')
        }

        fn synthesize_paste(&mut self) -> Result<(), TransferError> {
            self.chord('v')
        }
    }

    /// Build the real transfer channel from the process config.
    pub fn system_channel(
        config: &Config,
    ) -> Result<CopyPasteChannel<SystemClipboard, SystemKeystrokes>, TransferError> {
        let clipboard =
            arboard::Clipboard::new().map_err(|e| TransferError::Clipboard(e.to_string()))?;
        let enigo =
            Enigo::new(&Settings::default()).map_err(|_| TransferError::PermissionDenied)?;
        Ok(CopyPasteChannel::new(
            SystemClipboard(clipboard),
            SystemKeystrokes(enigo),
            config.copy_settle,
            config.paste_settle,
        ))
    }
}
