//! Glint binary — registers the global hotkeys and runs the dispatch loop.
//!
//! The display surface here is a minimal terminal sink: overlay content is
//! streamed to stdout. A windowed host replaces it by implementing
//! `DisplaySurface` and handing its impl to the orchestrator.

/// Load .env.local → .env from the working directory, first hit wins.
fn load_env() {
    for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break;
        }
    }
}

#[cfg(target_os = "macos")]
mod app {
    use glint::clipboard;
    use glint::config::{self, Config};
    use glint::llm::OllamaClient;
    use glint::orchestrator::Orchestrator;
    use glint::shortcuts::HotkeyListener;
    use glint::surface::{DisplaySurface, SurfaceId};
    use std::sync::Arc;
    use std::time::Duration;

    /// Streams surface updates to the terminal.
    struct TerminalSurface;

    impl DisplaySurface for TerminalSurface {
        fn show(&self, id: SurfaceId) {
            match id {
                SurfaceId::Overlay => println!("── {} ──", id.name()),
                SurfaceId::PromptOverlay => {
                    println!("── {} ── type a prompt and press Enter:", id.name())
                }
            }
        }

        fn hide(&self, id: SurfaceId) {
            println!("\n── {} hidden ──", id.name());
        }

        fn set_content(&self, _id: SurfaceId, text: &str) {
            print!("\r{}", text);
            flush();
        }

        fn append_content(&self, _id: SurfaceId, fragment: &str) {
            print!("{}", fragment);
            flush();
        }
    }

    fn flush() {
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    pub async fn run() {
        log::info!("Glint starting up");

        if !config::has_completed_onboarding() {
            log::info!("[STARTUP] First run — grant Accessibility permission when prompted");
            config::mark_onboarding_complete();
        }

        let cfg = Config::from_env();
        log::info!("[STARTUP] Endpoint: {} (model {})", cfg.endpoint, cfg.model);

        let channel = match clipboard::system_channel(&cfg) {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                log::error!("[STARTUP] Clipboard unavailable: {}", e);
                std::process::exit(1);
            }
        };
        let client = match OllamaClient::new(&cfg) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                log::error!("[STARTUP] {}", e);
                std::process::exit(1);
            }
        };
        let listener = match HotkeyListener::new() {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("[STARTUP] Hotkey registration failed: {}", e);
                std::process::exit(1);
            }
        };

        let orchestrator = Orchestrator::new(cfg, Arc::new(TerminalSurface), client, channel);

        // Stdin lines feed the prompt surface (stand-in for its input box).
        let (prompt_tx, mut prompt_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let trimmed = line.trim().to_string();
                if !trimmed.is_empty() && prompt_tx.send(trimmed).is_err() {
                    return;
                }
            }
        });

        log::info!("Hotkeys ready — Cmd+Ctrl+E/S/R/T/A");
        loop {
            if let Some(op) = listener.poll() {
                orchestrator.handle_trigger(op).await;
                continue;
            }
            tokio::select! {
                Some(prompt) = prompt_rx.recv() => {
                    orchestrator.submit_prompt(prompt).await;
                }
                _ = tokio::time::sleep(Duration::from_millis(30)) => {}
            }
        }
    }
}

#[cfg(target_os = "macos")]
#[tokio::main]
async fn main() {
    load_env();
    env_logger::init();
    app::run().await;
}

#[cfg(not(target_os = "macos"))]
fn main() {
    load_env();
    env_logger::init();
    log::error!("Glint's capture backend is macOS-only; the library builds everywhere.");
    std::process::exit(1);
}
