//! Animated status line on stderr while a blocking step runs.
//!
//! The loader is the only concurrent actor in an invocation: a
//! background thread that wakes on a tick, rewrites one stderr line,
//! and is joined before the caller returns. It starts with a short
//! warm-up delay so fast operations never flicker.

use std::io::{IsTerminal, Write};
use std::sync::mpsc;
use std::time::Duration;

use crate::cli_args::Options;
use crate::locale::Catalog;

const WARMUP: Duration = Duration::from_millis(180);
const FRAME_TICK: Duration = Duration::from_millis(260);
const FRAMES: [&str; 4] = ["ew   ", "we.  ", "EW.. ", "WE..."];

pub struct Loader {
    stop: mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl Loader {
    /// Starts the loader when enabled; `None` means nothing to join.
    pub fn start(opts: &Options, catalog: &Catalog, label: &str) -> Option<Loader> {
        if !loader_enabled(opts) {
            return None;
        }
        let messages = loader_messages(catalog, label);
        let (stop, stopped) = mpsc::channel();
        let handle = std::thread::spawn(move || render(messages, stopped));
        Some(Loader { stop, handle })
    }

    /// Signals completion and joins; the loader clears its line first.
    pub fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}

/// Runs `work` with the loader ticking beside it.
pub fn with_loader<T>(opts: &Options, catalog: &Catalog, label: &str, work: impl FnOnce() -> T) -> T {
    let loader = Loader::start(opts, catalog, label);
    let result = work();
    if let Some(loader) = loader {
        loader.finish();
    }
    result
}

fn loader_enabled(opts: &Options) -> bool {
    if opts.json {
        return false;
    }
    if let Ok(value) = std::env::var("EW_LOADER") {
        if matches!(value.trim().to_lowercase().as_str(), "0" | "off" | "false" | "no") {
            return false;
        }
    }
    std::io::stderr().is_terminal()
}

fn render(messages: Vec<String>, stopped: mpsc::Receiver<()>) {
    // Warm-up: fast operations finish before anything is drawn.
    if stopped.recv_timeout(WARMUP).is_ok() {
        return;
    }

    let mut frame_index = 0usize;
    let mut message_index = 0usize;
    loop {
        let line = format!("{} {}", FRAMES[frame_index], messages[message_index]);
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{line}\x1b[K");
        let _ = stderr.flush();

        frame_index = (frame_index + 1) % FRAMES.len();
        if frame_index == 0 {
            message_index = (message_index + 1) % messages.len();
        }

        match stopped.recv_timeout(FRAME_TICK) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "\r\x1b[K");
                let _ = stderr.flush();
                return;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Picks the rotating message set for a label, preferring the locale
/// catalog's category lists.
pub fn loader_messages(catalog: &Catalog, label: &str) -> Vec<String> {
    let base = label.trim();
    let low = base.to_lowercase();
    if low == "thinking of a command that fits" && !catalog.loader.thinking_fit.is_empty() {
        return catalog.loader.thinking_fit.clone();
    }
    if low.contains("ranking") {
        return category_messages(base, &catalog.loader.ranking);
    }
    if low.contains("history") {
        return category_messages(base, &catalog.loader.history);
    }
    if low.contains("debugging") {
        return category_messages(base, &catalog.loader.debugging);
    }

    let base = if base.is_empty() { "working" } else { base };
    let templated: Vec<String> = catalog
        .loader
        .default
        .iter()
        .map(|template| template.trim())
        .filter(|template| !template.is_empty())
        .map(|template| template.replace("{label}", base))
        .collect();
    if templated.is_empty() {
        return vec![base.to_string()];
    }
    templated
}

fn category_messages(base: &str, messages: &[String]) -> Vec<String> {
    let base = if base.trim().is_empty() { "working" } else { base.trim() };
    if messages.is_empty() {
        return vec![base.to_string()];
    }
    if messages[0].trim().eq_ignore_ascii_case(base) {
        return messages.to_vec();
    }
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(base.to_string());
    out.extend(messages.iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::load_catalog;

    #[test]
    fn unit_messages_pick_category_by_label() {
        let catalog = load_catalog("en");
        let ranking = loader_messages(&catalog, "ranking the best command");
        assert!(ranking[0].contains("ranking"));

        let history = loader_messages(&catalog, "scouting your history");
        assert_eq!(history[0], "scouting your history");
    }

    #[test]
    fn unit_unknown_label_uses_default_templates() {
        let catalog = load_catalog("en");
        let messages = loader_messages(&catalog, "checking something");
        assert_eq!(messages[0], "checking something");
        assert!(messages.iter().any(|message| message.contains("(still cooking)")));
    }

    #[test]
    fn unit_empty_label_falls_back_to_working() {
        let catalog = load_catalog("en");
        let messages = loader_messages(&catalog, "");
        assert!(messages[0].contains("working"));
    }

    #[test]
    fn functional_loader_thread_stops_cleanly() {
        let (stop, stopped) = mpsc::channel();
        let handle = std::thread::spawn(move || render(vec!["working".to_string()], stopped));
        std::thread::sleep(Duration::from_millis(20));
        stop.send(()).expect("send stop");
        handle.join().expect("join loader");
    }
}
