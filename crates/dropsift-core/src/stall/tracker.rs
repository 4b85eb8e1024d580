/// Shared walk state read by the stall sampler.
///
/// The walker pushes a scope when it enters a directory and pops it when it
/// leaves; every push or pop bumps a generation counter so the sampler can
/// tell that the innermost directory changed and restart its window. The
/// discovery counter is a plain atomic the walker bumps once per file.
use super::StallDiagnostic;
use crate::walker::CancelToken;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The directory the walker is currently inside.
#[derive(Debug, Clone)]
pub struct ActiveScope {
    /// Selection-relative folder path.
    pub path: String,
    pub token: CancelToken,
}

#[derive(Debug, Default)]
struct ScopeStack {
    generation: u64,
    stack: Vec<ActiveScope>,
}

#[derive(Debug, Default)]
pub struct WalkTracker {
    discovered: AtomicUsize,
    scopes: Mutex<ScopeStack>,
    finished: AtomicBool,
    stalls: Mutex<Vec<StallDiagnostic>>,
}

impl WalkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, path: &str, token: CancelToken) {
        let mut scopes = self.scopes.lock();
        scopes.generation += 1;
        scopes.stack.push(ActiveScope {
            path: path.to_owned(),
            token,
        });
    }

    pub fn exit(&self) {
        let mut scopes = self.scopes.lock();
        scopes.generation += 1;
        scopes.stack.pop();
    }

    /// Innermost scope and the generation it was observed at.
    pub fn innermost(&self) -> Option<(u64, ActiveScope)> {
        let scopes = self.scopes.lock();
        scopes
            .stack
            .last()
            .map(|scope| (scopes.generation, scope.clone()))
    }

    /// Cancel the innermost scope only if it is still the one observed at
    /// `generation`. Returns `false` if the walker has moved on.
    pub fn cancel_if_current(&self, generation: u64) -> bool {
        let scopes = self.scopes.lock();
        match scopes.stack.last() {
            Some(scope) if scopes.generation == generation => {
                scope.token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn record_file(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovered(&self) -> usize {
        self.discovered.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn push_stall(&self, diagnostic: StallDiagnostic) {
        self.stalls.lock().push(diagnostic);
    }

    /// Remove and return the diagnostic for `path`, if the sampler raised one.
    pub fn take_stall(&self, path: &str) -> Option<StallDiagnostic> {
        let mut stalls = self.stalls.lock();
        let pos = stalls.iter().position(|d| d.folder == path)?;
        Some(stalls.swap_remove(pos))
    }
}
