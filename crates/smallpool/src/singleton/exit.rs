//! Process-exit handler chain.
//!
//! A lock-protected LIFO chain drained at process teardown. Handlers
//! may register further handlers while the chain is draining (the
//! classic atexit-recursion case); the drain loop picks them up in the
//! same pass.

use std::sync::Once;

use parking_lot::Mutex;

pub type Handler = Box<dyn FnOnce() + Send>;

pub struct ExitChain {
    handlers: Mutex<Vec<Handler>>,
}

#[allow(clippy::new_without_default)]
impl ExitChain {
    pub const fn new() -> ExitChain {
        ExitChain {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: Handler) {
        self.handlers.lock().push(handler);
    }

    /// Drain the chain, newest handler first. The lock is released
    /// around each call so handlers can re-enter `register`.
    pub fn run(&self) {
        loop {
            let handler = self.handlers.lock().pop();
            match handler {
                Some(run) => run(),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The chain drained when the process exits.
static PROCESS_EXIT: ExitChain = ExitChain::new();

/// Register `handler` with the process chain. The first registration
/// hooks the chain into `atexit` so it drains after `main` returns.
pub fn at_exit(handler: Handler) {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| unsafe {
        libc::atexit(drain_process_chain);
    });
    PROCESS_EXIT.register(handler);
}

extern "C" fn drain_process_chain() {
    PROCESS_EXIT.run();
}
