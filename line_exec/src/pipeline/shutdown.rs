//! Cooperative shutdown token shared by the pipeline stages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process wide shutdown request.
///
/// Clones share the same flag. Stages check it at the top of each cycle and before sleeping.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown when the process receives Ctrl-C.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || shutdown.request())
    }
}
