//! Cooperative cancellation for long-running stage loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Raises cancellation from any thread; cloneable.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.try_send(());
    }
}

/// Observed by the stage. Once raised, stays raised.
pub struct Cancellation {
    rx: Receiver<()>,
    flag: Arc<AtomicBool>,
    // Keeps the channel connected so `receiver()` only becomes ready on a real cancel.
    _tx: Sender<()>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = bounded(1);
        let flag = Arc::new(AtomicBool::new(false));
        let handle = CancelHandle {
            tx: tx.clone(),
            flag: Arc::clone(&flag),
        };
        (handle, Cancellation { rx, flag, _tx: tx })
    }

    /// A cancellation nobody can raise.
    pub fn never() -> Cancellation {
        Self::new().1
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
