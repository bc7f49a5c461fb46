use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation token.
///
/// All clones observe the same state; once triggered an interrupt stays
/// triggered. Long running operations are expected to check the interrupt
/// between steps or to race their waits against [`Interrupt::wait`].
#[derive(Clone, Debug)]
pub struct Interrupt(Arc<watch::Sender<bool>>);

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(Arc::new(tx))
    }

    /// Trigger the interrupt, waking up every pending `wait`
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until the interrupt is triggered. Returns immediately if
    /// it was triggered already.
    pub async fn wait(&self) {
        let mut rx = self.0.subscribe();
        // the sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
