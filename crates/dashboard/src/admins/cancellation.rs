use tokio::sync::watch;

/// Creates a connected trigger/handle pair.
pub fn cancellation() -> (CancellationTrigger, CancellationHandle) {
    let (sender, receiver) = watch::channel(false);
    (CancellationTrigger(sender), CancellationHandle(receiver))
}

/// Owner side: requests that running scans stop.
#[derive(Debug)]
pub struct CancellationTrigger(watch::Sender<bool>);

impl CancellationTrigger {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observer side, handed to long running operations.
#[derive(Debug, Clone)]
pub struct CancellationHandle(watch::Receiver<bool>);

impl CancellationHandle {
    /// A handle that is never cancelled.
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self(receiver)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation was requested. Never resolves if the
    /// trigger was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.0.clone();
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
