use crate::error::GenerateError;
use tokio::sync::mpsc;

/// External requests handled while the coordinator is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Regenerate,
    Shutdown,
}

/// Cloneable sender for lifecycle signals.
///
/// Handed to plugins in `onComplete`. Signals sent before the coordinator goes
/// idle are queued. Once every handle is dropped an idle coordinator shuts down.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: mpsc::UnboundedSender<Signal>,
}

impl LifecycleHandle {
    /// Request a new generation pass.
    pub fn regenerate(&self) -> Result<(), GenerateError> {
        self.send(Signal::Regenerate)
    }

    /// Request shutdown.
    pub fn shutdown(&self) -> Result<(), GenerateError> {
        self.send(Signal::Shutdown)
    }

    /// Whether the coordinator has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, signal: Signal) -> Result<(), GenerateError> {
        self.tx.send(signal).map_err(|_| GenerateError::Terminated)
    }
}

/// Receiving side owned by the coordinator.
///
/// The coordinator keeps its own sender so it can mint handles, but lets go
/// of it while waiting; otherwise the channel could never report that every
/// external handle was dropped.
#[derive(Debug)]
pub(crate) struct SignalChannel {
    tx: Option<mpsc::UnboundedSender<Signal>>,
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl SignalChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx: Some(tx), rx }
    }

    pub(crate) fn handle(&mut self) -> LifecycleHandle {
        let tx = match &self.tx {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.rx = rx;
                self.tx = Some(tx.clone());
                tx
            }
        };
        LifecycleHandle { tx }
    }

    /// Wait for the next signal. `None` when no handle is left.
    pub(crate) async fn wait(&mut self) -> Option<Signal> {
        let weak = self.tx.take().map(|tx| tx.downgrade());
        let signal = self.rx.recv().await;

        self.tx = weak.and_then(|weak| weak.upgrade());
        signal
    }

    /// Stop accepting signals; later sends fail with [`GenerateError::Terminated`].
    pub(crate) fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}
