use tokio::sync::mpsc;
use tracing::info;

/// Receives protocol signals raised by the worker. Called on the worker
/// task: implementations must not block, or must hand work off themselves.
pub trait SyncEventListener: Send + Sync {
    /// Pending records reached the threshold and a valid sync URL exists.
    fn on_sync_requested(&self);
    /// Server answered 285.
    fn on_abort_updates_requested(&self);
    /// Server answered 401.
    fn on_reauth_required(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncSignal {
    SyncRequested,
    AbortUpdatesRequested,
    ReauthRequired,
}

/// Logs every signal and forwards it into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SyncSignal>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, signal: SyncSignal) {
        // receiver gone: nobody is interested any more
        let _ = self.tx.send(signal);
    }
}

impl SyncEventListener for ChannelListener {
    fn on_sync_requested(&self) {
        info!("batch sync requested");
        self.emit(SyncSignal::SyncRequested);
    }

    fn on_abort_updates_requested(&self) {
        info!("server requested that location updates stop (285)");
        self.emit(SyncSignal::AbortUpdatesRequested);
    }

    fn on_reauth_required(&self) {
        info!("server requested re-authentication (401)");
        self.emit(SyncSignal::ReauthRequired);
    }
}
