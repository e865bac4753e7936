//! Where completion callbacks run.
//!
//! The coordinator never calls user callbacks directly; it hands them to a
//! dispatcher, so an embedding UI can marshal them onto its own thread.

use tokio::sync::mpsc;

/// A callback ready to run, with its arguments already bound.
pub type CallbackJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs callback jobs on some execution context.
pub trait CallbackDispatcher: Send + Sync {
    fn dispatch(&self, job: CallbackJob);
}

/// Runs jobs immediately on whichever thread completed the work.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl CallbackDispatcher for InlineDispatcher {
    fn dispatch(&self, job: CallbackJob) {
        job();
    }
}

/// Queues jobs for an external event loop to drain.
///
/// The receiving side runs each job on its own thread, typically a UI
/// thread. If the receiver is gone the job is dropped and logged.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<CallbackJob>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallbackJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl CallbackDispatcher for ChannelDispatcher {
    fn dispatch(&self, job: CallbackJob) {
        if self.sender.send(job).is_err() {
            log::warn!("Callback dropped: dispatcher receiver is closed");
        }
    }
}
