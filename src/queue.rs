// The UI thread's message queue.
//
// The decode worker and the idle watchdog never touch session or overlay state directly.
// They post a UiMessage here, and the session drains the queue on the UI thread.

use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};

use crate::decode::Decoded;
use crate::types::ResultPoint;

#[derive(Debug)]
pub enum UiMessage {
    /// A candidate location seen by the worker of the given generation.
    PossibleResultPoint { generation: u64, point: ResultPoint },
    /// A full decode from the worker of the given generation.
    DecodeSucceeded { generation: u64, decoded: Decoded },
    /// The idle watchdog ran out while armed with `epoch`.
    IdleTimeout { epoch: u64 },
}

pub type UiSender = Sender<UiMessage>;

pub struct MessageQueue {
    tx: UiSender,
    rx: Receiver<UiMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A handle for a background thread to post through.
    pub fn sender(&self) -> UiSender {
        self.tx.clone()
    }

    /// Everything posted so far, without blocking.
    pub fn drain(&self) -> TryIter<'_, UiMessage> {
        self.rx.try_iter()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
