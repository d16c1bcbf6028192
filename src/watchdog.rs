// Idle watchdog: posts UiMessage::IdleTimeout once when an armed period passes without
// scan activity. Each timeout carries the epoch it was armed with.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::queue::{UiMessage, UiSender};

pub trait Watchdog {
    /// Start (or restart) the idle clock; a timeout reports `epoch` back.
    fn arm(&mut self, epoch: u64);
    /// Stop the clock without shutting the watchdog down.
    fn disarm(&mut self);
    /// Scan activity: restarts the clock if it is armed.
    fn on_activity(&mut self);
    /// Terminal; the watchdog never fires afterwards.
    fn shutdown(&mut self);
}

enum Command {
    Arm(u64),
    Disarm,
    Activity,
    Shutdown,
}

/// Timer thread fed by a command channel.
pub struct InactivityTimer {
    commands: Option<Sender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl InactivityTimer {
    pub fn spawn(timeout: Duration, notify: UiSender) -> Result<Self> {
        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("idle-watchdog".to_string())
            .spawn(move || run(rx, timeout, notify))
            .map_err(|e| Error::Spawn("idle-watchdog", e.to_string()))?;
        Ok(Self { commands: Some(tx), thread: Some(thread) })
    }

    fn send(&self, cmd: Command) {
        if let Some(tx) = &self.commands {
            let _ = tx.send(cmd);
        }
    }
}

fn run(rx: Receiver<Command>, timeout: Duration, notify: UiSender) {
    let mut deadline: Option<Instant> = None;
    let mut epoch = 0;
    loop {
        let cmd = match deadline {
            Some(at) => match rx.recv_deadline(at) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        match cmd {
            None => {
                info!("no scan activity for {timeout:?}");
                deadline = None;
                if notify.send(UiMessage::IdleTimeout { epoch }).is_err() {
                    break;
                }
            }
            Some(Command::Arm(armed)) => {
                epoch = armed;
                deadline = Some(Instant::now() + timeout);
            }
            Some(Command::Activity) => {
                if deadline.is_some() {
                    deadline = Some(Instant::now() + timeout);
                }
            }
            Some(Command::Disarm) => deadline = None,
            Some(Command::Shutdown) => break,
        }
    }
    debug!("idle watchdog exited");
}

impl Watchdog for InactivityTimer {
    fn arm(&mut self, epoch: u64) {
        self.send(Command::Arm(epoch));
    }

    fn disarm(&mut self) {
        self.send(Command::Disarm);
    }

    fn on_activity(&mut self) {
        self.send(Command::Activity);
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(Command::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("idle watchdog thread panicked");
            }
        }
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MessageQueue;

    fn timeouts(queue: &MessageQueue) -> usize {
        queue.drain().filter(|m| matches!(m, UiMessage::IdleTimeout { .. })).count()
    }

    #[test]
    fn fires_once_after_arming() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(30), queue.sender()).unwrap();
        timer.arm(1);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(timeouts(&queue), 1);
        timer.shutdown();
    }

    #[test]
    fn timeout_reports_the_latest_arm_epoch() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(30), queue.sender()).unwrap();
        timer.arm(1);
        timer.disarm();
        timer.arm(7);
        thread::sleep(Duration::from_millis(200));
        let epochs: Vec<u64> = queue
            .drain()
            .filter_map(|m| match m {
                UiMessage::IdleTimeout { epoch } => Some(epoch),
                _ => None,
            })
            .collect();
        assert_eq!(epochs, vec![7]);
        timer.shutdown();
    }

    #[test]
    fn unarmed_never_fires() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(20), queue.sender()).unwrap();
        timer.on_activity();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(timeouts(&queue), 0);
        timer.shutdown();
    }

    #[test]
    fn disarm_cancels_pending_timeout() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(60), queue.sender()).unwrap();
        timer.arm(1);
        timer.disarm();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(timeouts(&queue), 0);
        timer.shutdown();
    }

    #[test]
    fn activity_pushes_the_deadline() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(150), queue.sender()).unwrap();
        timer.arm(1);
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(60));
            timer.on_activity();
        }
        assert_eq!(timeouts(&queue), 0);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(timeouts(&queue), 1);
        timer.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let queue = MessageQueue::new();
        let mut timer = InactivityTimer::spawn(Duration::from_millis(10), queue.sender()).unwrap();
        timer.shutdown();
        timer.shutdown();
        timer.arm(1);
    }
}
