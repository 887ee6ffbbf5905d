//! User-facing notifications.
//!
//! Mutation outcomes go to a single [`Notifier`]. Delivery is the sink's
//! business; the coordinator only hands off.

use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
}

impl Notification {
  pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind: NotificationKind::Success,
      title: title.into(),
      message: message.into(),
    }
  }

  pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind: NotificationKind::Error,
      title: title.into(),
      message: message.into(),
    }
  }
}

/// Sink for notifications. Must not block.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}

/// Forwards notifications over a channel, e.g. to a UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl Notifier for ChannelNotifier {
  fn notify(&self, notification: Notification) {
    // Receiver gone means nobody is listening anymore
    let _ = self.tx.send(notification);
  }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, notification: Notification) {
    match notification.kind {
      NotificationKind::Success => info!("{}: {}", notification.title, notification.message),
      NotificationKind::Error => error!("{}: {}", notification.title, notification.message),
    }
  }
}
