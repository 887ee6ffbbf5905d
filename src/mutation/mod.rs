//! Optimistic mutations.
//!
//! Every mutation writes its local result into the cache before the remote
//! call is sent, then settles into a [`Pending`] the caller can await.

mod coordinator;
mod drag;

use tokio::task::JoinHandle;

use crate::error::MutationError;

pub use coordinator::MutationCoordinator;
pub use drag::{DragMove, DropTarget, MoveOutcome};

/// A mutation whose local effect is already visible and whose remote write
/// is in flight.
#[derive(Debug)]
pub struct Pending<T> {
  handle: JoinHandle<Result<T, MutationError>>,
}

impl<T> Pending<T> {
  pub(crate) fn new(handle: JoinHandle<Result<T, MutationError>>) -> Self {
    Self { handle }
  }

  pub fn is_settled(&self) -> bool {
    self.handle.is_finished()
  }

  /// Wait for the remote write and its reconciliation.
  pub async fn settle(self) -> Result<T, MutationError> {
    self
      .handle
      .await
      .map_err(|e| MutationError::Join(e.to_string()))?
  }
}
