//! Synthetic interaction dispatch.
//!
//! [`ActionDispatcher`] checks preconditions and then performs exactly one
//! call to the host's [`ActionChannel`]. It never retries; whether and when
//! to try again is the scheduler's decision.

use crate::tree::UiNode;
use std::sync::Arc;
use tracing::debug;

/// Why a synthetic interaction did not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// There was no node to act on.
    #[error("no node to act on")]
    MissingNode,

    /// The node does not accept synthetic clicks.
    #[error("node is not interactable")]
    NotInteractable,

    /// The host refused or failed to perform the action.
    #[error("host rejected action: {0}")]
    Rejected(String),

    /// The host's action channel is gone (service disconnected, permission revoked).
    #[error("action channel unavailable: {0}")]
    Unavailable(String),
}

/// Host-provided channel for synthetic interactions on nodes of type `N`.
pub trait ActionChannel<N>: Send + Sync {
    /// Perform one synthetic click on `node`.
    fn click(&self, node: &N) -> Result<(), DispatchError>;
}

/// Precondition-checking front for an [`ActionChannel`].
pub struct ActionDispatcher<C> {
    channel: Arc<C>,
}

impl<C> Clone for ActionDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<C> ActionDispatcher<C> {
    /// Dispatcher clicking through `channel`.
    pub fn new(channel: Arc<C>) -> Self {
        Self { channel }
    }

    /// Click `node`, performing at most one external call.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingNode`] / [`DispatchError::NotInteractable`]
    /// without touching the channel, otherwise whatever the channel reports.
    pub fn dispatch<N>(&self, node: Option<&N>) -> Result<(), DispatchError>
    where
        N: UiNode,
        C: ActionChannel<N>,
    {
        let Some(node) = node else {
            return Err(DispatchError::MissingNode);
        };
        if !node.is_interactable() {
            debug!(
                label = node.text_label().unwrap_or_default(),
                "skipping click on non-interactable node"
            );
            return Err(DispatchError::NotInteractable);
        }
        self.channel.click(node)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::tree::SnapshotNode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingChannel {
        calls: AtomicUsize,
        fail_with: Option<DispatchError>,
    }

    impl ActionChannel<Arc<SnapshotNode>> for CountingChannel {
        fn click(&self, _node: &Arc<SnapshotNode>) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn non_interactable_node_makes_no_external_call() {
        let channel = Arc::new(CountingChannel::default());
        let dispatcher = ActionDispatcher::new(Arc::clone(&channel));
        let node = SnapshotNode::labelled("Capture").interactable(false).into_shared();

        let result = dispatcher.dispatch(Some(&node));
        assert_eq!(result, Err(DispatchError::NotInteractable));
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_node_makes_no_external_call() {
        let channel = Arc::new(CountingChannel::default());
        let dispatcher = ActionDispatcher::new(Arc::clone(&channel));

        let result = dispatcher.dispatch::<Arc<SnapshotNode>>(None);
        assert_eq!(result, Err(DispatchError::MissingNode));
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn interactable_node_is_clicked_exactly_once() {
        let channel = Arc::new(CountingChannel::default());
        let dispatcher = ActionDispatcher::new(Arc::clone(&channel));
        let node = SnapshotNode::labelled("Capture").interactable(true).into_shared();

        assert!(dispatcher.dispatch(Some(&node)).is_ok());
        assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_failure_is_returned_without_retry() {
        let channel = Arc::new(CountingChannel {
            calls: AtomicUsize::new(0),
            fail_with: Some(DispatchError::Rejected("busy".to_owned())),
        });
        let dispatcher = ActionDispatcher::new(Arc::clone(&channel));
        let node = SnapshotNode::labelled("Capture").interactable(true).into_shared();

        let result = dispatcher.dispatch(Some(&node));
        assert_eq!(result, Err(DispatchError::Rejected("busy".to_owned())));
        assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
    }
}
