//! Single-slot hand-off of the latest pod identity from the locator to the streamer.
//!
//! Publishing overwrites whatever has not been consumed yet, so a slow consumer
//! only ever observes the newest identity.

use std::time::Duration;
use tokio::sync::watch;

use crate::error::TailError;
use crate::types::PodIdentity;

/// Publishing half, owned by the locator.
#[derive(Debug)]
pub struct Mailbox {
    tx: watch::Sender<Option<PodIdentity>>,
}

/// Consuming half, owned by the streamer.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Option<PodIdentity>>,
}

pub fn channel() -> (Mailbox, Subscription) {
    let (tx, rx) = watch::channel(None);
    (Mailbox { tx }, Subscription { rx })
}

impl Mailbox {
    /// Replaces the held identity. Returns `false` (and wakes nobody) when the
    /// same pod is already held.
    pub fn publish(&self, pod: PodIdentity) -> bool {
        self.tx.send_if_modified(|held| {
            if held.as_ref() == Some(&pod) {
                false
            } else {
                *held = Some(pod);
                true
            }
        })
    }

    pub fn current(&self) -> Option<PodIdentity> {
        self.tx.borrow().clone()
    }
}

impl Subscription {
    /// Waits until something has been published and marks it as seen.
    pub async fn first(&mut self) -> Result<PodIdentity, TailError> {
        let held = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TailError::MailboxClosed)?;
        held.clone().ok_or(TailError::MailboxClosed)
    }

    /// Waits for a publish newer than the last one seen. Cancel safe.
    pub async fn next(&mut self) -> Result<PodIdentity, TailError> {
        loop {
            self.rx
                .changed()
                .await
                .map_err(|_| TailError::MailboxClosed)?;
            if let Some(pod) = self.rx.borrow_and_update().clone() {
                return Ok(pod);
            }
        }
    }

    /// Like [`Subscription::next`], giving up with `None` after `timeout`.
    pub async fn next_within(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<PodIdentity>, TailError> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(pod) => pod.map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_consumer_sees_only_latest() {
        let (mailbox, mut sub) = channel();
        assert!(mailbox.publish(PodIdentity::new("a")));
        assert!(mailbox.publish(PodIdentity::new("b")));
        assert!(mailbox.publish(PodIdentity::new("c")));

        assert_eq!(sub.first().await.unwrap(), PodIdentity::new("c"));
        let pending = sub.next_within(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pending, None);
    }

    #[tokio::test]
    async fn republishing_same_pod_is_suppressed() {
        let (mailbox, mut sub) = channel();
        mailbox.publish(PodIdentity::new("p1"));
        assert_eq!(sub.first().await.unwrap(), PodIdentity::new("p1"));

        assert!(!mailbox.publish(PodIdentity::new("p1")));
        let pending = sub.next_within(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pending, None);
        assert_eq!(mailbox.current(), Some(PodIdentity::new("p1")));
    }

    #[tokio::test]
    async fn next_wakes_on_new_pod() {
        let (mailbox, mut sub) = channel();
        mailbox.publish(PodIdentity::new("p1"));
        sub.first().await.unwrap();

        let waiter = tokio::spawn(async move { sub.next().await });
        mailbox.publish(PodIdentity::new("p2"));
        assert_eq!(waiter.await.unwrap().unwrap(), PodIdentity::new("p2"));
    }

    #[tokio::test]
    async fn dropped_publisher_closes_subscription() {
        let (mailbox, mut sub) = channel();
        drop(mailbox);
        assert!(matches!(sub.first().await, Err(TailError::MailboxClosed)));
    }
}
