//! Tracks the newest pod matching a selector and publishes its identity.

use futures::FutureExt;
use futures::stream::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::LocatorSettings;
use crate::error::{ClusterError, TailError};
use crate::kubernetes::{PodSource, WatchStream};
use crate::mailbox::Mailbox;
use crate::types::{PodRecord, Selector};

/// Picks the pod with the greatest creation timestamp. On ties the pod listed
/// first wins; pods without a timestamp lose to any pod that has one.
pub fn latest_pod(pods: &[PodRecord]) -> Option<&PodRecord> {
    let mut latest: Option<&PodRecord> = None;
    for pod in pods {
        match latest {
            Some(current) if pod.created <= current.created => {}
            _ => latest = Some(pod),
        }
    }
    latest
}

pub struct Locator<S> {
    source: Arc<S>,
    selector: Selector,
    settings: LocatorSettings,
    mailbox: Mailbox,
    span: Span,
}

impl<S: PodSource + 'static> Locator<S> {
    pub fn new(
        source: Arc<S>,
        selector: Selector,
        settings: LocatorSettings,
        mailbox: Mailbox,
    ) -> Self {
        let span = info_span!(
            "locator",
            selector = %selector.labels,
            namespace = %selector.namespace
        );
        Self {
            source,
            selector,
            settings,
            mailbox,
            span,
        }
    }

    /// Runs until cancelled or until the cluster fails in a way retries
    /// cannot fix.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TailError> {
        let span = self.span.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Pod locator cancelled");
                    Ok(())
                }
                res = self.locate() => {
                    if let Err(err) = &res {
                        error!(error = %err, "Pod locator giving up");
                    }
                    res.map_err(TailError::from)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn locate(&self) -> Result<(), ClusterError> {
        info!("Starting pod watcher");
        let mut events = self.watch().await?;
        self.reconcile().await?;

        let mut failures = 0;
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(())) => {
                        failures = 0;
                        let coalesced = self.drain_ready(&mut events, &mut failures)?;
                        info!(coalesced, "Observed watch event");
                    }
                    Some(Err(err)) => {
                        failures += 1;
                        self.tolerate(failures, err, "watch")?;
                    }
                    None => {
                        info!("Watch stream closed, re-establishing");
                        events = self.watch().await?;
                    }
                },
                _ = tokio::time::sleep(self.settings.resync_interval) => {
                    info!(
                        interval_secs = self.settings.resync_interval.as_secs(),
                        "Timeout waiting for watch events"
                    );
                }
            }

            self.reconcile().await?;
        }
    }

    /// Re-lists and publishes the newest pod. An empty listing keeps
    /// whatever was published before.
    async fn reconcile(&self) -> Result<(), ClusterError> {
        let pods = self
            .retry("list", || self.source.list_pods(&self.selector))
            .await?;
        info!(num = pods.len(), "Found matching pods");

        let Some(latest) = latest_pod(&pods) else {
            warn!(
                previous = ?self.mailbox.current().map(|p| p.to_string()),
                "No pods match selector"
            );
            return Ok(());
        };

        let identity = latest.identity();
        if self.mailbox.publish(identity.clone()) {
            info!(pod = %identity, "Found latest pod");
        } else {
            debug!(pod = %identity, "Latest pod unchanged");
        }
        Ok(())
    }

    async fn watch(&self) -> Result<WatchStream, ClusterError> {
        self.retry("watch", || self.source.watch_pods(&self.selector))
            .await
    }

    /// Consumes events that are already queued so a burst costs one re-list.
    fn drain_ready(
        &self,
        events: &mut WatchStream,
        failures: &mut u32,
    ) -> Result<usize, ClusterError> {
        let mut coalesced = 1;
        while let Some(Some(event)) = events.next().now_or_never() {
            match event {
                Ok(()) => coalesced += 1,
                Err(err) => {
                    *failures += 1;
                    self.tolerate(*failures, err, "watch")?;
                    break;
                }
            }
        }
        Ok(coalesced)
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ClusterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClusterError>>,
    {
        let mut failures = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failures += 1;
                    self.tolerate(failures, err, operation)?;
                    let delay = self.settings.retry.delay(failures);
                    debug!(operation, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Logs a failure and decides whether it is fatal.
    fn tolerate(
        &self,
        failures: u32,
        err: ClusterError,
        operation: &'static str,
    ) -> Result<(), ClusterError> {
        if !err.is_transient() || failures > self.settings.retry.max_attempts {
            error!(
                operation,
                kind = %err.kind,
                failures,
                error = %err,
                "Cluster call failed"
            );
            return Err(err);
        }
        warn!(
            operation,
            kind = %err.kind,
            attempt = failures,
            max_attempts = self.settings.retry.max_attempts,
            error = %err,
            "Cluster call failed, retrying"
        );
        Ok(())
    }
}
