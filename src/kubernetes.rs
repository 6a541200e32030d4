use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use futures::{AsyncRead, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Config as WatcherConfig, watcher};
use kube::{Api, Client, Config};
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, info};

use crate::error::{ClusterError, ConfigError, ErrorKind};
use crate::types::{LogRequest, PodIdentity, PodRecord, Selector};

/// Raw log bytes of one container, in the order the API server sends them.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Wake-up signals for pod changes under a selector. Payloads are dropped;
/// consumers re-list to learn the current state.
pub type WatchStream = BoxStream<'static, Result<(), ClusterError>>;

/// The read-only cluster calls the locator and streamer depend on.
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Pods matching the selector, in the order the API returns them.
    async fn list_pods(&self, selector: &Selector) -> Result<Vec<PodRecord>, ClusterError>;

    async fn watch_pods(&self, selector: &Selector) -> Result<WatchStream, ClusterError>;

    /// Opens a follow-mode log stream for one container of `pod`.
    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &PodIdentity,
        request: &LogRequest,
    ) -> Result<LogStream, ClusterError>;
}

/// [`PodSource`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn list_pods(&self, selector: &Selector) -> Result<Vec<PodRecord>, ClusterError> {
        let params = ListParams::default().labels(&selector.labels);
        let pods = self.pods(&selector.namespace).list(&params).await?;
        debug!(count = pods.items.len(), "Listed pods");
        Ok(pods.items.iter().map(PodRecord::from).collect())
    }

    async fn watch_pods(&self, selector: &Selector) -> Result<WatchStream, ClusterError> {
        let cfg = WatcherConfig::default().labels(&selector.labels);
        let events = watcher(self.pods(&selector.namespace), cfg)
            .default_backoff()
            .map_ok(|_| ())
            .map_err(ClusterError::from)
            .boxed();
        Ok(events)
    }

    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &PodIdentity,
        request: &LogRequest,
    ) -> Result<LogStream, ClusterError> {
        let params = LogParams {
            follow: true,
            container: request.container.clone(),
            tail_lines: request.tail_lines,
            since_seconds: request.since_seconds,
            ..Default::default()
        };
        let stream = self.pods(namespace).log_stream(pod.name(), &params).await?;
        Ok(Box::pin(stream))
    }
}

/// Sorts a client error into retryable or not.
pub fn classify(err: &kube::Error) -> ErrorKind {
    match err {
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => {
            ErrorKind::Transient
        }
        kube::Error::Api(response) if matches!(response.code, 408 | 429 | 500 | 502 | 503 | 504) => {
            ErrorKind::Transient
        }
        _ => ErrorKind::Permanent,
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        let kind = classify(&err);
        ClusterError::new(kind, err)
    }
}

impl From<watcher::Error> for ClusterError {
    fn from(err: watcher::Error) -> Self {
        let kind = match &err {
            watcher::Error::InitialListFailed(e)
            | watcher::Error::WatchStartFailed(e)
            | watcher::Error::WatchFailed(e) => classify(e),
            // The watcher resumes on its own after anything else.
            _ => ErrorKind::Transient,
        };
        ClusterError::new(kind, err)
    }
}

/// Builds a client from an explicit kubeconfig and/or context, falling back
/// to the usual inference (KUBECONFIG, ~/.kube/config, in-cluster).
pub async fn create_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<Client, ConfigError> {
    let options = KubeConfigOptions {
        context: context.map(String::from),
        ..Default::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| ConfigError::Credentials(e.into()))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| ConfigError::Credentials(e.into()))?
        }
        None if context.is_some() => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| ConfigError::Credentials(e.into()))?,
        None => Config::infer()
            .await
            .map_err(|e| ConfigError::Credentials(e.into()))?,
    };

    info!(cluster = %config.cluster_url, "Using cluster");
    Client::try_from(config).map_err(|e| ConfigError::Credentials(e.into()))
}
