//! Scripted stand-in for the cluster used by the locator and streamer tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::{TryStreamExt, future};
use k8s_openapi::api::core::v1::Pod;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::ClusterError;
use crate::kubernetes::{LogStream, PodSource, WatchStream};
use crate::types::{LogRequest, PodIdentity, PodRecord, Selector};

pub fn pod(name: &str, created: &str) -> PodRecord {
    let pod: Pod = serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "creationTimestamp": created },
    }))
    .unwrap();
    PodRecord::from(&pod)
}

pub fn selector() -> Selector {
    Selector {
        namespace: "default".to_string(),
        labels: "app=web".to_string(),
    }
}

/// What the next `open_log_stream` call returns.
pub enum LogScript {
    Fail(ClusterError),
    /// Chunks followed by end-of-data.
    Finite(Vec<&'static str>),
    /// Chunks followed by a stream that never yields again.
    Follow(Vec<&'static str>),
    /// Chunks followed by a read error.
    Broken(Vec<&'static str>),
}

pub struct FakeCluster {
    listings: Mutex<VecDeque<Result<Vec<PodRecord>, ClusterError>>>,
    last_listing: Mutex<Vec<PodRecord>>,
    list_calls: AtomicUsize,
    watch_tx: mpsc::UnboundedSender<Result<(), ClusterError>>,
    watch_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<(), ClusterError>>>>,
    logs: Mutex<VecDeque<LogScript>>,
    opened: Mutex<Vec<(PodIdentity, LogRequest)>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            listings: Mutex::new(VecDeque::new()),
            last_listing: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            watch_tx,
            watch_rx: Mutex::new(Some(watch_rx)),
            logs: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Queues a listing. Once the queue runs dry the last good listing repeats.
    pub fn push_listing(&self, pods: Vec<PodRecord>) {
        self.listings.lock().unwrap().push_back(Ok(pods));
    }

    pub fn push_list_error(&self, err: ClusterError) {
        self.listings.lock().unwrap().push_back(Err(err));
    }

    pub fn push_log(&self, script: LogScript) {
        self.logs.lock().unwrap().push_back(script);
    }

    pub fn trigger(&self) {
        let _ = self.watch_tx.send(Ok(()));
    }

    pub fn fail_watch(&self, err: ClusterError) {
        let _ = self.watch_tx.send(Err(err));
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<(PodIdentity, LogRequest)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn opened_pods(&self) -> Vec<String> {
        self.opened()
            .into_iter()
            .map(|(pod, _)| pod.name().to_string())
            .collect()
    }
}

fn reader<S>(chunks: Vec<&'static str>, tail: S) -> LogStream
where
    S: futures::Stream<Item = io::Result<&'static [u8]>> + Send + Unpin + 'static,
{
    let chunks = stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes())));
    Box::pin(chunks.chain(tail).into_async_read())
}

#[async_trait]
impl PodSource for FakeCluster {
    async fn list_pods(&self, _selector: &Selector) -> Result<Vec<PodRecord>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.listings.lock().unwrap().pop_front() {
            Some(Ok(pods)) => {
                *self.last_listing.lock().unwrap() = pods.clone();
                Ok(pods)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last_listing.lock().unwrap().clone()),
        }
    }

    async fn watch_pods(&self, _selector: &Selector) -> Result<WatchStream, ClusterError> {
        match self.watch_rx.lock().unwrap().take() {
            Some(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn open_log_stream(
        &self,
        _namespace: &str,
        pod: &PodIdentity,
        request: &LogRequest,
    ) -> Result<LogStream, ClusterError> {
        self.opened
            .lock()
            .unwrap()
            .push((pod.clone(), request.clone()));
        match self.logs.lock().unwrap().pop_front() {
            Some(LogScript::Fail(err)) => Err(err),
            Some(LogScript::Finite(chunks)) => Ok(reader(chunks, stream::empty())),
            Some(LogScript::Follow(chunks)) => Ok(reader(chunks, stream::pending())),
            Some(LogScript::Broken(chunks)) => Ok(reader(
                chunks,
                stream::once(future::ready(Err(io::Error::other("connection reset")))),
            )),
            None => Ok(reader(Vec::new(), stream::pending())),
        }
    }
}
