//! Follows the log stream of whichever pod the locator last published.

use futures::AsyncReadExt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::StreamerSettings;
use crate::error::TailError;
use crate::kubernetes::PodSource;
use crate::lines::LineAssembler;
use crate::mailbox::Subscription;
use crate::types::{LogRequest, PodIdentity};

/// How one stream for one pod came to an end.
#[derive(Debug)]
enum Outcome {
    /// A different pod was published.
    Switched(PodIdentity),
    /// End-of-data, a read error, or a failed open (`opened == false`).
    Ended { opened: bool },
}

enum Wake {
    Published(PodIdentity),
    Read(std::io::Result<usize>),
}

pub struct Streamer<S> {
    source: Arc<S>,
    namespace: String,
    settings: StreamerSettings,
    buffer: Vec<u8>,
    span: Span,
}

impl<S: PodSource + 'static> Streamer<S> {
    pub fn new(source: Arc<S>, namespace: String, settings: StreamerSettings) -> Self {
        let span = info_span!(
            "streamer",
            namespace = %namespace,
            container = settings.container.as_deref().unwrap_or("<default>")
        );
        Self {
            source,
            namespace,
            buffer: vec![0; settings.buffer_size.max(1)],
            settings,
            span,
        }
    }

    /// Writes log lines to `output` until cancelled. Only an output failure
    /// or the locator going away ends it early.
    pub async fn run<W>(
        mut self,
        subscription: Subscription,
        output: W,
        cancel: CancellationToken,
    ) -> Result<(), TailError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let span = self.span.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Log streamer cancelled");
                    Ok(())
                }
                res = self.follow_latest(subscription, output) => res,
            }
        }
        .instrument(span)
        .await
    }

    async fn follow_latest<W>(
        &mut self,
        mut subscription: Subscription,
        mut output: W,
    ) -> Result<(), TailError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        info!("Waiting for the first matching pod");
        let mut current = subscription.first().await?;
        // When the last successfully opened stream of `current` ended.
        let mut last_end: Option<Instant> = None;

        loop {
            let request = self.request_for(last_end);
            let outcome = self
                .stream_pod(&current, &request, &mut subscription, &mut output)
                .await?;

            let next = match outcome {
                Outcome::Switched(next) => Some(next),
                Outcome::Ended { opened } => {
                    if opened {
                        last_end = Some(Instant::now());
                    }
                    self.cool_down(&current, &mut subscription).await?
                }
            };

            if let Some(next) = next {
                info!(pod = %next, previous = %current, "Detected new pod");
                current = next;
                last_end = None;
            }
        }
    }

    /// A fresh pod gets the configured history; re-opening the same pod only
    /// asks for what was logged since its last stream ended.
    fn request_for(&self, last_end: Option<Instant>) -> LogRequest {
        match last_end {
            Some(ended) => {
                let elapsed = ended.elapsed();
                let secs = elapsed.as_secs() + u64::from(elapsed.subsec_nanos() > 0) + 1;
                LogRequest {
                    container: self.settings.container.clone(),
                    tail_lines: None,
                    since_seconds: Some(i64::try_from(secs).unwrap_or(i64::MAX)),
                }
            }
            None => LogRequest {
                container: self.settings.container.clone(),
                tail_lines: self.settings.tail_lines,
                since_seconds: None,
            },
        }
    }

    async fn stream_pod<W>(
        &mut self,
        pod: &PodIdentity,
        request: &LogRequest,
        subscription: &mut Subscription,
        output: &mut W,
    ) -> Result<Outcome, TailError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        info!(pod = %pod, since_seconds = ?request.since_seconds, "Starting to stream pod logs");
        let mut stream = match self
            .source
            .open_log_stream(&self.namespace, pod, request)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    pod = %pod,
                    kind = %err.kind,
                    error = %err,
                    cooldown_secs = self.settings.cooldown.as_secs(),
                    "Failed to open log stream"
                );
                return Ok(Outcome::Ended { opened: false });
            }
        };

        let mut lines = LineAssembler::new(self.buffer.len());
        let mut out = Vec::new();
        loop {
            let wake = tokio::select! {
                biased;
                next = subscription.next() => Wake::Published(next?),
                read = stream.read(&mut self.buffer) => Wake::Read(read),
            };

            match wake {
                Wake::Published(next) if &next == pod => {
                    debug!(pod = %pod, "Pod republished, keeping stream");
                }
                Wake::Published(next) => {
                    flush_partial(&mut lines, output).await?;
                    return Ok(Outcome::Switched(next));
                }
                Wake::Read(Ok(0)) => {
                    flush_partial(&mut lines, output).await?;
                    info!(pod = %pod, "Stream terminated");
                    return Ok(Outcome::Ended { opened: true });
                }
                Wake::Read(Ok(num_bytes)) => {
                    lines.push(&self.buffer[..num_bytes], |line| append_line(&mut out, line));
                    debug!(pod = %pod, num_bytes, "Read logs");
                    if !out.is_empty() {
                        output.write_all(&out).await?;
                        output.flush().await?;
                        out.clear();
                    }
                }
                Wake::Read(Err(err)) => {
                    flush_partial(&mut lines, output).await?;
                    warn!(pod = %pod, error = %err, "Error reading log stream");
                    return Ok(Outcome::Ended { opened: true });
                }
            }
        }
    }

    /// Waits out the cooldown, returning early with a different pod if one
    /// is published meanwhile.
    async fn cool_down(
        &self,
        current: &PodIdentity,
        subscription: &mut Subscription,
    ) -> Result<Option<PodIdentity>, TailError> {
        let deadline = Instant::now() + self.settings.cooldown;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match subscription.next_within(remaining).await? {
                Some(next) if &next != current => return Ok(Some(next)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

fn append_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    out.push(b'\n');
}

async fn flush_partial<W>(lines: &mut LineAssembler, output: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut out = Vec::new();
    lines.finish(|line| append_line(&mut out, line));
    if !out.is_empty() {
        output.write_all(&out).await?;
        output.flush().await?;
    }
    Ok(())
}
