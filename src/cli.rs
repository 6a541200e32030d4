use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tailpods")]
#[command(about = "Tail the logs of the most recent pod with the provided labels")]
pub struct Cli {
    /// The label selector to match pods on
    #[arg(short = 'l', long = "labels", visible_alias = "selector")]
    pub labels: String,

    /// Namespace
    #[arg(short = 'n', long)]
    pub namespace: String,

    /// Container whose logs to tail (defaults to the pod's default container)
    #[arg(short = 'c', long)]
    pub container: Option<String>,

    /// Path to the kubeconfig file (defaults to KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// Seconds to wait for watch events before re-listing pods anyway
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub resync_interval: u64,

    /// Seconds to wait before re-opening a log stream for the same pod
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub cooldown: u64,

    /// Size of the log read buffer in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 10_000_000)]
    pub buffer_size: usize,

    /// Number of lines of history to show when switching to a pod
    #[arg(long)]
    pub tail: Option<i64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
