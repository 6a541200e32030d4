use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::fmt;

/// The population of candidate pods: a label query within one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub namespace: String,
    pub labels: String,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{{{}}}", self.namespace, self.labels)
    }
}

/// Name of the pod whose logs should be streamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodIdentity(String);

impl PodIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parts of a listed pod that pod selection looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRecord {
    pub name: String,
    /// `None` when the API server did not report one; sorts before any timestamp.
    pub created: Option<Time>,
}

impl PodRecord {
    pub fn identity(&self) -> PodIdentity {
        PodIdentity::new(self.name.clone())
    }
}

impl From<&Pod> for PodRecord {
    fn from(pod: &Pod) -> Self {
        Self {
            name: pod.name_any(),
            created: pod.metadata.creation_timestamp.clone(),
        }
    }
}

/// Parameters for opening a follow-mode log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRequest {
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
}
