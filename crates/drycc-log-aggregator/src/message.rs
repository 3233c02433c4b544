//! The wire envelope produced by the cluster's log shipper.
//!
//! Example envelope:
//!
//! ```json
//! {"log": "2016/05/31 01:34:43 10.164.1.1 GET / - 5074209722772702441\n",
//!  "stream": "stderr", "time": "2016-05-31T01:34:43+00:00",
//!  "kubernetes": {"namespace_name": "foo", "pod_id": "34ebc234-2423-11e6-94aa-42010a800021",
//!   "pod_name": "foo-web-2417451227-2ggow", "container_name": "foo-web",
//!   "labels": {"app": "foo", "heritage": "drycc", "type": "web", "version": "v2"},
//!   "host": "gke-default-pool-7ae1c279-10ye"}}
//! ```

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Which output stream a container line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// One log record as shipped from a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The raw text the container wrote, possibly newline terminated.
    #[serde(default)]
    pub log: String,
    /// The stream the text was written to.
    #[serde(default)]
    pub stream: OutputStream,
    /// When the line was written, with the shipper's UTC offset.
    pub time: DateTime<FixedOffset>,
    /// Where the line came from.
    #[serde(default)]
    pub kubernetes: Kubernetes,
}

/// Orchestration metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Kubernetes {
    /// Namespace of the pod.
    #[serde(default, rename = "namespace_name")]
    pub namespace: String,
    /// Unique id of the pod.
    #[serde(default)]
    pub pod_id: String,
    /// Name of the pod, `<app>-<type>-<hash>-<suffix>` for application pods.
    #[serde(default)]
    pub pod_name: String,
    /// Name of the container inside the pod.
    #[serde(default)]
    pub container_name: String,
    /// Pod labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Node the pod runs on.
    #[serde(default)]
    pub host: String,
}

impl Kubernetes {
    /// Returns a label value, treating an empty value as absent.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl Message {
    /// Decodes an envelope from raw JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid envelope.
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_MESSAGE: &str = r#"{"log": "test message", "stream": "stderr", "time": "2016-10-18T20:29:38+00:00", "docker": {"container_id": "containerId"}, "kubernetes": {"namespace_name": "foo", "pod_id": "podId", "pod_name": "foo-web-845861952-nzf60", "container_name": "foo-web", "labels": {"app": "foo", "heritage": "drycc", "type": "web", "version": "v2"}, "host": "host"}}"#;

    #[test]
    fn decodes_full_envelope() {
        let message = Message::from_slice(APP_MESSAGE.as_bytes()).unwrap();
        assert_eq!(message.log, "test message");
        assert_eq!(message.stream, OutputStream::Stderr);
        assert_eq!(message.time.to_rfc3339(), "2016-10-18T20:29:38+00:00");
        assert_eq!(message.kubernetes.namespace, "foo");
        assert_eq!(message.kubernetes.pod_name, "foo-web-845861952-nzf60");
        assert_eq!(message.kubernetes.container_name, "foo-web");
        assert_eq!(message.kubernetes.label("type"), Some("web"));
        assert_eq!(message.kubernetes.host, "host");
    }

    #[test]
    fn empty_labels_are_absent() {
        let raw = r#"{"log": "x", "time": "2016-10-18T20:29:38Z", "kubernetes": {"labels": {"app": ""}}}"#;
        let message = Message::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(message.kubernetes.label("app"), None);
        assert_eq!(message.kubernetes.label("missing"), None);
        assert_eq!(message.stream, OutputStream::Stdout);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Message::from_slice(br#"{"log":}"#).is_err());
    }

    #[test]
    fn rejects_missing_time() {
        assert!(Message::from_slice(br#"{"log": "x"}"#).is_err());
    }
}
