//! Classification and formatting of wire envelopes into stored log lines.
//!
//! Two origins are recognised:
//!
//! - control-plane messages, from a container whose name contains
//!   `drycc-controller`, stored under the application named in the payload's
//!   bracketed tag as `<time> drycc[controller]: <SEVERITY> <text>`
//! - application messages, stored under the pod's application as
//!   `<time> <app>[<type>.<version>.<pod suffix>]: <text>`

use chrono::{DateTime, FixedOffset};
use drycc_log_store::{validate_app, LogStorage};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AggregatorError, Result};
use crate::message::{Kubernetes, Message};

/// Container name marking control-plane messages.
pub const CONTROLLER_CONTAINER: &str = "drycc-controller";

/// Timestamp layout of stored lines, e.g. `2016-10-18T20:29:38+00:00`.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

static CONTROLLER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(INFO|WARN|DEBUG|ERROR)\s+(\[(\S+)\])+:(.*)").unwrap_or_else(|_| unreachable!())
});

/// `<deployment...>-<hash>-<suffix>` with at least four segments.
static POD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w.*)-(\w.*)-(\w.*)-(\w.*)$").unwrap_or_else(|_| unreachable!()));

/// A formatted line and the application it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Application identity the line is stored under.
    pub app: String,
    /// The formatted, single-line text.
    pub line: String,
}

/// Returns true if the message was written by the control plane.
#[must_use]
pub fn from_controller(message: &Message) -> bool {
    message.kubernetes.container_name.contains(CONTROLLER_CONTAINER)
}

/// Formats a message into the line stored for it.
///
/// # Errors
///
/// Returns [`AggregatorError::Classification`] if a control-plane message
/// does not have the `SEVERITY [app]: text` shape, or if the derived
/// application name cannot name a log.
pub fn classify(message: &Message) -> Result<LogLine> {
    let entry = if from_controller(message) {
        classify_controller(message)?
    } else {
        classify_application(message)
    };
    validate_app(&entry.app).map_err(|err| AggregatorError::Classification(err.to_string()))?;
    Ok(entry)
}

fn classify_controller(message: &Message) -> Result<LogLine> {
    let caps = CONTROLLER_LINE.captures(&message.log).ok_or_else(|| {
        AggregatorError::Classification(format!(
            "controller message does not match 'SEVERITY [app]: text': {:?}",
            message.log
        ))
    })?;
    let (Some(severity), Some(app), Some(text)) = (caps.get(1), caps.get(3), caps.get(4)) else {
        return Err(AggregatorError::Classification(
            "controller message is missing its application tag".to_string(),
        ));
    };
    let line = format!(
        "{} drycc[controller]: {} {}",
        format_time(&message.time),
        severity.as_str(),
        single_line(text.as_str().trim_matches(' '))
    );
    Ok(LogLine {
        app: app.as_str().to_string(),
        line,
    })
}

fn classify_application(message: &Message) -> LogLine {
    let k8s = &message.kubernetes;
    let app = application_name(k8s);
    let kind = k8s.label("type").unwrap_or_default();
    let version = k8s.label("version").unwrap_or_default();
    let tag = match pod_suffix(&k8s.pod_name) {
        Some(suffix) => format!("{kind}.{version}.{suffix}"),
        None => format!("{kind}.{version}"),
    };
    let line = format!(
        "{} {app}[{tag}]: {}",
        format_time(&message.time),
        single_line(&message.log)
    );
    LogLine { app, line }
}

/// Derives the application identity of an application pod.
///
/// The `app` label wins. Otherwise the pod name loses its replica-set hash
/// and pod suffix, and then its `-<type>` suffix. Pod names with fewer than
/// four segments are used as they are.
#[must_use]
pub fn application_name(k8s: &Kubernetes) -> String {
    if let Some(app) = k8s.label("app") {
        return app.to_string();
    }
    let Some(deployment) = deployment_name(&k8s.pod_name) else {
        return k8s.pod_name.clone();
    };
    k8s.label("type")
        .and_then(|kind| deployment.strip_suffix(kind))
        .and_then(|rest| rest.strip_suffix('-'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(deployment)
        .to_string()
}

/// Returns the pod name without its last two segments.
fn deployment_name(pod_name: &str) -> Option<&str> {
    let caps = POD_NAME.captures(pod_name)?;
    let end = caps.get(2)?.end();
    Some(&pod_name[..end])
}

/// Returns the last segment of a pod name with at least four segments.
#[must_use]
pub fn pod_suffix(pod_name: &str) -> Option<&str> {
    POD_NAME
        .captures(pod_name)
        .and_then(|caps| caps.get(4))
        .map(|m| m.as_str())
}

fn format_time(time: &DateTime<FixedOffset>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Strips trailing line breaks and folds any inner ones into spaces.
fn single_line(text: &str) -> String {
    text.trim_end_matches(['\n', '\r']).replace(['\n', '\r'], " ")
}

/// Decodes, classifies and stores one raw envelope.
///
/// # Errors
///
/// Returns an error if the envelope cannot be decoded or classified, or if
/// the storage rejects the line.
pub async fn handle(raw: &[u8], storage: &dyn LogStorage) -> Result<LogLine> {
    let message = Message::from_slice(raw)?;
    let entry = classify(&message)?;
    storage.write(&entry.app, &entry.line).await?;
    Ok(entry)
}
