//! HTTP request handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use drycc_log_store::{validate_app, LogStorage};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WeblogState;
use crate::config::parse_flag;
use crate::error::WeblogResult;

/// Query parameters of `GET /logs/{app}`.
///
/// Values stay raw strings so that malformed input falls back to the caps
/// instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    /// Number of historical lines to return.
    pub log_lines: Option<String>,
    /// Whether to keep streaming new lines.
    pub follow: Option<String>,
    /// Seconds to keep following.
    pub timeout: Option<String>,
}

/// Handle GET /healthz.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Handle GET /logs/{app}.
///
/// Writes the most recent lines, then live lines while following. The body
/// is streamed; a client that goes away drops the stream, which cancels the
/// live tail.
pub async fn get_logs(
    State(state): State<Arc<WeblogState>>,
    Path(app): Path<String>,
    Query(query): Query<LogQuery>,
) -> WeblogResult<Response> {
    validate_app(&app)?;
    let config = state.config();
    let lines = config.log_lines(query.log_lines.as_deref());
    let history = state.storage.read(&app, lines).await?;
    info!(app = %app, lines, "returning logs");

    let live = if parse_flag(query.follow.as_deref()) {
        let timeout = config.follow_timeout(query.timeout.as_deref());
        stream::once(follow(state.storage(), app, config.follow_capacity, timeout))
            .flatten()
            .boxed()
    } else {
        stream::empty().boxed()
    };

    let body = stream::iter(history)
        .map(|line| terminate(&line))
        .chain(live)
        .map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Handle DELETE /logs/{app}.
pub async fn delete_logs(
    State(state): State<Arc<WeblogState>>,
    Path(app): Path<String>,
) -> WeblogResult<StatusCode> {
    validate_app(&app)?;
    state.storage.destroy(&app).await?;
    info!(app = %app, "deleted logs");
    Ok(StatusCode::OK)
}

/// Opens a live tail that is cancelled once `timeout` elapses.
async fn follow(
    storage: Arc<dyn LogStorage>,
    app: String,
    capacity: usize,
    timeout: Duration,
) -> BoxStream<'static, String> {
    let cancel = CancellationToken::new();
    match storage.tail(&app, capacity, cancel.clone()).await {
        Ok(tail) => {
            debug!(app = %app, timeout_secs = timeout.as_secs(), "following logs");
            let deadline = async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            };
            tail.take_until(deadline).map(|line| terminate(&line)).boxed()
        }
        Err(err) => {
            warn!(app = %app, error = %err, "cannot follow logs");
            stream::empty().boxed()
        }
    }
}

/// Strips trailing newlines and appends exactly one.
fn terminate(line: &str) -> String {
    format!("{}\n", line.trim_end_matches('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a", "a\n" ; "bare")]
    #[test_case("a\n", "a\n" ; "one newline")]
    #[test_case("a\n\n", "a\n" ; "several newlines")]
    #[test_case("", "\n" ; "empty")]
    fn lines_end_with_one_newline(line: &str, expected: &str) {
        assert_eq!(terminate(line), expected);
    }
}
