//! Concurrent multi-stream orchestration
//!
//! Each stream runs in its own task over a shared engine. Streams fail
//! independently: one stream's error never aborts the others, and every
//! stream leaves a consistent persisted bookmark behind regardless.

use futures_util::future::join_all;
use tracing::{error, info};

use super::{StreamConfig, SyncEngine, SyncError, SyncSummary};

/// Terminal result of one stream's run
#[derive(Debug)]
pub struct StreamOutcome {
    /// Stream name
    pub stream: &'static str,
    /// Summary on success, first fatal error otherwise
    pub result: Result<SyncSummary, SyncError>,
}

impl StreamOutcome {
    /// Whether the stream completed
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every configured stream to completion and collect the outcomes.
///
/// Schemas are announced before the stream's first record. Outcomes come
/// back in the input order.
pub async fn sync_streams(engine: SyncEngine, streams: Vec<StreamConfig>) -> Vec<StreamOutcome> {
    let tasks = streams.into_iter().map(|stream| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let name = stream.name();
            let result = run_stream(&engine, &stream).await;
            match &result {
                Ok(summary) => {
                    info!(stream = name, emitted = summary.emitted, "Stream completed")
                }
                Err(e) => error!(stream = name, error = %e, "Stream failed"),
            }
            StreamOutcome {
                stream: name,
                result,
            }
        })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => StreamOutcome {
                stream: "<unknown>",
                result: Err(SyncError::Task(e.to_string())),
            },
        })
        .collect()
}

async fn run_stream(engine: &SyncEngine, stream: &StreamConfig) -> Result<SyncSummary, SyncError> {
    engine.announce(stream)?;
    engine.sync(stream).await
}
