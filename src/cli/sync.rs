//! Sync command: run configured streams end to end

use clap::Args;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Cli, CliError};
use crate::auth::OauthTokenProvider;
use crate::config::ConnectorConfig;
use crate::extract::CsvFileExtractor;
use crate::http::ApiClient;
use crate::registry::ReportType;
use crate::report::ReportJobClient;
use crate::schema::DefaultCoercer;
use crate::shutdown::SharedShutdown;
use crate::sink::JsonLinesSink;
use crate::state::{FileStateSink, StateSink, StateStore};
use crate::sync::{sync_streams, StreamConfig, SyncEngine};

/// Sync subcommand
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Path of the persisted bookmark state file
    #[arg(long, default_value = "state.json")]
    pub state: PathBuf,

    /// Skip emitting STATE messages to stdout
    #[arg(long)]
    pub no_state_messages: bool,
}

impl SyncCommand {
    /// Execute the sync command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = ConnectorConfig::load(&cli.config)?;
        let streams = selected_streams(&config)?;
        info!(streams = streams.len(), "Starting sync");

        let http = reqwest::Client::new();
        let tokens = Arc::new(OauthTokenProvider::new(
            http.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.refresh_token.clone(),
        ));
        let api = ApiClient::new(http, tokens);

        let file_sink = FileStateSink::new(self.state.clone());
        let initial = file_sink.load()?;
        let output = Arc::new(JsonLinesSink::stdout());
        let mut state_sinks: Vec<Box<dyn StateSink>> = vec![Box::new(file_sink)];
        if !self.no_state_messages {
            state_sinks.push(Box::new(Arc::clone(&output)));
        }
        let store = Arc::new(StateStore::new(initial, state_sinks));

        let engine = SyncEngine::new(
            Arc::new(ReportJobClient::new(api.clone(), Some(shutdown.clone()))),
            Arc::new(CsvFileExtractor::new(api)),
            output,
            Arc::new(DefaultCoercer),
            store,
            Some(shutdown),
        );

        let outcomes = sync_streams(engine, streams).await;
        let total = outcomes.len();
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(failed, total, "Sync finished with failures");
            return Err(CliError::StreamsFailed { failed, total });
        }
        info!(total, "Sync finished");
        Ok(())
    }
}

/// Resolve the configured stream selection, defaulting to every known stream
fn selected_streams(config: &ConnectorConfig) -> Result<Vec<StreamConfig>, CliError> {
    let report_types: Vec<ReportType> = match &config.streams {
        Some(names) => names
            .iter()
            .map(|name| {
                ReportType::from_str(name)
                    .map_err(|e| CliError::InvalidArgument(e.to_string()))
            })
            .collect::<Result<_, _>>()?,
        None => ReportType::all().to_vec(),
    };

    report_types
        .into_iter()
        .map(|report_type| StreamConfig::resolve(report_type, config).map_err(CliError::from))
        .collect()
}
