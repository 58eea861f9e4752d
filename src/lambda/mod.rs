// src/lambda/mod.rs

//! AWS Lambda handler for timer-triggered runs.
//!
//! Each invocation:
//! 1. Loads configuration from S3 (or defaults) plus environment overrides
//! 2. Runs the pipeline once against the S3-backed notified set
//! 3. Returns the run summary

use std::sync::Arc;

use chrono::Utc;
use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::LambdaConfigLoader;
use crate::error::Result;
use crate::models::{RunSummary, parse_region_list};
use crate::pipeline::Notifier;
use crate::storage::s3::S3Storage;

/// Lambda invocation payload. Scheduled events carry none of these fields.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Comma-separated regions replacing the configured list
    #[serde(default)]
    pub regions: Option<String>,

    /// Lookback window replacing the configured one
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct RunResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<RunRequest>,
) -> std::result::Result<RunResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();
    info!("Starting run: {:?}", request);

    match run_once(&request).await {
        Ok(summary) => {
            let elapsed = start.elapsed().as_millis() as u64;
            info!(
                "Run completed: {} sent, {} failed in {}ms",
                summary.sent(),
                summary.failed(),
                elapsed
            );
            Ok(RunResponse {
                success: summary.persist_error.is_none(),
                error: summary.persist_error.clone(),
                summary: Some(summary),
                execution_time_ms: elapsed,
            })
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Ok(RunResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

async fn run_once(request: &RunRequest) -> Result<RunSummary> {
    let storage = S3Storage::from_env().await?;
    let mut config = LambdaConfigLoader::new(&storage).load_config().await?;

    if let Some(regions) = request.regions.as_deref() {
        config.run.regions = parse_region_list(regions);
    }
    if let Some(days) = request.lookback_days {
        config.run.lookback_days = days;
    }

    let notifier = Notifier::from_config(&config, Arc::new(storage))?;
    Ok(notifier.run(Utc::now().date_naive()).await)
}
