use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use marketlens_core::{
    AssetType, CatalogEntry, IngestConfig, IngestionPipeline, ReqwestHttpClient, SeriesInterval,
    SymbolCatalog,
};

use crate::cli::IngestArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandResult};

pub async fn run(args: &IngestArgs, db: Option<&Path>) -> Result<CommandResult, CliError> {
    let config = build_config(IngestConfig::from_env()?, args, db)?;
    let pipeline = IngestionPipeline::open(&config, Arc::new(ReqwestHttpClient::new()))?;

    let report = pipeline
        .run(&config.catalog, args.mode.into(), args.since)
        .await;
    let failed = report.has_failures();

    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_partial_failure(failed))
}

fn build_config(
    mut config: IngestConfig,
    args: &IngestArgs,
    db: Option<&Path>,
) -> Result<IngestConfig, CliError> {
    if let Some(db) = db {
        config = config.with_db_path(db);
    }
    if let Some(path) = &args.catalog {
        config = config.with_catalog(SymbolCatalog::from_file(path)?);
    }
    for raw in &args.intraday {
        config.catalog.push(CatalogEntry::new(
            AssetType::Stock,
            SeriesInterval::FiveMinutes,
            parse_symbol(raw)?,
        ));
    }
    if let Some(millis) = args.min_interval_ms {
        config = config.with_min_request_interval(Duration::from_millis(millis));
    }
    config.validate()?;
    Ok(config)
}
