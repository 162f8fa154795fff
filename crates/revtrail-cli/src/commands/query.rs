//! Read-only commands: log, show, summary

use clap::Args;
use std::path::PathBuf;

use revtrail_core::QueryOptions;
use revtrail_engine::{parse_version, CallContext, DiffHistory};

use super::{entity, open_store, read_json, CliResult};

#[derive(Debug, Args)]
pub struct LogArgs {
    pub collection: String,
    pub id: String,

    /// Newest first
    #[arg(long)]
    pub desc: bool,

    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub collection: String,
    pub id: String,
    pub version: String,

    /// Current snapshot (JSON file); omit when the entity was deleted
    #[arg(long)]
    pub current: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    pub collection: String,
    pub id: String,

    /// Top-level field to render with old and new values (repeatable)
    #[arg(long = "expand")]
    pub expand: Vec<String>,
}

pub async fn execute_log(db: &str, args: LogArgs) -> CliResult {
    let history = DiffHistory::new(open_store(db)?);
    let mut options = if args.desc {
        QueryOptions::descending()
    } else {
        QueryOptions::default()
    };
    options = options.with_skip(args.skip);
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }

    let records = history
        .get_diffs(&entity(&args.collection, &args.id)?, &options, &CallContext::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub async fn execute_show(db: &str, args: ShowArgs) -> CliResult {
    let version = parse_version(&args.version)?;
    let current = args.current.as_deref().map(read_json).transpose()?;
    let history = DiffHistory::new(open_store(db)?);

    let state = history
        .reconstruct(
            &entity(&args.collection, &args.id)?,
            current,
            version,
            &CallContext::new(),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn execute_summary(db: &str, args: SummaryArgs) -> CliResult {
    let history = DiffHistory::new(open_store(db)?);
    let summaries = history
        .get_histories(
            &entity(&args.collection, &args.id)?,
            args.expand.as_slice(),
            &CallContext::new(),
        )
        .await?;

    for summary in summaries {
        match &summary.reason {
            Some(reason) => println!(
                "{}  {} ({})",
                summary.changed_at.to_rfc3339(),
                summary.comment,
                reason
            ),
            None => println!("{}  {}", summary.changed_at.to_rfc3339(), summary.comment),
        }
    }
    Ok(())
}
