//! Record command
//!
//! Usage: revtrail record <COLLECTION> <ID> --before <FILE> [--after <FILE>]

use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

use revtrail_core::{Attribution, HistoryOptions, Mutation};
use revtrail_engine::{CallContext, DiffHistory};

use super::{entity, open_store, read_json, CliResult};

#[derive(Debug, Args)]
pub struct RecordArgs {
    pub collection: String,
    pub id: String,

    /// Snapshot before the change (JSON file)
    #[arg(long)]
    pub before: PathBuf,

    /// Snapshot after the change; omit to record a delete
    #[arg(long)]
    pub after: Option<PathBuf>,

    /// Who made the change (JSON, or a bare string)
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub reason: Option<String>,

    /// History options (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(db: &str, args: RecordArgs) -> CliResult {
    let options = match &args.config {
        Some(path) => HistoryOptions::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => HistoryOptions::default(),
    };
    let history = DiffHistory::from_options(open_store(db)?, &options)?;

    let before = read_json(&args.before)?;
    let mutation = match &args.after {
        Some(path) => Mutation::Update {
            before,
            after: read_json(path)?,
        },
        None => Mutation::Delete { before },
    };

    let mut attribution = Attribution::new();
    if let Some(user) = args.user {
        attribution = attribution.with_user(parse_user(user));
    }
    if let Some(reason) = args.reason {
        attribution = attribution.with_reason(reason);
    }

    let target = entity(&args.collection, &args.id)?;
    match history
        .record_mutation(&target, &mutation, &attribution, &CallContext::new())
        .await?
    {
        Some(record) => println!("recorded version {}", record.version),
        None => println!("nothing recorded"),
    }
    Ok(())
}

fn parse_user(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_user() {
        assert_eq!(parse_user(r#"{"id": 3}"#.to_string()), json!({"id": 3}));
        assert_eq!(parse_user("alice".to_string()), json!("alice"));
    }
}
