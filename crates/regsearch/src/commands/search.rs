//! Offline search over an index snapshot

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use regsearch_core::search::{self, SearchRequest, SearchResponse};
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use super::{load_config, open_index, snapshot_path};
use crate::cli::SearchArgs;
use crate::output;

#[derive(Tabled)]
struct HitRow {
    id: String,
    score: String,
    fields: String,
}

/// Run a search against the configured snapshot
pub async fn run(args: SearchArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = snapshot_path(args.snapshot, &config)
        .ok_or_else(|| anyhow!("No snapshot configured; pass --snapshot or set server.snapshot"))?;
    let store = open_index(Some(&snapshot))?;

    let request = SearchRequest {
        simple: args.simple,
        advanced: args.advanced,
        fields: args.fields,
        offset: args.offset,
        max_results: args.max_results,
    };
    let response =
        search::execute(&store, &request, config.config.search.default_max_results).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_hits(&response);
    }
    Ok(())
}

fn print_hits(response: &SearchResponse) {
    if response.hits.is_empty() {
        output::info(&format!("No hits ({} total matches)", response.total));
        return;
    }

    let rows: Vec<HitRow> = response
        .hits
        .iter()
        .map(|hit| HitRow {
            id: hit.id.clone(),
            score: format!("{:.2}", hit.score),
            fields: hit
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, compact(v)))
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    output::info(&format!(
        "Showing {}-{} of {}",
        response.offset + 1,
        response.offset + response.hits.len(),
        response.total
    ));
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
