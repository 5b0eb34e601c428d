//! Query command implementation.

use super::open_snapshots;
use restmirror_query::QueryParams;
use restmirror_sync::LocalMirror;
use std::path::Path;

/// Parses `key=value` arguments into query params, keeping their order.
pub fn parse_params(raw: &[String]) -> Result<QueryParams, Box<dyn std::error::Error>> {
    let mut params = QueryParams::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got {:?}", pair))?;
        params.push(key, value);
    }
    Ok(params)
}

/// Runs the query command.
///
/// Every supplied key is allowed, so the query runs exactly as given.
pub fn run(
    path: &Path,
    resource: &str,
    tenant: &str,
    url: &str,
    raw_params: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, _) = open_snapshots(path)?;
    if registry.get(resource).is_none() {
        return Err(format!("No snapshot for resource {:?}", resource).into());
    }

    let params = parse_params(raw_params)?;
    let allowed: Vec<&str> = params.iter().map(|(k, _)| k).collect();
    let mirror = LocalMirror::open(&registry, resource);
    let page = mirror.list(tenant, url, &params, allowed.as_slice())?;

    match format {
        "json" => {
            let data: Vec<_> = page.results.iter().map(|r| r.data.clone()).collect();
            let body = serde_json::json!({
                "count": page.count,
                "next": page.next,
                "previous": page.previous,
                "results": data,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        _ => {
            println!("{} of {} record(s)", page.results.len(), page.count);
            for record in &page.results {
                let data = record
                    .data
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "null".to_string());
                println!("  [{:<6}] {}  {}", record.method().as_str(), record.path(), data);
            }
            if let Some(next) = &page.next {
                println!("Next: {}", next);
            }
            if let Some(previous) = &page.previous {
                println!("Previous: {}", previous);
            }
        }
    }

    Ok(())
}
