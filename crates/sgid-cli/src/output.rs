//! Plain and JSON renderings of command results.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use sgid_core::{AuditReport, CategorySequence};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn identifier(json: bool, id: &str, record_key: Option<&str>) -> Result<()> {
    if json {
        return print_json(&json!({ "record_key": record_key, "identifier": id }));
    }
    println!("{}", id);
    Ok(())
}

fn row_json(row: &CategorySequence) -> Result<serde_json::Value> {
    Ok(json!({
        "record_key": row.record_key,
        "category": row.pair.to_string(),
        "sequence_number": row.sequence_number,
        "identifier": row.identifier()?.to_string(),
        "allocated_at": row.allocated_at.to_rfc3339(),
    }))
}

pub fn row(json: bool, row: &CategorySequence) -> Result<()> {
    if json {
        return print_json(&row_json(row)?);
    }
    println!("{}", row.identifier()?);
    Ok(())
}

pub fn rows(json: bool, rows: &[CategorySequence]) -> Result<()> {
    if json {
        let values = rows.iter().map(row_json).collect::<Result<Vec<_>>>()?;
        return print_json(&values);
    }
    for row in rows {
        println!("{}\t{}", row.identifier()?, row.record_key);
    }
    Ok(())
}

pub fn audit(json: bool, report: &AuditReport) -> Result<()> {
    if json {
        return print_json(report);
    }
    for pair in &report.pairs {
        let status = if pair.is_consistent() { "ok" } else { "INCONSISTENT" };
        println!(
            "{}\trows={}\tcounter={}\tgaps={}\t{}",
            pair.pair,
            pair.row_count,
            pair.counter,
            pair.gaps.len(),
            status
        );
    }
    println!(
        "{} rows in {} categories",
        report.total_rows,
        report.pairs.len()
    );
    Ok(())
}
