//! Inventory rendering: terminal table, CSV and JSON

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use csv::Writer;
use std::path::Path;
use tracing::info;

use netcrawl_core::Inventory;
use netcrawl_discovery::DiscoveryReport;

/// Column order shared by the table and the CSV
pub const COLUMNS: [&str; 3] = ["address", "platform", "hostname"];

/// Rendered inventory
#[derive(Debug, Clone)]
pub struct Rendered {
    pub table: String,
    pub csv: Vec<u8>,
}

/// Render the inventory as a table and as CSV, in inventory order
pub fn render(inventory: &Inventory) -> Result<Rendered> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(COLUMNS.to_vec());

    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record(COLUMNS)?;

    for record in inventory {
        let address = record.address.to_string();
        table.add_row(vec![
            Cell::new(&address),
            Cell::new(record.platform.as_str()),
            Cell::new(&record.hostname),
        ]);
        wtr.write_record([
            address.as_str(),
            record.platform.as_str(),
            record.hostname.as_str(),
        ])?;
    }

    let csv = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV writer error: {}", e))?;

    Ok(Rendered {
        table: table.to_string(),
        csv,
    })
}

/// Full report as pretty JSON
pub fn render_json(report: &DiscoveryReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the CSV inventory, replacing any previous file
pub fn write_csv(path: &Path, rendered: &Rendered) -> Result<()> {
    std::fs::write(path, &rendered.csv)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Inventory written");
    Ok(())
}
