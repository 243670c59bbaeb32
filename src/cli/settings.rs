use anyhow::{bail, Context};
use comfy_table::{Cell, Table};

use journal_batch::fmt::money;
use journal_batch::normalizer::parse_amount;
use journal_batch::settings::{load_settings, save_settings, settings_path, Settings};

use super::SettingsOverrides;

/// Settings from the file with any command-line overrides applied.
pub fn effective(overrides: &SettingsOverrides) -> anyhow::Result<Settings> {
    let mut settings = load_settings();
    if let Some(client) = &overrides.client {
        settings.client_id = client.clone();
    }
    if let Some(column) = &overrides.group_column {
        settings.group_key_column = Some(column.clone()).filter(|c| !c.trim().is_empty());
    }
    if let Some(std_devs) = overrides.std_devs {
        if !(std_devs.is_finite() && std_devs > 0.0) {
            bail!("--std-devs must be a positive number");
        }
        settings.anomaly_std_devs = std_devs;
    }
    if let Some(raw) = &overrides.high_value {
        let cents = parse_amount(raw).with_context(|| format!("invalid --high-value amount '{raw}'"))?;
        settings.high_value_threshold_cents = cents.abs();
    }
    if let Some(workers) = overrides.workers {
        settings.workers = workers.max(1);
    }
    if let Some(ms) = overrides.timeout_ms {
        settings.timeout_ms = Some(ms);
    }
    Ok(settings)
}

pub fn run(overrides: &SettingsOverrides, save: bool) -> anyhow::Result<()> {
    let settings = effective(overrides)?;

    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec![Cell::new("Client"), Cell::new(&settings.client_id)]);
    table.add_row(vec![
        Cell::new("Group column"),
        Cell::new(settings.group_key_column.as_deref().unwrap_or("(zero-balance)")),
    ]);
    table.add_row(vec![Cell::new("Anomaly std devs"), Cell::new(settings.anomaly_std_devs)]);
    table.add_row(vec![
        Cell::new("High-value threshold"),
        Cell::new(money(settings.high_value_threshold_cents)),
    ]);
    table.add_row(vec![Cell::new("Workers"), Cell::new(settings.workers)]);
    table.add_row(vec![
        Cell::new("Timeout"),
        Cell::new(
            settings
                .timeout_ms
                .map(|ms| format!("{ms} ms"))
                .unwrap_or_else(|| "none".to_string()),
        ),
    ]);
    println!("{table}");

    if save {
        save_settings(&settings).context("saving settings")?;
        println!("Saved to {}", settings_path().display());
    }
    Ok(())
}
