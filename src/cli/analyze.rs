use std::path::Path;

use anyhow::Context;

use journal_batch::reference::ReferenceData;
use journal_batch::{analyze_batch, AnalyzeOptions, ReferenceSnapshot, SqliteReference};

use super::input::read_rows;
use super::report::render_text;
use super::{OutputFormat, SettingsOverrides};

/// `.json` files are snapshots; anything else is opened as a SQLite database.
pub fn open_reference(path: &Path) -> anyhow::Result<Box<dyn ReferenceData>> {
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let snapshot = ReferenceSnapshot::load(path)
            .with_context(|| format!("loading reference snapshot {}", path.display()))?;
        Ok(Box::new(snapshot))
    } else {
        let db = SqliteReference::open(path)
            .with_context(|| format!("opening reference database {}", path.display()))?;
        Ok(Box::new(db))
    }
}

pub fn run(
    file: &Path,
    reference: &Path,
    sheet: Option<&str>,
    format: OutputFormat,
    overrides: &SettingsOverrides,
) -> anyhow::Result<()> {
    let settings = super::settings::effective(overrides)?;
    let reference = open_reference(reference)?;
    let rows = read_rows(file, sheet).with_context(|| format!("reading {}", file.display()))?;

    let options = AnalyzeOptions::from_settings(&settings);
    let result = analyze_batch(&rows, reference.as_ref(), &options)
        .with_context(|| format!("analyzing {}", file.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print!("{}", render_text(&result)),
    }
    Ok(())
}
