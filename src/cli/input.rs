use std::path::Path;

use tracing::debug;

use journal_batch::error::{BatchError, Result};
use journal_batch::models::RawImportRow;

/// Decode a CSV or XLSX batch into rows numbered as a spreadsheet would show them.
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<RawImportRow>> {
    let is_workbook = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "xlsx" | "xlsm" | "xls" | "ods"));
    let rows = if is_workbook {
        read_workbook(path, sheet)?
    } else {
        read_csv(path)?
    };
    debug!(path = %path.display(), rows = rows.len(), "decoded input");
    Ok(rows)
}

/// The header is row 1; data rows keep their physical line number.
pub fn read_csv(path: &Path) -> Result<Vec<RawImportRow>> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim_start_matches('\u{feff}').to_string()).collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        let row_number = record
            .position()
            .map(|p| p.line() as u32)
            .unwrap_or(idx as u32 + 2);
        let cells = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()));
        rows.push(RawImportRow::new(row_number, cells));
    }
    Ok(rows)
}

#[cfg(any(feature = "xlsx", test))]
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    // Excel's epoch is 1899-12-30 once the 1900 leap-year bug is accounted for
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

#[cfg(feature = "xlsx")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(feature = "xlsx")]
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<RawImportRow>> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| BatchError::Workbook(format!("Failed to open {}: {e}", path.display())))?;
    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| BatchError::Workbook("Workbook has no sheets".to_string()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| BatchError::Workbook(format!("Sheet '{name}': {e}")))?;
    let first_row = range.start().map(|(row, _)| row).unwrap_or(0);

    let mut iter = range.rows();
    let Some(header_row) = iter.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(cell_text).collect();

    let rows = iter
        .enumerate()
        .map(|(idx, cells)| {
            // header occupies the first spreadsheet row of the range
            let row_number = first_row + idx as u32 + 2;
            RawImportRow::new(
                row_number,
                headers
                    .iter()
                    .zip(cells.iter().map(cell_text).chain(std::iter::repeat(String::new())))
                    .map(|(h, v)| (h.clone(), v)),
            )
        })
        .collect();
    Ok(rows)
}

#[cfg(not(feature = "xlsx"))]
pub fn read_workbook(path: &Path, _sheet: Option<&str>) -> Result<Vec<RawImportRow>> {
    Err(BatchError::Workbook(format!(
        "{} is a workbook, but jbatch was built without the xlsx feature",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("batch.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_csv_rows_numbered_from_two() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Account,Amount,Memo\n1000,100,Rent\n4000,-100,Rent\n");
        let rows = read_rows(&path, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[1].row_number, 3);
        assert_eq!(rows[0].cells[2], ("Memo".to_string(), "Rent".to_string()));
    }

    #[test]
    fn test_csv_short_records_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Account,Amount,Location\n1000,\"1,250.00\"\n");
        let rows = read_csv(&path).unwrap();
        assert_eq!(rows[0].cells.len(), 3);
        assert_eq!(rows[0].cells[1].1, "1,250.00");
        assert_eq!(rows[0].cells[2].1, "");
    }

    #[test]
    fn test_csv_keeps_blank_rows_for_the_normalizer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Account,Amount\n1000,5\n,\n4000,-5\n");
        let rows = read_csv(&path).unwrap();
        let numbers: Vec<u32> = rows.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
        assert!(rows[1].is_blank());
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45658.0).as_deref(), Some("2025-01-01"));
        assert_eq!(excel_serial_to_date(45658.75).as_deref(), Some("2025-01-01"));
    }
}
