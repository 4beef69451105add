// src/utils/csv_export.rs

use crate::error::AppError;

/// Serializes a header row plus data rows into CSV text.
///
/// The output starts with a UTF-8 BOM so spreadsheet software opens
/// Vietnamese names with the right encoding.
pub fn write_rows<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>]) -> Result<String, AppError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    wtr.write_record(headers.iter().map(|h| h.as_ref()))
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    for row in rows {
        wtr.write_record(row)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let body = String::from_utf8(bytes)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(format!("\u{FEFF}{}", body))
}
