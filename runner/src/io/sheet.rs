//! Spreadsheet ingestion: discovery, header cleanup, row mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Reader};

use crate::core::normalize::{clean_column_name, norm_float, norm_phone, norm_space};
use crate::core::types::{MatchBy, RowContext};

/// Logical fields carried into [`RowContext::fields`]. Column names match
/// after header cleanup.
pub const PROFILE_FIELD_KEYS: [&str; 20] = [
    "nama_usaha_pembetulan",
    "nama_komersial_usaha",
    "alamat_pembetulan",
    "nama_sls",
    "kodepos",
    "nomor_telepon",
    "nomor_whatsapp",
    "website",
    "idsbr_master",
    "kdprov_pindah",
    "kdkab_pindah",
    "kdprov",
    "kdkab",
    "kdkec",
    "kddesa",
    "jenis_kepemilikan_usaha",
    "sumber_profiling",
    "catatan_profiling",
    // Coordinates are only written when the operator maps a selector for
    // them, but they still need numeric normalization here.
    "latitude",
    "longitude",
];

const PHONE_KEYS: [&str; 2] = ["nomor_telepon", "nomor_whatsapp"];
const FLOAT_KEYS: [&str; 2] = ["latitude", "longitude"];

// Presence of any of these marks a usable header row.
const KEY_COLUMNS: [&str; 4] = ["idsbr", "nama", "keberadaan_usaha", "status"];

/// Resolve the spreadsheet path: explicit argument, or exactly one `.xlsx`
/// found in `search_dir` or `search_dir/data`. Zero or several candidates
/// are fatal preconditions.
pub fn resolve_excel(path_arg: Option<&Path>, search_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = path_arg {
        if !path.is_file() {
            bail!("spreadsheet not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for location in [search_dir.to_path_buf(), search_dir.join("data")] {
        if !location.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&location)
            .with_context(|| format!("scan {}", location.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("xlsx")
                && !candidates.contains(&path)
            {
                candidates.push(path);
            }
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => bail!(
            "no .xlsx found in {} or its data/ folder; pass --excel explicitly",
            search_dir.display()
        ),
        1 => Ok(candidates.remove(0)),
        _ => bail!(
            "more than one .xlsx found; pick one with --excel. Candidates: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Read the sheet at `sheet_index` and map rows `start..=end` (1-based,
/// inclusive, defaulting to the whole sheet) into contexts.
///
/// Returns the contexts plus the effective display range.
pub fn load_rows(
    path: &Path,
    sheet_index: usize,
    match_by: MatchBy,
    start: Option<u32>,
    end: Option<u32>,
) -> Result<(Vec<RowContext>, u32, u32)> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("open spreadsheet {}", path.display()))?;
    let sheet_names = workbook.sheet_names().to_owned();
    let Some(sheet_name) = sheet_names.get(sheet_index) else {
        bail!(
            "sheet index {sheet_index} out of range; {} has {} sheet(s)",
            path.display(),
            sheet_names.len()
        );
    };
    let range = workbook
        .worksheet_range(sheet_name)
        .with_context(|| format!("read sheet '{sheet_name}' of {}", path.display()))?;

    let mut rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    if rows.is_empty() {
        bail!("sheet '{sheet_name}' of {} is empty", path.display());
    }

    let mut headers: Vec<String> = rows
        .remove(0)
        .iter()
        .map(|h| clean_column_name(h))
        .collect();
    // Multi-row headers put the real column names on the second line.
    if !has_key_column(&headers) && !rows.is_empty() {
        headers = rows.remove(0).iter().map(|h| clean_column_name(h)).collect();
    }
    if !has_key_column(&headers) {
        bail!(
            "could not find key columns ({}) in {}",
            KEY_COLUMNS.join(", "),
            path.display()
        );
    }
    validate_match_columns(&headers, match_by)?;

    let total = rows.len() as u32;
    let (start_display, end_display) = display_range(total, start, end)
        .with_context(|| format!("row range for sheet '{sheet_name}' of {}", path.display()))?;

    let mut contexts = Vec::new();
    for display_index in start_display..=end_display {
        let table_index = (display_index - 1) as usize;
        let Some(cells) = rows.get(table_index) else {
            break;
        };
        contexts.push(context_from_cells(&headers, cells, table_index, display_index));
    }
    Ok((contexts, start_display, end_display))
}

/// Clamp the requested 1-based inclusive range to the sheet's data rows.
/// A start beyond the last row is an operator mistake, not an empty run.
fn display_range(total: u32, start: Option<u32>, end: Option<u32>) -> Result<(u32, u32)> {
    if total == 0 {
        bail!("no data rows below the header");
    }
    let start_display = start.unwrap_or(1).max(1);
    if start_display > total {
        bail!("--start {start_display} is beyond the last data row ({total})");
    }
    Ok((start_display, end.unwrap_or(total).min(total)))
}

fn has_key_column(headers: &[String]) -> bool {
    KEY_COLUMNS
        .iter()
        .any(|key| headers.iter().any(|h| h == key))
        || headers.iter().any(|h| h == "idsbr_master")
}

fn validate_match_columns(headers: &[String], match_by: MatchBy) -> Result<()> {
    let required: &[&str] = match match_by {
        MatchBy::Index => return Ok(()),
        MatchBy::Idsbr => &["idsbr", "idsbr_master"],
        MatchBy::Name => &["nama", "nama_usaha", "nama_usaha_pembetulan", "nama_komersial_usaha"],
    };
    if required.iter().any(|col| headers.iter().any(|h| h == col)) {
        Ok(())
    } else {
        bail!(
            "match strategy needs one of these columns: {}",
            required.join(", ")
        )
    }
}

/// Map one spreadsheet row into a [`RowContext`]. Pure; exercised directly
/// in tests without an actual workbook.
pub fn context_from_cells(
    headers: &[String],
    cells: &[String],
    table_index: usize,
    display_index: u32,
) -> RowContext {
    let get = |names: &[&str]| -> String {
        for name in names {
            if let Some(pos) = headers.iter().position(|h| h == name) {
                let value = norm_space(cells.get(pos).map(String::as_str).unwrap_or(""));
                if !value.is_empty() {
                    return value;
                }
            }
        }
        String::new()
    };

    let mut fields = BTreeMap::new();
    for key in PROFILE_FIELD_KEYS {
        let raw = get(&[key]);
        if raw.is_empty() {
            continue;
        }
        let value = if PHONE_KEYS.contains(&key) {
            norm_phone(&raw)
        } else if FLOAT_KEYS.contains(&key) {
            norm_float(&raw)
        } else {
            raw
        };
        // Empty after normalization means nothing usable; skip, never clear.
        if !value.is_empty() {
            fields.insert(key.to_string(), value);
        }
    }

    RowContext {
        table_index,
        row_index: display_index,
        idsbr: get(&["idsbr", "idsbr_master"]),
        name: get(&[
            "nama",
            "nama_usaha",
            "nama_usaha_pembetulan",
            "nama_komersial_usaha",
        ]),
        status_raw: get(&["status", "keberadaan_usaha"]),
        fields,
    }
}
