//! Mapping from spreadsheet status text to UI status option ids.
//!
//! The status cell may carry canonical text ("Aktif"), a known textual
//! variant ("aktif nonrespons"), or a numeric enumeration code ("1".."11").
//! Resolution is case- and whitespace-insensitive and never mutates the UI;
//! an unresolvable status is reported before any form interaction.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::normalize::norm_space;

/// Option id that marks a record as a duplicate of another IDSBR. Rows
/// resolving to this option take the check/accept flow before submission.
pub const DUPLICATE_OPTION: &str = "kondisi_duplikat";

const DEFAULT_STATUS_OPTIONS: [(&str, &str); 10] = [
    ("Aktif", "kondisi_aktif"),
    ("Tutup Sementara", "kondisi_tutup_sementara"),
    (
        "Belum Beroperasi/Berproduksi",
        "kondisi_belum_beroperasi_berproduksi",
    ),
    ("Tutup", "kondisi_tutup"),
    ("Alih Usaha", "kondisi_alih_usaha"),
    ("Tidak Ditemukan", "kondisi_tidak_ditemukan"),
    ("Aktif Pindah", "kondisi_aktif_pindah"),
    ("Aktif Nonrespon", "kondisi_aktif_nonrespon"),
    ("Duplikat", DUPLICATE_OPTION),
    ("Salah Kode Wilayah", "kondisi_salah_kode_wilayah"),
];

// Numeric enumeration used by field teams; 10 and 11 are both region-code
// corrections in the source data.
const NUMERIC_ALIASES: [(&str, &str); 11] = [
    ("1", "Aktif"),
    ("2", "Tutup Sementara"),
    ("3", "Belum Beroperasi/Berproduksi"),
    ("4", "Tutup"),
    ("5", "Alih Usaha"),
    ("6", "Tidak Ditemukan"),
    ("7", "Aktif Pindah"),
    ("8", "Aktif Nonrespon"),
    ("9", "Duplikat"),
    ("10", "Salah Kode Wilayah"),
    ("11", "Salah Kode Wilayah"),
];

const TEXT_ALIASES: [(&str, &str); 2] = [
    ("aktif nonrespons", "Aktif Nonrespon"),
    ("belum berproduksi", "Belum Beroperasi/Berproduksi"),
];

/// A status value that matched neither the canonical names, the textual
/// variants, nor the numeric codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{status}' (known: {known})")]
pub struct UnknownStatus {
    pub status: String,
    pub known: String,
}

/// Resolved status: canonical display name plus the UI option id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatus {
    pub canonical: String,
    pub option_id: String,
}

impl ResolvedStatus {
    pub fn is_duplicate(&self) -> bool {
        self.option_id == DUPLICATE_OPTION
    }
}

/// Status text -> option id table, defaults merged with any overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapper {
    options: BTreeMap<String, String>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        let options = DEFAULT_STATUS_OPTIONS
            .iter()
            .map(|(status, id)| ((*status).to_string(), (*id).to_string()))
            .collect();
        Self { options }
    }
}

impl StatusMapper {
    /// Defaults with `overrides` layered on top. Overrides add or replace
    /// entries, never remove them.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut mapper = Self::default();
        for (status, id) in overrides {
            mapper.options.insert(status.clone(), id.clone());
        }
        mapper
    }

    /// Resolve a raw status cell to its canonical name and option id.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedStatus, UnknownStatus> {
        let cleaned = norm_space(raw);
        if cleaned.is_empty() {
            return Err(self.unknown(raw));
        }

        let canonical = canonicalize(&cleaned);
        let lowered = canonical.to_lowercase();
        for (status, id) in &self.options {
            if status.to_lowercase() == lowered {
                return Ok(ResolvedStatus {
                    canonical: status.clone(),
                    option_id: id.clone(),
                });
            }
        }
        Err(self.unknown(raw))
    }

    fn unknown(&self, raw: &str) -> UnknownStatus {
        UnknownStatus {
            status: norm_space(raw),
            known: self
                .options
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Map numeric codes and textual variants onto canonical status names.
/// Unrecognized text passes through for the mapper's table lookup.
fn canonicalize(cleaned: &str) -> String {
    if cleaned.chars().all(|c| c.is_ascii_digit()) {
        for (code, status) in NUMERIC_ALIASES {
            if code == cleaned {
                return status.to_string();
            }
        }
    }
    let lowered = cleaned.to_lowercase();
    for (variant, status) in TEXT_ALIASES {
        if variant == lowered {
            return status.to_string();
        }
    }
    cleaned.to_string()
}
