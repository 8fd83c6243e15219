//! Run configuration: CLI merging, profile files, selector and status maps.
//!
//! Precedence is CLI flag, then profile file value, then built-in default.
//! Profile and map files are JSON, intended to be edited by operators, so
//! parse failures must explain themselves.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::retry::RetryPolicy;
use crate::core::status_map::StatusMapper;
use crate::core::types::MatchBy;
use crate::io::driver::FieldLocator;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9222";
pub const DEFAULT_MAX_WAIT_MS: u64 = 6_000;
pub const DEFAULT_SETTLE_MS: u64 = 300;
pub const DEFAULT_KEEP_RUNS: usize = 10;

const DEFAULT_FIELD_SELECTORS: [(&str, &str); 18] = [
    (
        "nama_usaha_pembetulan",
        "input#nama_usaha_pembetulan, input[name='nama_usaha_pembetulan'], \
         input#nama_usaha, input[name='namaUsaha'], input[name='nama_usaha']",
    ),
    (
        "nama_komersial_usaha",
        "input#nama_komersial_usaha, input[name='nama_komersial_usaha'], \
         input#nama_komersial, input[name='nama_komersial'], \
         input#nama-komersial, input[name='namaKomersial'], \
         input[placeholder*='Nama Komersial']",
    ),
    (
        "alamat_pembetulan",
        "textarea#alamat_pembetulan, textarea[name='alamat_pembetulan'], \
         input#alamat_pembetulan, input[name='alamat_pembetulan'], \
         input#alamat_usaha, input[name='alamat'], input#alamat",
    ),
    (
        "nama_sls",
        "input#nama_sls, input[name='nama_sls'], input#sls, input[name='sls']",
    ),
    (
        "kodepos",
        "input#kodepos, input[name='kodepos'], input[name='kode_pos']",
    ),
    (
        "nomor_telepon",
        "input#nomor_telepon, input[name='nomor_telepon'], input[name='telepon'], \
         input[name='no_telp'], input[name='no_telp_usaha']",
    ),
    (
        "nomor_whatsapp",
        "input#whatsapp, input[name='whatsapp'], input[name='nomor_whatsapp'], input[name='no_whatsapp']",
    ),
    ("website", "input#website, input[name='website']"),
    ("idsbr_master", "input#idsbr_master, input[name='idsbr_master']"),
    ("kdprov_pindah", "input#kdprov_pindah, input[name='kdprov_pindah']"),
    ("kdkab_pindah", "input#kdkab_pindah, input[name='kdkab_pindah']"),
    ("kdprov", "input#kdprov, input[name='kdprov']"),
    ("kdkab", "input#kdkab, input[name='kdkab']"),
    ("kdkec", "input#kdkec, input[name='kdkec']"),
    ("kddesa", "input#kddesa, input[name='kddesa']"),
    (
        "jenis_kepemilikan_usaha",
        "select#jenis_kepemilikan_usaha, select[name='jenis_kepemilikan_usaha'], \
         input#jenis_kepemilikan_usaha, input[name='jenis_kepemilikan_usaha']",
    ),
    (
        "sumber_profiling",
        "#sumber_profiling, input#sumber_profiling, input[name='sumber_profiling'], \
         textarea#sumber_profiling, textarea[name='sumber_profiling']",
    ),
    (
        "catatan_profiling",
        "#catatan_profiling, textarea#catatan_profiling, textarea[name='catatan_profiling']",
    ),
];

// select2-backed fields: click the container, type, confirm with Enter.
const DEFAULT_SELECT2_SELECTORS: [(&str, &str); 8] = [
    ("kdprov_pindah", "#provinsi_pindah"),
    ("kdkab_pindah", "#kabupaten_kota_pindah"),
    ("kdprov", "#provinsi"),
    ("kdkab", "#kabupaten_kota"),
    ("kdkec", "#kecamatan"),
    ("kddesa", "#kelurahan_desa"),
    ("jenis_kepemilikan_usaha", "#jenis_kepemilikan_usaha"),
    ("bentuk_badan_hukum_usaha", "#badan_usaha"),
];

/// Logical field name -> selector tables. select2 entries win over plain
/// CSS entries for the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorMap {
    pub fields: BTreeMap<String, String>,
    pub select2: BTreeMap<String, String>,
}

impl Default for SelectorMap {
    fn default() -> Self {
        let fields = DEFAULT_FIELD_SELECTORS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let select2 = DEFAULT_SELECT2_SELECTORS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { fields, select2 }
    }
}

impl SelectorMap {
    /// How to drive `name`, or `None` when the field is unknown. Unknown
    /// names are a warning at fill time, never an error.
    pub fn locator_for(&self, name: &str) -> Option<FieldLocator> {
        if let Some(selector) = self.select2.get(name) {
            return Some(FieldLocator::Select2(selector.clone()));
        }
        self.fields
            .get(name)
            .map(|selector| FieldLocator::Css(selector.clone()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SelectorFile {
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    select2: BTreeMap<String, String>,
}

/// Load a selector map, merging file entries over the built-in defaults.
pub fn load_selector_map(path: Option<&Path>) -> Result<SelectorMap> {
    let mut map = SelectorMap::default();
    let Some(path) = path else {
        return Ok(map);
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read selector map {}", path.display()))?;
    let file: SelectorFile = serde_json::from_str(&contents)
        .with_context(|| format!("parse selector map {}", path.display()))?;
    map.fields.extend(file.fields);
    map.select2.extend(file.select2);
    Ok(map)
}

/// Load status overrides and build the mapper. Overrides merge over the
/// built-in table; they never remove entries.
pub fn load_status_mapper(path: Option<&Path>) -> Result<StatusMapper> {
    let Some(path) = path else {
        return Ok(StatusMapper::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read status map {}", path.display()))?;
    let overrides: BTreeMap<String, String> = serde_json::from_str(&contents)
        .with_context(|| format!("parse status map {}", path.display()))?;
    Ok(StatusMapper::with_overrides(&overrides))
}

/// Operator-provided defaults for CLI options. Unknown keys are rejected
/// so typos do not silently fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDefaults {
    pub excel: Option<PathBuf>,
    pub sheet: Option<usize>,
    pub match_by: Option<MatchBy>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub stop_on_error: Option<bool>,
    pub resume: Option<bool>,
    pub dry_run: Option<bool>,
    pub skip_status: Option<bool>,
    pub status_map: Option<PathBuf>,
    pub selectors: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub max_wait_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub run_label: Option<String>,
    pub keep_days: Option<usize>,
    pub screenshot_on_ok: Option<bool>,
    pub artifacts: Option<PathBuf>,
    pub notify_url: Option<String>,
}

/// Load a profile file, or an empty profile when no path is given.
pub fn load_profile(path: Option<&Path>) -> Result<ProfileDefaults> {
    let Some(path) = path else {
        return Ok(ProfileDefaults::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read profile {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse profile {}", path.display()))
}

/// CLI values before profile merging. All optional so the profile can
/// fill whatever the operator left unset.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub excel: Option<PathBuf>,
    pub sheet: Option<usize>,
    pub match_by: Option<MatchBy>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub stop_on_error: bool,
    pub resume: bool,
    pub resume_from: Option<PathBuf>,
    pub dry_run: bool,
    pub skip_status: bool,
    pub status_map: Option<PathBuf>,
    pub selectors: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub max_wait_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub run_label: Option<String>,
    pub keep_days: Option<usize>,
    pub screenshot_on_ok: bool,
    pub artifacts: Option<PathBuf>,
    pub notify_url: Option<String>,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub excel: Option<PathBuf>,
    pub sheet: usize,
    pub match_by: MatchBy,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub stop_on_error: bool,
    pub resume: bool,
    pub resume_from: Option<PathBuf>,
    pub dry_run: bool,
    pub skip_status: bool,
    pub endpoint: String,
    pub max_wait: Duration,
    pub settle: Duration,
    pub run_label: Option<String>,
    pub keep_runs: usize,
    pub screenshot_on_ok: bool,
    pub artifacts: PathBuf,
    pub notify_url: Option<String>,
    pub retry: RetryPolicy,
    pub selectors: SelectorMap,
    pub status_mapper: StatusMapper,
}

impl RunConfig {
    /// Merge CLI values over profile defaults and load the map files.
    pub fn resolve(cli: RunOverrides, profile: &ProfileDefaults) -> Result<Self> {
        let selectors_path = cli.selectors.or_else(|| profile.selectors.clone());
        let status_map_path = cli.status_map.or_else(|| profile.status_map.clone());

        let config = Self {
            excel: cli.excel.or_else(|| profile.excel.clone()),
            sheet: cli.sheet.or(profile.sheet).unwrap_or(0),
            match_by: cli.match_by.or(profile.match_by).unwrap_or(MatchBy::Index),
            start: cli.start.or(profile.start),
            end: cli.end.or(profile.end),
            stop_on_error: cli.stop_on_error || profile.stop_on_error.unwrap_or(false),
            resume: cli.resume || profile.resume.unwrap_or(false),
            resume_from: cli.resume_from,
            dry_run: cli.dry_run || profile.dry_run.unwrap_or(false),
            skip_status: cli.skip_status || profile.skip_status.unwrap_or(false),
            endpoint: cli
                .endpoint
                .or_else(|| profile.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            max_wait: Duration::from_millis(
                cli.max_wait_ms
                    .or(profile.max_wait_ms)
                    .unwrap_or(DEFAULT_MAX_WAIT_MS),
            ),
            settle: Duration::from_millis(
                cli.settle_ms.or(profile.settle_ms).unwrap_or(DEFAULT_SETTLE_MS),
            ),
            run_label: cli.run_label.or_else(|| profile.run_label.clone()),
            keep_runs: cli
                .keep_days
                .or(profile.keep_days)
                .unwrap_or(DEFAULT_KEEP_RUNS),
            screenshot_on_ok: cli.screenshot_on_ok || profile.screenshot_on_ok.unwrap_or(false),
            artifacts: cli
                .artifacts
                .or_else(|| profile.artifacts.clone())
                .unwrap_or_else(|| PathBuf::from("artifacts")),
            notify_url: cli.notify_url.or_else(|| profile.notify_url.clone()),
            retry: RetryPolicy::default(),
            selectors: load_selector_map(selectors_path.as_deref())?,
            status_mapper: load_status_mapper(status_map_path.as_deref())?,
        };

        if let (Some(start), Some(end)) = (config.start, config.end) {
            if start > end {
                bail!("--start {start} is beyond --end {end}");
            }
        }
        if config.start == Some(0) {
            bail!("--start is 1-based; 0 is not a valid row");
        }
        Ok(config)
    }
}
