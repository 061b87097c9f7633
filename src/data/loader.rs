//! Yearly file recognition, parsing and the normalized-table cache.
//!
//! Files are matched to an expected year by a year token in their file
//! name. Once every expected year has a file, the contents are parsed,
//! concatenated in year order and normalized. The normalized table is
//! cached under a SHA-256 digest of the inputs, so loading the same four
//! files again reuses the earlier result. Only the most recently used
//! tables are kept.

use crate::data::normalize::{normalize_rows, null_if_token, RawRow};
use crate::error::LoadError;
use crate::models::SalesTable;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const DATE_COLUMN: &str = "FechaMov";
/// Normalized tables kept by the loader cache.
pub const CACHE_CAPACITY: usize = 3;
const QUANTITY_COLUMN: &str = "Cantidad";
const FAMILY_COLUMN: &str = "Familia";

/// One recognized yearly file and its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// Files supplied so far, keyed by the year they were recognized as.
#[derive(Debug, Clone)]
pub struct UploadSet {
    expected_years: Vec<i32>,
    files: BTreeMap<i32, UploadedFile>,
}

impl UploadSet {
    pub fn new(expected_years: Vec<i32>) -> Self {
        Self {
            expected_years,
            files: BTreeMap::new(),
        }
    }

    /// Find the first expected year whose digits appear in the file name.
    pub fn recognize_year(&self, path: &Path) -> Option<i32> {
        let name = path.file_name()?.to_string_lossy();
        self.expected_years
            .iter()
            .copied()
            .find(|year| name.contains(&year.to_string()))
    }

    /// Read a file from disk and register it under its year.
    pub fn add_file(&mut self, path: &Path) -> Result<i32, LoadError> {
        if self.recognize_year(path).is_none() {
            return Err(LoadError::UnrecognizedYear(path.to_path_buf()));
        }

        let contents = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.add_contents(path, contents)
    }

    /// Register already-read contents under the year found in `path`.
    pub fn add_contents(&mut self, path: &Path, contents: Vec<u8>) -> Result<i32, LoadError> {
        let year = self
            .recognize_year(path)
            .ok_or_else(|| LoadError::UnrecognizedYear(path.to_path_buf()))?;

        let file = UploadedFile {
            path: path.to_path_buf(),
            contents,
        };

        if let Some(previous) = self.files.insert(year, file) {
            warn!(
                "Replacing {} with {} for year {}",
                previous.path.display(),
                path.display(),
                year
            );
        }

        debug!("Recognized {} as year {}", path.display(), year);
        Ok(year)
    }

    pub fn expected_years(&self) -> &[i32] {
        &self.expected_years
    }

    /// Expected years that still have no file.
    pub fn missing_years(&self) -> Vec<i32> {
        self.expected_years
            .iter()
            .copied()
            .filter(|year| !self.files.contains_key(year))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_years().is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Recognized files in ascending year order.
    pub fn files(&self) -> impl Iterator<Item = (&i32, &UploadedFile)> {
        self.files.iter()
    }

    /// Digest of the year-ordered contents; identical inputs give identical keys.
    pub fn content_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (year, file) in &self.files {
            hasher.update(year.to_le_bytes());
            hasher.update((file.contents.len() as u64).to_le_bytes());
            hasher.update(&file.contents);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Parsing options shared by every yearly file.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub delimiter: u8,
    pub date_format: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            date_format: "%d/%m/%Y".to_string(),
        }
    }
}

impl From<&crate::config::DataConfig> for LoaderOptions {
    fn from(config: &crate::config::DataConfig) -> Self {
        Self {
            delimiter: u8::try_from(config.delimiter).unwrap_or(b','),
            date_format: config.date_format.clone(),
        }
    }
}

/// Builds normalized tables from complete upload sets, with caching.
pub struct DatasetLoader {
    options: LoaderOptions,
    /// Least recently used first.
    cache: VecDeque<(String, Arc<SalesTable>)>,
}

impl DatasetLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            cache: VecDeque::with_capacity(CACHE_CAPACITY),
        }
    }

    /// Combine and normalize a complete upload set.
    ///
    /// Returns [`LoadError::Incomplete`] without producing a table when any
    /// expected year is missing.
    pub fn load(&mut self, uploads: &UploadSet) -> Result<Arc<SalesTable>, LoadError> {
        let missing = uploads.missing_years();
        if !missing.is_empty() {
            return Err(LoadError::Incomplete { missing });
        }

        let key = uploads.content_key();
        if let Some(pos) = self.cache.iter().position(|(cached, _)| *cached == key) {
            if let Some(entry) = self.cache.remove(pos) {
                let table = Arc::clone(&entry.1);
                info!("Reusing cached dataset ({} rows)", table.len());
                self.cache.push_back(entry);
                return Ok(table);
            }
        }

        let mut rows = Vec::new();
        for (year, file) in uploads.files() {
            let parsed = parse_file(&file.path, &file.contents, self.options.delimiter)?;
            info!(
                "Read {} rows for {} from {}",
                parsed.len(),
                year,
                file.path.display()
            );
            rows.extend(parsed);
        }

        let table = Arc::new(normalize_rows(rows, &self.options.date_format));
        info!("Normalized dataset: {} rows", table.len());

        if self.cache.len() == CACHE_CAPACITY {
            if let Some((evicted, _)) = self.cache.pop_front() {
                debug!("Evicting cached dataset {}", &evicted[..12]);
            }
        }
        self.cache.push_back((key, Arc::clone(&table)));
        Ok(table)
    }

    /// Number of distinct normalized tables held in the cache.
    pub fn cached_tables(&self) -> usize {
        self.cache.len()
    }
}

/// Decode ISO-8859-1 bytes; every byte maps to the code point of equal value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Parse one delimited file into raw rows of the three core columns.
pub fn parse_file(path: &Path, contents: &[u8], delimiter: u8) -> Result<Vec<RawRow>, LoadError> {
    let text = decode_latin1(contents);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let column = |name: &str| {
        headers.iter().position(|h| {
            // A UTF-8 byte-order mark shows up as "ï»¿" once decoded as Latin-1.
            h.trim().trim_start_matches("ï»¿").trim_start_matches('\u{feff}') == name
        })
    };

    let date_idx = column(DATE_COLUMN).ok_or_else(|| LoadError::MissingColumn {
        path: path.to_path_buf(),
        column: DATE_COLUMN.to_string(),
    })?;
    let quantity_idx = column(QUANTITY_COLUMN);
    let family_idx = column(FAMILY_COLUMN);

    if quantity_idx.is_none() {
        warn!("{} has no '{}' column", path.display(), QUANTITY_COLUMN);
    }
    if family_idx.is_none() {
        warn!("{} has no '{}' column", path.display(), FAMILY_COLUMN);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(null_if_token);

        rows.push(RawRow {
            date: cell(Some(date_idx)),
            quantity: cell(quantity_idx),
            family: cell(family_idx),
        });
    }

    Ok(rows)
}

/// Find `*.csv` files under `dir`, up to `max_depth` levels deep, sorted.
pub fn discover_csv_files(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth.max(1))
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    files
}
