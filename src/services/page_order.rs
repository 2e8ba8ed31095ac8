//! Filename page markers and merge ordering.
//!
//! Uploaded documents carry their place in the merged PDF in the filename,
//! using the `стр. N` / `стр. N-M` convention (Russian "page") the service
//! was built around; a bare leading `N-M` range and the `титул` title-page
//! marker are also recognized. Files without a recognizable marker sort
//! after everything else, keeping their discovery order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

/// Markers tried in order: explicit range, dangling range, single page.
static PAGE_MARKERS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"стр\s*[.,]?\s*(\d+)\s*[-–]\s*\d+").unwrap(),
        Regex::new(r"стр\s*[.,]?\s*(\d+)\s*[-–]").unwrap(),
        Regex::new(r"стр\s*[.,]?\s*(\d+)").unwrap(),
    ]
});

/// A bare `N-M` range at the start of the name.
static LEADING_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*[-–]\s*\d+").unwrap());

/// Everything after a page marker, scanned for a loose standalone number.
static AFTER_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"стр\s*[.,]?\s*(.+)").unwrap());

static STANDALONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").unwrap());

/// Numeric prefix some upload clients add to filenames.
static UPLOAD_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+_(.+)$").unwrap());

/// Extract the first page number from a filename. Returns 0 when no marker
/// is recognized.
pub fn extract_page_number(filename: &str) -> u32 {
    let lower = filename.to_lowercase();

    for pattern in PAGE_MARKERS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            if let Ok(page) = caps[1].parse::<u32>() {
                if (1..=1000).contains(&page) {
                    return page;
                }
            }
        }
    }

    if let Some(caps) = LEADING_RANGE.captures(filename) {
        if let Ok(page) = caps[1].parse::<u32>() {
            if (1..=1000).contains(&page) {
                return page;
            }
        }
    }

    // A marker without a parseable page right after it: take the first
    // plausible number anywhere in the remainder.
    if let Some(caps) = AFTER_MARKER.captures(&lower) {
        for m in STANDALONE_NUMBER.captures_iter(&caps[1]) {
            if let Ok(num) = m[1].parse::<u32>() {
                if (2..=500).contains(&num) {
                    return num;
                }
            }
        }
    }

    if lower.contains("титул") {
        return 1;
    }

    0
}

/// Strip the numeric `NNNN_` upload prefix from a filename.
pub fn logical_filename(filename: &str) -> &str {
    UPLOAD_PREFIX
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(filename)
}

/// Whether a filename is a supported input document.
pub fn is_supported_document(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".doc") || lower.ends_with(".docx")
}

/// Recursively find all supported documents under `root`, without duplicates.
/// Discovery order is deterministic (sorted by file name per directory).
pub fn collect_documents(root: &Path) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut documents = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !is_supported_document(name) {
            continue;
        }
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if seen.insert(key) {
            documents.push(path.to_path_buf());
        }
    }

    documents
}

/// Sort documents by extracted page number, dropping duplicates.
///
/// The sort is stable: unknown pages (0) go last, ties keep discovery order.
/// Two files with the same page and the same logical name (upload prefix
/// stripped) are duplicates; the first wins.
pub fn sort_by_page(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut keyed: Vec<(u32, PathBuf)> = Vec::new();

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let page = extract_page_number(&name);
        let key = (page, logical_filename(&name).to_string());
        if !seen.insert(key) {
            tracing::debug!(file = %name, "skipping duplicate document");
            continue;
        }
        keyed.push((page, path));
    }

    keyed.sort_by_key(|(page, _)| if *page == 0 { u32::MAX } else { *page });
    keyed.into_iter().map(|(_, path)| path).collect()
}
