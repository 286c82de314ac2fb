use std::path::Path;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_MARKER, DEFAULT_MARKER_WINDOW, DEFAULT_TABLE_SIZE, HelperConfig};
use crate::dates::mdy_date_to_iso;
use crate::dump::{DumpPage, read_dump_file};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDatesOptions {
    pub table_size: usize,
    pub marker: String,
    /// Number of leading characters of the revision text searched for the marker.
    pub marker_window: usize,
}

impl Default for ChapterDatesOptions {
    fn default() -> Self {
        Self {
            table_size: DEFAULT_TABLE_SIZE,
            marker: DEFAULT_MARKER.to_string(),
            marker_window: DEFAULT_MARKER_WINDOW,
        }
    }
}

impl ChapterDatesOptions {
    pub fn from_config(config: &HelperConfig) -> Self {
        Self {
            table_size: config.table_size(),
            marker: config.marker().to_string(),
            marker_window: config.marker_window(),
        }
    }
}

/// Chapter index to ISO date, with unset slots for chapters lacking a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChapterDateTable {
    slots: Vec<Option<String>>,
}

impl ChapterDateTable {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    pub fn set(&mut self, index: usize, date: String) -> Result<()> {
        let size = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| anyhow!("chapter index {index} outside table of {size} entries"))?;
        *slot = Some(date);
        Ok(())
    }

    /// Set slots in index order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_deref().map(|date| (index, date)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterDatesReport {
    pub pages_scanned: usize,
    pub pages_with_marker: Vec<String>,
    pub failures: Vec<PageFailure>,
    pub table: ChapterDateTable,
}

pub fn extract_chapter_dates_from_file(
    path: &Path,
    options: &ChapterDatesOptions,
) -> Result<ChapterDatesReport> {
    let pages = read_dump_file(path)?;
    info!(pages = pages.len(), path = %path.display(), "loaded dump");
    Ok(extract_chapter_dates(&pages, options))
}

pub fn extract_chapter_dates(pages: &[DumpPage], options: &ChapterDatesOptions) -> ChapterDatesReport {
    let mut report = ChapterDatesReport {
        pages_scanned: 0,
        pages_with_marker: Vec::new(),
        failures: Vec::new(),
        table: ChapterDateTable::new(options.table_size),
    };

    for page in pages {
        report.pages_scanned += 1;
        match scan_page(page, options) {
            Ok(PageScan::NoMarker) => {
                debug!(title = %page.title, "no publication date marker");
            }
            Ok(PageScan::Dated { index, date }) => {
                report.pages_with_marker.push(page.title.clone());
                if let Some(date) = date {
                    debug!(title = %page.title, index, date = %date, "recorded chapter date");
                    if let Err(error) = report.table.set(index, date) {
                        warn!(title = %page.title, "failed: {error}");
                        report.failures.push(PageFailure {
                            title: page.title.clone(),
                            message: error.to_string(),
                        });
                    }
                }
            }
            Err(error) => {
                warn!(title = %page.title, "failed: {error:#}");
                report.failures.push(PageFailure {
                    title: page.title.clone(),
                    message: format!("{error:#}"),
                });
            }
        }
    }

    info!(
        pages = report.pages_scanned,
        dated = report.table.entries().count(),
        failures = report.failures.len(),
        "chapter date extraction finished"
    );
    report
}

enum PageScan {
    NoMarker,
    /// Marker seen; `date` is `None` when no `marker=` assignment follows it.
    Dated { index: usize, date: Option<String> },
}

fn scan_page(page: &DumpPage, options: &ChapterDatesOptions) -> Result<PageScan> {
    let index = chapter_index(&page.title)?;
    let Some(text) = page.latest_text.as_deref() else {
        bail!("page has no revision text");
    };
    if !marker_in_window(text, &options.marker, options.marker_window) {
        return Ok(PageScan::NoMarker);
    }
    let date = match field_value(text, &options.marker) {
        Some(value) => Some(mdy_date_to_iso(value)?),
        None => None,
    };
    Ok(PageScan::Dated { index, date })
}

/// First run of ASCII digits in the title, e.g. `Chapter 12` -> 12.
pub fn chapter_index(title: &str) -> Result<usize> {
    let start = title
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| anyhow!("title has no chapter number"))?;
    let digits = &title[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse()
        .map_err(|error| anyhow!("invalid chapter number {:?}: {error}", &digits[..end]))
}

fn marker_in_window(text: &str, marker: &str, window: usize) -> bool {
    let end = text
        .char_indices()
        .nth(window)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    text[..end].contains(marker)
}

/// Value of the first `marker=` assignment, up to end of line or a `<ref>` tag.
pub fn field_value<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let needle = format!("{marker}=");
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let end = rest.find(['<', '\n']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Sparse array literal; unset slots print their own index.
pub fn render_array_literal(table: &ChapterDateTable) -> String {
    let items: Vec<String> = table
        .slots
        .iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(date) => format!("\"{date}\""),
            None => index.to_string(),
        })
        .collect();
    format!("[{}]", items.join(", "))
}

/// `[12] = "2018-03-08"` lines for the wiki's chapter data module.
pub fn render_lua_entries(table: &ChapterDateTable) -> String {
    table
        .entries()
        .map(|(index, date)| format!("[{index}] = \"{date}\"\n"))
        .collect()
}
