use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::{
    DEFAULT_ANCHOR_EVERY, DEFAULT_PRIMARY_ACCOUNT, HelperConfig, SecondaryAccount,
    default_secondary_accounts,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterSearchOptions {
    /// Searched on the `# ` line of every pair.
    pub primary: String,
    /// Searched on `#* ` lines, each from its `since` date onwards.
    pub secondary: Vec<SecondaryAccount>,
    pub anchor_every: usize,
}

impl Default for TwitterSearchOptions {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_ACCOUNT.to_string(),
            secondary: default_secondary_accounts(),
            anchor_every: DEFAULT_ANCHOR_EVERY,
        }
    }
}

impl TwitterSearchOptions {
    pub fn from_config(config: &HelperConfig) -> Self {
        Self {
            primary: config.primary_account().to_string(),
            secondary: config.secondary_accounts(),
            anchor_every: config.anchor_every(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TwitterSearchReport {
    pub dates: usize,
    pub pairs: usize,
    pub lines: usize,
    pub output: String,
}

pub fn parse_date_lines(content: &str) -> Result<Vec<NaiveDate>> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let value = line.trim_end();
            value
                .parse::<NaiveDate>()
                .with_context(|| format!("line {}: invalid ISO date {value:?}", index + 1))
        })
        .collect()
}

pub fn date_pairs(dates: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    dates.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Live x.com search for posts by `account` between the day before `from` and the day after `to`.
pub fn search_url(account: &str, from: NaiveDate, to: NaiveDate) -> Result<String> {
    let since = from
        .pred_opt()
        .ok_or_else(|| anyhow!("no day before {from}"))?;
    let until = to.succ_opt().ok_or_else(|| anyhow!("no day after {to}"))?;
    Ok(format!(
        "https://x.com/search?q=({})%20{}%20{}&src=typed_query&f=live",
        urlencoding::encode(&format!("from:{account}")),
        urlencoding::encode(&format!("since:{since}")),
        urlencoding::encode(&format!("until:{until}")),
    ))
}

pub fn anchor(pair_number: usize, every: usize) -> String {
    if every != 0 && pair_number % every == 0 {
        format!("{{{{anchor|{pair_number}}}}} ")
    } else {
        String::new()
    }
}

pub fn generate_search_lines(dates: &[NaiveDate], options: &TwitterSearchOptions) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (index, (from, to)) in date_pairs(dates).into_iter().enumerate() {
        let pair_number = index + 1;
        lines.push(format!(
            "# {}{}",
            anchor(pair_number, options.anchor_every),
            search_url(&options.primary, from, to)?
        ));
        for account in &options.secondary {
            if account.since.is_some_and(|since| from < since) {
                continue;
            }
            lines.push(format!("#* {}", search_url(&account.handle, from, to)?));
        }
    }
    Ok(lines)
}

pub fn render_search_lines(lines: &[String]) -> String {
    format!("{}\n", lines.join("\n"))
}

/// `dates.txt` -> `dates-parsed.txt`.
pub fn parsed_filename(input: &Path) -> Result<PathBuf> {
    let name = input.to_string_lossy();
    let output = name.replace(".txt", "-parsed.txt");
    if output == name {
        bail!(
            "cannot derive an output name from {} (no .txt in the name); pass --output",
            input.display()
        );
    }
    Ok(PathBuf::from(output))
}

pub fn generate_twitter_searches_file(
    input: &Path,
    output: &Path,
    options: &TwitterSearchOptions,
) -> Result<TwitterSearchReport> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("failed to read date list {}", input.display()))?;
    let dates = parse_date_lines(&content).with_context(|| format!("failed to parse {}", input.display()))?;
    let lines = generate_search_lines(&dates, options)?;
    fs::write(output, render_search_lines(&lines))
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(dates = dates.len(), lines = lines.len(), output = %output.display(), "wrote twitter searches");

    Ok(TwitterSearchReport {
        dates: dates.len(),
        pairs: dates.len().saturating_sub(1),
        lines: lines.len(),
        output: output.to_string_lossy().replace('\\', "/"),
    })
}
