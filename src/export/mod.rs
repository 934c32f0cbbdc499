//! Best-effort extraction of a structured summary from a finished draft,
//! and its rendering to tabular formats.

mod render;

pub use render::{render_html, write_csv, write_xlsx};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const NOT_SPECIFIED: &str = "Not specified";
pub const DEFAULT_TARGET_COMPANY: &str = "Company";

/// Headings that describe document structure rather than an initiative.
const NON_INITIATIVE_HEADINGS: &[&str] = &[
    "introduction",
    "overview",
    "summary",
    "conclusion",
    "background",
    "reference",
    "appendix",
    "assessment",
    "evaluation",
    "timeline",
    "budget",
    "objectives",
];

static TITLE: LazyLock<Regex> = LazyLock::new(|| compile(r"#+\s*(.+?)\s*(?:\n|$)"));
static INITIATIVE: LazyLock<Regex> = LazyLock::new(|| compile(r"#{2,3}\s+(.+?)\s*(?:\n|$)"));
static BULLET_ITEM: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:^|\n)[-•*]\s+([^\n]+)"));
static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:^|\n)\d+\.\s+([^\n]+)"));

static OBJECTIVE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:objective|goal|purpose)[s\s]*[:\s]+([^\n]+)",
        r"(?i)(?:aim|mission|intent)s?(?:\s+of\s+(?:this|the)\s+proposal)?[:\s]+([^\n]+)",
    ])
});
static APPROACH: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:approach|methodology|strategy)[:\s]+([^\n]+)",
        r"(?i)(?:implementation|execution)\s+(?:approach|strategy|plan)[:\s]+([^\n]+)",
    ])
});
static METRICS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:metrics|kpis|measurements|success\s+criteria)[:\s]+((?:.+\n)+)",
        r"(?i)#+\s+(?:metrics|kpis|performance\s+indicators)[^\n]*\n+((?:.+\n)+)",
    ])
});
static TIMELINE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:timeline|schedule|timeframe)[:\s]+([^\n]+)",
        r"(?i)#+\s+(?:timeline|implementation\s+schedule)[^\n]*\n+([^\n]+)",
    ])
});
static BUDGET: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:budget|cost|investment)[:\s]+([^\n]+)",
        r"(?i)#+\s+(?:budget|financial\s+requirements)[^\n]*\n+([^\n]+)",
    ])
});
static REFERENCES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(?:references|sources|bibliography)[:\s]+((?:.+\n)+)",
        r"(?i)#+\s+(?:references|sources|bibliography)[^\n]*\n+((?:.+\n)+)",
    ])
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("export extraction pattern is a valid regex")
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| compile(p)).collect()
}

/// Caller-supplied overrides for the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportParameters {
    #[serde(default)]
    pub proposal_title: Option<String>,
    #[serde(default)]
    pub target_company: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
}

impl ExportParameters {
    /// Reads parameters from a JSON file. A missing or invalid file yields `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No export parameters");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(parameters) => Some(parameters),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid export parameters");
                None
            }
        }
    }
}

/// Structured summary of a finished document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalRecord {
    pub title: String,
    pub target_company: String,
    pub objective: String,
    pub approach: String,
    pub initiatives: Vec<String>,
    pub metrics: Vec<String>,
    pub timeline: String,
    pub budget: String,
    pub references: Vec<String>,
}

/// Extracts the summary fields from `draft`. Never fails: anything not
/// found keeps its default. The objective and approach fall back to `plan`
/// when the draft does not state them. `default_title` is used when the
/// draft has no heading and no title parameter was given.
pub fn extract_structured(
    draft: &str,
    plan: &str,
    parameters: Option<&ExportParameters>,
    default_title: &str,
) -> ProposalRecord {
    let mut record = ProposalRecord {
        title: first_capture(std::slice::from_ref(&*TITLE), draft)
            .unwrap_or_else(|| default_title.to_string()),
        target_company: DEFAULT_TARGET_COMPANY.to_string(),
        objective: NOT_SPECIFIED.to_string(),
        approach: NOT_SPECIFIED.to_string(),
        initiatives: Vec::new(),
        metrics: Vec::new(),
        timeline: NOT_SPECIFIED.to_string(),
        budget: NOT_SPECIFIED.to_string(),
        references: Vec::new(),
    };

    if let Some(parameters) = parameters {
        if let Some(title) = non_empty(&parameters.proposal_title) {
            record.title = title;
        }
        if let Some(company) = non_empty(&parameters.target_company) {
            record.target_company = company;
        }
        if let Some(objective) = non_empty(&parameters.objective) {
            record.objective = objective;
        }
    }

    if record.objective == NOT_SPECIFIED {
        if let Some(objective) =
            first_capture(&OBJECTIVE, draft).or_else(|| first_capture(&OBJECTIVE, plan))
        {
            record.objective = objective;
        }
    }
    if let Some(approach) =
        first_capture(&APPROACH, draft).or_else(|| first_capture(&APPROACH, plan))
    {
        record.approach = approach;
    }

    record.initiatives = INITIATIVE
        .captures_iter(draft)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|heading| {
            let lower = heading.to_lowercase();
            !NON_INITIATIVE_HEADINGS.iter().any(|h| lower.contains(h))
        })
        .collect();

    if let Some(section) = first_capture(&METRICS, draft) {
        record.metrics = list_items(&section);
    }
    if let Some(timeline) = first_capture(&TIMELINE, draft) {
        record.timeline = timeline;
    }
    if let Some(budget) = first_capture(&BUDGET, draft) {
        record.budget = budget;
    }
    if let Some(section) = first_capture(&REFERENCES, draft) {
        record.references = list_items(&section);
    }
    record
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First group 1 of the first pattern that matches, trimmed.
fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Bullet items, else numbered items, else non-empty lines.
fn list_items(section: &str) -> Vec<String> {
    let collect = |pattern: &Regex| -> Vec<String> {
        pattern
            .captures_iter(section)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .collect()
    };
    let bullets = collect(&BULLET_ITEM);
    if !bullets.is_empty() {
        return bullets;
    }
    let numbered = collect(&NUMBERED_ITEM);
    if !numbered.is_empty() {
        return numbered;
    }
    section
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Html => "html",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" | "excel" => Some(ExportFormat::Xlsx),
            "html" => Some(ExportFormat::Html),
            _ => None,
        }
    }
}

/// `<title>_summary.<ext>` with the title reduced to a safe file stem.
pub fn summary_file_name(title: &str, format: ExportFormat) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase();
    format!("{}_summary.{}", safe, format.extension())
}

/// Writes summaries into an export directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    export_dir: PathBuf,
    heading: String,
}

impl Exporter {
    /// `heading` is the table caption, e.g. `"ESG Proposal Summary"`.
    pub fn new(export_dir: impl Into<PathBuf>, heading: impl Into<String>) -> Self {
        Self {
            export_dir: export_dir.into(),
            heading: heading.into(),
        }
    }

    pub fn export(&self, record: &ProposalRecord, format: ExportFormat) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.export_dir).with_context(|| {
            format!(
                "Failed to create export directory: {}",
                self.export_dir.display()
            )
        })?;
        let path = self
            .export_dir
            .join(summary_file_name(&record.title, format));
        match format {
            ExportFormat::Csv => write_csv(record, &self.heading, &path)?,
            ExportFormat::Xlsx => write_xlsx(record, &path)?,
            ExportFormat::Html => std::fs::write(&path, render_html(record, &self.heading))
                .with_context(|| format!("Failed to write {}", path.display()))?,
        }
        tracing::info!(path = %path.display(), "Exported summary");
        Ok(path)
    }
}

#[cfg(test)]
#[path = "tests/export_tests.rs"]
mod tests;
