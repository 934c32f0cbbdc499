//! CSV, HTML and XLSX renderings of a [`ProposalRecord`].

use super::ProposalRecord;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Label/value rows shared by the tabular formats. Section rows have an
/// empty value.
fn rows(record: &ProposalRecord) -> Vec<(String, String)> {
    let mut rows = vec![
        ("Title".to_string(), record.title.clone()),
        ("Target Company".to_string(), record.target_company.clone()),
        ("Objective".to_string(), record.objective.clone()),
        ("Approach".to_string(), record.approach.clone()),
        ("Timeline".to_string(), record.timeline.clone()),
        ("Budget".to_string(), record.budget.clone()),
    ];
    let mut section = |title: &str, label: &str, items: &[String]| {
        rows.push((title.to_string(), String::new()));
        for (index, item) in items.iter().enumerate() {
            rows.push((format!("{} {}", label, index + 1), item.clone()));
        }
    };
    section("Key Initiatives", "Initiative", &record.initiatives);
    section("Success Metrics", "Metric", &record.metrics);
    section("References", "Reference", &record.references);
    rows
}

pub fn write_csv(record: &ProposalRecord, heading: &str, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([heading])?;
    for (label, value) in rows(record) {
        if value.is_empty() {
            writer.write_record([label.as_str()])?;
        } else {
            writer.write_record([label.as_str(), value.as_str()])?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const CELL: &str = "padding: 8px; text-align: left; border: 1px solid #ddd;";
const ACCENT: &str = "background-color: #1E5631; color: white;";

/// Two-column HTML table with every value escaped.
pub fn render_html(record: &ProposalRecord, heading: &str) -> String {
    let mut html = String::from(
        "<table style=\"width:100%; border-collapse: collapse; font-family: Arial, sans-serif;\">\n",
    );
    html.push_str(&format!(
        "  <tr><th colspan=\"2\" style=\"padding: 8px; text-align: center; {} font-size: 16px;\">{}</th></tr>\n",
        ACCENT,
        escape(heading)
    ));
    for (label, value) in rows(record) {
        if value.is_empty() && !is_field_label(&label) {
            html.push_str(&format!(
                "  <tr><th colspan=\"2\" style=\"{} {}\">{}</th></tr>\n",
                CELL,
                ACCENT,
                escape(&label)
            ));
        } else {
            html.push_str(&format!(
                "  <tr><th style=\"width: 20%; {} background-color: #f2f2f2;\">{}</th><td style=\"{}\">{}</td></tr>\n",
                CELL,
                escape(&label),
                CELL,
                escape(&value)
            ));
        }
    }
    html.push_str("</table>\n");
    html
}

fn is_field_label(label: &str) -> bool {
    matches!(
        label,
        "Title" | "Target Company" | "Objective" | "Approach" | "Timeline" | "Budget"
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Summary" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn sheet_xml(record: &ProposalRecord) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (index, (label, value)) in rows(record).into_iter().enumerate() {
        let row = index + 1;
        xml.push_str(&format!(
            r#"<row r="{row}"><c r="A{row}" t="inlineStr"><is><t>{}</t></is></c><c r="B{row}" t="inlineStr"><is><t>{}</t></is></c></row>"#,
            escape(&label),
            escape(&value)
        ));
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Minimal single-sheet SpreadsheetML workbook with inline strings.
pub fn write_xlsx(record: &ProposalRecord, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let sheet = sheet_xml(record);
    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)
            .with_context(|| format!("Failed to add {} to workbook", name))?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()
        .with_context(|| format!("Failed to finish {}", path.display()))?;
    Ok(())
}
