//! Raw report → display payload. Pure; no I/O.

use serde::Serialize;

use crate::types::{label_and_amount, RawReport, Row, RowKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Section,
    Line,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    /// Nesting level; 0 for top-level sections.
    pub depth: usize,
    pub kind: LineKind,
    pub label: String,
    /// Amount exactly as the API reported it. `None` for section headers.
    pub value: Option<String>,
    /// Display form of `value`, e.g. `$1,234.56`.
    pub amount: Option<String>,
}

/// Formatted report ready to be rendered into an email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub title: String,
    pub as_of: String,
    pub currency: String,
    pub lines: Vec<ReportLine>,
}

/// Flatten the report's section tree into display lines.
///
/// Sections emit a header line, their children one level deeper, then their
/// summary at the section's own level. Rows of unknown type contribute only
/// their nested rows.
pub fn format_report(report: &RawReport) -> ReportPayload {
    let header = &report.header;
    let mut lines = Vec::new();
    push_rows(&report.rows.row, 0, &mut lines);

    ReportPayload {
        title: header
            .report_name
            .clone()
            .unwrap_or_else(|| "Balance Sheet".to_string()),
        as_of: header
            .end_period
            .clone()
            .or_else(|| header.date_macro.clone())
            .unwrap_or_else(|| "N/A".to_string()),
        currency: header.currency.clone().unwrap_or_else(|| "USD".to_string()),
        lines,
    }
}

fn push_rows(rows: &[Row], depth: usize, out: &mut Vec<ReportLine>) {
    for row in rows {
        match row.kind {
            RowKind::Section => {
                let title = row
                    .header
                    .as_ref()
                    .and_then(|h| h.col_data.first())
                    .map_or("Unknown Section", |c| c.value.as_str());
                out.push(ReportLine {
                    depth,
                    kind: LineKind::Section,
                    label: title.to_string(),
                    value: None,
                    amount: None,
                });
                if let Some(children) = &row.rows {
                    push_rows(&children.row, depth + 1, out);
                }
                if let Some(summary) = row.summary.as_ref().filter(|s| !s.col_data.is_empty()) {
                    let (label, value) = label_and_amount(&summary.col_data, "Total");
                    out.push(valued_line(depth, LineKind::Total, label, value));
                }
            }
            RowKind::Data if !row.col_data.is_empty() => {
                let (label, value) = label_and_amount(&row.col_data, "Unknown Account");
                out.push(valued_line(depth, LineKind::Line, label, value));
            }
            RowKind::Total if !row.col_data.is_empty() => {
                let (label, value) = label_and_amount(&row.col_data, "Total");
                out.push(valued_line(depth, LineKind::Total, label, value));
            }
            RowKind::Other => {
                if let Some(children) = &row.rows {
                    push_rows(&children.row, depth, out);
                }
            }
            _ => {}
        }
    }
}

fn valued_line(depth: usize, kind: LineKind, label: &str, value: &str) -> ReportLine {
    ReportLine {
        depth,
        kind,
        label: label.to_string(),
        value: Some(value.to_string()),
        amount: Some(format_amount(value)),
    }
}

/// `1234.5` → `$1,234.50`, `-20` → `-$20.00`. Anything that does not parse
/// as a number is returned unchanged.
pub fn format_amount(raw: &str) -> String {
    let Ok(n) = raw.trim().parse::<f64>() else {
        return raw.to_string();
    };
    if !n.is_finite() {
        return raw.to_string();
    }
    let fixed = format!("{:.2}", n.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // -0.001 rounds to 0.00 and is shown without a sign.
    let sign = if n < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{frac}")
}

impl ReportPayload {
    /// Plain-text rendering used as the email body.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{}\nAs of: {}\nCurrency: {}\n{}\n",
            self.title,
            self.as_of,
            self.currency,
            "=".repeat(50)
        );
        for line in &self.lines {
            let indent = "  ".repeat(line.depth);
            let amount = line.amount.as_deref().unwrap_or_default();
            match line.kind {
                LineKind::Section => {
                    out.push_str(&format!("\n{indent}=== {} ===\n", line.label));
                }
                LineKind::Line => out.push_str(&format!("{indent}{}: {amount}\n", line.label)),
                LineKind::Total => {
                    out.push_str(&format!("{indent}--- {}: {amount} ---\n", line.label));
                }
            }
        }
        out
    }

    /// `label,amount` rows with the raw API amounts, for spreadsheet export.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("label,amount\n");
        for line in &self.lines {
            out.push_str(&csv_field(&line.label));
            out.push(',');
            out.push_str(&csv_field(line.value.as_deref().unwrap_or_default()));
            out.push('\n');
        }
        out
    }
}

fn csv_field(s: &str) -> String {
    // Spreadsheets evaluate cells starting with these as formulas. Plain
    // numbers such as "-15.5" are left alone.
    let s = if s.starts_with(['=', '+', '-', '@', '\t', '\r']) && s.parse::<f64>().is_err() {
        format!("'{s}")
    } else {
        s.to_string()
    };
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}
