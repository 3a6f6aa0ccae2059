//! Wire shape of the QuickBooks Online report JSON.
//!
//! Only the fields the formatter reads are modelled; everything else in the
//! response is ignored. Every field is optional on the wire, so missing keys
//! deserialize to empty values rather than failing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawReport {
    #[serde(default)]
    pub header: ReportHeader,
    #[serde(default)]
    pub rows: RowSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportHeader {
    pub report_name: Option<String>,
    /// e.g. `today`; present when the request used a date macro.
    pub date_macro: Option<String>,
    pub start_period: Option<String>,
    pub end_period: Option<String>,
    pub currency: Option<String>,
    /// Generation timestamp as reported by the API.
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RowSet {
    #[serde(default)]
    pub row: Vec<Row>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Section,
    Data,
    Total,
    #[default]
    #[serde(other)]
    Other,
}

/// One report row. Sections carry `header`, nested `rows` and a `summary`;
/// data and total rows carry `col_data` directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Row {
    #[serde(rename = "type", default)]
    pub kind: RowKind,
    #[serde(rename = "group", default)]
    pub group: Option<String>,
    #[serde(default)]
    pub header: Option<ColumnSet>,
    #[serde(default)]
    pub rows: Option<RowSet>,
    #[serde(default)]
    pub summary: Option<ColumnSet>,
    #[serde(default)]
    pub col_data: Vec<ColData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnSet {
    #[serde(default)]
    pub col_data: Vec<ColData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColData {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// First column is the label, last column the amount.
pub(crate) fn label_and_amount<'a>(
    cols: &'a [ColData],
    default_label: &'a str,
) -> (&'a str, &'a str) {
    let label = cols.first().map_or(default_label, |c| c.value.as_str());
    let amount = if cols.len() > 1 {
        cols.last().map_or("0", |c| c.value.as_str())
    } else {
        "0"
    };
    (label, amount)
}
