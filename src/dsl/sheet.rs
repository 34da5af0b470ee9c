//! CSV reading and heading validation. Produces [`RawRow`]s with their
//! source positions; no cell is interpreted here.

use super::builtins::REQUIRED_HEADINGS;
use super::error::Diagnostic;
use super::row::{RawRow, RowLocation};

/// A sheet whose headings passed validation.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headings: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Number of unnamed columns after `Result_detail`.
    pub max_extra_choices: usize,
}

/// Column positions of the required headings.
struct Columns {
    input_type: usize,
    input_detail: usize,
    choice_share: usize,
    result_duration: usize,
    result_type: usize,
    result_detail: usize,
}

fn locate_columns(headings: &[String], header_line: &str) -> Result<Columns, Diagnostic> {
    let find = |name: &str| {
        headings.iter().position(|h| h == name).ok_or_else(|| {
            Diagnostic::schema(format!("Required heading '{name}' not found"))
                .at_line(1, header_line)
        })
    };
    let [input_type, input_detail, choice_share, result_duration, result_type, result_detail] =
        REQUIRED_HEADINGS.map(find);
    let columns = Columns {
        input_type: input_type?,
        input_detail: input_detail?,
        choice_share: choice_share?,
        result_duration: result_duration?,
        result_type: result_type?,
        result_detail: result_detail?,
    };

    // Everything right of Result_detail is an alternative-text column.
    if let Some(named) = headings
        .iter()
        .skip(columns.result_detail + 1)
        .find(|h| !h.is_empty())
    {
        return Err(Diagnostic::schema(format!(
            "Heading '{named}' after Result_detail; alternative text columns must be unnamed"
        ))
        .at(&RowLocation { line: 1, text: header_line.to_string() }, named));
    }
    Ok(columns)
}

/// 1-based line of the record starting at `byte`. The reader skips empty
/// lines without counting them, so the line is derived from the byte offset
/// and moved past any blank lines the offset still points at.
fn line_at(source: &str, lines: &[&str], byte: usize) -> usize {
    let before = source.get(..byte).unwrap_or(source);
    let mut line = before.matches('\n').count() + 1;
    while lines.get(line - 1).is_some_and(|l| l.is_empty()) {
        line += 1;
    }
    line
}

/// Read and validate a whole sheet.
pub fn read_sheet(source: &str) -> Result<Sheet, Diagnostic> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let lines: Vec<&str> = source.lines().collect();
    let header_line = lines.first().copied().unwrap_or_default();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source.as_bytes());

    let headings: Vec<String> = reader
        .headers()
        .map_err(|e| Diagnostic::schema(format!("Unreadable heading row: {e}")).at_line(1, header_line))?
        .iter()
        .map(str::to_string)
        .collect();
    let columns = locate_columns(&headings, header_line)?;
    let max_extra_choices = headings.len() - 1 - columns.result_detail;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Diagnostic::syntax(format!("Unreadable row: {e}")))?;
        let byte = record
            .position()
            .map_or(0, |p| usize::try_from(p.byte()).unwrap_or(usize::MAX));
        let line = line_at(source, &lines, byte);
        let loc = RowLocation {
            line,
            text: line
                .checked_sub(1)
                .and_then(|i| lines.get(i))
                .map(|s| (*s).to_string())
                .unwrap_or_default(),
        };
        if record.len() > headings.len() {
            return Err(Diagnostic::schema(format!(
                "Row has {} cells but the sheet has {} columns",
                record.len(),
                headings.len()
            ))
            .at(&loc, ""));
        }
        let cell = |i: usize| record.get(i).unwrap_or_default().to_string();
        rows.push(RawRow {
            input_type: cell(columns.input_type),
            input_detail: cell(columns.input_detail),
            choice_share: cell(columns.choice_share),
            result_duration: cell(columns.result_duration),
            result_type: cell(columns.result_type),
            result_detail: cell(columns.result_detail),
            extra: record
                .iter()
                .skip(columns.result_detail + 1)
                .map(str::to_string)
                .collect(),
            loc,
        });
    }

    tracing::debug!(rows = rows.len(), max_extra_choices, "sheet read");
    Ok(Sheet {
        headings,
        rows,
        max_extra_choices,
    })
}
