use serde::Serialize;

use super::row::RowLocation;

/// Whether a diagnostic stops the compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Fatal,
    Warning,
}

/// Which layer of the compiler found the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Missing or misplaced headings.
    Schema,
    /// Unknown kinds, malformed numbers.
    Syntax,
    /// Well-formed rows that don't make sense together.
    Semantic,
    /// Legal but questionable input.
    Style,
}

/// Where in the input document a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// 1-based line number in the input document.
    pub line: usize,
    /// Raw text of that line.
    pub text: String,
    /// Offending field; the caret goes under its first case-insensitive match.
    pub field: Option<String>,
}

/// A compiler diagnostic with optional source location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    fn new(severity: Severity, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, ErrorKind::Schema, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, ErrorKind::Syntax, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, ErrorKind::Semantic, message)
    }

    pub fn style(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, ErrorKind::Style, message)
    }

    /// Downgrade to a warning while keeping the taxonomy kind.
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Attach a row location, with the caret under `field`.
    pub fn at(mut self, loc: &RowLocation, field: &str) -> Self {
        self.location = Some(Location {
            line: loc.line,
            text: loc.text.clone(),
            field: if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            },
        });
        self
    }

    /// Attach a bare line number with no caret, e.g. for heading problems.
    pub fn at_line(mut self, line: usize, text: &str) -> Self {
        self.location = Some(Location {
            line,
            text: text.to_string(),
            field: None,
        });
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Format the diagnostic the way the toolchain prints it:
    ///
    /// ```text
    /// FATAL: states.csv:12
    /// FOO,,,,TEXT,hi
    /// ^~~ Unknown input type 'FOO'
    /// ```
    pub fn render(&self, file: &str) -> String {
        let label = match self.severity {
            Severity::Fatal => "FATAL",
            Severity::Warning => "WARNING",
        };
        let Some(loc) = &self.location else {
            return format!("{label}: {file}\n {}", self.message);
        };
        let (column, width) = loc
            .field
            .as_deref()
            .map_or((0, 1), |field| caret_position(&loc.text, field));
        format!(
            "{label}: {file}:{}\n{}\n{}^{} {}",
            loc.line,
            loc.text,
            " ".repeat(column),
            "~".repeat(width.saturating_sub(1)),
            self.message,
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// A compilation stopped by a FATAL, with the warnings found before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileFailure {
    pub fatal: Diagnostic,
    pub warnings: Vec<Diagnostic>,
}

impl CompileFailure {
    /// Warnings in the order they were found, then the FATAL.
    pub fn render(&self, file: &str) -> String {
        self.warnings
            .iter()
            .chain(std::iter::once(&self.fatal))
            .map(|d| d.render(file))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Diagnostic> for CompileFailure {
    fn from(fatal: Diagnostic) -> Self {
        Self {
            fatal,
            warnings: Vec::new(),
        }
    }
}

impl std::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fatal)
    }
}

impl std::error::Error for CompileFailure {}

/// Column (in chars) and width of the first case-insensitive match of `field`.
fn caret_position(text: &str, field: &str) -> (usize, usize) {
    let haystack = text.to_ascii_lowercase();
    let needle = field.to_ascii_lowercase();
    let width = field.chars().count().max(1);
    match haystack.find(&needle) {
        Some(offset) => (haystack.get(..offset).map_or(0, |s| s.chars().count()), width),
        None => (0, 1),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn loc(text: &str) -> RowLocation {
        RowLocation {
            line: 7,
            text: text.to_string(),
        }
    }

    #[test]
    fn caret_sits_under_field() {
        let d = Diagnostic::syntax("Unknown result type 'BLINK'")
            .at(&loc("ENTER,,,,blink,x"), "BLINK");
        let out = d.render("game.csv");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "FATAL: game.csv:7");
        assert_eq!(lines[1], "ENTER,,,,blink,x");
        assert_eq!(lines[2], format!("{}^~~~~ Unknown result type 'BLINK'", " ".repeat(9)));
    }

    #[test]
    fn missing_field_falls_back_to_column_zero() {
        let d = Diagnostic::semantic("oops").at(&loc("a,b,c"), "zzz");
        assert!(d.render("f.csv").ends_with("\n^ oops"));
    }

    #[test]
    fn warning_without_location() {
        let d = Diagnostic::style("State graph is not connected");
        assert!(!d.is_fatal());
        assert_eq!(d.render("f.csv"), "WARNING: f.csv\n State graph is not connected");
    }

    #[test]
    fn failure_renders_warnings_before_the_fatal() {
        let failure = CompileFailure {
            fatal: Diagnostic::semantic("Input text too long").at(&loc("USER_IN,x,,,CLOSE,"), "x"),
            warnings: vec![Diagnostic::style("Frame 'x' is a single word after wrapping")],
        };
        let out = failure.render("f.csv");
        let warning = out.find("WARNING: f.csv").unwrap();
        let fatal = out.find("FATAL: f.csv:7").unwrap();
        assert!(warning < fatal);
        assert!(out.ends_with("Input text too long"));
    }

    #[test]
    fn downgrade_keeps_kind() {
        let d = Diagnostic::semantic("Implicit declaration of state FOO").as_warning();
        assert_eq!(d.kind, ErrorKind::Semantic);
        assert_eq!(d.severity, Severity::Warning);
    }
}
