//! Diagnostic scanning
//!
//! Build tool output is matched line by line against an ordered rule
//! list; the first matching rule produces a structured diagnostic.
//! Diagnostics render differently locally, on a CI agent that
//! understands issue-link prefixes, and on a plain CI log.

use regex::Regex;

/// Severity bucket for a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Error,
    Warning,
}

/// One structured diagnostic extracted from tool output
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// How diagnostics are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Human-readable terminal output
    #[default]
    Local,
    /// CI output with machine-readable issue prefixes
    CiLinked,
    /// CI output without prefixes
    CiPlain,
}

impl Diagnostic {
    /// Render per display mode
    pub fn render(&self, mode: DisplayMode) -> String {
        let severity = match self.category {
            DiagnosticCategory::Error => "error",
            DiagnosticCategory::Warning => "warning",
        };
        match mode {
            DisplayMode::Local => {
                let location = match (&self.file, self.line, self.column) {
                    (Some(file), Some(line), Some(column)) => {
                        format!(" [{file}({line},{column})]")
                    }
                    (Some(file), Some(line), None) => format!(" [{file}:{line}]"),
                    (Some(file), None, None) => format!(" [{file}]"),
                    _ => String::new(),
                };
                format!("{severity}: {}{location}", self.message)
            }
            DisplayMode::CiLinked => {
                let mut props = format!("type={severity}");
                if let Some(file) = &self.file {
                    props.push_str(&format!(";sourcepath={file}"));
                }
                if let Some(line) = self.line {
                    props.push_str(&format!(";linenumber={line}"));
                }
                if let Some(column) = self.column {
                    props.push_str(&format!(";columnnumber={column}"));
                }
                format!("##vso[task.logissue {props}]{}", self.message)
            }
            DisplayMode::CiPlain => format!("{severity}: {}", self.message),
        }
    }
}

/// One pattern rule: regex plus a constructor for its captures
struct Rule {
    pattern: Regex,
    build: fn(&regex::Captures<'_>) -> Diagnostic,
}

/// Ordered rule list applied per line; first match wins
pub struct DiagnosticScanner {
    rules: Vec<Rule>,
}

impl Default for DiagnosticScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticScanner {
    /// The standard rule set for typescript-style toolchains
    pub fn new() -> Self {
        let rules = vec![
            // src/a.ts(12,5): error TS2304: Cannot find name 'x'.
            Rule {
                pattern: Regex::new(
                    r"^(?P<file>[^\s(]+)\((?P<line>\d+),(?P<col>\d+)\):\s*(?P<sev>error|warning)\s+(?P<msg>.+)$",
                )
                .expect("rule regex compiles"),
                build: |caps| Diagnostic {
                    category: severity(&caps["sev"]),
                    message: caps["msg"].to_string(),
                    file: Some(caps["file"].to_string()),
                    line: caps["line"].parse().ok(),
                    column: caps["col"].parse().ok(),
                },
            },
            // src/a.ts:12:5 - error TS2304: ...
            Rule {
                pattern: Regex::new(
                    r"^(?P<file>[^\s:]+):(?P<line>\d+):(?P<col>\d+)\s*-?\s*(?P<sev>error|warning)\s+(?P<msg>.+)$",
                )
                .expect("rule regex compiles"),
                build: |caps| Diagnostic {
                    category: severity(&caps["sev"]),
                    message: caps["msg"].to_string(),
                    file: Some(caps["file"].to_string()),
                    line: caps["line"].parse().ok(),
                    column: caps["col"].parse().ok(),
                },
            },
            // ERROR: something went wrong  /  Error: something went wrong
            Rule {
                pattern: Regex::new(r"^\s*(?i:error)[:!]\s*(?P<msg>.+)$")
                    .expect("rule regex compiles"),
                build: |caps| Diagnostic {
                    category: DiagnosticCategory::Error,
                    message: caps["msg"].to_string(),
                    file: None,
                    line: None,
                    column: None,
                },
            },
        ];
        Self { rules }
    }

    /// Scan one line
    pub fn scan_line(&self, line: &str) -> Option<Diagnostic> {
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(line) {
                return Some((rule.build)(&caps));
            }
        }
        None
    }

    /// Scan a whole transcript
    pub fn scan(&self, output: &str) -> Vec<Diagnostic> {
        output.lines().filter_map(|l| self.scan_line(l)).collect()
    }
}

fn severity(text: &str) -> DiagnosticCategory {
    if text.eq_ignore_ascii_case("warning") {
        DiagnosticCategory::Warning
    } else {
        DiagnosticCategory::Error
    }
}

/// Strip ANSI escape sequences before persisting output to log files
pub fn strip_ansi(text: &str) -> String {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ansi regex compiles")
    });
    re.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typescript_style_rule() {
        let scanner = DiagnosticScanner::new();
        let diag = scanner
            .scan_line("src/index.ts(12,5): error TS2304: Cannot find name 'foo'.")
            .expect("matches");
        assert_eq!(diag.category, DiagnosticCategory::Error);
        assert_eq!(diag.file.as_deref(), Some("src/index.ts"));
        assert_eq!(diag.line, Some(12));
        assert_eq!(diag.column, Some(5));
        assert!(diag.message.contains("TS2304"));
    }

    #[test]
    fn test_colon_separated_rule() {
        let scanner = DiagnosticScanner::new();
        let diag = scanner
            .scan_line("src/app.ts:3:10 - warning TS6133: 'x' is declared but never used.")
            .expect("matches");
        assert_eq!(diag.category, DiagnosticCategory::Warning);
        assert_eq!(diag.line, Some(3));
    }

    #[test]
    fn test_bare_error_rule_and_first_match_wins() {
        let scanner = DiagnosticScanner::new();
        let diag = scanner.scan_line("Error: build exploded").expect("matches");
        assert_eq!(diag.category, DiagnosticCategory::Error);
        assert_eq!(diag.message, "build exploded");
        assert!(diag.file.is_none());

        // A located line must be claimed by the located rule
        let located = scanner
            .scan_line("a.ts(1,1): error TS1: x")
            .expect("matches");
        assert!(located.file.is_some());
    }

    #[test]
    fn test_clean_output_produces_nothing() {
        let scanner = DiagnosticScanner::new();
        let diags = scanner.scan("compiling...\nemitted 14 files\ndone in 3.2s\n");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_render_modes() {
        let diag = Diagnostic {
            category: DiagnosticCategory::Error,
            message: "Cannot find name 'foo'.".to_string(),
            file: Some("src/index.ts".to_string()),
            line: Some(12),
            column: Some(5),
        };
        assert_eq!(
            diag.render(DisplayMode::Local),
            "error: Cannot find name 'foo'. [src/index.ts(12,5)]"
        );
        assert_eq!(
            diag.render(DisplayMode::CiLinked),
            "##vso[task.logissue type=error;sourcepath=src/index.ts;linenumber=12;columnnumber=5]Cannot find name 'foo'."
        );
        assert_eq!(
            diag.render(DisplayMode::CiPlain),
            "error: Cannot find name 'foo'."
        );
    }

    #[test]
    fn test_strip_ansi() {
        let colored = "\x1b[31merror\x1b[0m: boom";
        assert_eq!(strip_ansi(colored), "error: boom");
    }
}
