//! Parsing of fact-check reports into structured issues

use deepcite_core::ParseMode;
use serde::{Deserialize, Serialize};

/// Marker that opens an issue line in a check report
pub const ISSUE_MARKER: &str = "❌";

const RESOLUTION_MARKER: &str = "Resolution Query:";

/// Longest label accepted as an issue type in `Type: text` form
const MAX_LABEL_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Unsupported,
    Contradicted,
    Unclear,
    Unclassified,
}

impl IssueKind {
    fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("unsupported") || label.contains("uncited") {
            Some(Self::Unsupported)
        } else if label.contains("contradict") {
            Some(Self::Contradicted)
        } else if label.contains("unclear") || label.contains("uncertain") {
            Some(Self::Unclear)
        } else {
            None
        }
    }
}

/// A finding reported by the Fact Checker or Validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub classification: IssueKind,
    pub quote: String,
    pub sources: Vec<usize>,
    pub action: Option<String>,
}

/// Number of lines carrying the issue marker
pub fn count_marked_lines<S: AsRef<str>>(lines: &[S]) -> usize {
    lines
        .iter()
        .filter(|line| line.as_ref().contains(ISSUE_MARKER))
        .count()
}

/// Parse a line-structured check report into issues.
///
/// `Sources:` and `Action:` lines attach to the most recent marker line.
/// Strict mode drops marker lines whose type cannot be recognised.
pub fn parse_issues<S: AsRef<str>>(lines: &[S], mode: ParseMode) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::new();
    // Whether the last marker line produced an issue that may take details
    let mut open = false;

    for line in lines.iter().map(|l| l.as_ref().trim()) {
        if let Some((_, remainder)) = line.split_once(ISSUE_MARKER) {
            open = match parse_marker_line(remainder) {
                Some(issue) if accepts(mode, &issue) => {
                    issues.push(issue);
                    true
                }
                _ => false,
            };
            continue;
        }

        if !open {
            continue;
        }
        let Some(current) = issues.last_mut() else {
            continue;
        };

        let detail = line.trim_start_matches(['-', '*', ' ']);
        if let Some(sources) = strip_label(detail, "Sources:") {
            current.sources.extend(source_numbers(sources));
        } else if let Some(action) = strip_label(detail, "Required Action:")
            .or_else(|| strip_label(detail, "Action:"))
        {
            let action = clean_text(action);
            if !action.is_empty() {
                current.action = Some(action);
            }
        }
    }

    issues
}

/// Extract follow-up search queries from a correction response.
///
/// Each line containing `Resolution Query:` contributes the text after the
/// marker with surrounding quotes and brackets removed. Empty results are skipped.
pub fn parse_resolution_queries(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_once(RESOLUTION_MARKER))
        .map(|(_, query)| clean_text(query))
        .filter(|query| !query.is_empty())
        .collect()
}

fn accepts(mode: ParseMode, issue: &Issue) -> bool {
    mode == ParseMode::Lenient || issue.classification != IssueKind::Unclassified
}

fn parse_marker_line(remainder: &str) -> Option<Issue> {
    let remainder = remainder.trim_start_matches([']', ' ', ':']).trim();
    if remainder.is_empty() {
        return None;
    }

    let (classification, quote) = match split_label(remainder) {
        Some((label, rest)) => match IssueKind::from_label(label) {
            Some(kind) => (kind, Some(rest)),
            None => (IssueKind::Unclassified, None),
        },
        None => (IssueKind::Unclassified, None),
    };

    // Unclassified issues keep the whole remainder verbatim
    let quote = match quote {
        Some(rest) => clean_text(rest),
        None => remainder.to_string(),
    };

    Some(Issue {
        classification,
        quote,
        sources: Vec::new(),
        action: None,
    })
}

/// Split `[Label]: rest` or `Label: rest` into its parts
fn split_label(text: &str) -> Option<(&str, &str)> {
    if let Some(inner) = text.strip_prefix('[') {
        let (label, rest) = inner.split_once(']')?;
        return Some((label, rest.trim_start_matches([':', ' '])));
    }

    let (label, rest) = text.split_once(':')?;
    (label.chars().count() <= MAX_LABEL_LEN).then(|| (label, rest))
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| &line[label.len()..])
}

fn source_numbers(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.split(|c: char| !c.is_ascii_digit())
        .filter_map(|digits| digits.parse().ok())
}

fn clean_text(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '*' | '[' | ']' | '`'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn parses_bracketed_issue_blocks() {
        let report = lines(
            "Fact check results:\n\
             - [❌] [Unsupported]: \"RSA is unbreakable\"\n\
             \x20 Sources: [2, 4]\n\
             \x20 Action: [Remove]\n\
             - [❌] [Contradicted]: RSA was published in 1976\n\
             \x20 Sources: 1\n\
             \x20 Action: Research Needed",
        );

        let issues = parse_issues(&report, ParseMode::Lenient);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].classification, IssueKind::Unsupported);
        assert_eq!(issues[0].quote, "RSA is unbreakable");
        assert_eq!(issues[0].sources, vec![2, 4]);
        assert_eq!(issues[0].action.as_deref(), Some("Remove"));
        assert_eq!(issues[1].classification, IssueKind::Contradicted);
        assert_eq!(issues[1].action.as_deref(), Some("Research Needed"));
        assert_eq!(count_marked_lines(&report), 2);
    }

    #[test]
    fn colon_labels_are_classified() {
        let report = lines("- ❌ Unclear claim: key sizes used in 1980");
        let issues = parse_issues(&report, ParseMode::Strict);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].classification, IssueKind::Unclear);
        assert_eq!(issues[0].quote, "key sizes used in 1980");
    }

    #[test]
    fn strict_mode_drops_unrecognised_types() {
        let report = lines(
            "- [❌] [Exact Quote]: something odd\n\
             \x20 Required Action: Clarify\n\
             - [❌] [Unsupported]: claim",
        );

        let strict = parse_issues(&report, ParseMode::Strict);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].classification, IssueKind::Unsupported);
        assert_eq!(strict[0].action, None);

        let lenient = parse_issues(&report, ParseMode::Lenient);
        assert_eq!(lenient.len(), 2);
        assert_eq!(lenient[0].classification, IssueKind::Unclassified);
        assert_eq!(lenient[0].quote, "[Exact Quote]: something odd");
        assert_eq!(lenient[0].action.as_deref(), Some("Clarify"));
    }

    #[test]
    fn detail_lines_without_an_issue_are_ignored() {
        let report = lines("Sources: 1, 2\nAction: Remove\nNo issues found.");
        assert!(parse_issues(&report, ParseMode::Lenient).is_empty());
        assert_eq!(count_marked_lines(&report), 0);
    }

    #[test]
    fn extracts_resolution_queries() {
        let response = "- Issue: RSA patent dates\n\
                        \x20 Resolution Query: \"RSA patent expiration 2000\"\n\
                        - Issue: Key size history\n\
                        \x20 **Resolution Query:** history of RSA key sizes\n\
                        \x20 Resolution Query:   \n";

        assert_eq!(
            parse_resolution_queries(response),
            vec!["RSA patent expiration 2000", "history of RSA key sizes"]
        );
    }

    #[test]
    fn no_resolution_queries_yields_empty_list() {
        assert!(parse_resolution_queries("I could not find any issues.").is_empty());
    }
}
