//! Prompt builders for every completion-backed stage
//!
//! Source blocks are always built from the most recent documents selected by
//! the caller, with content truncated by characters.

use deepcite_core::Document;

/// Prompt asking for one refined search query
pub fn refine_query_prompt(query: &str, recent_titles: &[&str]) -> String {
    let titles = if recent_titles.is_empty() {
        "none".to_string()
    } else {
        recent_titles.join(", ")
    };

    format!(
        "Based on the research query '{}' and the titles of the sources gathered so far ({}), \
         write a new, more focused web search query that explores the topic in more depth. \
         Reply with a single search query and nothing else.",
        query, titles
    )
}

/// Source blocks shown to the Drafter
pub fn draft_sources(documents: &[Document], char_limit: usize) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "### Source {}\n**{}**\nURL: {}\n{}",
                i + 1,
                doc.title,
                doc.display_url(),
                doc.truncated_content(char_limit)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drafting prompt with citation discipline and prior issues
pub fn draft_prompt(query: &str, previous_issues: Option<&[String]>, sources: &str) -> String {
    let previous = match previous_issues {
        Some(lines) if !lines.is_empty() => lines.join("\n"),
        _ => "None".to_string(),
    };

    format!(
        r#"Strict Requirements:
1. Cite a source for every factual claim using [Source X]
2. Mark uncertain claims with [Needs Verification]
3. Remove any statement the sources do not support
4. Use the exact source numbers listed below

Research Question: {query}

Previous Issues:
{previous}

Sources:
{sources}

Write a comprehensive answer with:
- Clear section headers
- [Source X] citations after each claim
- Technical specifications where the sources provide them
- A historical timeline of key developments"#
    )
}

/// Source blocks shown to the Fact Checker and Validator
pub fn check_sources(documents: &[Document], char_limit: usize) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "Source {}: {}\n{}\n\n",
                i + 1,
                doc.title,
                doc.truncated_content(char_limit)
            )
        })
        .collect()
}

pub fn fact_check_prompt(answer: &str, sources: &str) -> String {
    format!(
        r#"Verify the document below against the provided sources.

Document to Verify:
{answer}

Sources:
{sources}

Report every issue of these kinds:
1. Unsupported: a claim without a supporting source
2. Contradicted: a claim that conflicts with a source
3. Unclear: a claim that is ambiguous or cannot be verified

Use exactly this format for each issue:
- [❌] [Type]: [Exact Text]
  Sources: [Numbers]
  Action: [Research Needed/Remove/Clarify]"#
    )
}

/// Prompt turning issue lines into follow-up research queries
pub fn correction_prompt(issue_lines: &[&str]) -> String {
    format!(
        r#"For each of the issues below, generate a specific research query that would resolve it.

Issues:
{}

Use exactly this format for each issue:
- Issue: [Issue description]
  Resolution Query: [Search query]"#,
        issue_lines.join("\n")
    )
}

pub fn validation_prompt(answer: &str, sources: &str) -> String {
    format!(
        r#"Final Report:
{answer}

Sources:
{sources}

Identify ANY remaining:
1. Uncited claims
2. Contradictions
3. Uncertain statements

For EACH issue:
- [❌] [Exact Quote]
  Required Action: [Remove/Clarify/Add Citation]"#
    )
}

/// Source blocks shown to the Report Compiler
pub fn report_sources(documents: &[Document], char_limit: usize) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "Source {}: {} | {}\n{}\n\n",
                i + 1,
                doc.title,
                doc.display_url(),
                doc.truncated_content(char_limit)
            )
        })
        .collect()
}

pub fn report_prompt(
    answer: &str,
    sources: &str,
    fact_checks: Option<&[String]>,
    final_checks: Option<&[String]>,
) -> String {
    let checks = fact_checks
        .map(|lines| lines.join("\n"))
        .unwrap_or_else(|| "None".to_string());

    let validation = match final_checks {
        Some(lines) => format!("\nValidation Findings:\n{}\n", lines.join("\n")),
        None => String::new(),
    };

    format!(
        r#"Write a professional academic report of 15-20 pages based on the research below.

Professional Report Requirements:
1. Executive Summary
2. Introduction & Background
3. Technical Architecture
4. Key Achievements
5. Ethical Considerations
6. Extended Analysis and Future Outlook
7. Conclusion
8. References (APA format)

Guidelines:
- Cite every claim with [Source X]
- Include data tables where the sources provide figures
- Include a timeline of key developments
- Present 3-5 case studies
- Add expert commentary and analysis

Research Draft:
{answer}

Fact Checks:
{checks}
{validation}
Sources:
{sources}"#
    )
}

/// Deterministic source appendix appended to the report
pub fn report_appendix(documents: &[Document], char_limit: usize) -> String {
    let blocks = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "### Source {}\n**{}**\n*URL: {}*\n{}...",
                i + 1,
                doc.title,
                doc.display_url(),
                doc.truncated_content(char_limit)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("\n\n## Appendices\n{}", blocks)
}
