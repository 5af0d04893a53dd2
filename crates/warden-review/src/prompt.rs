use std::fmt::Write as _;

use serde::Deserialize;
use warden_core::{CheckOutcomes, CompareFile, ReviewFinding, Severity, WardenError};

const SYSTEM_PROMPT: &str = "\
You are a code reviewer gating changes made by an autonomous coding agent. \
Review the changes and the automated check results, then answer with JSON only.

Flag an issue as critical only if it should block the merge: a bug, a \
security problem, a broken build or test suite, or work that does not do \
what the task asked.

Respond with a JSON object:
{
  \"hasCriticalIssues\": true | false,
  \"feedback\": \"Concrete, actionable feedback for the agent\",
  \"severity\": \"low\" | \"medium\" | \"high\"
}";

/// Build the system prompt for the reviewer.
///
/// # Examples
///
/// ```
/// use warden_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("hasCriticalIssues"));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

fn mark(passed: bool) -> &'static str {
    if passed {
        "✅ Passed"
    } else {
        "❌ Failed"
    }
}

/// Build the user prompt summarizing changed files and check outcomes.
///
/// # Examples
///
/// ```
/// use warden_core::{CheckOutcomes, CompareFile};
/// use warden_review::prompt::build_review_prompt;
///
/// let files = vec![CompareFile {
///     filename: "src/login.ts".into(),
///     status: "modified".into(),
///     additions: 10,
///     deletions: 2,
///     changes: 12,
/// }];
/// let prompt = build_review_prompt(&files, &CheckOutcomes::NONE);
/// assert!(prompt.contains("src/login.ts: modified (12 changes)"));
/// assert!(prompt.contains("Build: ❌ Failed"));
/// ```
pub fn build_review_prompt(files: &[CompareFile], checks: &CheckOutcomes) -> String {
    let mut prompt = String::from("Please review the following code changes:\n\n## Changed Files:\n");
    if files.is_empty() {
        prompt.push_str("(no changes between base and head)\n");
    }
    for f in files {
        let _ = writeln!(prompt, "- {}: {} ({} changes)", f.filename, f.status, f.changes);
    }

    let _ = write!(
        prompt,
        "\n## Test Results:\n- Build: {}\n- Tests: {}\n- Linting: {}\n",
        mark(checks.build),
        mark(checks.tests),
        mark(checks.lint),
    );
    prompt.push_str(
        "\nAnalyze the changes for code quality, potential bugs, security concerns, \
         performance implications, and whether they meet the requirements.\n",
    );
    prompt
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    has_critical_issues: bool,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    severity: Option<String>,
}

/// Parse the reviewer's JSON answer into a [`ReviewFinding`].
///
/// Markdown code fences around the JSON are tolerated. An unknown severity
/// falls back to `low`; a missing or non-boolean `hasCriticalIssues` is an
/// error, never a default.
///
/// # Errors
///
/// Returns [`WardenError::Review`] if the answer is not a valid finding.
///
/// # Examples
///
/// ```
/// use warden_core::Severity;
/// use warden_review::prompt::parse_finding;
///
/// let finding = parse_finding(r#"{"hasCriticalIssues":false,"feedback":"LGTM","severity":"low"}"#).unwrap();
/// assert!(!finding.has_critical_issues);
/// assert_eq!(finding.severity, Severity::Low);
/// ```
pub fn parse_finding(response: &str) -> Result<ReviewFinding, WardenError> {
    let cleaned = strip_code_fences(response);
    let raw: RawFinding = serde_json::from_str(cleaned)
        .map_err(|e| WardenError::Review(format!("unparseable reviewer answer: {e}")))?;

    let severity = match raw.severity.as_deref() {
        Some(s) => s.parse().unwrap_or_else(|_| {
            tracing::warn!(severity = s, "unknown reviewer severity, using low");
            Severity::Low
        }),
        None => Severity::Low,
    };

    Ok(ReviewFinding {
        has_critical_issues: raw.has_critical_issues,
        feedback: raw.feedback,
        severity,
    })
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
