//! Human-readable explanations for remediation decisions.
//!
//! Every healing and scaling decision is published with a single sentence
//! of the form:
//!
//! ```text
//! The agent detected that <problem> and <action> to <reason>.
//! ```

/// Problem text used when none is known.
pub const DEFAULT_PROBLEM: &str = "a service failure";
/// Action text used when none is known.
pub const DEFAULT_ACTION: &str = "restarted the service";
/// Reason text used when none is known.
pub const DEFAULT_REASON: &str = "prevent further issues and restore service availability";

/// Build an explanation sentence.
///
/// Never fails: blank parts fall back to the defaults above, a leading
/// `to ` on the reason is not doubled, and the result always ends in a period.
///
/// ```
/// use remedy_core::explain::format_explanation;
///
/// let text = format_explanation("service web-1 crashed", "restarted pod web-1", "");
/// assert_eq!(
///     text,
///     "The agent detected that service web-1 crashed and restarted pod web-1 \
///      to prevent further issues and restore service availability."
/// );
/// ```
#[must_use]
pub fn format_explanation(problem: &str, action: &str, reason: &str) -> String {
    let problem = non_blank(problem).unwrap_or(DEFAULT_PROBLEM);
    let action = non_blank(action).unwrap_or(DEFAULT_ACTION);
    let reason = non_blank(reason)
        .map(|r| r.strip_prefix("to ").map_or(r, str::trim_start))
        .filter(|r| !r.is_empty() && *r != "to")
        .unwrap_or(DEFAULT_REASON);

    format!("The agent detected that {problem} and {action} to {reason}.")
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim().trim_end_matches('.').trim_end();
    (!trimmed.is_empty()).then_some(trimmed)
}
