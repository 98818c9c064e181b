//! Classification of engine output text.
//!
//! These parsers read the human-readable transcript (merged stdout/stderr), not the
//! engine's machine-readable plan format. Counts are best-effort: diff markers that
//! appear inside attribute values are counted too, and marker lines the engine
//! indents differently may be missed. Callers that need exact numbers should use
//! the engine's JSON output instead.

use std::sync::LazyLock;

use regex::Regex;

/// Tagged parse result, so "parsed zero" and "nothing to parse" stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    Matched(T),
    NotFound,
}

impl<T> Parsed<T> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Parsed::Matched(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Parsed::Matched(value) => value,
            Parsed::NotFound => default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanSummary {
    pub has_changes: bool,
    pub resource_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyCounts {
    pub added: u32,
    pub changed: u32,
    pub destroyed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    pub resource_count: usize,
    pub version: Parsed<String>,
}

const NO_CHANGES: &str = "No changes";
const DIFF_MARKERS: [&str; 3] = ["+ ", "- ", "~ "];
const RESOURCES_TOKEN: &str = "Resources:";
const RESOURCE_BLOCK: &str = "resource \"";
const VERSION_BANNER: &str = "OpenTofu v";
const LEGACY_VERSION_BANNER: &str = "Terraform v";

pub fn parse_plan(output: &str) -> PlanSummary {
    PlanSummary {
        has_changes: plan_has_changes(output).unwrap_or(true),
        resource_count: count_plan_changes(output),
    }
}

/// `Matched(false)` when the engine reported no changes, `NotFound` for blank output.
pub fn plan_has_changes(output: &str) -> Parsed<bool> {
    if output.trim().is_empty() {
        return Parsed::NotFound;
    }
    Parsed::Matched(!output.contains(NO_CHANGES))
}

pub fn count_plan_changes(output: &str) -> usize {
    output
        .lines()
        .map(str::trim_start)
        .filter(|body| DIFF_MARKERS.iter().any(|marker| body.starts_with(marker)))
        .count()
}

/// Extract counts from the last `Resources:` summary line.
pub fn parse_apply(output: &str) -> Parsed<ApplyCounts> {
    let Some(line) = output
        .lines()
        .rev()
        .find(|line| line.contains(RESOURCES_TOKEN))
    else {
        return Parsed::NotFound;
    };

    let (Some(added), Some(changed), Some(destroyed)) = (
        count_before(line, "added"),
        count_before(line, "changed"),
        count_before(line, "destroyed"),
    ) else {
        return Parsed::NotFound;
    };
    Parsed::Matched(ApplyCounts {
        added,
        changed,
        destroyed,
    })
}

/// Count preceding `phrase`: `Some(0)` when the phrase is absent, `None` when the
/// number does not fit.
fn count_before(line: &str, phrase: &str) -> Option<u32> {
    static COUNT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+)\s+(added|changed|destroyed)\b").unwrap());

    match COUNT_RE.captures_iter(line).find(|caps| &caps[2] == phrase) {
        Some(caps) => caps[1].parse().ok(),
        None => Some(0),
    }
}

pub fn parse_state(output: &str) -> StateSummary {
    StateSummary {
        resource_count: count_state_resources(output),
        version: extract_version(output),
    }
}

pub fn count_state_resources(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.contains(RESOURCE_BLOCK))
        .count()
}

/// Version text after the current banner, falling back to the legacy one.
pub fn extract_version(output: &str) -> Parsed<String> {
    for banner in [VERSION_BANNER, LEGACY_VERSION_BANNER] {
        let found = output
            .lines()
            .find_map(|line| line.split_once(banner).map(|(_, rest)| rest.trim()));
        if let Some(version) = found {
            return Parsed::Matched(version.to_string());
        }
    }
    Parsed::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_WITH_CHANGES: &str = r#"
OpenTofu will perform the following actions:

  # aws_instance.web will be created
  + resource "aws_instance" "web" {
      + ami           = "ami-123"
    }

  # aws_s3_bucket.logs will be updated in-place
  ~ resource "aws_s3_bucket" "logs" {
    }

Plan: 1 to add, 1 to change, 0 to destroy.
"#;

    #[test]
    fn no_changes_plan_has_no_changes() {
        let summary = parse_plan("No changes. Infrastructure is up-to-date.\n");
        assert!(!summary.has_changes);
        assert_eq!(summary.resource_count, 0);
    }

    #[test]
    fn plan_counts_marker_lines() {
        let summary = parse_plan(PLAN_WITH_CHANGES);
        assert!(summary.has_changes);
        // Attribute lines carry markers too; the count is a heuristic.
        assert_eq!(summary.resource_count, 3);
    }

    #[test]
    fn blank_plan_output_is_not_found() {
        assert_eq!(plan_has_changes("  \n"), Parsed::NotFound);
        assert!(parse_plan("").has_changes);
    }

    #[test]
    fn marker_without_trailing_space_is_ignored() {
        assert_eq!(count_plan_changes("+resource\n-\n~~\n"), 0);
    }

    #[test]
    fn apply_extracts_real_numbers() {
        let text = "aws_instance.web: Creating...\nApply complete! Resources: 3 added, 1 changed, 0 destroyed.\n";
        assert_eq!(
            parse_apply(text),
            Parsed::Matched(ApplyCounts {
                added: 3,
                changed: 1,
                destroyed: 0,
            })
        );
    }

    #[test]
    fn apply_missing_phrases_count_zero() {
        let text = "Destroy complete! Resources: 12 destroyed.";
        assert_eq!(
            parse_apply(text),
            Parsed::Matched(ApplyCounts {
                added: 0,
                changed: 0,
                destroyed: 12,
            })
        );
    }

    #[test]
    fn apply_uses_last_summary_line() {
        let text = "Resources: 1 added, 0 changed, 0 destroyed.\nResources: 7 added, 2 changed, 5 destroyed.\n";
        assert_eq!(
            parse_apply(text),
            Parsed::Matched(ApplyCounts {
                added: 7,
                changed: 2,
                destroyed: 5,
            })
        );
    }

    #[test]
    fn apply_without_summary_is_not_found() {
        assert_eq!(parse_apply("Error: No configuration files"), Parsed::NotFound);
    }

    #[test]
    fn apply_count_overflow_is_not_found() {
        let text = "Apply complete! Resources: 99999999999 added, 0 changed, 0 destroyed.";
        assert_eq!(parse_apply(text), Parsed::NotFound);
    }

    #[test]
    fn state_counts_resource_blocks() {
        let text = "resource \"aws_instance\" \"a\" {\n}\nresource \"aws_instance\" \"b\" {\n}\n";
        assert_eq!(count_state_resources(text), 2);
    }

    #[test]
    fn version_prefers_current_banner() {
        let text = "Terraform v1.5.7\nOpenTofu v1.6.2 \n";
        assert_eq!(extract_version(text), Parsed::Matched("1.6.2".to_string()));
    }

    #[test]
    fn version_falls_back_to_legacy_banner() {
        let text = "Terraform v1.5.7\non linux_amd64\n";
        assert_eq!(extract_version(text), Parsed::Matched("1.5.7".to_string()));
    }

    #[test]
    fn version_missing_is_not_found() {
        let summary = parse_state("No state.\n");
        assert_eq!(summary.version, Parsed::NotFound);
        assert_eq!(summary.resource_count, 0);
    }
}
