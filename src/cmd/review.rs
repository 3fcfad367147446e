//! Reviewer decision sources for `draftgate resume`.

use anyhow::{Context, Result};
use dialoguer::{Input, Select, theme::ColorfulTheme};
use std::io::IsTerminal;
use std::path::Path;

use draftgate::gate::{ReviewDecision, parse_verdict};

/// Decide from flags, a decision file, or an interactive prompt.
///
/// Comments without a verdict outside a terminal are taken as a rejection
/// carrying those comments. Returns `None` when nothing at all was given; the
/// engine treats that as a rejection with empty feedback.
pub fn collect_decision(
    verdict: Option<bool>,
    comments: Option<&str>,
    decision_file: Option<&Path>,
    pending: Option<&str>,
) -> Result<Option<ReviewDecision>> {
    if let Some(approved) = verdict {
        let comments = comments.unwrap_or_default().to_string();
        return Ok(Some(ReviewDecision {
            approved,
            comments,
        }));
    }

    if let Some(path) = decision_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decision file: {}", path.display()))?;
        let mut decision = parse_decision(&content);
        if let (Some(d), Some(c)) = (decision.as_mut(), comments) {
            d.comments = c.to_string();
        }
        return Ok(decision.or_else(|| comments_as_reject(comments)));
    }

    if std::io::stdin().is_terminal() {
        return prompt_decision(pending, comments).map(Some);
    }

    Ok(comments_as_reject(comments))
}

fn comments_as_reject(comments: Option<&str>) -> Option<ReviewDecision> {
    let comments = comments.filter(|c| !c.trim().is_empty())?;
    println!(
        "{} no verdict given; rejecting with the supplied comments",
        console::style("note:").cyan()
    );
    Some(ReviewDecision::reject(comments))
}

/// Parse decision file content: a JSON decision object, or a verdict on the
/// first line with comments on the following lines.
pub fn parse_decision(content: &str) -> Option<ReviewDecision> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        return ReviewDecision::from_value(&value);
    }

    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    let approved = parse_verdict(first)?;
    Some(ReviewDecision {
        approved,
        comments: rest.trim().to_string(),
    })
}

fn prompt_decision(pending: Option<&str>, comments: Option<&str>) -> Result<ReviewDecision> {
    if let Some(text) = pending {
        println!();
        println!("{}", console::style("Pending artifact").bold().underlined());
        println!();
        println!("{}", text);
        println!();
    }

    let options = &["Approve and continue", "Reject and regenerate"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Review decision")
        .items(options)
        .default(0)
        .interact()?;

    let comments = match comments {
        Some(c) => c.to_string(),
        None => Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Comments")
            .allow_empty(true)
            .interact_text()?,
    };

    Ok(ReviewDecision {
        approved: selection == 0,
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_decision_wins() {
        let decision = collect_decision(Some(false), Some("too short"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(decision, ReviewDecision::reject("too short"));
    }

    #[test]
    fn test_comments_without_verdict_reject() {
        if std::io::stdin().is_terminal() {
            return;
        }
        let decision = collect_decision(None, Some("add milestones"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(decision, ReviewDecision::reject("add milestones"));
        assert!(collect_decision(None, Some("  "), None, None).unwrap().is_none());
        assert!(collect_decision(None, None, None, None).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_decision_file_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decision.txt");
        std::fs::write(&path, "maybe later").unwrap();
        let decision = collect_decision(None, Some("tighten scope"), Some(&path), None)
            .unwrap()
            .unwrap();
        assert_eq!(decision, ReviewDecision::reject("tighten scope"));
    }

    #[test]
    fn test_parse_decision_json() {
        let d = parse_decision(r#"{"approved": true, "comments": "ok"}"#).unwrap();
        assert_eq!(d, ReviewDecision::approve("ok"));
        assert!(parse_decision(r#"{"approved": "yes"}"#).is_none());
    }

    #[test]
    fn test_parse_decision_text() {
        let d = parse_decision("reject\nNeeds a rollback plan.\n").unwrap();
        assert_eq!(d, ReviewDecision::reject("Needs a rollback plan."));
        assert_eq!(parse_decision("approve").unwrap(), ReviewDecision::approve(""));
        assert!(parse_decision("maybe later").is_none());
    }
}
