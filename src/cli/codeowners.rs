//! Codeowners command - parse a CODEOWNERS file and suggest reviewers

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check};
use anstream::println;
use mr_gate::codeowners::{CodeOwnerRule, parse_code_owners, suggest_reviewers};
use mr_gate::error::{Error, Result};
use mr_gate::types::{Team, User};
use serde_json::json;
use std::path::Path;

fn display_pattern(rule: &CodeOwnerRule) -> String {
    let raw = rule.pattern.as_str();
    let body = raw
        .strip_prefix('^')
        .and_then(|s| s.strip_suffix('$'))
        .unwrap_or(raw);
    if rule.negative {
        format!("!{body}")
    } else {
        body.to_string()
    }
}

fn owner_names(users: &[User], teams: &[Team]) -> Vec<String> {
    users
        .iter()
        .map(|u| format!("@{}", u.name))
        .chain(teams.iter().map(|t| format!("@{}/{}", t.org, t.name)))
        .collect()
}

/// Run the codeowners command
pub async fn run_codeowners(ctx: &CommandContext, file: &Path, changed: &[String]) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| Error::InvalidArgument(format!("failed to read {}: {e}", file.display())))?;

    let (rules, warnings) = parse_code_owners(&content, &ctx.directory).await;
    let suggested = (!changed.is_empty()).then(|| suggest_reviewers(&rules, changed));

    if ctx.json {
        let rules_json: Vec<_> = rules
            .iter()
            .map(|r| {
                json!({
                    "pattern": display_pattern(r),
                    "negative": r.negative,
                    "owners": owner_names(&r.users, &r.teams),
                })
            })
            .collect();
        let mut out = json!({ "rules": rules_json, "warnings": warnings });
        if let Some((users, teams)) = &suggested {
            out["suggested_reviewers"] = json!(owner_names(users, teams));
        }
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| Error::InvalidArgument(format!("failed to encode JSON: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("{}:", "Rules".emphasis());
    if rules.is_empty() {
        println!("  {}", "No usable rules".muted());
    }
    for rule in &rules {
        println!(
            "  {} {}",
            display_pattern(rule).accent(),
            owner_names(&rule.users, &rule.teams).join(" ")
        );
    }

    if !warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".emphasis());
        for warning in &warnings {
            println!("  {}", warning.warn());
        }
    }

    if let Some((users, teams)) = &suggested {
        println!();
        let owners = owner_names(users, teams);
        if owners.is_empty() {
            println!("{}", "No reviewers to suggest.".muted());
        } else {
            println!("{} Suggested reviewers: {}", check(), owners.join(" ").accent());
        }
    }
    Ok(())
}
