//! Gate command - evaluate a merge gate fixture

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross};
use anstream::println;
use mr_gate::error::{Error, Result};
use mr_gate::gate::{
    GateVerdict, ProtectedBranch, approval_count, evaluate_gate, precondition_reasons,
};
use mr_gate::types::{MergeRequest, MergeRequestStatus, Review};
use serde::Deserialize;
use std::path::Path;

/// Merge request state and gate inputs
#[derive(Debug, Deserialize)]
pub struct GateFixture {
    /// Issue title (checked for work-in-progress prefixes)
    pub title: String,
    /// Current status
    #[serde(default = "default_status")]
    pub status: MergeRequestStatus,
    /// Commits on base not on head
    #[serde(default)]
    pub commits_behind: u32,
    /// Protection rule of the base branch, absent when unprotected
    #[serde(default)]
    pub rule: Option<ProtectedBranch>,
    /// Reviews on the merge request
    #[serde(default)]
    pub reviews: Vec<Review>,
}

const fn default_status() -> MergeRequestStatus {
    MergeRequestStatus::Mergeable
}

impl GateFixture {
    /// Evaluate the precondition and the protection gate
    pub fn evaluate(&self, wip_prefixes: &[String]) -> GateVerdict {
        let mut mr = MergeRequest::new(0, "head", 0, "base");
        mr.status = self.status;
        mr.commits_behind = self.commits_behind;

        let mut reasons = precondition_reasons(&mr, &self.title, wip_prefixes);
        reasons.extend(evaluate_gate(&mr, self.rule.as_ref(), &self.reviews).reasons);
        GateVerdict::from_reasons(reasons)
    }
}

/// Run the gate command
pub fn run_gate(ctx: &CommandContext, fixture_path: &Path) -> Result<GateVerdict> {
    let content = std::fs::read_to_string(fixture_path).map_err(|e| {
        Error::InvalidArgument(format!("failed to read {}: {e}", fixture_path.display()))
    })?;
    let fixture: GateFixture = toml::from_str(&content).map_err(|e| {
        Error::InvalidArgument(format!("invalid fixture {}: {e}", fixture_path.display()))
    })?;

    let verdict = fixture.evaluate(&ctx.config.pull_request.work_in_progress_prefixes);

    if ctx.json {
        let text = serde_json::to_string_pretty(&verdict)
            .map_err(|e| Error::InvalidArgument(format!("failed to encode JSON: {e}")))?;
        println!("{text}");
        return Ok(verdict);
    }

    if let Some(rule) = &fixture.rule {
        println!(
            "{} {} ({}/{} approvals)",
            "Rule".emphasis(),
            rule.rule_name.accent(),
            approval_count(rule, &fixture.reviews),
            rule.required_approvals
        );
    } else {
        println!("{}", "Branch is not protected".muted());
    }

    if verdict.allowed {
        println!("{} {}", check(), "Merge allowed".success());
    } else {
        println!("{} {}", cross(), "Merge blocked".error());
        for reason in &verdict.reasons {
            println!("  - {}", reason.code().muted());
        }
    }
    Ok(verdict)
}
