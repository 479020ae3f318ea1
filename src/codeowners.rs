//! CODEOWNERS parsing and reviewer suggestion
//!
//! Parsing is best-effort: malformed lines and unknown owners are skipped
//! and reported as warnings rather than failing the whole file.

use crate::backend::{IdentityResolver, TeamLookup};
use crate::types::{Team, User};
use regex::Regex;
use tracing::debug;

/// A parsed CODEOWNERS rule
#[derive(Debug, Clone)]
pub struct CodeOwnerRule {
    /// Anchored path pattern
    pub pattern: Regex,
    /// `!pattern`: applies to files the pattern does *not* match
    pub negative: bool,
    /// Owning users
    pub users: Vec<User>,
    /// Owning teams
    pub teams: Vec<Team>,
}

impl CodeOwnerRule {
    /// Whether the rule applies to a path
    pub fn applies_to(&self, path: &str) -> bool {
        self.pattern.is_match(path) != self.negative
    }
}

#[derive(Clone, Copy)]
enum LexState {
    /// Between tokens
    Normal,
    /// Inside a token
    InToken,
    /// After `\`; the next char is taken literally
    Escaped,
}

/// Split one CODEOWNERS line into tokens
///
/// Tabs count as spaces, an unescaped `#` ends the line and `\` makes the
/// next character literal.
pub fn tokenize_line(line: &str) -> Vec<String> {
    let line = line.trim().replace('\t', " ");
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut state = LexState::Normal;

    for c in line.chars() {
        state = match (state, c) {
            (LexState::Escaped, c) => {
                token.push(c);
                LexState::InToken
            }
            (_, '\\') => LexState::Escaped,
            (_, '#') => break,
            (LexState::InToken, ' ') => {
                tokens.push(std::mem::take(&mut token));
                LexState::Normal
            }
            (LexState::Normal, ' ') => LexState::Normal,
            (_, c) => {
                token.push(c);
                LexState::InToken
            }
        };
    }

    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}

/// Parse CODEOWNERS content, resolving owners through `resolver`
///
/// Returns the usable rules and every warning, each prefixed with its
/// 1-based line number.
pub async fn parse_code_owners(
    content: &str,
    resolver: &dyn IdentityResolver,
) -> (Vec<CodeOwnerRule>, Vec<String>) {
    let mut rules = Vec::new();
    let mut warnings = Vec::new();
    if content.is_empty() {
        return (rules, warnings);
    }

    for (i, line) in content.split('\n').enumerate() {
        let line_no = i + 1;
        let tokens = tokenize_line(line);
        match tokens.len() {
            0 => continue,
            1 => {
                warnings.push(format!("Line: {line_no}: incorrect format"));
                continue;
            }
            _ => {}
        }

        let (rule, rule_warnings) = parse_rule(&tokens, resolver).await;
        warnings.extend(
            rule_warnings
                .into_iter()
                .map(|w| format!("Line: {line_no}: {w}")),
        );
        rules.extend(rule);
    }

    debug!(rules = rules.len(), warnings = warnings.len(), "parsed CODEOWNERS");
    (rules, warnings)
}

/// Parse one tokenized line (`pattern owner...`)
pub async fn parse_rule(
    tokens: &[String],
    resolver: &dyn IdentityResolver,
) -> (Option<CodeOwnerRule>, Vec<String>) {
    let mut warnings = Vec::new();
    let Some((raw_pattern, owners)) = tokens.split_first() else {
        return (None, warnings);
    };

    let (negative, body) = raw_pattern
        .strip_prefix('!')
        .map_or((false, raw_pattern.as_str()), |rest| (true, rest));
    let pattern = match Regex::new(&format!("^{body}$")) {
        Ok(re) => re,
        Err(e) => {
            warnings.push(format!("incorrect codeowner regexp: {e}"));
            return (None, warnings);
        }
    };

    let mut users = Vec::new();
    let mut teams = Vec::new();
    for owner in owners {
        let owner = owner.strip_prefix('@').unwrap_or(owner);

        if owner.contains('/') {
            let parts: Vec<&str> = owner.split('/').collect();
            let [org, team] = parts.as_slice() else {
                warnings.push(format!("incorrect codeowner group: {owner}"));
                continue;
            };
            match resolver.resolve_org_team(org, team).await {
                Ok(TeamLookup::Found(found)) => teams.push(found),
                Ok(TeamLookup::TeamNotFound) => {
                    warnings.push(format!("incorrect codeowner team: {owner}"));
                }
                Ok(TeamLookup::OrgNotFound) | Err(_) => {
                    warnings.push(format!("incorrect codeowner organization: {owner}"));
                }
            }
        } else {
            match resolver.resolve_user(owner).await {
                Ok(Some(user)) => users.push(user),
                Ok(None) | Err(_) => {
                    warnings.push(format!("incorrect codeowner user: {owner}"));
                }
            }
        }
    }

    if users.is_empty() && teams.is_empty() {
        warnings.push("no users/groups matched".to_string());
        return (None, warnings);
    }

    (
        Some(CodeOwnerRule {
            pattern,
            negative,
            users,
            teams,
        }),
        warnings,
    )
}

/// Owners to request reviews from for a set of changed files
///
/// Deduplicated, in first-seen order.
pub fn suggest_reviewers<S: AsRef<str>>(
    rules: &[CodeOwnerRule],
    changed_files: &[S],
) -> (Vec<User>, Vec<Team>) {
    let mut users: Vec<User> = Vec::new();
    let mut teams: Vec<Team> = Vec::new();

    for file in changed_files {
        for rule in rules.iter().filter(|r| r.applies_to(file.as_ref())) {
            for user in &rule.users {
                if !users.iter().any(|u| u.id == user.id) {
                    users.push(user.clone());
                }
            }
            for team in &rule.teams {
                if !teams.iter().any(|t| t.id == team.id) {
                    teams.push(team.clone());
                }
            }
        }
    }

    (users, teams)
}
