//! Default commit messages

use crate::types::{Issue, MergeRequest, MergeStyle, User};

/// Message a style writes when the caller gives none
///
/// `None` for styles that do not create a commit of their own.
pub fn default_message(style: MergeStyle, mr: &MergeRequest, issue: &Issue) -> Option<String> {
    match style {
        MergeStyle::Merge | MergeStyle::RebaseMerge => Some(format!(
            "Merge pull request '{}' (#{}) from {} into {}",
            issue.title, mr.index, mr.head_branch, mr.base_branch
        )),
        MergeStyle::Squash => Some(format!("{} (#{})", issue.title, mr.index)),
        MergeStyle::FastForwardOnly | MergeStyle::Rebase => None,
    }
}

/// `Reviewed-by:` trailer block
///
/// `max` caps the number of lines; 0 disables the block and a negative value
/// means unlimited. Returns an empty string when there is nothing to add.
pub fn reviewed_by_trailers(approvers: &[User], max: i64) -> String {
    let limit = match usize::try_from(max) {
        Ok(0) => return String::new(),
        Ok(n) => n,
        Err(_) => usize::MAX,
    };

    approvers
        .iter()
        .take(limit)
        .map(|u| format!("Reviewed-by: {}", u.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append a trailer block to a message
pub fn with_trailers(message: String, trailers: &str) -> String {
    if trailers.is_empty() {
        message
    } else {
        format!("{message}\n\n{trailers}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (MergeRequest, Issue) {
        let mut mr = MergeRequest::new(1, "feature/login", 1, "main");
        mr.index = 12;
        (mr, Issue::new(1, 1, "Add login"))
    }

    fn users(n: i64) -> Vec<User> {
        (1..=n)
            .map(|id| User {
                id,
                name: format!("user{id}"),
            })
            .collect()
    }

    #[test]
    fn test_default_message_per_style() {
        let (mr, issue) = fixture();
        assert_eq!(
            default_message(MergeStyle::Merge, &mr, &issue).unwrap(),
            "Merge pull request 'Add login' (#12) from feature/login into main"
        );
        assert_eq!(
            default_message(MergeStyle::Squash, &mr, &issue).unwrap(),
            "Add login (#12)"
        );
        assert!(default_message(MergeStyle::FastForwardOnly, &mr, &issue).is_none());
        assert!(default_message(MergeStyle::Rebase, &mr, &issue).is_none());
    }

    #[test]
    fn test_trailers_respect_cap() {
        assert_eq!(
            reviewed_by_trailers(&users(3), 2),
            "Reviewed-by: user1\nReviewed-by: user2"
        );
        assert!(reviewed_by_trailers(&users(3), 0).is_empty());
        assert_eq!(reviewed_by_trailers(&users(3), -1).lines().count(), 3);
    }

    #[test]
    fn test_with_trailers() {
        assert_eq!(with_trailers("msg".to_string(), ""), "msg");
        assert_eq!(
            with_trailers("msg".to_string(), "Reviewed-by: a"),
            "msg\n\nReviewed-by: a"
        );
    }
}
