//! Static identity directory backed by configuration

use crate::backend::{IdentityResolver, TeamLookup};
use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::types::{Team, User, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// In-memory identity resolver
///
/// Names are matched case-insensitively, the way forge logins are.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: HashMap<String, User>,
    orgs: HashSet<String>,
    teams: HashMap<(String, String), Team>,
}

impl Directory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[directory]` config section
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut directory = Self::new();
        for org in &config.orgs {
            directory.add_org(org);
        }
        for user in &config.users {
            directory.add_user(user.clone());
        }
        for team in &config.teams {
            directory.add_team(team.clone());
        }
        directory
    }

    /// Register a user
    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.name.to_lowercase(), user);
    }

    /// Register an organization
    pub fn add_org(&mut self, org: &str) {
        self.orgs.insert(org.to_lowercase());
    }

    /// Register a team (and its organization)
    pub fn add_team(&mut self, team: Team) {
        self.add_org(&team.org);
        self.teams
            .insert((team.org.to_lowercase(), team.name.to_lowercase()), team);
    }
}

#[async_trait]
impl IdentityResolver for Directory {
    async fn resolve_user(&self, name: &str) -> Result<Option<User>> {
        Ok(self.users.get(&name.to_lowercase()).cloned())
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.values().find(|u| u.id == id).cloned())
    }

    async fn resolve_org_team(&self, org: &str, team: &str) -> Result<TeamLookup> {
        let org = org.to_lowercase();
        if !self.orgs.contains(&org) {
            return Ok(TeamLookup::OrgNotFound);
        }
        Ok(self
            .teams
            .get(&(org, team.to_lowercase()))
            .cloned()
            .map_or(TeamLookup::TeamNotFound, TeamLookup::Found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        let mut d = Directory::new();
        d.add_user(User {
            id: 1,
            name: "Alice".to_string(),
        });
        d.add_org("empty-org");
        d.add_team(Team {
            id: 10,
            org: "org1".to_string(),
            name: "team1".to_string(),
        });
        d
    }

    #[tokio::test]
    async fn test_user_lookup_is_case_insensitive() {
        let d = directory();
        assert_eq!(d.resolve_user("alice").await.unwrap().unwrap().id, 1);
        assert_eq!(d.user_by_id(1).await.unwrap().unwrap().name, "Alice");
        assert!(d.resolve_user("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_team_lookup_distinguishes_org_and_team() {
        let d = directory();
        assert!(matches!(
            d.resolve_org_team("ORG1", "Team1").await.unwrap(),
            TeamLookup::Found(t) if t.id == 10
        ));
        assert_eq!(
            d.resolve_org_team("nope", "team1").await.unwrap(),
            TeamLookup::OrgNotFound
        );
        assert_eq!(
            d.resolve_org_team("empty-org", "team1").await.unwrap(),
            TeamLookup::TeamNotFound
        );
    }
}
