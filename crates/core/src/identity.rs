//! Identity records and dated table references
//!
//! Users and groups are listed from the identity directory and stored one
//! item per record in a table whose name carries the run date. Memberships
//! are not listed directly; they are derived from each group's member list.

use crate::types::Category;
use crate::value::{AttributeValue, Item, ItemBuilder};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A directory user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name
    pub user_name: String,
    /// Resource name
    pub arn: String,
    /// Contact address
    pub email: Option<String>,
    /// Service role (ADMIN, AUTHOR, READER, ...)
    pub role: Option<String>,
    /// How the user authenticates
    pub identity_type: Option<String>,
    /// Whether the user is active
    pub active: bool,
    /// Principal id
    pub principal_id: Option<String>,
    /// Custom permission profile
    pub custom_permissions_name: Option<String>,
    /// Federation provider kind
    pub external_login_federation_provider_type: Option<String>,
    /// Federation provider URL
    pub external_login_federation_provider_url: Option<String>,
    /// Identity at the federation provider
    pub external_login_id: Option<String>,
}

impl User {
    /// An active user with only the required attributes set
    pub fn new(user_name: impl Into<String>, arn: impl Into<String>) -> Self {
        User {
            user_name: user_name.into(),
            arn: arn.into(),
            email: None,
            role: None,
            identity_type: None,
            active: true,
            principal_id: None,
            custom_permissions_name: None,
            external_login_federation_provider_type: None,
            external_login_federation_provider_url: None,
            external_login_id: None,
        }
    }

    /// Render as a users-table item
    pub fn to_item(&self, backup_timestamp: DateTime<Utc>) -> Item {
        ItemBuilder::new()
            .set("user_name", self.user_name.as_str())
            .set("arn", self.arn.as_str())
            .set("active", self.active)
            .set("backup_timestamp", iso8601(backup_timestamp))
            .set_opt("email", self.email.as_ref())
            .set_opt("role", self.role.as_ref())
            .set_opt("identity_type", self.identity_type.as_ref())
            .set_opt("principal_id", self.principal_id.as_ref())
            .set_opt("custom_permissions_name", self.custom_permissions_name.as_ref())
            .set_opt(
                "external_login_federation_provider_type",
                self.external_login_federation_provider_type.as_ref(),
            )
            .set_opt(
                "external_login_federation_provider_url",
                self.external_login_federation_provider_url.as_ref(),
            )
            .set_opt("external_login_id", self.external_login_id.as_ref())
            .build()
    }
}

/// A directory group and its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group name
    pub group_name: String,
    /// Resource name
    pub arn: String,
    /// Free-text description
    pub description: Option<String>,
    /// Principal id
    pub principal_id: Option<String>,
    /// Member user names, in listing order
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    /// A group with no members
    pub fn new(group_name: impl Into<String>, arn: impl Into<String>) -> Self {
        Group {
            group_name: group_name.into(),
            arn: arn.into(),
            description: None,
            principal_id: None,
            members: Vec::new(),
        }
    }

    /// Render as a groups-table item
    pub fn to_item(&self, backup_timestamp: DateTime<Utc>) -> Item {
        let members = self
            .members
            .iter()
            .map(|m| AttributeValue::S(m.clone()))
            .collect();
        ItemBuilder::new()
            .set("group_name", self.group_name.as_str())
            .set("arn", self.arn.as_str())
            .set("members", AttributeValue::L(members))
            .set("backup_timestamp", iso8601(backup_timestamp))
            .set_opt("description", self.description.as_ref())
            .set_opt("principal_id", self.principal_id.as_ref())
            .build()
    }
}

/// A user's membership in a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// `"{user_name}#{group_name}"`
    pub membership_id: String,
    /// Member user name
    pub user_name: String,
    /// Group name
    pub group_name: String,
    /// Member resource name
    pub user_arn: String,
    /// Group resource name
    pub group_arn: String,
}

impl Membership {
    /// Build the membership of `user` in `group`
    pub fn new(user: &User, group: &Group) -> Self {
        Membership {
            membership_id: format!("{}#{}", user.user_name, group.group_name),
            user_name: user.user_name.clone(),
            group_name: group.group_name.clone(),
            user_arn: user.arn.clone(),
            group_arn: group.arn.clone(),
        }
    }

    /// Render as a memberships-table item
    pub fn to_item(&self, backup_timestamp: DateTime<Utc>) -> Item {
        ItemBuilder::new()
            .set("membership_id", self.membership_id.as_str())
            .set("user_name", self.user_name.as_str())
            .set("group_name", self.group_name.as_str())
            .set("user_arn", self.user_arn.as_str())
            .set("group_arn", self.group_arn.as_str())
            .set("backup_timestamp", iso8601(backup_timestamp))
            .build()
    }
}

/// Derive memberships from group member lists
///
/// Members that do not resolve to one of `users` are skipped. Output order
/// follows group order, then member order within each group.
pub fn derive_memberships(users: &[User], groups: &[Group]) -> Vec<Membership> {
    let by_name: HashMap<&str, &User> = users.iter().map(|u| (u.user_name.as_str(), u)).collect();
    groups
        .iter()
        .flat_map(|group| {
            group
                .members
                .iter()
                .filter_map(|name| by_name.get(name.as_str()))
                .map(move |user| Membership::new(user, group))
        })
        .collect()
}

/// ISO-8601 UTC timestamp with second precision
pub fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The three identity tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalTable {
    /// Users table
    Users,
    /// Groups table
    Groups,
    /// Memberships table
    Memberships,
}

impl LogicalTable {
    /// All identity tables in write order
    pub const ALL: [LogicalTable; 3] = [
        LogicalTable::Users,
        LogicalTable::Groups,
        LogicalTable::Memberships,
    ];

    /// Partition key attribute of this table
    pub fn partition_key(&self) -> &'static str {
        match self {
            LogicalTable::Users => "user_name",
            LogicalTable::Groups => "group_name",
            LogicalTable::Memberships => "membership_id",
        }
    }
}

impl fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalTable::Users => "users",
            LogicalTable::Groups => "groups",
            LogicalTable::Memberships => "memberships",
        };
        f.write_str(s)
    }
}

impl From<LogicalTable> for Category {
    fn from(table: LogicalTable) -> Self {
        match table {
            LogicalTable::Users => Category::Users,
            LogicalTable::Groups => Category::Groups,
            LogicalTable::Memberships => Category::Memberships,
        }
    }
}

/// A dated identity table for one run
///
/// Computed once at run start so every writer in the run addresses the
/// same physical table, even when the run crosses midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTableRef {
    /// Which identity table this is
    pub table: LogicalTable,
    /// Configured base name
    pub logical_name: String,
    /// `"{YYYY-MM-DD}-{logical_name}"`
    pub dated_name: String,
    /// Set once this run created the table
    pub created_this_run: bool,
}

impl IdentityTableRef {
    /// Reference the dated table for `run_date`
    pub fn for_run(table: LogicalTable, logical_name: &str, run_date: NaiveDate) -> Self {
        IdentityTableRef {
            table,
            logical_name: logical_name.to_string(),
            dated_name: format!("{}-{}", run_date.format("%Y-%m-%d"), logical_name),
            created_this_run: false,
        }
    }
}
