//! In-memory identity directory

use crate::memory::faults::FaultScript;
use crate::traits::IdentityDirectory;
use async_trait::async_trait;
use parking_lot::RwLock;
use qsbackup_core::{Group, RemoteError, User};

/// Identity directory backed by process memory
///
/// Fault keys: `"users"` and `"groups"` for the listings, the group name for
/// member listings, `""` for the access check.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<Vec<User>>,
    groups: RwLock<Vec<Group>>,
    /// Faults for `list_users` and `list_groups`
    pub list_faults: FaultScript,
    /// Faults for `list_group_members`
    pub member_faults: FaultScript,
    /// Faults for `check_access`
    pub access_faults: FaultScript,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user
    pub fn add_user(&self, user: User) {
        self.users.write().push(user);
    }

    /// Add a group; its `members` are what `list_group_members` returns
    pub fn add_group(&self, group: Group) {
        self.groups.write().push(group);
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        self.list_faults.check("users")?;
        Ok(self.users.read().clone())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, RemoteError> {
        self.list_faults.check("groups")?;
        Ok(self
            .groups
            .read()
            .iter()
            .map(|g| Group {
                members: Vec::new(),
                ..g.clone()
            })
            .collect())
    }

    async fn list_group_members(&self, group_name: &str) -> Result<Vec<String>, RemoteError> {
        self.member_faults.check(group_name)?;
        self.groups
            .read()
            .iter()
            .find(|g| g.group_name == group_name)
            .map(|g| g.members.clone())
            .ok_or_else(|| RemoteError::new("ResourceNotFoundException", format!("no group {}", group_name)))
    }

    async fn check_access(&self) -> Result<(), RemoteError> {
        self.access_faults.check("")
    }
}
