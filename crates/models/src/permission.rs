//! Permission vocabulary shared by the access-control metadata, the
//! database service and the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    Public,
    User,
    CurrentUser,
    ProjectOwner,
    ProjectAdmin,
    ProjectMember,
    CanCreateProjectMonitor,
    CanReadProjectMonitor,
    CanEditProjectMonitor,
    CanDeleteProjectMonitor,
    CanCreateProjectApiKey,
    CanReadProjectApiKey,
    CanEditProjectApiKey,
    CanDeleteProjectApiKey,
    CanCreateProjectTeam,
    CanReadProjectTeam,
    CanEditProjectTeam,
    CanDeleteProjectTeam,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::Public,
        Permission::User,
        Permission::CurrentUser,
        Permission::ProjectOwner,
        Permission::ProjectAdmin,
        Permission::ProjectMember,
        Permission::CanCreateProjectMonitor,
        Permission::CanReadProjectMonitor,
        Permission::CanEditProjectMonitor,
        Permission::CanDeleteProjectMonitor,
        Permission::CanCreateProjectApiKey,
        Permission::CanReadProjectApiKey,
        Permission::CanEditProjectApiKey,
        Permission::CanDeleteProjectApiKey,
        Permission::CanCreateProjectTeam,
        Permission::CanReadProjectTeam,
        Permission::CanEditProjectTeam,
        Permission::CanDeleteProjectTeam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Public => "Public",
            Permission::User => "User",
            Permission::CurrentUser => "CurrentUser",
            Permission::ProjectOwner => "ProjectOwner",
            Permission::ProjectAdmin => "ProjectAdmin",
            Permission::ProjectMember => "ProjectMember",
            Permission::CanCreateProjectMonitor => "CanCreateProjectMonitor",
            Permission::CanReadProjectMonitor => "CanReadProjectMonitor",
            Permission::CanEditProjectMonitor => "CanEditProjectMonitor",
            Permission::CanDeleteProjectMonitor => "CanDeleteProjectMonitor",
            Permission::CanCreateProjectApiKey => "CanCreateProjectApiKey",
            Permission::CanReadProjectApiKey => "CanReadProjectApiKey",
            Permission::CanEditProjectApiKey => "CanEditProjectApiKey",
            Permission::CanDeleteProjectApiKey => "CanDeleteProjectApiKey",
            Permission::CanCreateProjectTeam => "CanCreateProjectTeam",
            Permission::CanReadProjectTeam => "CanReadProjectTeam",
            Permission::CanEditProjectTeam => "CanEditProjectTeam",
            Permission::CanDeleteProjectTeam => "CanDeleteProjectTeam",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ModelError::Validation(format!("unknown permission: {s}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub permission: Permission,
    #[serde(default)]
    pub label_ids: Vec<Uuid>,
}

impl UserPermission {
    pub fn unlabeled(permission: Permission) -> Self {
        Self { permission, label_ids: Vec::new() }
    }
}

/// Permissions a user holds regardless of the project a request targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGlobalAccessPermission {
    pub project_ids: Vec<Uuid>,
    pub global_permissions: Vec<Permission>,
}

/// Permissions a user holds inside one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProjectAccessPermission {
    pub project_id: Uuid,
    pub permissions: Vec<UserPermission>,
}

impl UserProjectAccessPermission {
    pub fn permission_list(&self) -> Vec<Permission> {
        self.permissions.iter().map(|p| p.permission).collect()
    }
}

pub fn does_permissions_intersect(a: &[Permission], b: &[Permission]) -> bool {
    a.iter().any(|p| b.contains(p))
}

/// Elements of `a` that are also in `b`, in `a` order, without duplicates.
pub fn intersecting_permissions(a: &[Permission], b: &[Permission]) -> Vec<Permission> {
    let mut out = Vec::new();
    for p in a {
        if b.contains(p) && !out.contains(p) {
            out.push(*p);
        }
    }
    out
}
