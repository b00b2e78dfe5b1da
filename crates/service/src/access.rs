//! Resolves what a user may do, globally and inside one project, from
//! accepted team memberships and the permissions granted to those teams.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use models::permission::{Permission, UserGlobalAccessPermission, UserPermission, UserProjectAccessPermission};
use models::{team_member, team_permission};

use crate::database::{DatabaseService, DbHandle};
use crate::errors::DatabaseError;
use crate::types::{DatabaseCommonInteractionProps, FindBy, Query, QueryValue, Record, Select, LIMIT_MAX};

const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: u64 = 10_000;

/// Every signed-in user holds these, in any project they belong to.
const BASE_PERMISSIONS: [Permission; 3] = [Permission::Public, Permission::User, Permission::CurrentUser];

#[derive(Clone)]
pub struct AccessService {
    members: DatabaseService<team_member::Entity>,
    permissions: DatabaseService<team_permission::Entity>,
    global: Cache<Uuid, UserGlobalAccessPermission>,
    project: Cache<(Uuid, Uuid), Option<UserProjectAccessPermission>>,
}

impl AccessService {
    pub fn new(db: DbHandle, encryption_secret: &str) -> Self {
        Self::with_ttl(db, encryption_secret, CACHE_TTL)
    }

    pub fn with_ttl(db: DbHandle, encryption_secret: &str, ttl: Duration) -> Self {
        Self {
            members: DatabaseService::new(Arc::clone(&db), encryption_secret),
            permissions: DatabaseService::new(db, encryption_secret),
            global: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
            project: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn accepted_memberships(&self, user_id: Uuid, project_id: Option<Uuid>) -> Result<Vec<Record>, DatabaseError> {
        let mut query = Query::new()
            .with("user_id", user_id)
            .with("has_accepted_invitation", true);
        if let Some(project_id) = project_id {
            query.insert("project_id", project_id);
        }
        self.members
            .find_by(FindBy {
                query,
                select: Select::from(["project_id".to_owned(), "team_id".to_owned()]),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await
    }

    async fn resolve_global(&self, user_id: Uuid) -> Result<UserGlobalAccessPermission, DatabaseError> {
        let mut project_ids: Vec<Uuid> = self
            .accepted_memberships(user_id, None)
            .await?
            .iter()
            .filter_map(|m| m.get("project_id").and_then(Value::as_str))
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect();
        project_ids.sort_unstable();
        project_ids.dedup();
        debug!(%user_id, projects = project_ids.len(), "global access resolved");
        Ok(UserGlobalAccessPermission { project_ids, global_permissions: BASE_PERMISSIONS.to_vec() })
    }

    async fn resolve_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<UserProjectAccessPermission>, DatabaseError> {
        let team_ids: Vec<Value> = self
            .accepted_memberships(user_id, Some(project_id))
            .await?
            .into_iter()
            .filter_map(|mut m| m.remove("team_id"))
            .collect();
        if team_ids.is_empty() {
            return Ok(None);
        }

        let rows = self
            .permissions
            .find_by(FindBy {
                query: Query::new()
                    .with("project_id", project_id)
                    .with("team_id", QueryValue::In(team_ids)),
                select: Select::from(["permission".to_owned()]),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;

        let mut granted: Vec<Permission> = BASE_PERMISSIONS.to_vec();
        for row in &rows {
            let Some(raw) = row.get("permission").and_then(Value::as_str) else { continue };
            match raw.parse::<Permission>() {
                Ok(p) if !granted.contains(&p) => granted.push(p),
                Ok(_) => {}
                Err(e) => warn!(%project_id, permission = raw, error = %e, "ignoring unknown team permission"),
            }
        }
        Ok(Some(UserProjectAccessPermission {
            project_id,
            permissions: granted.into_iter().map(UserPermission::unlabeled).collect(),
        }))
    }

    pub async fn global_permissions(&self, user_id: Uuid) -> Result<UserGlobalAccessPermission, DatabaseError> {
        self.global
            .try_get_with(user_id, self.resolve_global(user_id))
            .await
            .map_err(|e: Arc<DatabaseError>| (*e).clone())
    }

    /// `None` when the user is not an accepted member of the project.
    pub async fn project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<UserProjectAccessPermission>, DatabaseError> {
        self.project
            .try_get_with((user_id, project_id), self.resolve_project(user_id, project_id))
            .await
            .map_err(|e: Arc<DatabaseError>| (*e).clone())
    }

    /// Interaction props for a request. Anonymous callers only hold `Public`.
    pub async fn props_for(
        &self,
        user_id: Option<Uuid>,
        project_id: Option<Uuid>,
    ) -> Result<DatabaseCommonInteractionProps, DatabaseError> {
        let Some(user) = user_id else {
            return Ok(DatabaseCommonInteractionProps {
                project_id,
                user_global_access_permission: Some(UserGlobalAccessPermission {
                    project_ids: Vec::new(),
                    global_permissions: vec![Permission::Public],
                }),
                ..Default::default()
            });
        };
        let global = self.global_permissions(user).await?;
        let project = match project_id {
            Some(project_id) => self.project_permissions(user, project_id).await?,
            None => None,
        };
        Ok(DatabaseCommonInteractionProps {
            user_id: Some(user),
            project_id,
            is_root: false,
            user_global_access_permission: Some(global),
            user_project_access_permission: project,
        })
    }

    pub fn invalidate_all(&self) {
        self.global.invalidate_all();
        self.project.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Value as SeaValue};

    use super::*;

    fn membership(project_id: Uuid, team_id: Uuid) -> BTreeMap<&'static str, SeaValue> {
        BTreeMap::from([("project_id", SeaValue::from(project_id)), ("team_id", SeaValue::from(team_id))])
    }

    fn permission(name: &str) -> BTreeMap<&'static str, SeaValue> {
        BTreeMap::from([("permission", SeaValue::from(name.to_owned()))])
    }

    #[tokio::test]
    async fn global_access_lists_distinct_projects() {
        let project = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                membership(project, Uuid::new_v4()),
                membership(project, Uuid::new_v4()),
            ]])
            .into_connection();
        let access = AccessService::new(Arc::new(db), "s");
        let global = access.global_permissions(Uuid::new_v4()).await.unwrap();
        assert_eq!(global.project_ids, vec![project]);
        assert!(global.global_permissions.contains(&Permission::CurrentUser));
    }

    #[tokio::test]
    async fn project_access_collects_team_permissions() {
        let project = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![membership(project, Uuid::new_v4())]])
            .append_query_results([vec![permission("ProjectOwner"), permission("NotAPermission")]])
            .into_connection();
        let access = AccessService::new(Arc::new(db), "s");
        let access = access.project_permissions(Uuid::new_v4(), project).await.unwrap().unwrap();
        assert_eq!(access.project_id, project);
        let list = access.permission_list();
        assert!(list.contains(&Permission::ProjectOwner));
        assert!(list.contains(&Permission::Public));
        assert_eq!(list.len(), 4);
    }

    #[tokio::test]
    async fn non_members_have_no_project_access_and_results_are_cached() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, SeaValue>>::new()])
            .into_connection();
        let access = AccessService::new(Arc::new(db), "s");
        let (user, project) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(access.project_permissions(user, project).await.unwrap().is_none());
        // a second lookup would exhaust the mock if it reached the database
        assert!(access.project_permissions(user, project).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn anonymous_props_only_hold_public() {
        let access = AccessService::new(Arc::new(DatabaseConnection::Disconnected), "s");
        let props = access.props_for(None, None).await.unwrap();
        assert!(props.user_id.is_none());
        assert_eq!(
            props.user_global_access_permission.unwrap().global_permissions,
            vec![Permission::Public]
        );
    }
}
