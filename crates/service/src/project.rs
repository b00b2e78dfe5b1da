//! Project lifecycle: name checks on create, default teams afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use models::permission::Permission;
use models::{project, team, team_member, team_permission};

use crate::database::{DatabaseService, DbHandle};
use crate::errors::DatabaseError;
use crate::hooks::DatabaseHooks;
use crate::types::{CountBy, CreateBy, DatabaseCommonInteractionProps, FindBy, Query, QueryValue, Record};

pub type ProjectService = DatabaseService<project::Entity, ProjectHooks>;

pub fn project_service(db: DbHandle, encryption_secret: &str) -> ProjectService {
    DatabaseService::with_hooks(Arc::clone(&db), encryption_secret, ProjectHooks::new(db, encryption_secret))
}

struct DefaultTeam {
    name: &'static str,
    description: &'static str,
    permission: Permission,
    locked: bool,
    add_creator: bool,
}

const DEFAULT_TEAMS: [DefaultTeam; 3] = [
    DefaultTeam {
        name: "Owners",
        description: "This team is for project owners. Adding team members to this team will give them root level permissions.",
        permission: Permission::ProjectOwner,
        locked: true,
        add_creator: true,
    },
    DefaultTeam {
        name: "Admin",
        description: "This team is for project administrators. Adding team members to this team will give them admin level permissions.",
        permission: Permission::ProjectAdmin,
        locked: true,
        add_creator: false,
    },
    DefaultTeam {
        name: "Members",
        description: "This team is for project members. Adding team members to this team will give them basic permissions to view all resources in the project.",
        permission: Permission::ProjectMember,
        locked: false,
        add_creator: false,
    },
];

#[derive(Clone)]
pub struct ProjectHooks {
    db: DbHandle,
    secret: Arc<str>,
}

impl ProjectHooks {
    pub fn new(db: DbHandle, encryption_secret: &str) -> Self {
        Self { db, secret: Arc::from(encryption_secret) }
    }

    fn projects(&self) -> DatabaseService<project::Entity> {
        DatabaseService::new(Arc::clone(&self.db), &self.secret)
    }

    async fn create_default_teams(&self, project_id: Uuid, creator: Uuid) -> Result<(), DatabaseError> {
        let teams = DatabaseService::<team::Entity>::new(Arc::clone(&self.db), &self.secret);
        let members = DatabaseService::<team_member::Entity>::new(Arc::clone(&self.db), &self.secret);
        let permissions = DatabaseService::<team_permission::Entity>::new(Arc::clone(&self.db), &self.secret);

        for default in &DEFAULT_TEAMS {
            let created = teams
                .create(CreateBy {
                    data: record(json!({
                        "project_id": project_id.to_string(),
                        "name": default.name,
                        "description": default.description,
                        "is_permissions_editable": !default.locked,
                        "is_team_editable": !default.locked,
                        "is_team_deleteable": !default.locked,
                    })),
                    props: DatabaseCommonInteractionProps::root(),
                })
                .await?;
            let team_id = created
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| DatabaseError::Db("created team has no id".into()))?
                .to_owned();

            if default.add_creator {
                members
                    .create(CreateBy {
                        data: record(json!({
                            "project_id": project_id.to_string(),
                            "team_id": team_id,
                            "user_id": creator.to_string(),
                            "has_accepted_invitation": true,
                            "invitation_accepted_at": Utc::now().to_rfc3339(),
                        })),
                        props: DatabaseCommonInteractionProps::root(),
                    })
                    .await?;
            }

            permissions
                .create(CreateBy {
                    data: record(json!({
                        "project_id": project_id.to_string(),
                        "team_id": team_id,
                        "permission": default.permission.as_str(),
                    })),
                    props: DatabaseCommonInteractionProps::root(),
                })
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseHooks<project::Entity> for ProjectHooks {
    async fn on_before_create(&self, mut create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        let name = match create_by.data.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_owned(),
            _ => return Err(DatabaseError::bad_data("Project name is required")),
        };

        if let Some(global) = &create_by.props.user_global_access_permission {
            if !global.project_ids.is_empty() {
                let ids = global.project_ids.iter().map(|id| Value::String(id.to_string())).collect();
                let existing = self
                    .projects()
                    .count_by(CountBy {
                        query: Query::new()
                            .with("id", QueryValue::In(ids))
                            .with("name", QueryValue::SameName(name)),
                        props: DatabaseCommonInteractionProps::root(),
                        ..Default::default()
                    })
                    .await?;
                if existing > 0 {
                    return Err(DatabaseError::bad_data("Project with the same name already exists"));
                }
            }
        }

        let Some(user_id) = create_by.props.user_id else {
            return Err(DatabaseError::not_authorized("User should be logged in to create the project."));
        };
        create_by.data.insert("created_by_user_id".into(), Value::String(user_id.to_string()));
        Ok(create_by)
    }

    async fn on_create_success(&self, create_by: &CreateBy, created: Record) -> Result<Record, DatabaseError> {
        let project_id = created
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| DatabaseError::Db("created project has no id".into()))?;
        let Some(creator) = create_by.props.user_id else {
            return Ok(created);
        };
        self.create_default_teams(project_id, creator).await?;
        info!(%project_id, %creator, "default teams created");
        Ok(created)
    }

    async fn on_before_find(&self, mut find_by: FindBy) -> Result<FindBy, DatabaseError> {
        if find_by.props.is_root {
            return Ok(find_by);
        }
        let has_projects = find_by
            .props
            .user_global_access_permission
            .as_ref()
            .is_some_and(|g| !g.project_ids.is_empty());
        if !has_projects {
            find_by.props = DatabaseCommonInteractionProps::root();
            find_by.query = Query::new().with("id", QueryValue::In(Vec::new()));
        }
        Ok(find_by)
    }
}

pub(crate) fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
