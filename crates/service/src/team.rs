//! Guards for the default teams a project is created with.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use models::{team, team_member, team_permission};

use crate::database::{DatabaseService, DbHandle};
use crate::errors::DatabaseError;
use crate::hooks::DatabaseHooks;
use crate::types::{
    CountBy, CreateBy, DatabaseCommonInteractionProps, DeleteBy, FindBy, Query, QueryValue, Record, Select, UpdateBy,
    LIMIT_MAX,
};

pub type TeamService = DatabaseService<team::Entity, TeamHooks>;

/// Shared by the team, team member and team permission services; each
/// impl looks up the owning team with root access.
#[derive(Clone)]
pub struct TeamHooks {
    db: DbHandle,
    secret: Arc<str>,
}

impl TeamHooks {
    pub fn new(db: DbHandle, encryption_secret: &str) -> Self {
        Self { db, secret: Arc::from(encryption_secret) }
    }

    fn teams(&self) -> DatabaseService<team::Entity> {
        DatabaseService::new(Arc::clone(&self.db), &self.secret)
    }

    async fn find_teams(&self, query: Query) -> Result<Vec<Record>, DatabaseError> {
        self.teams()
            .find_by(FindBy {
                query,
                select: ["name", "is_permissions_editable", "is_team_editable", "is_team_deleteable"]
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await
    }

    /// Teams referenced through `team_id` by the rows `query` matches.
    async fn owning_teams<E>(&self, query: &Query) -> Result<Vec<Record>, DatabaseError>
    where
        E: models::CrudEntity,
        E::Model: Sync,
    {
        let rows = DatabaseService::<E>::new(Arc::clone(&self.db), &self.secret)
            .find_by(FindBy {
                query: query.clone(),
                select: Select::from(["team_id".to_owned()]),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;
        let ids: Vec<Value> = rows.iter().filter_map(|r| r.get("team_id").cloned()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find_teams(Query::new().with("id", QueryValue::In(ids))).await
    }

    fn team_for_create(data: &Record) -> Result<Uuid, DatabaseError> {
        data.get("team_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| DatabaseError::bad_data("team_id is required"))
    }
}

fn flag(team: &Record, column: &str) -> bool {
    team.get(column).and_then(Value::as_bool).unwrap_or(true)
}

fn name(team: &Record) -> &str {
    team.get("name").and_then(Value::as_str).unwrap_or("This")
}

#[async_trait]
impl DatabaseHooks<team::Entity> for TeamHooks {
    async fn on_before_update(&self, update_by: UpdateBy) -> Result<UpdateBy, DatabaseError> {
        if update_by.props.is_root {
            return Ok(update_by);
        }
        for team in self.find_teams(update_by.query.clone()).await? {
            if !flag(&team, "is_team_editable") {
                return Err(DatabaseError::bad_data(format!(
                    "{} team cannot be edited because it is a critical resource for this project.",
                    name(&team)
                )));
            }
        }
        Ok(update_by)
    }

    async fn on_before_delete(&self, delete_by: DeleteBy) -> Result<DeleteBy, DatabaseError> {
        if delete_by.props.is_root {
            return Ok(delete_by);
        }
        for team in self.find_teams(delete_by.query.clone()).await? {
            if !flag(&team, "is_team_deleteable") {
                return Err(DatabaseError::bad_data(format!(
                    "{} team cannot be deleted because it is a critical resource for this project.",
                    name(&team)
                )));
            }
        }
        Ok(delete_by)
    }
}

#[async_trait]
impl DatabaseHooks<team_permission::Entity> for TeamHooks {
    async fn on_before_create(&self, create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        if create_by.props.is_root {
            return Ok(create_by);
        }
        if let Some(value) = create_by.data.get("permission").and_then(Value::as_str) {
            value.parse::<models::Permission>()?;
        }
        let team_id = Self::team_for_create(&create_by.data)?;
        for team in self.find_teams(Query::by_id(team_id)).await? {
            if !flag(&team, "is_permissions_editable") {
                return Err(DatabaseError::bad_data(format!("Permissions of the {} team cannot be changed.", name(&team))));
            }
        }
        Ok(create_by)
    }

    async fn on_before_update(&self, update_by: UpdateBy) -> Result<UpdateBy, DatabaseError> {
        if update_by.props.is_root {
            return Ok(update_by);
        }
        for team in self.owning_teams::<team_permission::Entity>(&update_by.query).await? {
            if !flag(&team, "is_permissions_editable") {
                return Err(DatabaseError::bad_data(format!("Permissions of the {} team cannot be changed.", name(&team))));
            }
        }
        Ok(update_by)
    }

    async fn on_before_delete(&self, delete_by: DeleteBy) -> Result<DeleteBy, DatabaseError> {
        if delete_by.props.is_root {
            return Ok(delete_by);
        }
        for team in self.owning_teams::<team_permission::Entity>(&delete_by.query).await? {
            if !flag(&team, "is_permissions_editable") {
                return Err(DatabaseError::bad_data(format!("Permissions of the {} team cannot be changed.", name(&team))));
            }
        }
        Ok(delete_by)
    }
}

#[async_trait]
impl DatabaseHooks<team_member::Entity> for TeamHooks {
    async fn on_before_create(&self, create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        let team_id = Self::team_for_create(&create_by.data)?;
        let Some(user_id) = create_by.data.get("user_id").cloned() else {
            return Err(DatabaseError::bad_data("user_id is required"));
        };
        let existing = DatabaseService::<team_member::Entity>::new(Arc::clone(&self.db), &self.secret)
            .count_by(CountBy {
                query: Query::new().with("team_id", team_id).with("user_id", QueryValue::Eq(user_id)),
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;
        if existing > 0 {
            return Err(DatabaseError::bad_data("This user is already a member of the team."));
        }
        Ok(create_by)
    }

    /// A locked team keeps at least one member who accepted the invitation.
    async fn on_before_delete(&self, delete_by: DeleteBy) -> Result<DeleteBy, DatabaseError> {
        if delete_by.props.is_root {
            return Ok(delete_by);
        }
        let members = DatabaseService::<team_member::Entity>::new(Arc::clone(&self.db), &self.secret);
        let rows = members
            .find_by(FindBy {
                query: delete_by.query.clone(),
                select: Select::from(["team_id".to_owned()]),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;
        for row in rows {
            let Some(team_id) = row.get("team_id").cloned() else { continue };
            let locked = self
                .find_teams(Query::new().with("id", QueryValue::Eq(team_id.clone())))
                .await?
                .iter()
                .any(|team| !flag(team, "is_team_deleteable"));
            if !locked {
                continue;
            }
            let accepted = members
                .count_by(CountBy {
                    query: Query::new()
                        .with("team_id", QueryValue::Eq(team_id))
                        .with("has_accepted_invitation", true),
                    props: DatabaseCommonInteractionProps::root(),
                    ..Default::default()
                })
                .await?;
            if accepted <= 1 {
                return Err(DatabaseError::bad_data(
                    "This team should have at least 1 member who has accepted invitation.",
                ));
            }
        }
        Ok(delete_by)
    }
}
