use anyhow::Result;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::{insert_project, insert_user, setup_test_db};
use crate::{api_key, monitor, project, team, team_member, team_permission, user};

#[tokio::test]
async fn test_team_membership_crud() -> Result<()> {
    let Some(db) = setup_test_db().await? else { return Ok(()) };

    let owner = insert_user(&db).await?;
    let p = insert_project(&db, owner.id).await?;
    let now = Utc::now();

    let t = team::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        name: Set("Owners".into()),
        description: Set(None),
        is_permissions_editable: Set(false),
        is_team_editable: Set(false),
        is_team_deleteable: Set(false),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&db)
    .await?;

    let m = team_member::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        team_id: Set(t.id),
        user_id: Set(owner.id),
        has_accepted_invitation: Set(true),
        invitation_accepted_at: Set(Some(now.into())),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&db)
    .await?;

    team_permission::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        team_id: Set(t.id),
        permission: Set("ProjectOwner".into()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&db)
    .await?;

    let members = team_member::Entity::find()
        .filter(team_member::Column::UserId.eq(owner.id))
        .filter(team_member::Column::HasAcceptedInvitation.eq(true))
        .all(&db)
        .await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, m.id);

    let perms = team_permission::Entity::find()
        .filter(team_permission::Column::TeamId.eq(t.id))
        .all(&db)
        .await?;
    assert_eq!(perms[0].parsed_permission()?, crate::Permission::ProjectOwner);

    // the same user cannot join a team twice
    let dup = team_member::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        team_id: Set(t.id),
        user_id: Set(owner.id),
        has_accepted_invitation: Set(false),
        invitation_accepted_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&db)
    .await;
    assert!(dup.is_err());

    // cascade from project removes team rows
    project::Entity::delete_by_id(p.id).exec(&db).await?;
    assert!(team::Entity::find_by_id(t.id).one(&db).await?.is_none());
    assert!(team_member::Entity::find_by_id(m.id).one(&db).await?.is_none());
    user::Entity::delete_by_id(owner.id).exec(&db).await?;
    Ok(())
}

#[tokio::test]
async fn test_monitor_and_api_key_crud() -> Result<()> {
    let Some(db) = setup_test_db().await? else { return Ok(()) };

    let owner = insert_user(&db).await?;
    let p = insert_project(&db, owner.id).await?;
    let now = Utc::now();

    let mon = monitor::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        name: Set("Homepage".into()),
        description: Set(Some("checks the landing page".into())),
        slug: Set(format!("homepage-{}", Uuid::new_v4().simple())),
        created_by_user_id: Set(Some(owner.id)),
        deleted_by_user_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        deleted_at: Set(None),
    }
    .insert(&db)
    .await?;

    let mut am: monitor::ActiveModel = mon.clone().into();
    am.deleted_at = Set(Some(now.into()));
    am.deleted_by_user_id = Set(Some(owner.id));
    let soft = am.update(&db).await?;
    assert!(soft.deleted_at.is_some());

    let live = monitor::Entity::find()
        .filter(monitor::Column::ProjectId.eq(p.id))
        .filter(monitor::Column::DeletedAt.is_null())
        .all(&db)
        .await?;
    assert!(live.is_empty());

    let key = api_key::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(p.id),
        name: Set("ci".into()),
        description: Set(None),
        expires_at: Set((now + Duration::days(30)).into()),
        api_key: Set("ciphertext".into()),
        iv: Set(Some("00".repeat(12))),
        created_by_user_id: Set(Some(owner.id)),
        deleted_by_user_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        deleted_at: Set(None),
    }
    .insert(&db)
    .await?;
    let found = api_key::Entity::find_by_id(key.id).one(&db).await?.expect("api key");
    assert_eq!(found.iv.as_deref(), Some("000000000000000000000000"));

    project::Entity::delete_by_id(p.id).exec(&db).await?;
    assert!(monitor::Entity::find_by_id(mon.id).one(&db).await?.is_none());
    user::Entity::delete_by_id(owner.id).exec(&db).await?;
    Ok(())
}
