//! Per-model lifecycle callbacks around the generic database operations.

use async_trait::async_trait;

use models::metadata::CrudEntity;

use crate::errors::DatabaseError;
use crate::types::{CreateBy, DeleteBy, FindBy, Record, UpdateBy};

/// Every callback defaults to a pass-through. `on_before_*` may rewrite the
/// request, `on_*_success` may rewrite the result, and `on_*_error` observes
/// the failure before it propagates.
#[async_trait]
pub trait DatabaseHooks<E: CrudEntity>: Send + Sync {
    async fn on_before_create(&self, create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        Ok(create_by)
    }

    async fn on_create_success(&self, _create_by: &CreateBy, created: Record) -> Result<Record, DatabaseError> {
        Ok(created)
    }

    async fn on_create_error(&self, _error: &DatabaseError) {}

    async fn on_before_find(&self, find_by: FindBy) -> Result<FindBy, DatabaseError> {
        Ok(find_by)
    }

    async fn on_find_success(&self, items: Vec<Record>) -> Result<Vec<Record>, DatabaseError> {
        Ok(items)
    }

    async fn on_find_error(&self, _error: &DatabaseError) {}

    async fn on_before_update(&self, update_by: UpdateBy) -> Result<UpdateBy, DatabaseError> {
        Ok(update_by)
    }

    async fn on_update_success(&self, _update_by: &UpdateBy, _affected: u64) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn on_update_error(&self, _error: &DatabaseError) {}

    async fn on_before_delete(&self, delete_by: DeleteBy) -> Result<DeleteBy, DatabaseError> {
        Ok(delete_by)
    }

    async fn on_delete_success(&self, _delete_by: &DeleteBy, _affected: u64) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn on_delete_error(&self, _error: &DatabaseError) {}

    async fn on_count_success(&self, count: u64) -> Result<u64, DatabaseError> {
        Ok(count)
    }

    async fn on_count_error(&self, _error: &DatabaseError) {}
}

/// Hooks for models without custom behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

#[async_trait]
impl<E: CrudEntity> DatabaseHooks<E> for NoHooks {}
