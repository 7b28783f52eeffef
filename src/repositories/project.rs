//! Project repository.

use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::models::project::{Entity, Model};

pub struct ProjectRepository {
    db: DatabaseConnection,
}

impl ProjectRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, project_id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(project_id).one(&self.db).await
    }
}
