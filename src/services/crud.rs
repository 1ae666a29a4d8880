//! Generic service layer over [`Repository`].
//!
//! A [`Resource`] ties an entity to its wire DTO and partial-update type.
//! The DTO's field names must match the entity's columns, since it is
//! written to the table as-is (minus `id`).

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::db::{DbPool, Entity, Repository};

pub const DEFAULT_PAGE_SIZE: i64 = 100;

pub trait Resource: Send + Sync + 'static {
    type Entity: Entity;
    type Dto: From<Self::Entity> + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Patch: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Singular name used in messages, e.g. "Post"
    const NAME: &'static str;

    fn validate(_dto: &Self::Dto) -> Result<(), ApiError> {
        Ok(())
    }

    fn validate_patch(_patch: &Self::Patch) -> Result<(), ApiError> {
        Ok(())
    }
}

/// `?skip=&limit=` pagination
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

pub struct CrudService<R: Resource> {
    repo: Repository<R::Entity>,
}

impl<R: Resource> CrudService<R> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            repo: Repository::new(pool),
        }
    }

    pub async fn create(&self, dto: R::Dto) -> Result<R::Dto, ApiError> {
        R::validate(&dto)?;
        let entity = self.repo.create(&dto).await?;
        Ok(entity.into())
    }

    pub async fn read(&self, id: i64) -> Result<Option<R::Dto>, ApiError> {
        Ok(self.repo.read(id).await?.map(Into::into))
    }

    pub async fn read_all(&self, page: Page) -> Result<Vec<R::Dto>, ApiError> {
        let rows = self
            .repo
            .read_all(page.skip.max(0), page.limit.max(0))
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update(&self, id: i64, patch: R::Patch) -> Result<Option<R::Dto>, ApiError> {
        R::validate_patch(&patch)?;
        Ok(self.repo.update(id, &patch).await?.map(Into::into))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, ApiError> {
        Ok(self.repo.delete(id).await?)
    }

    pub fn not_found(id: i64) -> ApiError {
        ApiError::not_found(format!("{} with id {} not found", R::NAME, id))
    }
}
