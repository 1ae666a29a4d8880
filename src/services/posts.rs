use crate::api::error::ApiError;
use crate::api::validation::{validate_post, validate_post_patch};
use crate::db::{Post, PostDto, PostPatch};

use super::Resource;

/// Blog-style posts exposed through the generic CRUD routes
pub struct Posts;

impl Resource for Posts {
    type Entity = Post;
    type Dto = PostDto;
    type Patch = PostPatch;

    const NAME: &'static str = "Post";

    fn validate(dto: &PostDto) -> Result<(), ApiError> {
        validate_post(dto)
    }

    fn validate_patch(patch: &PostPatch) -> Result<(), ApiError> {
        validate_post_patch(patch)
    }
}
