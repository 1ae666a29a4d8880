//! Post model, the sample CRUD resource.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::Entity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PostState {
    #[default]
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub subtext: String,
    pub content: String,
    pub author: String,
    pub date: NaiveDate,
    pub state: PostState,
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] =
        &["title", "subtext", "content", "author", "date", "state"];
}

/// Wire representation of a post, used for both requests and responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub subtext: String,
    #[serde(default)]
    pub content: String,
    pub author: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub state: PostState,
}

impl From<Post> for PostDto {
    fn from(post: Post) -> Self {
        Self {
            id: Some(post.id),
            title: post.title,
            subtext: post.subtext,
            content: post.content,
            author: post.author,
            date: post.date,
            state: post.state,
        }
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PostState>,
}
