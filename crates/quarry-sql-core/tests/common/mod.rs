//! Shared fixture models for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use quarry_sql_core::{Association, Attribute, ModelMeta, SqlType};

/// `User` has many `Task`s and belongs to many `Project`s through
/// `UserProject`.
pub fn user_model() -> Arc<ModelMeta> {
    Arc::new(
        ModelMeta::new("User", "users")
            .attribute(Attribute::new("id", SqlType::BigInt).not_null().auto_increment())
            .attribute(Attribute::new("name", SqlType::Varchar(Some(120))).not_null())
            .attribute(Attribute::new("email", SqlType::Text))
            .attribute(Attribute::new("settings", SqlType::Jsonb))
            .primary_key("id")
            .association(Association::has_many("Task", "Tasks", "user_id"))
            .association(Association::belongs_to_many(
                "Project",
                "Projects",
                "UserProject",
                "user_id",
                "project_id",
            )),
    )
}

pub fn task_model() -> Arc<ModelMeta> {
    Arc::new(
        ModelMeta::new("Task", "tasks")
            .attribute(Attribute::new("id", SqlType::BigInt).not_null().auto_increment())
            .attribute(Attribute::new("title", SqlType::Text).not_null())
            .attribute(Attribute::new("userId", SqlType::BigInt).field("user_id"))
            .primary_key("id")
            .association(Association::belongs_to("User", "User", "user_id")),
    )
}

pub fn project_model() -> Arc<ModelMeta> {
    Arc::new(
        ModelMeta::new("Project", "projects")
            .attribute(Attribute::new("id", SqlType::BigInt).not_null().auto_increment())
            .attribute(Attribute::new("name", SqlType::Text).not_null())
            .primary_key("id"),
    )
}

pub fn user_project_model() -> Arc<ModelMeta> {
    Arc::new(
        ModelMeta::new("UserProject", "user_projects")
            .attribute(Attribute::new("user_id", SqlType::BigInt).not_null())
            .attribute(Attribute::new("project_id", SqlType::BigInt).not_null())
            .attribute(Attribute::new("rank", SqlType::Integer)),
    )
}
