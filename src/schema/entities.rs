//! Field tables for every persisted entity, one per relational table.
//!
//! Conventions: `id` and `created_at` are filled by the database; foreign
//! keys are opaque string ids; `updated_at`-style columns are nullable.

use super::FieldKind::{Bool, DateTime, Float, Id, Int, Json, Text};
use super::{Entity, EntitySchema, FieldKind, FieldSpec};

const fn req(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec::required(name, kind)
}

const fn opt(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec::nullable(name, kind)
}

const fn def(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec::defaulted(name, kind)
}

const ID: FieldSpec = def("id", Id);
const CREATED_AT: FieldSpec = def("created_at", DateTime);
const UPDATED_AT: FieldSpec = opt("updated_at", DateTime);

const BY_ID: &[&[&str]] = &[&["id"]];

pub static USERS: EntitySchema = EntitySchema {
    entity: Entity::Users,
    fields: &[
        ID,
        req("email", Text),
        opt("name", Text),
        opt("avatar_url", Text),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: &[&["id"], &["email"]],
};

pub static PROJECTS: EntitySchema = EntitySchema {
    entity: Entity::Projects,
    fields: &[
        ID,
        req("name", Text),
        opt("description", Text),
        req("owner_id", Id),
        def("is_public", Bool),
        opt("settings", Json),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static PROJECT_COLLABORATORS: EntitySchema = EntitySchema {
    entity: Entity::ProjectCollaborators,
    fields: &[
        ID,
        req("project_id", Id),
        req("user_id", Id),
        def("role", Text),
        opt("invited_by", Id),
        CREATED_AT,
    ],
    unique_keys: &[&["id"], &["project_id", "user_id"]],
};

pub static TAGS: EntitySchema = EntitySchema {
    entity: Entity::Tags,
    fields: &[ID, req("project_id", Id), req("name", Text), opt("color", Text), CREATED_AT],
    unique_keys: &[&["id"], &["project_id", "name"]],
};

pub static GROUPS: EntitySchema = EntitySchema {
    entity: Entity::Groups,
    fields: &[
        ID,
        req("project_id", Id),
        req("name", Text),
        opt("color", Text),
        def("position_x", Float),
        def("position_y", Float),
        opt("width", Float),
        opt("height", Float),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static METRIC_CARDS: EntitySchema = EntitySchema {
    entity: Entity::MetricCards,
    fields: &[
        ID,
        req("project_id", Id),
        opt("group_id", Id),
        req("title", Text),
        opt("description", Text),
        opt("category", Text),
        opt("value", Float),
        opt("unit", Text),
        opt("trend", Text),
        opt("source", Text),
        def("position_x", Float),
        def("position_y", Float),
        def("sort_order", Int),
        opt("created_by", Id),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static METRIC_CARD_TAGS: EntitySchema = EntitySchema {
    entity: Entity::MetricCardTags,
    fields: &[ID, req("metric_card_id", Id), req("tag_id", Id), CREATED_AT],
    unique_keys: &[&["id"], &["metric_card_id", "tag_id"]],
};

pub static RELATIONSHIPS: EntitySchema = EntitySchema {
    entity: Entity::Relationships,
    fields: &[
        ID,
        req("project_id", Id),
        req("source_id", Id),
        req("target_id", Id),
        def("kind", Text),
        opt("label", Text),
        opt("weight", Float),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static RELATIONSHIP_TAGS: EntitySchema = EntitySchema {
    entity: Entity::RelationshipTags,
    fields: &[ID, req("relationship_id", Id), req("tag_id", Id), CREATED_AT],
    unique_keys: &[&["id"], &["relationship_id", "tag_id"]],
};

pub static COMMENT_THREADS: EntitySchema = EntitySchema {
    entity: Entity::CommentThreads,
    fields: &[
        ID,
        req("project_id", Id),
        opt("metric_card_id", Id),
        opt("relationship_id", Id),
        def("resolved", Bool),
        req("created_by", Id),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static COMMENTS: EntitySchema = EntitySchema {
    entity: Entity::Comments,
    fields: &[
        ID,
        req("thread_id", Id),
        req("author_id", Id),
        req("body", Text),
        def("edited", Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
    unique_keys: BY_ID,
};

pub static COMMENT_MENTIONS: EntitySchema = EntitySchema {
    entity: Entity::CommentMentions,
    fields: &[ID, req("comment_id", Id), req("user_id", Id), CREATED_AT],
    unique_keys: &[&["id"], &["comment_id", "user_id"]],
};

pub static NOTIFICATIONS: EntitySchema = EntitySchema {
    entity: Entity::Notifications,
    fields: &[
        ID,
        req("user_id", Id),
        opt("project_id", Id),
        req("kind", Text),
        opt("payload", Json),
        def("read", Bool),
        CREATED_AT,
        opt("read_at", DateTime),
    ],
    unique_keys: BY_ID,
};

pub(super) fn schema_for(entity: Entity) -> &'static EntitySchema {
    match entity {
        Entity::Users => &USERS,
        Entity::Projects => &PROJECTS,
        Entity::ProjectCollaborators => &PROJECT_COLLABORATORS,
        Entity::Tags => &TAGS,
        Entity::Groups => &GROUPS,
        Entity::MetricCards => &METRIC_CARDS,
        Entity::MetricCardTags => &METRIC_CARD_TAGS,
        Entity::Relationships => &RELATIONSHIPS,
        Entity::RelationshipTags => &RELATIONSHIP_TAGS,
        Entity::CommentThreads => &COMMENT_THREADS,
        Entity::Comments => &COMMENTS,
        Entity::CommentMentions => &COMMENT_MENTIONS,
        Entity::Notifications => &NOTIFICATIONS,
    }
}
