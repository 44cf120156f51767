//! View definition contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist saved view definitions and their JSON config bodies.
//! - Enforce the at-most-one-default-view-per-app invariant.
//!
//! # Invariants
//! - Marking a view default clears every other default of the app in the
//!   same transaction.
//! - Config bodies are stored as-is; stale field references inside them are
//!   resolved (and skipped) at projection time, not here.

use crate::model::app::AppId;
use crate::model::view::{NewView, ViewConfig, ViewDefinition, ViewId, ViewType};
use crate::repo::app_repo::app_is_active;
use crate::repo::{
    bool_to_int, ensure_schema_version, ensure_tables, int_to_bool, parse_uuid, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use uuid::Uuid;

const VIEW_SELECT_SQL: &str = "SELECT
    uuid,
    app_uuid,
    name,
    view_type,
    config,
    is_default
FROM app_views";

/// Repository interface for saved views.
pub trait ViewRepository {
    fn save_view(&mut self, draft: &NewView) -> RepoResult<ViewDefinition>;
    fn get_view(&self, view_id: ViewId) -> RepoResult<Option<ViewDefinition>>;
    fn list_views(&self, app_id: AppId) -> RepoResult<Vec<ViewDefinition>>;
    /// Marks one view default, clearing the app's previous default.
    fn set_default_view(&mut self, view_id: ViewId) -> RepoResult<()>;
    fn default_view(&self, app_id: AppId) -> RepoResult<Option<ViewDefinition>>;
    fn delete_view(&self, view_id: ViewId) -> RepoResult<()>;
}

/// SQLite-backed view repository.
pub struct SqliteViewRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteViewRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[("app_views", &["uuid", "app_uuid", "view_type", "config", "is_default"])],
        )?;
        Ok(Self { conn })
    }
}

impl ViewRepository for SqliteViewRepository<'_> {
    fn save_view(&mut self, draft: &NewView) -> RepoResult<ViewDefinition> {
        if draft.name.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "view name must not be empty".to_string(),
            ));
        }
        if !app_is_active(self.conn, draft.app_id)? {
            return Err(RepoError::AppNotFound(draft.app_id));
        }

        let view = ViewDefinition {
            id: Uuid::new_v4(),
            app_id: draft.app_id,
            name: draft.name.clone(),
            config: draft.config.clone(),
            is_default: draft.is_default,
        };
        let config_json = view.config.to_config_json()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if view.is_default {
            tx.execute(
                "UPDATE app_views SET is_default = 0 WHERE app_uuid = ?1;",
                [view.app_id.to_string()],
            )?;
        }
        tx.execute(
            "INSERT INTO app_views (uuid, app_uuid, name, view_type, config, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                view.id.to_string(),
                view.app_id.to_string(),
                view.name.as_str(),
                view.config.view_type().as_str(),
                config_json,
                bool_to_int(view.is_default),
            ],
        )?;
        tx.commit()?;
        Ok(view)
    }

    fn get_view(&self, view_id: ViewId) -> RepoResult<Option<ViewDefinition>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{VIEW_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([view_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_view_row(row)?));
        }
        Ok(None)
    }

    fn list_views(&self, app_id: AppId) -> RepoResult<Vec<ViewDefinition>> {
        list_views_on(self.conn, app_id)
    }

    fn set_default_view(&mut self, view_id: ViewId) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let app_uuid: Option<String> = tx
            .query_row(
                "SELECT app_uuid FROM app_views WHERE uuid = ?1;",
                [view_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(app_uuid) = app_uuid else {
            return Err(RepoError::ViewNotFound(view_id));
        };

        tx.execute(
            "UPDATE app_views SET is_default = 0 WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        tx.execute(
            "UPDATE app_views SET is_default = 1 WHERE uuid = ?1;",
            [view_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn default_view(&self, app_id: AppId) -> RepoResult<Option<ViewDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VIEW_SELECT_SQL} WHERE app_uuid = ?1 AND is_default = 1;"
        ))?;
        let mut rows = stmt.query([app_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_view_row(row)?));
        }
        Ok(None)
    }

    fn delete_view(&self, view_id: ViewId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM app_views WHERE uuid = ?1;",
            [view_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::ViewNotFound(view_id));
        }
        Ok(())
    }
}

pub(crate) fn list_views_on(conn: &Connection, app_id: AppId) -> RepoResult<Vec<ViewDefinition>> {
    let mut stmt =
        conn.prepare(&format!("{VIEW_SELECT_SQL} WHERE app_uuid = ?1 ORDER BY name ASC;"))?;
    let mut rows = stmt.query([app_id.to_string()])?;
    let mut views = Vec::new();
    while let Some(row) = rows.next()? {
        views.push(parse_view_row(row)?);
    }
    Ok(views)
}

fn parse_view_row(row: &Row<'_>) -> RepoResult<ViewDefinition> {
    let uuid_text: String = row.get("uuid")?;
    let app_uuid_text: String = row.get("app_uuid")?;

    let type_text: String = row.get("view_type")?;
    let view_type = ViewType::parse(&type_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid view type `{type_text}`")))?;

    let config_text: String = row.get("config")?;
    let config = ViewConfig::from_parts(view_type, &config_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid view config JSON: {err}"))
    })?;

    Ok(ViewDefinition {
        id: parse_uuid(&uuid_text, "app_views.uuid")?,
        app_id: parse_uuid(&app_uuid_text, "app_views.app_uuid")?,
        name: row.get("name")?,
        config,
        is_default: int_to_bool(row.get("is_default")?, "app_views.is_default")?,
    })
}
