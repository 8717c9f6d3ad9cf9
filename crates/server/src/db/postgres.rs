//! Postgres-backed audit store

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde_json::Value as JsonValue;
use reqlog_core::{
    Actor, AuditError, Criterion, Entry, EntryPage, EntryQuery, Finalization, NewEntry, SortColumn,
    SortOrder,
};
use tokio_postgres::{Row, types::ToSql};

use super::{AuditStore, NewUser, User};

const SCHEMA: &str = include_str!("schema.sql");

const ENTRY_COLUMNS: &str = "e.id, e.user_id, u.email, u.display_name, e.ip, e.host, e.path, \
     e.method, e.status, e.user_agent, e.query_params, e.request_data, e.response_data, \
     e.time_initialized, e.time_finalized";

const ENTRY_SOURCE: &str = "reqlog_entries e LEFT JOIN reqlog_users u ON u.id = e.user_id";

/// Audit store over a deadpool Postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), AuditError> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA).await.map_err(persistence)?;
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AuditError> {
        self.pool
            .get()
            .await
            .map_err(|e| AuditError::Persistence(format!("Database pool error: {}", e)))
    }
}

fn persistence(err: tokio_postgres::Error) -> AuditError {
    AuditError::Persistence(format!("Database error: {}", err))
}

fn status_to_sql(status: u16) -> Result<i16, AuditError> {
    i16::try_from(status).map_err(|_| AuditError::InvalidInput(format!("status {} out of range", status)))
}

fn entry_from_row(row: &Row) -> Result<Entry, tokio_postgres::Error> {
    let user_id: Option<i64> = row.try_get(1)?;
    let email: Option<String> = row.try_get(2)?;
    let user = match (user_id, email) {
        (Some(id), Some(email)) => Some(Actor {
            id,
            email,
            display_name: row.try_get(3)?,
        }),
        _ => None,
    };
    let status: Option<i16> = row.try_get(8)?;

    Ok(Entry {
        id: row.try_get(0)?,
        user,
        ip: row.try_get(4)?,
        host: row.try_get(5)?,
        path: row.try_get(6)?,
        method: row.try_get(7)?,
        status: status.and_then(|s| u16::try_from(s).ok()),
        user_agent: row.try_get(9)?,
        query_params: row.try_get(10)?,
        request_data: row.try_get(11)?,
        response_data: row.try_get(12)?,
        time_initialized: row.try_get(13)?,
        time_finalized: row.try_get(14)?,
    })
}

fn user_from_row(row: &Row) -> Result<User, tokio_postgres::Error> {
    Ok(User {
        id: row.try_get(0)?,
        email: row.try_get(1)?,
        display_name: row.try_get(2)?,
        api_key: row.try_get(3)?,
    })
}

/// Postgres TEXT and JSONB cannot hold NUL; it is stored as U+FFFD.
fn pg_text(s: &str) -> String {
    s.replace('\0', "\u{FFFD}")
}

fn pg_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(pg_text(s)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(pg_json).collect()),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, val)| (pg_text(key), pg_json(val)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Escape special characters for LIKE patterns
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// WHERE clause under construction, with its positional parameters.
#[derive(Default)]
struct WhereClause {
    predicates: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl WhereClause {
    /// Register a parameter and return its placeholder.
    fn bind(&mut self, value: impl ToSql + Sync + Send + 'static) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    fn criterion(&mut self, criterion: &Criterion) {
        let predicate = match criterion {
            Criterion::UserId(id) => format!("e.user_id = {}", self.bind(*id)),
            Criterion::UserEmail(email) => {
                format!("lower(u.email) = lower({})", self.bind(email.clone()))
            }
            Criterion::Path(path) => format!("lower(e.path) = lower({})", self.bind(path.clone())),
            Criterion::Ip(ip) => format!("e.ip = {}", self.bind(ip.clone())),
            Criterion::Status(status) => match i16::try_from(*status) {
                Ok(status) => format!("e.status = {}", self.bind(status)),
                Err(_) => "FALSE".to_string(),
            },
        };
        self.predicates.push(predicate);
    }

    fn search_term(&mut self, term: &str) {
        let mut alternatives = Vec::with_capacity(3);
        if term.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = term.parse::<i64>() {
                alternatives.push(format!("e.user_id = {}", self.bind(id)));
            }
        }
        alternatives.push(format!("lower(u.email) = lower({})", self.bind(term.to_string())));
        alternatives.push(format!(
            "u.display_name ILIKE {}",
            self.bind(format!("%{}%", escape_like(term)))
        ));
        self.predicates.push(format!("({})", alternatives.join(" OR ")));
    }

    fn from_query(query: &EntryQuery) -> Self {
        let mut clause = Self::default();
        for criterion in query.filters.criteria() {
            clause.criterion(criterion);
        }
        for term in query.search.terms() {
            clause.search_term(term);
        }
        clause
    }

    fn sql(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

/// ORDER BY matching the in-memory ordering: missing values first when ascending.
fn order_sql(order: SortOrder) -> String {
    let expr = match order.column {
        SortColumn::Id => "e.id",
        SortColumn::User => "e.user_id",
        SortColumn::Ip => "e.ip",
        SortColumn::Host => "e.host",
        SortColumn::UserAgent => "e.user_agent",
        SortColumn::TimeInitialized => "e.time_initialized",
        SortColumn::DurationMs => "(e.time_finalized - e.time_initialized)",
        SortColumn::Method => "e.method",
        SortColumn::Path => "e.path",
        SortColumn::Status => "e.status",
    };
    if order.descending {
        format!(" ORDER BY {} DESC NULLS LAST, e.id DESC", expr)
    } else {
        format!(" ORDER BY {} ASC NULLS FIRST, e.id ASC", expr)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn create_entry(&self, entry: NewEntry) -> Result<i64, AuditError> {
        let client = self.client().await?;
        let user_id = entry.user.as_ref().map(|u| u.id);
        let query_params = entry.query_params.as_ref().map(pg_json);
        let request_data = entry.request_data.as_ref().map(pg_json);
        let row = client
            .query_one(
                "INSERT INTO reqlog_entries
                   (user_id, ip, host, path, method, user_agent, query_params, request_data, time_initialized)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING id",
                &[
                    &user_id,
                    &pg_text(&entry.ip),
                    &pg_text(&entry.host),
                    &pg_text(&entry.path),
                    &pg_text(&entry.method),
                    &pg_text(&entry.user_agent),
                    &query_params,
                    &request_data,
                    &entry.time_initialized,
                ],
            )
            .await
            .map_err(persistence)?;
        row.try_get(0).map_err(persistence)
    }

    async fn finalize_entry(&self, id: i64, finalization: Finalization) -> Result<(), AuditError> {
        let client = self.client().await?;
        let status = status_to_sql(finalization.status)?;
        let response_data = finalization.response_data.as_ref().map(pg_json);
        let updated = client
            .execute(
                "UPDATE reqlog_entries
                    SET status = $2, response_data = $3, time_finalized = $4
                  WHERE id = $1 AND time_finalized IS NULL AND status IS NULL",
                &[&id, &status, &response_data, &finalization.time_finalized],
            )
            .await
            .map_err(persistence)?;

        if updated == 1 {
            return Ok(());
        }
        let exists = client
            .query_opt("SELECT 1 FROM reqlog_entries WHERE id = $1", &[&id])
            .await
            .map_err(persistence)?;
        match exists {
            Some(_) => Err(AuditError::AlreadyFinalized(id)),
            None => Err(AuditError::NotFound(id)),
        }
    }

    async fn get_entry(&self, id: i64) -> Result<Option<Entry>, AuditError> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM {} WHERE e.id = $1", ENTRY_COLUMNS, ENTRY_SOURCE);
        let row = client.query_opt(sql.as_str(), &[&id]).await.map_err(persistence)?;

        match row {
            Some(row) => Ok(Some(entry_from_row(&row).map_err(persistence)?)),
            None => Ok(None),
        }
    }

    async fn search_entries(&self, query: &EntryQuery) -> Result<EntryPage, AuditError> {
        let client = self.client().await?;
        let clause = WhereClause::from_query(query);
        let where_sql = clause.sql();
        let params = clause.param_refs();

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", ENTRY_SOURCE, where_sql);
        let total: i64 = client
            .query_one(count_sql.as_str(), &params)
            .await
            .and_then(|row| row.try_get(0))
            .map_err(persistence)?;

        let page_sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            ENTRY_COLUMNS,
            ENTRY_SOURCE,
            where_sql,
            order_sql(query.order),
            query.limit,
            query.offset
        );
        let rows = client.query(page_sql.as_str(), &params).await.map_err(persistence)?;
        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(persistence)?;

        Ok(EntryPage {
            total: usize::try_from(total).unwrap_or_default(),
            entries,
        })
    }

    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, AuditError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, email, display_name, api_key FROM reqlog_users WHERE api_key = $1",
                &[&api_key],
            )
            .await
            .map_err(persistence)?;

        match row {
            Some(row) => Ok(Some(user_from_row(&row).map_err(persistence)?)),
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AuditError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO reqlog_users (email, display_name, api_key)
                 VALUES ($1, $2, $3)
                 RETURNING id, email, display_name, api_key",
                &[&user.email, &user.display_name, &user.api_key],
            )
            .await
            .map_err(persistence)?;
        user_from_row(&row).map_err(persistence)
    }

    async fn ping(&self) -> Result<(), AuditError> {
        let client = self.client().await?;
        client.query_one("SELECT 1", &[]).await.map_err(persistence)?;
        Ok(())
    }
}
