//! Durable record store
//!
//! A namespaced key/value store. Every record lives in a `scope` (tenant) and a
//! `category`, is addressed by `key`, and carries author-supplied metadata.
//! Writes upsert on `(scope, category, key)`; nothing is ever deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Priority attached to a stored record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl RecordPriority {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(RecordPriority::Low),
            1 => Some(RecordPriority::Normal),
            2 => Some(RecordPriority::High),
            3 => Some(RecordPriority::Critical),
            _ => None,
        }
    }
}

/// Author-supplied metadata of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub created_by: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: RecordPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<String>,
    /// Arbitrary additional fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record to be written
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub scope: String,
    pub category: String,
    pub key: String,
    pub value: Value,
    pub metadata: RecordMetadata,
}

impl NewRecord {
    pub fn new(
        scope: impl Into<String>,
        category: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        author: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            category: category.into(),
            key: key.into(),
            value,
            metadata: RecordMetadata {
                created_by: author.into(),
                tags: Vec::new(),
                priority: RecordPriority::Normal,
                status: None,
                cycle_id: None,
                extra: Map::new(),
            },
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: RecordPriority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.metadata.status = Some(status.into());
        self
    }

    pub fn with_cycle_id(mut self, cycle_id: impl Into<String>) -> Self {
        self.metadata.cycle_id = Some(cycle_id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(name.into(), value);
        self
    }
}

/// A stored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub scope: String,
    pub category: String,
    pub key: String,
    pub value: Value,
    pub metadata: RecordMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Priority => "priority",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filtered scan over one scope
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub category: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<String>,
    /// Every tag must be present on a matching record
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            category: None,
            created_by: None,
            status: None,
            tags: Vec::new(),
            since: None,
            sort_by: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
            limit: 50,
        }
    }
}

impl RecordQuery {
    /// Newest-first scan of one category
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn sort(mut self, sort_by: SortField, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Persistence collaborator used by the authority layer
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record at `(scope, category, key)`
    async fn write(&self, record: NewRecord) -> Result<()>;

    /// Fetch a single record
    async fn get(&self, scope: &str, category: &str, key: &str) -> Result<Option<Entry>>;

    /// Filtered, sorted, limited scan
    async fn query(&self, scope: &str, query: &RecordQuery) -> Result<Vec<Entry>>;
}

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const SELECT_RECORDS: &str = r#"
    SELECT id, scope, category, key, value, created_by, tags, priority, status, cycle_id, extra, created_at, updated_at
    FROM records
"#;

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn write(&self, record: NewRecord) -> Result<()> {
        let now = Utc::now();
        let value = serde_json::to_string(&record.value)?;
        let tags = serde_json::to_string(&record.metadata.tags)?;
        let extra = serde_json::to_string(&record.metadata.extra)?;

        sqlx::query(
            r#"
            INSERT INTO records (id, scope, category, key, value, created_by, tags, priority, status, cycle_id, extra, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (scope, category, key) DO UPDATE SET
                value = excluded.value,
                created_by = excluded.created_by,
                tags = excluded.tags,
                priority = excluded.priority,
                status = excluded.status,
                cycle_id = excluded.cycle_id,
                extra = excluded.extra,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.scope)
        .bind(&record.category)
        .bind(&record.key)
        .bind(value)
        .bind(&record.metadata.created_by)
        .bind(tags)
        .bind(record.metadata.priority.as_i64())
        .bind(&record.metadata.status)
        .bind(&record.metadata.cycle_id)
        .bind(extra)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, scope: &str, category: &str, key: &str) -> Result<Option<Entry>> {
        let sql = format!("{} WHERE scope = ? AND category = ? AND key = ?", SELECT_RECORDS);
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(scope)
            .bind(category)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Entry::try_from).transpose()
    }

    async fn query(&self, scope: &str, query: &RecordQuery) -> Result<Vec<Entry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_RECORDS);
        builder.push(" WHERE scope = ").push_bind(scope.to_string());

        if let Some(category) = &query.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(author) = &query.created_by {
            builder.push(" AND created_by = ").push_bind(author.clone());
        }
        if let Some(status) = &query.status {
            builder.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(since) = query.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        for tag in &query.tags {
            builder
                .push(" AND EXISTS (SELECT 1 FROM json_each(records.tags) WHERE json_each.value = ")
                .push_bind(tag.clone())
                .push(")");
        }

        let order = query.sort_order.keyword();
        builder
            .push(" ORDER BY ")
            .push(query.sort_by.column())
            .push(" ")
            .push(order)
            .push(", rowid ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit));

        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Entry::try_from).collect()
    }
}

// Internal row type for sqlx

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    scope: String,
    category: String,
    key: String,
    value: String,
    created_by: String,
    tags: String,
    priority: i64,
    status: Option<String>,
    cycle_id: Option<String>,
    extra: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for Entry {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?;
        let value = serde_json::from_str(&row.value)
            .map_err(|e| AppError::Internal(format!("Invalid record value: {}", e)))?;
        let tags = serde_json::from_str(&row.tags)
            .map_err(|e| AppError::Internal(format!("Invalid record tags: {}", e)))?;
        let extra = serde_json::from_str(&row.extra)
            .map_err(|e| AppError::Internal(format!("Invalid record metadata: {}", e)))?;
        let priority = RecordPriority::from_i64(row.priority).ok_or_else(|| {
            AppError::Internal(format!("Invalid record priority: {}", row.priority))
        })?;

        Ok(Entry {
            id,
            scope: row.scope,
            category: row.category,
            key: row.key,
            value,
            metadata: RecordMetadata {
                created_by: row.created_by,
                tags,
                priority,
                status: row.status,
                cycle_id: row.cycle_id,
                extra,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
