//! TableStore - executes compiled table requests against PostgreSQL
//!
//! The store owns a connection pool and a `DataModel`. It compiles each
//! `TableRequest` with the `QueryCompiler`, runs the count and row queries,
//! and decodes rows into JSON objects according to the attribute types.

use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::query::compiler::{InvalidPath, QueryCompiler};
use crate::query::request::{Pagination, TableRequest};
use crate::schema::DataModel;
use crate::sql::ddl::DdlGenerator;
use crate::types::{ColumnDefinition, ColumnType};

/// One page of rows plus the total row count of the filtered query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub rows: Vec<serde_json::Value>,
    pub total: i64,
    pub pagination: Option<Pagination>,
    /// Filter and sort keys that were skipped
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_paths: Vec<InvalidPath>,
}

/// Table query executor over a PostgreSQL pool
pub struct TableStore {
    /// Database connection pool
    pool: PgPool,
    /// Entity types the store can query
    model: DataModel,
    /// Store configuration
    config: StoreConfig,
}

impl TableStore {
    /// Connect to the database named in `config`
    pub async fn new(model: DataModel, config: StoreConfig) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Database connection failed: {}", e)))?;

        Ok(Self {
            pool,
            model,
            config,
        })
    }

    /// Create a store from an existing pool
    ///
    /// Use this when you already have a connection pool and want to
    /// share it with the store.
    pub fn from_pool(pool: PgPool, model: DataModel, config: StoreConfig) -> Self {
        Self {
            pool,
            model,
            config,
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create every table of the model, with association tables and foreign keys
    pub async fn create_tables(&self) -> Result<()> {
        let statements = DdlGenerator::new(&self.model).generate_schema()?;
        let mut tx = self.pool.begin().await?;
        for statement in &statements {
            debug!(sql = %statement, "Executing DDL");
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Drop every table of the model
    pub async fn drop_tables(&self) -> Result<()> {
        let generator = DdlGenerator::new(&self.model);
        for entity in self.model.entities() {
            let statement = generator.generate_drop_table(&entity.name)?;
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        for through in self
            .model
            .entities()
            .flat_map(|e| e.relations.iter())
            .filter_map(|r| r.through.as_ref())
        {
            let statement = format!(
                "DROP TABLE IF EXISTS {} CASCADE",
                crate::sql::sanitize::quote_identifier(&through.table)
            );
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Run `request` against `entity` and return one page of rows.
    ///
    /// Rows whose soft-delete column is set are hidden when the store is
    /// configured with one and the entity declares it.
    pub async fn fetch_page(&self, entity: &str, request: &TableRequest) -> Result<TablePage> {
        let entity_type = self.model.entity(entity)?;
        let mut compiler = QueryCompiler::new(&self.model, entity)?;
        if let Some(column) = &self.config.soft_delete_column {
            if entity_type.has_attribute(column) {
                compiler = compiler.exclude_soft_deleted(column)?;
            }
        }
        let compiled = compiler.compile(request);

        let (total,) = compiled
            .count
            .params
            .iter()
            .fold(sqlx::query_as::<_, (i64,)>(&compiled.count.sql), |q, p| {
                q.bind(param_string(p))
            })
            .fetch_one(&self.pool)
            .await?;

        let rows = compiled
            .select
            .params
            .iter()
            .fold(sqlx::query(&compiled.select.sql), |q, p| q.bind(param_string(p)))
            .fetch_all(&self.pool)
            .await?;

        let rows = rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for col in &entity_type.attributes {
                    let value = Self::extract_column_value(row, col).unwrap_or(serde_json::Value::Null);
                    object.insert(col.name.clone(), value);
                }
                serde_json::Value::Object(object)
            })
            .collect::<Vec<_>>();

        debug!(entity = %entity, rows = rows.len(), total, "Fetched table page");
        Ok(TablePage {
            rows,
            total,
            pagination: compiled.pagination,
            invalid_paths: compiled.invalid_paths,
        })
    }

    fn extract_column_value(
        row: &sqlx::postgres::PgRow,
        col: &ColumnDefinition,
    ) -> Option<serde_json::Value> {
        match &col.column_type {
            ColumnType::String | ColumnType::Enum { .. } => row
                .try_get::<Option<String>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::String),
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(|v| serde_json::Value::Number(serde_json::Number::from(v))),
            ColumnType::Decimal { .. } => {
                use rust_decimal::prelude::ToPrimitive;
                row.try_get::<Option<rust_decimal::Decimal>, _>(col.name.as_str())
                    .ok()
                    .flatten()
                    .and_then(|d| d.to_f64())
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
            }
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::Bool),
            ColumnType::Timestamp => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.to_rfc3339())),
            ColumnType::Json => row
                .try_get::<Option<serde_json::Value>, _>(col.name.as_str())
                .ok()
                .flatten(),
        }
    }
}

/// Compiled parameters are bound as text and cast in SQL
fn param_string(param: &serde_json::Value) -> String {
    match param {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
