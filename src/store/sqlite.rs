use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{GrantQuery, GrantStore};
use crate::db::row_parsers::db_grant_from_row;
use crate::errors::PermissableResult;
use crate::models::permission::normalize_permission;
use crate::models::{Grant, NewGrant};
use crate::utils::{timestamp, utc_now};

const GRANT_COLUMNS: &str =
    "id, member_id, member_type, resource_id, resource_type, permission_name, created_at, updated_at";

/// Upper bound on resources or ids bound into one statement.
const BIND_CHUNK: usize = 500;

/// Grant store over the `permissions` table.
#[derive(Debug, Clone)]
pub struct SqliteGrantStore {
    pool: SqlitePool,
}

impl SqliteGrantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Appends the WHERE clause for `query` to a statement on `permissions`.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &GrantQuery) {
    qb.push(" WHERE 1 = 1");

    if let Some(member_type) = &query.member_type {
        qb.push(" AND member_type = ").push_bind(member_type.clone());
    }

    if let Some(ids) = &query.member_ids {
        qb.push(" AND member_id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.as_str().to_string());
        }
        sep.push_unseparated(")");
    }

    if let Some(resources) = &query.resources {
        let mut by_type: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for resource in resources {
            by_type
                .entry(resource.type_name.as_str())
                .or_default()
                .push(resource.id.as_str());
        }

        qb.push(" AND (");
        for (idx, (resource_type, ids)) in by_type.into_iter().enumerate() {
            if idx > 0 {
                qb.push(" OR ");
            }
            qb.push("(resource_type = ")
                .push_bind(resource_type.to_string())
                .push(" AND resource_id IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(id.to_string());
            }
            sep.push_unseparated("))");
        }
        qb.push(")");
    }

    if let Some(types) = &query.resource_types {
        qb.push(" AND resource_type IN (");
        let mut sep = qb.separated(", ");
        for resource_type in types {
            sep.push_bind(resource_type.clone());
        }
        sep.push_unseparated(")");
    }

    if let Some(permissions) = &query.permissions {
        qb.push(" AND lower(permission_name) IN (");
        let mut sep = qb.separated(", ");
        for permission in permissions {
            sep.push_bind(permission.clone());
        }
        sep.push_unseparated(")");
    }
}

/// Splits a query with a long resource list into queries of at most
/// `BIND_CHUNK` resources each.
fn chunked(query: &GrantQuery) -> Vec<GrantQuery> {
    match &query.resources {
        Some(resources) if resources.len() > BIND_CHUNK => resources
            .chunks(BIND_CHUNK)
            .map(|chunk| GrantQuery {
                resources: Some(chunk.to_vec()),
                ..query.clone()
            })
            .collect(),
        _ => vec![query.clone()],
    }
}

#[async_trait]
impl GrantStore for SqliteGrantStore {
    async fn find(&self, query: &GrantQuery) -> PermissableResult<Vec<Grant>> {
        if query.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let parts = chunked(query);
        let mut grants = Vec::new();
        for part in &parts {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {GRANT_COLUMNS} FROM permissions"));
            push_filters(&mut qb, part);
            qb.push(" ORDER BY created_at, id");

            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in &rows {
                grants.push(Grant::try_from(db_grant_from_row(row)?)?);
            }
        }

        if parts.len() > 1 {
            grants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(grants)
    }

    async fn exists(&self, query: &GrantQuery) -> PermissableResult<bool> {
        if query.is_unsatisfiable() {
            return Ok(false);
        }

        for part in chunked(query) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT EXISTS(SELECT 1 FROM permissions");
            push_filters(&mut qb, &part);
            qb.push(")");

            let exists: bool = qb.build_query_scalar().fetch_one(&self.pool).await?;
            if exists {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_all(&self, grants: Vec<NewGrant>) -> PermissableResult<Vec<Grant>> {
        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let now = utc_now();
        let mut created = Vec::with_capacity(grants.len());
        let mut tx = self.pool.begin().await?;

        for mut grant in grants {
            grant.permission_name = normalize_permission(&grant.permission_name);
            let id = Uuid::new_v4();
            let result = sqlx::query(
                "INSERT INTO permissions (id, member_id, member_type, resource_id, resource_type, permission_name, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (member_id, member_type, resource_id, resource_type, permission_name) DO NOTHING",
            )
            .bind(id.to_string())
            .bind(grant.member.id.as_str())
            .bind(&grant.member.type_name)
            .bind(grant.resource.id.as_str())
            .bind(&grant.resource.type_name)
            .bind(&grant.permission_name)
            .bind(timestamp(now))
            .bind(timestamp(now))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(
                    member = %grant.member,
                    resource = %grant.resource,
                    permission = %grant.permission_name,
                    "grant already present"
                );
                continue;
            }

            created.push(Grant {
                id,
                member_id: grant.member.id,
                member_type: grant.member.type_name,
                resource_id: grant.resource.id,
                resource_type: grant.resource.type_name,
                permission_name: grant.permission_name,
                created_at: now,
                updated_at: now,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_permission(&self, ids: &[Uuid], permission: &str) -> PermissableResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let permission = normalize_permission(permission);
        let now = timestamp(utc_now());
        let mut updated = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in ids.chunks(BIND_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE permissions SET permission_name = ");
            qb.push_bind(permission.clone())
                .push(", updated_at = ")
                .push_bind(now.clone())
                .push(" WHERE id IN (");
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(id.to_string());
            }
            sep.push_unseparated(")");

            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, query: &GrantQuery) -> PermissableResult<u64> {
        if query.is_unsatisfiable() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;

        for part in chunked(query) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM permissions");
            push_filters(&mut qb, &part);
            removed += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }
}
