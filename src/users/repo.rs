use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::Executor;
use crate::domain::{Error, NewUser, User, UserSearchFilters, UserUpdate};

const USER_COLUMNS: &str =
    "id, first_name, last_name, nickname, email, country_iso_code, created_at, updated_at";

/// Mutating user persistence.
#[async_trait::async_trait]
pub trait UserStoreCommands: Send + Sync {
    /// Inserts a user. A unique-constraint conflict on email or nickname is
    /// `UserAlreadyExists`; anything else is logged and `Internal`.
    async fn save(&self, db: &mut Executor<'_>, user: &NewUser) -> Result<Uuid, Error>;

    /// Full-row update by id. `UserNotFound` when the row does not exist.
    async fn update(&self, db: &mut Executor<'_>, user: &UserUpdate) -> Result<(), Error>;

    /// Delete by id. `UserNotFound` when the row does not exist.
    async fn delete(&self, db: &mut Executor<'_>, user_id: Uuid) -> Result<(), Error>;
}

/// Read-side user persistence.
#[async_trait::async_trait]
pub trait UserStoreQueries: Send + Sync {
    async fn get(&self, db: &mut Executor<'_>, user_id: Uuid) -> Result<User, Error>;

    /// Keyset-paginated listing ordered by `updated_at DESC, id DESC`. The
    /// cursor predicate only applies when both parts are present.
    async fn list(
        &self,
        db: &mut Executor<'_>,
        cursor_id: Option<Uuid>,
        cursor_updated_at: Option<OffsetDateTime>,
        limit: i64,
        filters: &UserSearchFilters,
    ) -> Result<Vec<User>, Error>;
}

#[derive(Debug, Clone, Default)]
pub struct PgUserStore;

#[async_trait::async_trait]
impl UserStoreCommands for PgUserStore {
    async fn save(&self, db: &mut Executor<'_>, user: &NewUser) -> Result<Uuid, Error> {
        let query = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (first_name, last_name, country_iso_code, nickname, email, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.country_iso_code)
        .bind(&user.nickname)
        .bind(&user.email)
        .bind(&user.password_hash);

        let result = match db {
            Executor::Pool(pool) => query.fetch_one(*pool).await,
            Executor::Tx(tx) => query.fetch_one(&mut ***tx).await,
        };

        result.map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|e| e.is_unique_violation())
            {
                debug!(email = %user.email, error = %err, "user already exists");
                Error::UserAlreadyExists
            } else {
                error!(error = %err, "failed to save user");
                Error::Internal
            }
        })
    }

    async fn update(&self, db: &mut Executor<'_>, user: &UserUpdate) -> Result<(), Error> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, country_iso_code = $4, nickname = $5, email = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.country_iso_code)
        .bind(&user.nickname)
        .bind(&user.email);

        let result = match db {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        };

        let done = result.map_err(|err| {
            error!(error = %err, "failed to update user");
            Error::Internal
        })?;
        if done.rows_affected() == 0 {
            debug!(user_id = %user.id, "user does not exist");
            return Err(Error::UserNotFound);
        }
        Ok(())
    }

    async fn delete(&self, db: &mut Executor<'_>, user_id: Uuid) -> Result<(), Error> {
        let query = sqlx::query("DELETE FROM users WHERE id = $1").bind(user_id);

        let result = match db {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        };

        let done = result.map_err(|err| {
            error!(error = %err, "failed to delete user");
            Error::Internal
        })?;
        if done.rows_affected() == 0 {
            debug!(user_id = %user_id, "user does not exist");
            return Err(Error::UserNotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStoreQueries for PgUserStore {
    async fn get(&self, db: &mut Executor<'_>, user_id: Uuid) -> Result<User, Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let query = sqlx::query_as::<_, User>(&sql).bind(user_id);

        let result = match db {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        };

        match result {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(Error::UserNotFound),
            Err(err) => {
                error!(error = %err, "failed to read user row");
                Err(Error::FailedToProcessData)
            }
        }
    }

    async fn list(
        &self,
        db: &mut Executor<'_>,
        cursor_id: Option<Uuid>,
        cursor_updated_at: Option<OffsetDateTime>,
        limit: i64,
        filters: &UserSearchFilters,
    ) -> Result<Vec<User>, Error> {
        let mut qb = build_list_query(cursor_id, cursor_updated_at, limit, filters);
        let query = qb.build_query_as::<User>();

        let result = match db {
            Executor::Pool(pool) => query.fetch_all(*pool).await,
            Executor::Tx(tx) => query.fetch_all(&mut ***tx).await,
        };

        result.map_err(|err| match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                error!(error = %err, "failed to decode user row");
                Error::FailedToProcessData
            }
            _ => {
                debug!(error = %err, "failed to list users");
                Error::Internal
            }
        })
    }
}

/// Assembles the listing query. Kept separate from execution so the clause
/// composition is testable without a database.
fn build_list_query(
    cursor_id: Option<Uuid>,
    cursor_updated_at: Option<OffsetDateTime>,
    limit: i64,
    filters: &UserSearchFilters,
) -> QueryBuilder<'static, Postgres> {
    let mut qb =
        QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
    let mut prefix = " WHERE ";

    if let (Some(id), Some(updated_at)) = (cursor_id, cursor_updated_at) {
        qb.push(prefix);
        prefix = " AND ";
        qb.push("(updated_at < ")
            .push_bind(updated_at)
            .push(" OR (updated_at = ")
            .push_bind(updated_at)
            .push(" AND id < ")
            .push_bind(id)
            .push("))");
    }

    let text_filters = [
        ("first_name", &filters.first_name),
        ("last_name", &filters.last_name),
        ("nickname", &filters.nickname),
        ("email", &filters.email),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value {
            qb.push(prefix);
            prefix = " AND ";
            qb.push(column)
                .push(" ILIKE ")
                .push_bind(format!("%{value}%"));
        }
    }
    if let Some(country) = &filters.country_iso_code {
        qb.push(prefix);
        qb.push("country_iso_code ILIKE ").push_bind(country.clone());
    }

    qb.push(" ORDER BY updated_at DESC, id DESC LIMIT ")
        .push_bind(limit);
    qb
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn list_query_without_cursor_or_filters() {
        let qb = build_list_query(None, None, 10, &UserSearchFilters::default());
        assert_eq!(
            qb.sql(),
            format!("SELECT {USER_COLUMNS} FROM users ORDER BY updated_at DESC, id DESC LIMIT $1")
        );
    }

    #[test]
    fn list_query_with_full_cursor() {
        let id = Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap();
        let ts = datetime!(2024-08-22 20:09:11 UTC);
        let qb = build_list_query(Some(id), Some(ts), 5, &UserSearchFilters::default());
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE (updated_at < $1 OR (updated_at = $2 AND id < $3)) ORDER BY updated_at DESC, id DESC LIMIT $4"
            )
        );
    }

    #[test]
    fn list_query_ignores_a_partial_cursor() {
        let id = Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap();
        let qb = build_list_query(Some(id), None, 5, &UserSearchFilters::default());
        assert!(!qb.sql().contains("WHERE"));
    }

    #[test]
    fn list_query_composes_filters() {
        let filters = UserSearchFilters {
            first_name: Some("fir".into()),
            country_iso_code: Some("PT".into()),
            ..Default::default()
        };
        let qb = build_list_query(None, None, 5, &filters);
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE first_name ILIKE $1 AND country_iso_code ILIKE $2 ORDER BY updated_at DESC, id DESC LIMIT $3"
            )
        );
    }

    #[test]
    fn list_query_combines_cursor_and_filters() {
        let id = Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap();
        let ts = datetime!(2024-08-22 20:09:11 UTC);
        let filters = UserSearchFilters {
            nickname: Some("nick".into()),
            ..Default::default()
        };
        let qb = build_list_query(Some(id), Some(ts), 2, &filters);
        assert!(qb.sql().contains("(updated_at < $1 OR (updated_at = $2 AND id < $3))"));
        assert!(qb.sql().contains(" AND nickname ILIKE $4"));
        assert!(qb.sql().ends_with(" ORDER BY updated_at DESC, id DESC LIMIT $5"));
    }
}
