//! Postgres-backed entity store.
//!
//! ## Concurrency
//!
//! [`EntityStore::begin`] opens a database transaction and takes a row lock on
//! the visitor (`SELECT ... FOR UPDATE`). Two transactions over the same visitor
//! therefore serialize; under READ COMMITTED every statement the second one
//! issues after acquiring the lock sees what the first one committed.
//!
//! The schema backs the lock up with a partial unique index allowing one
//! `active`/`expired` pass per visitor and a unique index on `pass_number`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Anything else | N/A | `Backend` |
//! | Column decode / unknown enum text | N/A | `Decode` |

use core::fmt::Display;
use core::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use gatepass_auth::Role;
use gatepass_core::{AppointmentId, CheckLogId, PassId, UserId, VisitorId};
use gatepass_passes::{CheckLog, Pass};
use gatepass_visitors::{Appointment, User, Visitor};

use super::{
    AppointmentFilter, CheckCounts, CheckLogFilter, EntityStore, Page, Pagination, PassFilter,
    StoreError, StoreTx, UserFilter, VisitorFilter,
};

const SCHEMA: &str = include_str!("schema.sql");

const VISITOR_COLUMNS: &str = "id, name, email, phone, company, purpose, host_id, photo, status, \
     expected_arrival, expected_departure, actual_arrival, actual_departure, notes, created_at, updated_at";

const PASS_COLUMNS: &str = "id, visitor_id, pass_number, qr_data, pdf_url, issued_by, issued_at, \
     expires_at, status, access_level, valid_from, valid_to";

const CHECK_LOG_COLUMNS: &str = "id, visitor_id, pass_id, kind, logged_at, location, checked_by, \
     method, notes, temperature, device_info";

const APPOINTMENT_COLUMNS: &str = "id, visitor_id, host_id, title, description, date, start_time, \
     end_time, location, attendees, status, notes, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, role, department, phone, is_active, created_at";

const VISITOR_WHERE: &str = "WHERE ($1::text IS NULL OR status = $1)
       AND ($2::uuid IS NULL OR host_id = $2)
       AND ($3::text IS NULL
            OR name ILIKE '%' || $3 || '%'
            OR email ILIKE '%' || $3 || '%'
            OR company ILIKE '%' || $3 || '%')
       AND ($4::timestamptz IS NULL OR expected_arrival >= $4)
       AND ($5::timestamptz IS NULL OR expected_arrival <= $5)";

const PASS_WHERE: &str = "WHERE ($1::text IS NULL OR status = $1)
       AND ($2::uuid IS NULL OR visitor_id = $2)
       AND ($3::text IS NULL OR pass_number ILIKE '%' || $3 || '%')
       AND ($4::uuid IS NULL OR visitor_id IN (SELECT id FROM visitors WHERE host_id = $4))";

const CHECK_LOG_WHERE: &str = "WHERE ($1::uuid IS NULL OR visitor_id = $1)
       AND ($2::text IS NULL OR kind = $2)
       AND ($3::timestamptz IS NULL OR logged_at >= $3)
       AND ($4::timestamptz IS NULL OR logged_at <= $4)
       AND ($5::uuid IS NULL OR visitor_id IN (SELECT id FROM visitors WHERE host_id = $5))";

const APPOINTMENT_WHERE: &str = "WHERE ($1::text IS NULL OR status = $1)
       AND ($2::uuid IS NULL OR visitor_id = $2)
       AND ($3::uuid IS NULL OR host_id = $3 OR $3 = ANY(attendees))";

const USER_WHERE: &str = "WHERE ($1::text IS NULL OR role = $1)
       AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR email ILIKE '%' || $2 || '%')";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Postgres-backed entity store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool of at most `max_connections`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn count(&self, operation: &'static str, query: PgQuery<'_>) -> Result<u64, StoreError> {
        let row = query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let n: i64 = row.try_get(0).map_err(decode_error)?;
        Ok(n.max(0) as u64)
    }

    async fn rows(&self, operation: &'static str, query: PgQuery<'_>) -> Result<Vec<PgRow>, StoreError> {
        query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn row(&self, operation: &'static str, query: PgQuery<'_>) -> Result<Option<PgRow>, StoreError> {
        query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn exec(&self, operation: &'static str, query: PgQuery<'_>) -> Result<u64, StoreError> {
        let done = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(done.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db) => db.constraint().unwrap_or("unique").to_string(),
            _ => "unique".to_string(),
        };
        return StoreError::Duplicate(format!("{operation}: {constraint}"));
    }
    StoreError::Backend {
        operation,
        message: err.to_string(),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn parsed<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column).map_err(decode_error)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Decode(format!("{column}: {e}")))
}

fn col<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(decode_error)
}

fn visitor_from_row(row: &PgRow) -> Result<Visitor, StoreError> {
    Ok(Visitor {
        id: VisitorId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        email: col(row, "email")?,
        phone: col(row, "phone")?,
        company: col(row, "company")?,
        purpose: col(row, "purpose")?,
        host_id: UserId::from_uuid(col(row, "host_id")?),
        photo: col(row, "photo")?,
        status: parsed(row, "status")?,
        expected_arrival: col(row, "expected_arrival")?,
        expected_departure: col(row, "expected_departure")?,
        actual_arrival: col(row, "actual_arrival")?,
        actual_departure: col(row, "actual_departure")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn pass_from_row(row: &PgRow) -> Result<Pass, StoreError> {
    Ok(Pass {
        id: PassId::from_uuid(col(row, "id")?),
        visitor_id: VisitorId::from_uuid(col(row, "visitor_id")?),
        pass_number: col(row, "pass_number")?,
        qr_data: col(row, "qr_data")?,
        pdf_url: col(row, "pdf_url")?,
        issued_by: UserId::from_uuid(col(row, "issued_by")?),
        issued_at: col(row, "issued_at")?,
        expires_at: col(row, "expires_at")?,
        status: parsed(row, "status")?,
        access_level: parsed(row, "access_level")?,
        valid_from: col(row, "valid_from")?,
        valid_to: col(row, "valid_to")?,
    })
}

fn check_log_from_row(row: &PgRow) -> Result<CheckLog, StoreError> {
    Ok(CheckLog {
        id: CheckLogId::from_uuid(col(row, "id")?),
        visitor_id: VisitorId::from_uuid(col(row, "visitor_id")?),
        pass_id: PassId::from_uuid(col(row, "pass_id")?),
        kind: parsed(row, "kind")?,
        timestamp: col(row, "logged_at")?,
        location: col(row, "location")?,
        checked_by: UserId::from_uuid(col(row, "checked_by")?),
        method: parsed(row, "method")?,
        notes: col(row, "notes")?,
        temperature: col(row, "temperature")?,
        device_info: col(row, "device_info")?,
    })
}

fn appointment_from_row(row: &PgRow) -> Result<Appointment, StoreError> {
    let attendees: Vec<Uuid> = col(row, "attendees")?;
    let date: NaiveDate = col(row, "date")?;
    Ok(Appointment {
        id: AppointmentId::from_uuid(col(row, "id")?),
        visitor_id: VisitorId::from_uuid(col(row, "visitor_id")?),
        host_id: UserId::from_uuid(col(row, "host_id")?),
        title: col(row, "title")?,
        description: col(row, "description")?,
        date,
        start_time: col(row, "start_time")?,
        end_time: col(row, "end_time")?,
        location: col(row, "location")?,
        attendees: attendees.into_iter().map(UserId::from_uuid).collect(),
        status: parsed(row, "status")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        email: col(row, "email")?,
        role: parsed::<Role>(row, "role")?,
        department: col(row, "department")?,
        phone: col(row, "phone")?,
        is_active: col(row, "is_active")?,
        created_at: col(row, "created_at")?,
    })
}

fn decode_all<T>(rows: Vec<PgRow>, f: fn(&PgRow) -> Result<T, StoreError>) -> Result<Vec<T>, StoreError> {
    rows.iter().map(f).collect()
}

// ---------------------------------------------------------------------------
// Parameter binding
// ---------------------------------------------------------------------------

fn uuid_of<T: Copy + Into<Uuid>>(id: Option<T>) -> Option<Uuid> {
    id.map(Into::into)
}

fn bind_visitor_filter<'q>(q: PgQuery<'q>, f: &'q VisitorFilter) -> PgQuery<'q> {
    q.bind(f.status.map(|s| s.as_str()))
        .bind(uuid_of(f.host_id))
        .bind(f.search.as_deref())
        .bind(f.start)
        .bind(f.end)
}

fn bind_pass_filter<'q>(q: PgQuery<'q>, f: &'q PassFilter) -> PgQuery<'q> {
    q.bind(f.status.map(|s| s.as_str()))
        .bind(uuid_of(f.visitor_id))
        .bind(f.search.as_deref())
        .bind(uuid_of(f.hosted_by))
}

fn bind_check_log_filter<'q>(q: PgQuery<'q>, f: &'q CheckLogFilter) -> PgQuery<'q> {
    q.bind(uuid_of(f.visitor_id))
        .bind(f.kind.map(|k| k.as_str()))
        .bind(f.start)
        .bind(f.end)
        .bind(uuid_of(f.hosted_by))
}

fn bind_appointment_filter<'q>(q: PgQuery<'q>, f: &'q AppointmentFilter) -> PgQuery<'q> {
    q.bind(f.status.map(|s| s.as_str()))
        .bind(uuid_of(f.visitor_id))
        .bind(uuid_of(f.participant))
}

fn bind_user_filter<'q>(q: PgQuery<'q>, f: &'q UserFilter) -> PgQuery<'q> {
    q.bind(f.role.map(|r| r.as_str())).bind(f.search.as_deref())
}

fn bind_visitor<'q>(q: PgQuery<'q>, v: &'q Visitor) -> PgQuery<'q> {
    q.bind(v.id.as_uuid())
        .bind(&v.name)
        .bind(&v.email)
        .bind(&v.phone)
        .bind(v.company.as_deref())
        .bind(&v.purpose)
        .bind(v.host_id.as_uuid())
        .bind(v.photo.as_deref())
        .bind(v.status.as_str())
        .bind(v.expected_arrival)
        .bind(v.expected_departure)
        .bind(v.actual_arrival)
        .bind(v.actual_departure)
        .bind(v.notes.as_deref())
        .bind(v.created_at)
        .bind(v.updated_at)
}

fn bind_pass<'q>(q: PgQuery<'q>, p: &'q Pass) -> PgQuery<'q> {
    q.bind(p.id.as_uuid())
        .bind(p.visitor_id.as_uuid())
        .bind(&p.pass_number)
        .bind(&p.qr_data)
        .bind(p.pdf_url.as_deref())
        .bind(p.issued_by.as_uuid())
        .bind(p.issued_at)
        .bind(p.expires_at)
        .bind(p.status.as_str())
        .bind(p.access_level.as_str())
        .bind(p.valid_from)
        .bind(p.valid_to)
}

fn bind_appointment<'q>(q: PgQuery<'q>, a: &'q Appointment) -> PgQuery<'q> {
    q.bind(a.id.as_uuid())
        .bind(a.visitor_id.as_uuid())
        .bind(a.host_id.as_uuid())
        .bind(&a.title)
        .bind(a.description.as_deref())
        .bind(a.date)
        .bind(&a.start_time)
        .bind(&a.end_time)
        .bind(a.location.as_deref())
        .bind(a.attendees.iter().map(|u| *u.as_uuid()).collect::<Vec<Uuid>>())
        .bind(a.status.as_str())
        .bind(a.notes.as_deref())
        .bind(a.created_at)
        .bind(a.updated_at)
}

fn bind_user<'q>(q: PgQuery<'q>, u: &'q User) -> PgQuery<'q> {
    q.bind(u.id.as_uuid())
        .bind(&u.name)
        .bind(&u.email)
        .bind(u.role.as_str())
        .bind(u.department.as_deref())
        .bind(u.phone.as_deref())
        .bind(u.is_active)
        .bind(u.created_at)
}

fn page_bounds(page: Pagination) -> (i64, i64) {
    (i64::from(page.limit), page.offset() as i64)
}

fn upsert_sql(table: &str, columns: &str, conflict: &str) -> String {
    let names: Vec<&str> = columns.split(',').map(str::trim).collect();
    let params = (1..=names.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = names
        .iter()
        .filter(|n| **n != conflict)
        .map(|n| format!("{n} = EXCLUDED.{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({params}) ON CONFLICT ({conflict}) DO UPDATE SET {updates}")
}

fn insert_sql(table: &str, columns: &str) -> String {
    let n = columns.split(',').count();
    let params = (1..=n).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({params})")
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

#[async_trait]
impl EntityStore for PostgresStore {
    #[instrument(skip(self), fields(visitor_id = %visitor_id), err)]
    async fn begin(&self, visitor_id: VisitorId) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query("SELECT id FROM visitors WHERE id = $1 FOR UPDATE")
            .bind(visitor_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_visitor", e))?;
        Ok(Box::new(PgTx { visitor_id, tx }))
    }

    async fn visitor(&self, id: VisitorId) -> Result<Option<Visitor>, StoreError> {
        let sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = $1");
        self.row("load_visitor", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(visitor_from_row)
            .transpose()
    }

    #[instrument(skip(self, visitor), fields(visitor_id = %visitor.id), err)]
    async fn insert_visitor(&self, visitor: &Visitor) -> Result<(), StoreError> {
        let sql = insert_sql("visitors", VISITOR_COLUMNS);
        self.exec("insert_visitor", bind_visitor(sqlx::query(&sql), visitor))
            .await?;
        Ok(())
    }

    async fn list_visitors(
        &self,
        filter: &VisitorFilter,
        page: Pagination,
    ) -> Result<Page<Visitor>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM visitors {VISITOR_WHERE}");
        let total = self
            .count("count_visitors", bind_visitor_filter(sqlx::query(&count_sql), filter))
            .await?;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {VISITOR_COLUMNS} FROM visitors {VISITOR_WHERE}
             ORDER BY created_at DESC, id DESC LIMIT $6 OFFSET $7"
        );
        let rows = self
            .rows(
                "list_visitors",
                bind_visitor_filter(sqlx::query(&sql), filter).bind(limit).bind(offset),
            )
            .await?;
        Ok(Page {
            items: decode_all(rows, visitor_from_row)?,
            total,
            pagination: page,
        })
    }

    async fn pass(&self, id: PassId) -> Result<Option<Pass>, StoreError> {
        let sql = format!("SELECT {PASS_COLUMNS} FROM passes WHERE id = $1");
        self.row("load_pass", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(pass_from_row)
            .transpose()
    }

    async fn set_pass_pdf_url(&self, id: PassId, url: &str) -> Result<(), StoreError> {
        self.exec(
            "set_pass_pdf_url",
            sqlx::query("UPDATE passes SET pdf_url = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(url),
        )
        .await?;
        Ok(())
    }

    async fn list_passes(&self, filter: &PassFilter, page: Pagination) -> Result<Page<Pass>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM passes {PASS_WHERE}");
        let total = self
            .count("count_passes", bind_pass_filter(sqlx::query(&count_sql), filter))
            .await?;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {PASS_COLUMNS} FROM passes {PASS_WHERE}
             ORDER BY issued_at DESC, id DESC LIMIT $5 OFFSET $6"
        );
        let rows = self
            .rows(
                "list_passes",
                bind_pass_filter(sqlx::query(&sql), filter).bind(limit).bind(offset),
            )
            .await?;
        Ok(Page {
            items: decode_all(rows, pass_from_row)?,
            total,
            pagination: page,
        })
    }

    async fn check_log(&self, id: CheckLogId) -> Result<Option<CheckLog>, StoreError> {
        let sql = format!("SELECT {CHECK_LOG_COLUMNS} FROM check_logs WHERE id = $1");
        self.row("load_check_log", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(check_log_from_row)
            .transpose()
    }

    async fn list_check_logs(
        &self,
        filter: &CheckLogFilter,
        page: Pagination,
    ) -> Result<Page<CheckLog>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM check_logs {CHECK_LOG_WHERE}");
        let total = self
            .count(
                "count_check_logs",
                bind_check_log_filter(sqlx::query(&count_sql), filter),
            )
            .await?;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {CHECK_LOG_COLUMNS} FROM check_logs {CHECK_LOG_WHERE}
             ORDER BY logged_at DESC, seq DESC LIMIT $6 OFFSET $7"
        );
        let rows = self
            .rows(
                "list_check_logs",
                bind_check_log_filter(sqlx::query(&sql), filter)
                    .bind(limit)
                    .bind(offset),
            )
            .await?;
        Ok(Page {
            items: decode_all(rows, check_log_from_row)?,
            total,
            pagination: page,
        })
    }

    async fn visitor_history(&self, visitor_id: VisitorId) -> Result<Vec<CheckLog>, StoreError> {
        let sql = format!(
            "SELECT {CHECK_LOG_COLUMNS} FROM check_logs WHERE visitor_id = $1
             ORDER BY logged_at DESC, seq DESC"
        );
        let rows = self
            .rows("visitor_history", sqlx::query(&sql).bind(visitor_id.as_uuid()))
            .await?;
        decode_all(rows, check_log_from_row)
    }

    #[instrument(skip(self), err)]
    async fn check_counts(&self, since: DateTime<Utc>) -> Result<CheckCounts, StoreError> {
        let row = self
            .row(
                "check_counts",
                sqlx::query(
                    "SELECT
                        COUNT(*) FILTER (WHERE kind = 'check_in') AS check_ins,
                        COUNT(*) FILTER (WHERE kind = 'check_out') AS check_outs,
                        (SELECT COUNT(*) FROM visitors
                          WHERE status = 'checked_in' AND actual_arrival >= $1) AS on_site
                     FROM check_logs WHERE logged_at >= $1",
                )
                .bind(since),
            )
            .await?;
        let Some(row) = row else {
            return Ok(CheckCounts::default());
        };
        let n = |c: &str| -> Result<u64, StoreError> { Ok(col::<i64>(&row, c)?.max(0) as u64) };
        Ok(CheckCounts {
            check_ins: n("check_ins")?,
            check_outs: n("check_outs")?,
            currently_checked_in: n("on_site")?,
        })
    }

    async fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1");
        self.row("load_appointment", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(appointment_from_row)
            .transpose()
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let sql = insert_sql("appointments", APPOINTMENT_COLUMNS);
        self.exec(
            "insert_appointment",
            bind_appointment(sqlx::query(&sql), appointment),
        )
        .await?;
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let sql = upsert_sql("appointments", APPOINTMENT_COLUMNS, "id");
        self.exec(
            "update_appointment",
            bind_appointment(sqlx::query(&sql), appointment),
        )
        .await?;
        Ok(())
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<bool, StoreError> {
        let n = self
            .exec(
                "delete_appointment",
                sqlx::query("DELETE FROM appointments WHERE id = $1").bind(id.as_uuid()),
            )
            .await?;
        Ok(n > 0)
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        page: Pagination,
    ) -> Result<Page<Appointment>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM appointments {APPOINTMENT_WHERE}");
        let total = self
            .count(
                "count_appointments",
                bind_appointment_filter(sqlx::query(&count_sql), filter),
            )
            .await?;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments {APPOINTMENT_WHERE}
             ORDER BY date DESC, start_time DESC LIMIT $4 OFFSET $5"
        );
        let rows = self
            .rows(
                "list_appointments",
                bind_appointment_filter(sqlx::query(&sql), filter)
                    .bind(limit)
                    .bind(offset),
            )
            .await?;
        Ok(Page {
            items: decode_all(rows, appointment_from_row)?,
            total,
            pagination: page,
        })
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.row("load_user", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let sql = insert_sql("users", USER_COLUMNS);
        self.exec("insert_user", bind_user(sqlx::query(&sql), user))
            .await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let sql = upsert_sql("users", USER_COLUMNS, "id");
        self.exec("update_user", bind_user(sqlx::query(&sql), user))
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let n = self
            .exec(
                "delete_user",
                sqlx::query("DELETE FROM users WHERE id = $1").bind(id.as_uuid()),
            )
            .await?;
        Ok(n > 0)
    }

    async fn list_users(&self, filter: &UserFilter, page: Pagination) -> Result<Page<User>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM users {USER_WHERE}");
        let total = self
            .count("count_users", bind_user_filter(sqlx::query(&count_sql), filter))
            .await?;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {USER_WHERE}
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        let rows = self
            .rows(
                "list_users",
                bind_user_filter(sqlx::query(&sql), filter).bind(limit).bind(offset),
            )
            .await?;
        Ok(Page {
            items: decode_all(rows, user_from_row)?,
            total,
            pagination: page,
        })
    }
}

// ---------------------------------------------------------------------------
// StoreTx
// ---------------------------------------------------------------------------

/// Database transaction holding the visitor's row lock.
///
/// Dropping it without `commit` rolls back.
struct PgTx {
    visitor_id: VisitorId,
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn row(&mut self, operation: &'static str, query: PgQuery<'_>) -> Result<Option<PgRow>, StoreError> {
        query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn exec(&mut self, operation: &'static str, query: PgQuery<'_>) -> Result<(), StoreError> {
        query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    fn visitor_id(&self) -> VisitorId {
        self.visitor_id
    }

    async fn visitor(&mut self) -> Result<Option<Visitor>, StoreError> {
        let sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = $1");
        let id = self.visitor_id;
        self.row("tx_load_visitor", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(visitor_from_row)
            .transpose()
    }

    async fn pass(&mut self, id: PassId) -> Result<Option<Pass>, StoreError> {
        let sql = format!("SELECT {PASS_COLUMNS} FROM passes WHERE id = $1");
        self.row("tx_load_pass", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(pass_from_row)
            .transpose()
    }

    async fn blocking_pass(&mut self) -> Result<Option<Pass>, StoreError> {
        let sql = format!(
            "SELECT {PASS_COLUMNS} FROM passes
             WHERE visitor_id = $1 AND status IN ('active', 'expired')
             LIMIT 1"
        );
        let id = self.visitor_id;
        self.row("blocking_pass", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .as_ref()
            .map(pass_from_row)
            .transpose()
    }

    async fn pass_number_taken(&mut self, number: &str) -> Result<bool, StoreError> {
        let row = self
            .row(
                "pass_number_taken",
                sqlx::query("SELECT 1 FROM passes WHERE pass_number = $1").bind(number),
            )
            .await?;
        Ok(row.is_some())
    }

    async fn latest_check_in_since(
        &mut self,
        since: DateTime<Utc>,
    ) -> Result<Option<CheckLog>, StoreError> {
        let sql = format!(
            "SELECT {CHECK_LOG_COLUMNS} FROM check_logs
             WHERE visitor_id = $1 AND kind = 'check_in' AND logged_at >= $2
             ORDER BY logged_at DESC, seq DESC
             LIMIT 1"
        );
        let id = self.visitor_id;
        self.row(
            "latest_check_in",
            sqlx::query(&sql).bind(id.as_uuid()).bind(since),
        )
        .await?
        .as_ref()
        .map(check_log_from_row)
        .transpose()
    }

    async fn insert_pass(&mut self, pass: &Pass) -> Result<(), StoreError> {
        let sql = insert_sql("passes", PASS_COLUMNS);
        self.exec("insert_pass", bind_pass(sqlx::query(&sql), pass))
            .await
    }

    async fn update_pass(&mut self, pass: &Pass) -> Result<(), StoreError> {
        self.exec(
            "update_pass",
            sqlx::query("UPDATE passes SET status = $2 WHERE id = $1")
                .bind(pass.id.as_uuid())
                .bind(pass.status.as_str()),
        )
        .await
    }

    async fn update_visitor(&mut self, visitor: &Visitor) -> Result<(), StoreError> {
        let sql = upsert_sql("visitors", VISITOR_COLUMNS, "id");
        self.exec("update_visitor", bind_visitor(sqlx::query(&sql), visitor))
            .await
    }

    async fn append_check_log(&mut self, log: &CheckLog) -> Result<(), StoreError> {
        let sql = insert_sql("check_logs", CHECK_LOG_COLUMNS);
        self.exec(
            "append_check_log",
            sqlx::query(&sql)
                .bind(log.id.as_uuid())
                .bind(log.visitor_id.as_uuid())
                .bind(log.pass_id.as_uuid())
                .bind(log.kind.as_str())
                .bind(log.timestamp)
                .bind(log.location.as_deref())
                .bind(log.checked_by.as_uuid())
                .bind(log.method.as_str())
                .bind(log.notes.as_deref())
                .bind(log.temperature)
                .bind(log.device_info.as_deref()),
        )
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_updates_every_column_but_the_key() {
        let sql = upsert_sql("users", "id, name, email", "id");
        assert_eq!(
            sql,
            "INSERT INTO users (id, name, email) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email"
        );
    }

    #[test]
    fn insert_placeholders_match_column_count() {
        let sql = insert_sql("check_logs", CHECK_LOG_COLUMNS);
        assert!(sql.ends_with("$11)"));
    }

    #[test]
    fn schema_declares_every_table() {
        for table in ["users", "visitors", "passes", "check_logs", "appointments"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
    }
}
