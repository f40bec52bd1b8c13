//! PostgreSQL-backed record store.
//!
//! Queries are built as runtime strings with positional binds; rows come
//! back as tuples and are mapped into the domain types here. Referential
//! integrity is enforced by the schema, so constraint violations surface
//! as database errors and are translated in [`crate::error`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use medreg_core::id::generate_id;
use medreg_core::model::{
    Hospital, HospitalRecord, HospitalSummary, HospitalUpdate, NewHospital, NewUser, NewWard,
    Role, User, UserCredentials, UserRecord, UserUpdate, Ward, WardKind, WardRecord, WardSummary,
    WardUpdate,
};
use medreg_core::scope::{DEVELOPMENT_HOSPITAL_ID, ScopeFilter};
use medreg_store::{RecordStore, StoreError};

use crate::config::PostgresConfig;
use crate::error::{map_query_error, map_record_error};
use crate::pool::create_pool;
use crate::schema::ensure_schema;

const HOSPITAL_COLUMNS: &str = "id, name, sequence, address, phone, contact_name, \
     contact_phone, latitude, longitude, picture, created_at, updated_at";

const WARD_COLUMNS: &str = "id, name, sequence, kind, hospital_id, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, password_hash, active, role, display_name, \
     picture, note, created_by, ward_id, created_at, updated_at";

const USER_JOIN_COLUMNS: &str =
    "u.id, u.username, u.active, u.role, u.display_name, u.picture, \
     w.id, w.name, h.id, h.name, h.picture";

/// Role sort rank, pinned in SQL so listings match the in-memory backend.
const USER_ROLE_ORDER: &str = "CASE u.role WHEN 'SUPER' THEN 0 WHEN 'SERVICE' THEN 1 \
     WHEN 'ADMIN' THEN 2 WHEN 'LEGACY_ADMIN' THEN 3 ELSE 4 END";

type HospitalRow = (
    String,
    String,
    i32,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type WardRow = (
    String,
    String,
    i32,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type UserRow = (
    String,
    String,
    String,
    bool,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type UserJoinRow = (
    String,
    String,
    bool,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
);

type CredentialsRow = (String, String, String, bool, String, String, String);

/// Converts chrono DateTime to time OffsetDateTime.
fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

fn parse_role(value: &str) -> Result<Role, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::internal(format!("unrecognized role in storage: {value}")))
}

fn parse_kind(value: &str) -> Result<WardKind, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::internal(format!("unrecognized ward kind in storage: {value}")))
}

/// Builds the `WHERE` fragment for a scope filter over `column`.
///
/// The fragment always owns placeholders `$1` onward, so it must come
/// before any other binds in the statement.
fn scope_clause(filter: &ScopeFilter, column: &str) -> (String, Vec<String>) {
    match filter {
        ScopeFilter::All => (String::new(), Vec::new()),
        ScopeFilter::ExcludeDevelopment => (
            format!(" WHERE {column} <> $1"),
            vec![DEVELOPMENT_HOSPITAL_ID.to_string()],
        ),
        ScopeFilter::Organization(org) => (
            format!(" WHERE {column} = $1 AND {column} <> $2"),
            vec![org.clone(), DEVELOPMENT_HOSPITAL_ID.to_string()],
        ),
    }
}

fn hospital_from_row(row: HospitalRow) -> Hospital {
    let (
        id,
        name,
        sequence,
        address,
        phone,
        contact_name,
        contact_phone,
        latitude,
        longitude,
        picture,
        created_at,
        updated_at,
    ) = row;
    Hospital {
        id,
        name,
        sequence,
        address,
        phone,
        contact_name,
        contact_phone,
        latitude,
        longitude,
        picture,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    }
}

fn ward_from_row(row: WardRow) -> Result<Ward, StoreError> {
    let (id, name, sequence, kind, hospital_id, created_at, updated_at) = row;
    Ok(Ward {
        id,
        name,
        sequence,
        kind: parse_kind(&kind)?,
        hospital_id,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (
        id,
        username,
        password_hash,
        active,
        role,
        display_name,
        picture,
        note,
        created_by,
        ward_id,
        created_at,
        updated_at,
    ) = row;
    Ok(User {
        id,
        username,
        password_hash,
        active,
        role: parse_role(&role)?,
        display_name,
        picture,
        note,
        created_by,
        ward_id,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

fn user_record_from_row(row: UserJoinRow) -> Result<UserRecord, StoreError> {
    let (
        id,
        username,
        active,
        role,
        display_name,
        picture,
        ward_id,
        ward_name,
        hospital_id,
        hospital_name,
        hospital_picture,
    ) = row;
    Ok(UserRecord {
        id,
        username,
        active,
        role: parse_role(&role)?,
        display_name,
        picture,
        ward: WardSummary {
            id: ward_id,
            name: ward_name,
            hospital: HospitalSummary {
                id: hospital_id,
                name: hospital_name,
                picture: hospital_picture,
            },
        },
    })
}

/// Record store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing pool. The schema must already be in place.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a pool from `config` and bootstraps the schema.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid, the server is
    /// unreachable, or the schema statements fail.
    pub async fn connect(config: &PostgresConfig) -> crate::error::Result<Self> {
        let pool = create_pool(config).await?;
        ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn wards_of(&self, hospital_id: &str) -> Result<Vec<Ward>, StoreError> {
        let sql = format!(
            "SELECT {WARD_COLUMNS} FROM wards WHERE hospital_id = $1 \
             ORDER BY sequence ASC, id ASC"
        );
        let rows: Vec<WardRow> = query_as(&sql)
            .bind(hospital_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        rows.into_iter().map(ward_from_row).collect()
    }

    async fn hospitals_by_id(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Hospital>, StoreError> {
        let sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = ANY($1)");
        let rows: Vec<HospitalRow> = query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        Ok(rows
            .into_iter()
            .map(hospital_from_row)
            .map(|h| (h.id.clone(), h))
            .collect())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn create_hospital(&self, new: NewHospital) -> Result<Hospital, StoreError> {
        let id = new.id.unwrap_or_else(generate_id);
        let sequence = new.sequence.unwrap_or(0);
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO hospitals ({HOSPITAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING created_at, updated_at"
        );
        let row: (DateTime<Utc>, DateTime<Utc>) = query_as(&sql)
            .bind(&id)
            .bind(&new.name)
            .bind(sequence)
            .bind(&new.address)
            .bind(&new.phone)
            .bind(&new.contact_name)
            .bind(&new.contact_phone)
            .bind(&new.latitude)
            .bind(&new.longitude)
            .bind(&new.picture)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "hospital", &id))?;

        Ok(Hospital {
            id,
            name: new.name,
            sequence,
            address: new.address,
            phone: new.phone,
            contact_name: new.contact_name,
            contact_phone: new.contact_phone,
            latitude: new.latitude,
            longitude: new.longitude,
            picture: new.picture,
            created_at: chrono_to_time(row.0),
            updated_at: chrono_to_time(row.1),
        })
    }

    async fn list_hospitals(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<HospitalRecord>, StoreError> {
        let (where_clause, binds) = scope_clause(filter, "id");
        let sql = format!(
            "SELECT {HOSPITAL_COLUMNS} FROM hospitals{where_clause} \
             ORDER BY sequence ASC, id ASC"
        );
        let mut q = query_as(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows: Vec<HospitalRow> = q.fetch_all(&self.pool).await.map_err(map_query_error)?;
        let hospitals: Vec<Hospital> = rows.into_iter().map(hospital_from_row).collect();
        if hospitals.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hospitals.iter().map(|h| h.id.clone()).collect();
        let ward_sql = format!(
            "SELECT {WARD_COLUMNS} FROM wards WHERE hospital_id = ANY($1) \
             ORDER BY sequence ASC, id ASC"
        );
        let ward_rows: Vec<WardRow> = query_as(&ward_sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        let mut by_hospital: HashMap<String, Vec<Ward>> = HashMap::new();
        for row in ward_rows {
            let ward = ward_from_row(row)?;
            by_hospital
                .entry(ward.hospital_id.clone())
                .or_default()
                .push(ward);
        }

        Ok(hospitals
            .into_iter()
            .map(|hospital| {
                let wards = by_hospital.remove(&hospital.id).unwrap_or_default();
                HospitalRecord { hospital, wards }
            })
            .collect())
    }

    async fn get_hospital(&self, id: &str) -> Result<Option<HospitalRecord>, StoreError> {
        let sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1");
        let row: Option<HospitalRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let hospital = hospital_from_row(row);
        let wards = self.wards_of(&hospital.id).await?;
        Ok(Some(HospitalRecord { hospital, wards }))
    }

    async fn update_hospital(
        &self,
        id: &str,
        patch: HospitalUpdate,
    ) -> Result<Hospital, StoreError> {
        let sql = format!(
            "UPDATE hospitals SET \
                name = COALESCE($2, name), \
                sequence = COALESCE($3, sequence), \
                address = COALESCE($4, address), \
                phone = COALESCE($5, phone), \
                contact_name = COALESCE($6, contact_name), \
                contact_phone = COALESCE($7, contact_phone), \
                latitude = COALESCE($8, latitude), \
                longitude = COALESCE($9, longitude), \
                picture = COALESCE($10, picture), \
                updated_at = $11 \
             WHERE id = $1 \
             RETURNING {HOSPITAL_COLUMNS}"
        );
        let row: Option<HospitalRow> = query_as(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(patch.sequence)
            .bind(&patch.address)
            .bind(&patch.phone)
            .bind(&patch.contact_name)
            .bind(&patch.contact_phone)
            .bind(&patch.latitude)
            .bind(&patch.longitude)
            .bind(&patch.picture)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "hospital", id))?;

        match row {
            Some(row) => Ok(hospital_from_row(row)),
            None => Err(StoreError::not_found("hospital", id)),
        }
    }

    async fn delete_hospital(&self, id: &str) -> Result<Hospital, StoreError> {
        let sql = format!("DELETE FROM hospitals WHERE id = $1 RETURNING {HOSPITAL_COLUMNS}");
        let row: Option<HospitalRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "hospital", id))?;

        match row {
            Some(row) => Ok(hospital_from_row(row)),
            None => Err(StoreError::not_found("hospital", id)),
        }
    }

    async fn create_ward(&self, new: NewWard) -> Result<Ward, StoreError> {
        let id = new.id.unwrap_or_else(generate_id);
        let sequence = new.sequence.unwrap_or(0);
        let kind = new.kind.unwrap_or_default();
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO wards ({WARD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING created_at, updated_at"
        );
        let row: (DateTime<Utc>, DateTime<Utc>) = query_as(&sql)
            .bind(&id)
            .bind(&new.name)
            .bind(sequence)
            .bind(kind.as_str())
            .bind(&new.hospital_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "ward", &id))?;

        Ok(Ward {
            id,
            name: new.name,
            sequence,
            kind,
            hospital_id: new.hospital_id,
            created_at: chrono_to_time(row.0),
            updated_at: chrono_to_time(row.1),
        })
    }

    async fn list_wards(&self, filter: &ScopeFilter) -> Result<Vec<WardRecord>, StoreError> {
        let (where_clause, binds) = scope_clause(filter, "hospital_id");
        let sql = format!(
            "SELECT {WARD_COLUMNS} FROM wards{where_clause} ORDER BY sequence ASC, id ASC"
        );
        let mut q = query_as(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows: Vec<WardRow> = q.fetch_all(&self.pool).await.map_err(map_query_error)?;
        let wards = rows
            .into_iter()
            .map(ward_from_row)
            .collect::<Result<Vec<Ward>, StoreError>>()?;
        if wards.is_empty() {
            return Ok(Vec::new());
        }

        let mut hospital_ids: Vec<String> = wards.iter().map(|w| w.hospital_id.clone()).collect();
        hospital_ids.sort();
        hospital_ids.dedup();
        let hospitals = self.hospitals_by_id(&hospital_ids).await?;

        wards
            .into_iter()
            .map(|ward| {
                let hospital = hospitals.get(&ward.hospital_id).cloned().ok_or_else(|| {
                    StoreError::internal(format!(
                        "ward {} references missing hospital {}",
                        ward.id, ward.hospital_id
                    ))
                })?;
                Ok(WardRecord { ward, hospital })
            })
            .collect()
    }

    async fn get_ward(&self, id: &str) -> Result<Option<WardRecord>, StoreError> {
        let sql = format!("SELECT {WARD_COLUMNS} FROM wards WHERE id = $1");
        let row: Option<WardRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let ward = ward_from_row(row)?;

        let hospital_sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1");
        let hospital_row: Option<HospitalRow> = query_as(&hospital_sql)
            .bind(&ward.hospital_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;
        let hospital = hospital_row.map(hospital_from_row).ok_or_else(|| {
            StoreError::internal(format!(
                "ward {} references missing hospital {}",
                ward.id, ward.hospital_id
            ))
        })?;

        Ok(Some(WardRecord { ward, hospital }))
    }

    async fn update_ward(&self, id: &str, patch: WardUpdate) -> Result<Ward, StoreError> {
        let sql = format!(
            "UPDATE wards SET \
                name = COALESCE($2, name), \
                sequence = COALESCE($3, sequence), \
                kind = COALESCE($4, kind), \
                hospital_id = COALESCE($5, hospital_id), \
                updated_at = $6 \
             WHERE id = $1 \
             RETURNING {WARD_COLUMNS}"
        );
        let row: Option<WardRow> = query_as(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(patch.sequence)
            .bind(patch.kind.map(|k| k.as_str()))
            .bind(&patch.hospital_id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "ward", id))?;

        match row {
            Some(row) => ward_from_row(row),
            None => Err(StoreError::not_found("ward", id)),
        }
    }

    async fn delete_ward(&self, id: &str) -> Result<Ward, StoreError> {
        let sql = format!("DELETE FROM wards WHERE id = $1 RETURNING {WARD_COLUMNS}");
        let row: Option<WardRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "ward", id))?;

        match row {
            Some(row) => ward_from_row(row),
            None => Err(StoreError::not_found("ward", id)),
        }
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let id = new.id.unwrap_or_else(generate_id);
        let active = new.active.unwrap_or(true);
        let role = new.role.unwrap_or(Role::User);
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING created_at, updated_at"
        );
        let row: (DateTime<Utc>, DateTime<Utc>) = query_as(&sql)
            .bind(&id)
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(active)
            .bind(role.as_str())
            .bind(&new.display_name)
            .bind(&new.picture)
            .bind(&new.note)
            .bind(&new.created_by)
            .bind(&new.ward_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "user", &id))?;

        Ok(User {
            id,
            username: new.username,
            password_hash: new.password_hash,
            active,
            role,
            display_name: new.display_name,
            picture: new.picture,
            note: new.note,
            created_by: new.created_by,
            ward_id: new.ward_id,
            created_at: chrono_to_time(row.0),
            updated_at: chrono_to_time(row.1),
        })
    }

    async fn list_users(&self, filter: &ScopeFilter) -> Result<Vec<UserRecord>, StoreError> {
        let (where_clause, binds) = scope_clause(filter, "h.id");
        let sql = format!(
            "SELECT {USER_JOIN_COLUMNS} FROM users u \
             JOIN wards w ON w.id = u.ward_id \
             JOIN hospitals h ON h.id = w.hospital_id{where_clause} \
             ORDER BY {USER_ROLE_ORDER} ASC, u.username ASC"
        );
        let mut q = query_as(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows: Vec<UserJoinRow> = q.fetch_all(&self.pool).await.map_err(map_query_error)?;
        rows.into_iter().map(user_record_from_row).collect()
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!(
            "SELECT {USER_JOIN_COLUMNS} FROM users u \
             JOIN wards w ON w.id = u.ward_id \
             JOIN hospitals h ON h.id = w.hospital_id \
             WHERE u.id = $1"
        );
        let row: Option<UserJoinRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;
        row.map(user_record_from_row).transpose()
    }

    async fn update_user(&self, id: &str, patch: UserUpdate) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users SET \
                ward_id = COALESCE($2, ward_id), \
                username = COALESCE($3, username), \
                password_hash = COALESCE($4, password_hash), \
                active = COALESCE($5, active), \
                role = COALESCE($6, role), \
                display_name = COALESCE($7, display_name), \
                picture = COALESCE($8, picture), \
                note = COALESCE($9, note), \
                updated_at = $10 \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = query_as(&sql)
            .bind(id)
            .bind(&patch.ward_id)
            .bind(&patch.username)
            .bind(&patch.password_hash)
            .bind(patch.active)
            .bind(patch.role.map(|r| r.as_str()))
            .bind(&patch.display_name)
            .bind(&patch.picture)
            .bind(&patch.note)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "user", id))?;

        match row {
            Some(row) => user_from_row(row),
            None => Err(StoreError::not_found("user", id)),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<User, StoreError> {
        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row: Option<UserRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_record_error(e, "user", id))?;

        match row {
            Some(row) => user_from_row(row),
            None => Err(StoreError::not_found("user", id)),
        }
    }

    async fn user_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let sql = "SELECT u.id, u.username, u.password_hash, u.active, u.role, \
                   u.ward_id, w.hospital_id \
                   FROM users u JOIN wards w ON w.id = u.ward_id \
                   WHERE u.username = $1";
        let row: Option<CredentialsRow> = query_as(sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;
        match row {
            Some((id, username, password_hash, active, role, ward_id, hospital_id)) => {
                Ok(Some(UserCredentials {
                    id,
                    username,
                    password_hash,
                    active,
                    role: parse_role(&role)?,
                    ward_id,
                    hospital_id,
                }))
            }
            None => Ok(None),
        }
    }
}
