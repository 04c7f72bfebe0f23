//! SQLite storage implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::WrapErr as _;
use diesel::connection::SimpleConnection as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use crate::lastseen::LastSeenBatcher;
use crate::models::*;
use crate::queue::QueueState;
use crate::schema::*;
use crate::traits::*;
use crate::StorageError;
use mdm_core::{
    Authenticate, BootstrapTokenResponse, Command, CommandResults, GetBootstrapToken, PushCert,
    PushInfo, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqliteConn = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn build_pool(database_url: &str, max_size: u32) -> color_eyre::eyre::Result<SqlitePool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .wrap_err_with(|| format!("failed to create connection pool for {database_url}"))
}

/// SQLite-based storage.
///
/// Reads may go to an optional replica unless the request asks for primary
/// consistency.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    replica: Option<SqlitePool>,
    last_seen: Option<Arc<LastSeenBatcher>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database URL.
    pub fn new(database_url: &str) -> color_eyre::eyre::Result<Self> {
        Ok(Self {
            pool: build_pool(database_url, 10)?,
            replica: None,
            last_seen: None,
        })
    }

    /// Serve eventually consistent reads from a read replica.
    pub fn with_replica(mut self, database_url: &str) -> color_eyre::eyre::Result<Self> {
        self.replica = Some(build_pool(database_url, 10)?);
        Ok(self)
    }

    /// Batch last-seen writes instead of writing one per report.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_async_last_seen(mut self, interval: Duration, capacity: usize) -> Self {
        let pool = self.pool.clone();
        let batcher = LastSeenBatcher::spawn(interval, capacity, move |ids| {
            if let Err(e) = touch_last_seen(&pool, &ids) {
                tracing::warn!(count = ids.len(), error = %e, "failed to update last seen");
            }
        });
        self.last_seen = Some(Arc::new(batcher));
        self
    }

    /// Run migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self.conn()?;
        conn.run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        Ok(())
    }

    /// Persist pending last-seen ids.
    pub fn flush_last_seen(&self) {
        if let Some(batcher) = &self.last_seen {
            batcher.flush();
        }
    }

    /// When an enrollment last reported command results.
    pub fn last_seen_at(
        &self,
        id: &str,
    ) -> color_eyre::eyre::Result<Option<chrono::NaiveDateTime>> {
        let mut conn = self.conn()?;
        let seen: Option<Option<chrono::NaiveDateTime>> = enrollments::table
            .find(id)
            .select(enrollments::last_seen_at)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to read last seen")?;
        Ok(seen.flatten())
    }

    fn conn(&self) -> color_eyre::eyre::Result<SqliteConn> {
        self.pool
            .get()
            .wrap_err("failed to get database connection")
    }

    fn read_conn(&self, req: &Request) -> color_eyre::eyre::Result<SqliteConn> {
        match &self.replica {
            Some(replica) if !req.requires_primary() => replica
                .get()
                .wrap_err("failed to get replica connection"),
            _ => self.conn(),
        }
    }

    fn mark_seen(&self, id: &str) {
        match &self.last_seen {
            Some(batcher) => batcher.mark_seen(id),
            None => {
                if let Err(e) = touch_last_seen(&self.pool, &[id.to_string()]) {
                    tracing::warn!(enrollment_id = %id, error = %e, "failed to update last seen");
                }
            }
        }
    }
}

fn touch_last_seen(pool: &SqlitePool, ids: &[String]) -> color_eyre::eyre::Result<()> {
    let mut conn = pool.get().wrap_err("failed to get database connection")?;
    let now = chrono::Utc::now().naive_utc();
    diesel::update(enrollments::table.filter(enrollments::id.eq_any(ids)))
        .set(enrollments::last_seen_at.eq(now))
        .execute(&mut conn)
        .wrap_err("failed to update last seen")?;
    Ok(())
}

/// Ids of a device enrollment and every user channel under it.
fn device_family(conn: &mut SqliteConnection, device_id: &str) -> QueryResult<Vec<String>> {
    let mut ids: Vec<String> = enrollments::table
        .filter(enrollments::device_id.eq(device_id))
        .select(enrollments::id)
        .load(conn)?;
    if !ids.iter().any(|id| id == device_id) {
        ids.push(device_id.to_string());
    }
    Ok(ids)
}

fn pending_states() -> [&'static str; 2] {
    QueueState::PENDING.map(|s| s.as_str())
}

impl CheckinStore for SqliteStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            let device = NewDevice {
                id: &id.id,
                serial_number: msg.serial_number.as_deref(),
                authenticate: &msg.raw,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(devices::table)
                .values(&device)
                .on_conflict(devices::id)
                .do_update()
                .set((
                    devices::serial_number.eq(msg.serial_number.as_deref()),
                    devices::authenticate.eq(&msg.raw),
                    devices::bootstrap_token.eq(None::<Vec<u8>>),
                    devices::updated_at.eq(now),
                ))
                .execute(conn)
                .wrap_err("failed to store device")?;

            let enrollment = NewEnrollment {
                id: &id.id,
                device_id: id.device_id(),
                enroll_type: id.enroll_type.as_str(),
                parent_id: id.parent_id.as_deref(),
                topic: &msg.topic,
                push_magic: "",
                token: &[],
                enabled: false,
                token_update_tally: 0,
                token_update: None,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(enrollments::table)
                .values(&enrollment)
                .on_conflict(enrollments::id)
                .do_update()
                .set((
                    enrollments::topic.eq(&msg.topic),
                    enrollments::updated_at.eq(now),
                ))
                .execute(conn)
                .wrap_err("failed to store enrollment")?;
            Ok(())
        })
    }

    fn store_token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            let enrollment = NewEnrollment {
                id: &id.id,
                device_id: id.device_id(),
                enroll_type: id.enroll_type.as_str(),
                parent_id: id.parent_id.as_deref(),
                topic: &msg.topic,
                push_magic: &msg.push_magic,
                token: &msg.token,
                enabled: true,
                token_update_tally: 1,
                token_update: Some(&msg.raw),
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(enrollments::table)
                .values(&enrollment)
                .on_conflict(enrollments::id)
                .do_update()
                .set((
                    enrollments::topic.eq(&msg.topic),
                    enrollments::push_magic.eq(&msg.push_magic),
                    enrollments::token.eq(&msg.token),
                    enrollments::enabled.eq(true),
                    enrollments::token_update_tally.eq(enrollments::token_update_tally + 1),
                    enrollments::token_update.eq(Some(&msg.raw)),
                    enrollments::updated_at.eq(now),
                ))
                .execute(conn)
                .wrap_err("failed to store token update")?;

            if let (Some(unlock), false) = (&msg.unlock_token, id.is_user_channel()) {
                diesel::update(devices::table.find(&id.id))
                    .set((
                        devices::unlock_token.eq(Some(unlock)),
                        devices::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .wrap_err("failed to store unlock token")?;
            }
            Ok(())
        })
    }

    fn store_user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        let digest = msg.digest_response.is_some();
        let user = NewUser {
            id: &id.id,
            device_id: id.device_id(),
            user_short_name: msg.enrollment.user_short_name.as_deref(),
            user_long_name: msg.enrollment.user_long_name.as_deref(),
            user_authenticate: (!digest).then_some(msg.raw.as_slice()),
            user_authenticate_digest: digest.then_some(msg.raw.as_slice()),
            updated_at: now,
        };

        let query = diesel::insert_into(users::table)
            .values(&user)
            .on_conflict(users::id)
            .do_update();
        let stored = if digest {
            query
                .set((
                    users::user_authenticate_digest.eq(Some(&msg.raw)),
                    users::updated_at.eq(now),
                ))
                .execute(&mut conn)
        } else {
            query
                .set((
                    users::user_authenticate.eq(Some(&msg.raw)),
                    users::user_authenticate_digest.eq(None::<Vec<u8>>),
                    users::updated_at.eq(now),
                ))
                .execute(&mut conn)
        };
        stored.wrap_err("failed to store user authenticate")?;

        Ok(())
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        id.require_device_channel("disable")?;
        let mut conn = self.conn()?;

        diesel::update(enrollments::table.filter(enrollments::device_id.eq(&id.id)))
            .set((
                enrollments::enabled.eq(false),
                enrollments::token_update_tally.eq(0),
                enrollments::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .wrap_err("failed to disable enrollment")?;

        Ok(())
    }

    fn is_enabled(&self, id: &str) -> color_eyre::eyre::Result<bool> {
        let mut conn = self.conn()?;
        let enabled: Option<bool> = enrollments::table
            .find(id)
            .select(enrollments::enabled)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to check enabled status")?;
        Ok(enabled.unwrap_or(false))
    }

    fn token_update_tally(&self, id: &str) -> color_eyre::eyre::Result<u32> {
        let mut conn = self.conn()?;
        let tally: Option<i32> = enrollments::table
            .find(id)
            .select(enrollments::token_update_tally)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to read token update tally")?;
        let tally = tally.ok_or_else(|| StorageError::EnrollmentNotFound(id.to_string()))?;
        Ok(tally.max(0) as u32)
    }
}

impl BootstrapTokenStore for SqliteStorage {
    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let mut conn = self.conn()?;

        let updated = diesel::update(devices::table.find(&id.id))
            .set((
                devices::bootstrap_token.eq(Some(&msg.bootstrap_token)),
                devices::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .wrap_err("failed to store bootstrap token")?;
        if updated == 0 {
            return Err(StorageError::EnrollmentNotFound(id.id.clone()).into());
        }

        Ok(())
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
        _msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        let id = req.require_enroll_id()?;
        let mut conn = self.read_conn(req)?;

        let token: Option<Option<Vec<u8>>> = devices::table
            .find(&id.id)
            .select(devices::bootstrap_token)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to retrieve bootstrap token")?;

        Ok(token
            .flatten()
            .map(|bootstrap_token| BootstrapTokenResponse { bootstrap_token }))
    }
}

fn enqueue_one(
    conn: &mut SqliteConnection,
    id: &str,
    command_uuid: &str,
    now: chrono::NaiveDateTime,
) -> color_eyre::eyre::Result<()> {
    conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
        let known: i64 = enrollments::table
            .filter(enrollments::id.eq(id))
            .count()
            .get_result(conn)?;
        if known == 0 {
            return Err(StorageError::EnrollmentNotFound(id.to_string()).into());
        }

        let queued: i64 = enrollment_queue::table
            .filter(enrollment_queue::id.eq(id))
            .filter(enrollment_queue::command_uuid.eq(command_uuid))
            .count()
            .get_result(conn)?;
        if queued > 0 {
            return Err(StorageError::AlreadyQueued {
                id: id.to_string(),
                command_uuid: command_uuid.to_string(),
            }
            .into());
        }

        diesel::insert_into(enrollment_queue::table)
            .values(NewQueueEntry {
                id,
                command_uuid,
                state: QueueState::Active.as_str(),
                created_at: now,
                updated_at: now,
            })
            .execute(conn)?;
        Ok(())
    })
}

impl CommandQueueStore for SqliteStorage {
    fn enqueue_command(
        &self,
        ids: &[String],
        command: &Command,
    ) -> color_eyre::eyre::Result<EnqueueReport> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        diesel::insert_into(commands::table)
            .values(NewCommand {
                command_uuid: &command.command_uuid,
                request_type: &command.request_type,
                command: &command.raw,
                created_at: now,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .wrap_err("failed to store command")?;

        let mut report = EnqueueReport {
            command_uuid: command.command_uuid.clone(),
            ..Default::default()
        };
        for id in ids {
            match enqueue_one(&mut conn, id, &command.command_uuid, now) {
                Ok(()) => report.enqueued.push(id.clone()),
                Err(e) => {
                    tracing::warn!(
                        enrollment_id = %id,
                        command_uuid = %command.command_uuid,
                        error = %e,
                        "enqueue failed"
                    );
                    report.failed.insert(id.clone(), e.to_string());
                }
            }
        }

        Ok(report)
    }

    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;

        if !results.is_idle() {
            let mut conn = self.conn()?;
            let now = chrono::Utc::now().naive_utc();
            let not_now = results.status == mdm_core::CommandStatus::NotNow;

            conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
                let known: i64 = commands::table
                    .filter(commands::command_uuid.eq(&results.command_uuid))
                    .count()
                    .get_result(conn)?;
                if known == 0 {
                    return Err(
                        StorageError::UnknownCommand(results.command_uuid.clone()).into()
                    );
                }

                let row = NewCommandResult {
                    id: &id.id,
                    command_uuid: &results.command_uuid,
                    status: results.status.as_str(),
                    result: &results.raw,
                    not_now_at: not_now.then_some(now),
                    not_now_tally: i32::from(not_now),
                    updated_at: now,
                };
                let upsert = diesel::insert_into(command_results::table)
                    .values(&row)
                    .on_conflict((command_results::id, command_results::command_uuid))
                    .do_update();
                if not_now {
                    upsert
                        .set((
                            command_results::status.eq(row.status),
                            command_results::result.eq(row.result),
                            command_results::not_now_at.eq(Some(now)),
                            command_results::not_now_tally
                                .eq(command_results::not_now_tally + 1),
                            command_results::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                } else {
                    upsert
                        .set((
                            command_results::status.eq(row.status),
                            command_results::result.eq(row.result),
                            command_results::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }

                diesel::update(
                    enrollment_queue::table
                        .filter(enrollment_queue::id.eq(&id.id))
                        .filter(enrollment_queue::command_uuid.eq(&results.command_uuid))
                        .filter(enrollment_queue::state.eq_any(pending_states())),
                )
                .set((
                    enrollment_queue::state.eq(QueueState::after_report(results.status).as_str()),
                    enrollment_queue::updated_at.eq(now),
                ))
                .execute(conn)?;
                Ok(())
            })
            .wrap_err("failed to store command report")?;
        }

        self.mark_seen(&id.id);
        Ok(())
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let id = req.require_enroll_id()?;
        let mut conn = self.read_conn(req)?;

        for state in QueueState::fetch_order(skip_not_now) {
            let row: Option<CommandRow> = enrollment_queue::table
                .inner_join(
                    commands::table
                        .on(commands::command_uuid.eq(enrollment_queue::command_uuid)),
                )
                .filter(enrollment_queue::id.eq(&id.id))
                .filter(enrollment_queue::state.eq(state.as_str()))
                .order(enrollment_queue::queue_id.asc())
                .select(CommandRow::as_select())
                .first(&mut conn)
                .optional()
                .wrap_err("failed to retrieve next command")?;

            if let Some(row) = row {
                return Ok(Some(Command {
                    command_uuid: row.command_uuid,
                    request_type: row.request_type,
                    raw: row.command,
                }));
            }
        }

        Ok(None)
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        id.require_device_channel("clear queue")?;
        let mut conn = self.conn()?;

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            let family = device_family(conn, &id.id)?;
            diesel::update(
                enrollment_queue::table
                    .filter(enrollment_queue::id.eq_any(&family))
                    .filter(enrollment_queue::state.eq_any(pending_states())),
            )
            .set((
                enrollment_queue::state.eq(QueueState::Inactive.as_str()),
                enrollment_queue::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(conn)?;
            Ok(())
        })
        .wrap_err("failed to clear command queue")
    }
}

impl CertAuthStore for SqliteStorage {
    fn has_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        let mut conn = self.read_conn(req)?;
        let count: i64 = cert_auth::table
            .filter(cert_auth::sha256.eq(hash))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to look up cert hash")?;
        Ok(count > 0)
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        let id = req.require_enroll_id()?;
        let mut conn = self.read_conn(req)?;
        let count: i64 = cert_auth::table
            .filter(cert_auth::id.eq(&id.id))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to look up enrollment cert hash")?;
        Ok(count > 0)
    }

    fn is_cert_hash_associated(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        let id = req.require_enroll_id()?;
        let mut conn = self.read_conn(req)?;
        let count: i64 = cert_auth::table
            .filter(cert_auth::id.eq(&id.id))
            .filter(cert_auth::sha256.eq(hash))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to look up cert association")?;
        Ok(count > 0)
    }

    fn associate_cert_hash(
        &self,
        req: &Request,
        hash: &str,
        not_after: Option<chrono::DateTime<chrono::Utc>>,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();
        let not_after = not_after.map(|t| t.naive_utc());

        diesel::insert_into(cert_auth::table)
            .values(NewCertAuth {
                id: &id.id,
                sha256: hash,
                cert_not_valid_after: not_after,
                updated_at: now,
            })
            .on_conflict(cert_auth::id)
            .do_update()
            .set((
                cert_auth::sha256.eq(hash),
                cert_auth::cert_not_valid_after.eq(not_after),
                cert_auth::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .wrap_err("failed to associate cert hash")?;

        Ok(())
    }
}

impl PushInfoStore for SqliteStorage {
    fn retrieve_push_info(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushInfo>> {
        let mut conn = self.conn()?;

        let rows: Vec<PushInfoRow> = enrollments::table
            .filter(enrollments::id.eq_any(ids))
            .filter(enrollments::enabled.eq(true))
            .select(PushInfoRow::as_select())
            .load(&mut conn)
            .wrap_err("failed to retrieve push info")?;

        Ok(rows
            .into_iter()
            .filter(|row| !row.token.is_empty())
            .map(|row| {
                (
                    row.id,
                    PushInfo {
                        token: row.token,
                        push_magic: row.push_magic,
                        topic: row.topic,
                    },
                )
            })
            .collect())
    }
}

impl PushCertStore for SqliteStorage {
    fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<()> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        diesel::insert_into(push_certs::table)
            .values(NewPushCert {
                topic,
                cert_pem,
                key_pem,
                stale_token: 1,
                updated_at: now,
            })
            .on_conflict(push_certs::topic)
            .do_update()
            .set((
                push_certs::cert_pem.eq(cert_pem),
                push_certs::key_pem.eq(key_pem),
                push_certs::stale_token.eq(push_certs::stale_token + 1),
                push_certs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .wrap_err("failed to store push cert")?;

        Ok(())
    }

    fn retrieve_push_cert(&self, topic: &str) -> color_eyre::eyre::Result<Option<PushCert>> {
        let mut conn = self.conn()?;

        let row: Option<PushCertRow> = push_certs::table
            .find(topic)
            .select(PushCertRow::as_select())
            .first(&mut conn)
            .optional()
            .wrap_err("failed to retrieve push cert")?;

        Ok(row.map(|r| PushCert {
            topic: r.topic,
            cert_pem: r.cert_pem,
            key_pem: r.key_pem,
            stale_token: r.stale_token.to_string(),
        }))
    }

    fn is_push_cert_stale(&self, topic: &str, stale_token: &str) -> color_eyre::eyre::Result<bool> {
        let mut conn = self.conn()?;

        let current: Option<i32> = push_certs::table
            .find(topic)
            .select(push_certs::stale_token)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to check push cert staleness")?;

        Ok(current.is_none_or(|t| t.to_string() != stale_token))
    }
}
