//! Database models.

use diesel::prelude::*;

use crate::schema::{
    cert_auth, command_results, commands, devices, enrollment_queue, enrollments, push_certs,
    users,
};

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = devices)]
pub(crate) struct NewDevice<'a> {
    pub id: &'a str,
    pub serial_number: Option<&'a str>,
    pub authenticate: &'a [u8],
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUser<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub user_short_name: Option<&'a str>,
    pub user_long_name: Option<&'a str>,
    pub user_authenticate: Option<&'a [u8]>,
    pub user_authenticate_digest: Option<&'a [u8]>,
    pub updated_at: chrono::NaiveDateTime,
}

/// New enrollment for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollments)]
pub(crate) struct NewEnrollment<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub enroll_type: &'a str,
    pub parent_id: Option<&'a str>,
    pub topic: &'a str,
    pub push_magic: &'a str,
    pub token: &'a [u8],
    pub enabled: bool,
    pub token_update_tally: i32,
    pub token_update: Option<&'a [u8]>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Push fields of an enrollment.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = enrollments)]
pub(crate) struct PushInfoRow {
    pub id: String,
    pub topic: String,
    pub push_magic: String,
    pub token: Vec<u8>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = commands)]
pub(crate) struct NewCommand<'a> {
    pub command_uuid: &'a str,
    pub request_type: &'a str,
    pub command: &'a [u8],
    pub created_at: chrono::NaiveDateTime,
}

/// Queued command joined with its payload.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = commands)]
pub(crate) struct CommandRow {
    pub command_uuid: String,
    pub request_type: String,
    pub command: Vec<u8>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollment_queue)]
pub(crate) struct NewQueueEntry<'a> {
    pub id: &'a str,
    pub command_uuid: &'a str,
    pub state: &'a str,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = command_results)]
pub(crate) struct NewCommandResult<'a> {
    pub id: &'a str,
    pub command_uuid: &'a str,
    pub status: &'a str,
    pub result: &'a [u8],
    pub not_now_at: Option<chrono::NaiveDateTime>,
    pub not_now_tally: i32,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cert_auth)]
pub(crate) struct NewCertAuth<'a> {
    pub id: &'a str,
    pub sha256: &'a str,
    pub cert_not_valid_after: Option<chrono::NaiveDateTime>,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = push_certs)]
pub(crate) struct NewPushCert<'a> {
    pub topic: &'a str,
    pub cert_pem: &'a str,
    pub key_pem: &'a str,
    pub stale_token: i32,
    pub updated_at: chrono::NaiveDateTime,
}

/// Push certificate record.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = push_certs)]
pub(crate) struct PushCertRow {
    pub topic: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub stale_token: i32,
}
