//! Filesystem storage implementation.
//!
//! Layout under the root directory:
//!
//! ```text
//! enrollments/<id>/record.plist            enrollment state
//! enrollments/<id>/{authenticate,token_update,user_authenticate*}.plist
//! enrollments/<id>/queue/<state>/<seq>_<uuid>
//! enrollments/<id>/results/<uuid>.plist
//! commands/<uuid>.plist                  command uuid and request type
//! commands/<uuid>.raw                    command as delivered
//! devices/<device id>/<id>               index of a device's enrollments
//! certauth/ids/<id>.plist
//! certauth/hashes/<sha256>/<id>
//! pushcerts/<topic>.plist
//! ```
//!
//! Path components are percent-encoded. Queue entry names start with a
//! zero-padded sequence so a sorted directory listing is queue order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use color_eyre::eyre::WrapErr as _;

use crate::queue::QueueState;
use crate::traits::*;
use crate::StorageError;
use mdm_core::{
    Authenticate, BootstrapTokenResponse, Command, CommandResults, GetBootstrapToken, PushCert,
    PushInfo, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnrollmentRecord {
    device_id: String,
    enroll_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    push_magic: String,
    #[serde(default)]
    token_hex: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    token_update_tally: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bootstrap_token_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unlock_token_hex: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandRecord {
    #[serde(rename = "CommandUUID")]
    command_uuid: String,
    request_type: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CertAuthRecord {
    sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    not_after: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PushCertRecord {
    cert_pem: String,
    key_pem: String,
    stale_token: u64,
}

struct FileInner {
    root: PathBuf,
    // Serializes every multi-file mutation.
    write_lock: Mutex<()>,
    last_seq: Mutex<u64>,
}

/// Filesystem-based storage.
#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<FileInner>,
}

fn encode_component(s: &str) -> String {
    let encoded = urlencoding::encode(s);
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{rest}"),
        None => encoded.into_owned(),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> color_eyre::eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| color_eyre::eyre::eyre!("no parent directory for {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .wrap_err_with(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, data).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    std::fs::rename(&tmp, path).wrap_err_with(|| format!("failed to replace {}", path.display()))
}

fn write_plist<T: serde::Serialize>(path: &Path, value: &T) -> color_eyre::eyre::Result<()> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, value)
        .wrap_err_with(|| format!("failed to encode {}", path.display()))?;
    write_atomic(path, &buf)
}

fn read_plist<T: serde::de::DeserializeOwned>(path: &Path) -> color_eyre::eyre::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    plist::from_file(path)
        .map(Some)
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Sorted file names in `dir`, empty when it does not exist.
fn list_names(dir: &Path) -> color_eyre::eyre::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).wrap_err_with(|| format!("failed to list {}", dir.display())),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.wrap_err_with(|| format!("failed to list {}", dir.display()))?;
        if let Some(name) = entry.file_name().to_str() {
            if !name.ends_with(".tmp") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn entry_uuid(name: &str) -> Option<&str> {
    name.split_once('_').map(|(_, uuid)| uuid)
}

fn hex_field(value: &str) -> color_eyre::eyre::Result<Vec<u8>> {
    hex::decode(value).wrap_err("corrupt hex field in enrollment record")
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(root: impl Into<PathBuf>) -> color_eyre::eyre::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create storage dir {}", root.display()))?;

        Ok(Self {
            inner: Arc::new(FileInner {
                root,
                write_lock: Mutex::new(()),
                last_seq: Mutex::new(0),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Monotonic queue sequence, seeded from the clock so it survives restarts.
    fn next_seq(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut last = self
            .inner
            .last_seq
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = now.max(*last + 1);
        *last
    }

    fn enrollments_dir(&self) -> PathBuf {
        self.inner.root.join("enrollments")
    }

    fn enrollment_dir(&self, id: &str) -> PathBuf {
        self.enrollments_dir().join(encode_component(id))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.enrollment_dir(id).join("record.plist")
    }

    fn queue_dir(&self, enrollment_dir: &Path, state: QueueState) -> PathBuf {
        enrollment_dir.join("queue").join(state.as_str())
    }

    fn command_path(&self, command_uuid: &str) -> PathBuf {
        self.inner
            .root
            .join("commands")
            .join(format!("{}.plist", encode_component(command_uuid)))
    }

    fn command_raw_path(&self, command_uuid: &str) -> PathBuf {
        self.inner
            .root
            .join("commands")
            .join(format!("{}.raw", encode_component(command_uuid)))
    }

    fn device_index_dir(&self, device_id: &str) -> PathBuf {
        self.inner
            .root
            .join("devices")
            .join(encode_component(device_id))
    }

    fn cert_id_path(&self, id: &str) -> PathBuf {
        self.inner
            .root
            .join("certauth")
            .join("ids")
            .join(format!("{}.plist", encode_component(id)))
    }

    fn cert_hash_dir(&self, hash: &str) -> PathBuf {
        self.inner
            .root
            .join("certauth")
            .join("hashes")
            .join(encode_component(hash))
    }

    fn push_cert_path(&self, topic: &str) -> PathBuf {
        self.inner
            .root
            .join("pushcerts")
            .join(format!("{}.plist", encode_component(topic)))
    }

    fn read_record(&self, id: &str) -> color_eyre::eyre::Result<Option<EnrollmentRecord>> {
        read_plist(&self.record_path(id))
    }

    fn require_record(&self, id: &str) -> color_eyre::eyre::Result<EnrollmentRecord> {
        self.read_record(id)?
            .ok_or_else(|| StorageError::EnrollmentNotFound(id.to_string()).into())
    }

    /// Write an enrollment record and index it under its device.
    fn write_record(&self, id: &str, record: &EnrollmentRecord) -> color_eyre::eyre::Result<()> {
        write_plist(&self.record_path(id), record)?;
        let marker = self
            .device_index_dir(&record.device_id)
            .join(encode_component(id));
        if !marker.exists() {
            write_atomic(&marker, &[])?;
        }
        Ok(())
    }

    /// Enrollment directories of a device and its user channels.
    fn device_family(&self, device_id: &str) -> color_eyre::eyre::Result<Vec<PathBuf>> {
        Ok(list_names(&self.device_index_dir(device_id))?
            .into_iter()
            .map(|name| self.enrollments_dir().join(name))
            .filter(|dir| dir.join("record.plist").exists())
            .collect())
    }

    /// Locate a command's queue entry among `states`.
    fn find_entry(
        &self,
        enrollment_dir: &Path,
        command_uuid: &str,
        states: &[QueueState],
    ) -> color_eyre::eyre::Result<Option<(QueueState, String)>> {
        let encoded = encode_component(command_uuid);
        for state in states {
            let names = list_names(&self.queue_dir(enrollment_dir, *state))?;
            if let Some(name) = names
                .into_iter()
                .find(|n| entry_uuid(n) == Some(encoded.as_str()))
            {
                return Ok(Some((*state, name)));
            }
        }
        Ok(None)
    }

    fn move_entry(
        &self,
        enrollment_dir: &Path,
        name: &str,
        from: QueueState,
        to: QueueState,
    ) -> color_eyre::eyre::Result<()> {
        if from == to {
            return Ok(());
        }
        let target_dir = self.queue_dir(enrollment_dir, to);
        std::fs::create_dir_all(&target_dir)
            .wrap_err_with(|| format!("failed to create {}", target_dir.display()))?;
        std::fs::rename(
            self.queue_dir(enrollment_dir, from).join(name),
            target_dir.join(name),
        )
        .wrap_err_with(|| format!("failed to move queue entry {name}"))
    }

    fn enqueue_one(&self, id: &str, command_uuid: &str) -> color_eyre::eyre::Result<()> {
        self.require_record(id)?;
        let dir = self.enrollment_dir(id);
        let any_state = [
            QueueState::Active,
            QueueState::NotNow,
            QueueState::Done,
            QueueState::Inactive,
        ];
        if self.find_entry(&dir, command_uuid, &any_state)?.is_some() {
            return Err(StorageError::AlreadyQueued {
                id: id.to_string(),
                command_uuid: command_uuid.to_string(),
            }
            .into());
        }

        let name = format!("{:020}_{}", self.next_seq(), encode_component(command_uuid));
        write_atomic(&self.queue_dir(&dir, QueueState::Active).join(name), &[])
    }
}

impl CheckinStore for FileStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let _guard = self.lock();

        let mut record = self.read_record(&id.id)?.unwrap_or_default();
        record.device_id = id.device_id().to_string();
        record.enroll_type = id.enroll_type.as_str().to_string();
        record.parent_id = id.parent_id.clone();
        record.topic = msg.topic.clone();
        record.bootstrap_token_hex = None;

        write_atomic(
            &self.enrollment_dir(&id.id).join("authenticate.plist"),
            &msg.raw,
        )?;
        self.write_record(&id.id, &record)
    }

    fn store_token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let _guard = self.lock();

        let mut record = self.read_record(&id.id)?.unwrap_or_default();
        record.device_id = id.device_id().to_string();
        record.enroll_type = id.enroll_type.as_str().to_string();
        record.parent_id = id.parent_id.clone();
        record.topic = msg.topic.clone();
        record.push_magic = msg.push_magic.clone();
        record.token_hex = hex::encode(&msg.token);
        record.enabled = true;
        record.token_update_tally += 1;
        if let (Some(unlock), false) = (&msg.unlock_token, id.is_user_channel()) {
            record.unlock_token_hex = Some(hex::encode(unlock));
        }

        write_atomic(
            &self.enrollment_dir(&id.id).join("token_update.plist"),
            &msg.raw,
        )?;
        self.write_record(&id.id, &record)
    }

    fn store_user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let _guard = self.lock();

        let dir = self.enrollment_dir(&id.id);
        let digest_path = dir.join("user_authenticate_digest.plist");
        if msg.digest_response.is_some() {
            return write_atomic(&digest_path, &msg.raw);
        }

        write_atomic(&dir.join("user_authenticate.plist"), &msg.raw)?;
        if digest_path.exists() {
            std::fs::remove_file(&digest_path)
                .wrap_err_with(|| format!("failed to remove {}", digest_path.display()))?;
        }
        Ok(())
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        id.require_device_channel("disable")?;
        let _guard = self.lock();

        for dir in self.device_family(&id.id)? {
            let path = dir.join("record.plist");
            if let Some(mut record) = read_plist::<EnrollmentRecord>(&path)? {
                record.enabled = false;
                record.token_update_tally = 0;
                write_plist(&path, &record)?;
            }
        }
        Ok(())
    }

    fn is_enabled(&self, id: &str) -> color_eyre::eyre::Result<bool> {
        Ok(self.read_record(id)?.is_some_and(|r| r.enabled))
    }

    fn token_update_tally(&self, id: &str) -> color_eyre::eyre::Result<u32> {
        Ok(self.require_record(id)?.token_update_tally)
    }
}

impl BootstrapTokenStore for FileStorage {
    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let _guard = self.lock();

        let mut record = self.require_record(&id.id)?;
        record.bootstrap_token_hex = Some(hex::encode(&msg.bootstrap_token));
        self.write_record(&id.id, &record)
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
        _msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        let id = req.require_enroll_id()?;
        let Some(token) = self.read_record(&id.id)?.and_then(|r| r.bootstrap_token_hex) else {
            return Ok(None);
        };
        Ok(Some(BootstrapTokenResponse {
            bootstrap_token: hex_field(&token)?,
        }))
    }
}

impl CommandQueueStore for FileStorage {
    fn enqueue_command(
        &self,
        ids: &[String],
        command: &Command,
    ) -> color_eyre::eyre::Result<EnqueueReport> {
        let _guard = self.lock();

        let command_path = self.command_path(&command.command_uuid);
        if !command_path.exists() {
            write_atomic(&self.command_raw_path(&command.command_uuid), &command.raw)?;
            write_plist(
                &command_path,
                &CommandRecord {
                    command_uuid: command.command_uuid.clone(),
                    request_type: command.request_type.clone(),
                },
            )?;
        }

        let mut report = EnqueueReport {
            command_uuid: command.command_uuid.clone(),
            ..Default::default()
        };
        for id in ids {
            let outcome = self.enqueue_one(id, &command.command_uuid);

            match outcome {
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
        if results.is_idle() {
            return Ok(());
        }
        let _guard = self.lock();

        if !self.command_path(&results.command_uuid).exists() {
            return Err(StorageError::UnknownCommand(results.command_uuid.clone()).into());
        }

        let dir = self.enrollment_dir(&id.id);
        write_atomic(
            &dir.join("results")
                .join(format!("{}.plist", encode_component(&results.command_uuid))),
            &results.raw,
        )?;

        if let Some((state, name)) =
            self.find_entry(&dir, &results.command_uuid, &QueueState::PENDING)?
        {
            self.move_entry(&dir, &name, state, QueueState::after_report(results.status))?;
        }
        Ok(())
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let id = req.require_enroll_id()?;
        let dir = self.enrollment_dir(&id.id);

        for state in QueueState::fetch_order(skip_not_now) {
            let names = list_names(&self.queue_dir(&dir, *state))?;
            let Some(name) = names.first() else {
                continue;
            };
            let uuid = entry_uuid(name)
                .ok_or_else(|| color_eyre::eyre::eyre!("malformed queue entry {name}"))?;
            let uuid = urlencoding::decode(uuid).wrap_err("malformed queue entry")?;

            let record: CommandRecord = read_plist(&self.command_path(&uuid))?
                .ok_or_else(|| StorageError::UnknownCommand(uuid.to_string()))?;
            let path = self.command_raw_path(&uuid);
            let raw = std::fs::read(&path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            return Ok(Some(Command {
                command_uuid: record.command_uuid,
                request_type: record.request_type,
                raw,
            }));
        }

        Ok(None)
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        id.require_device_channel("clear queue")?;
        let _guard = self.lock();

        for dir in self.device_family(&id.id)? {
            for state in QueueState::PENDING {
                for name in list_names(&self.queue_dir(&dir, state))? {
                    self.move_entry(&dir, &name, state, QueueState::Inactive)?;
                }
            }
        }
        Ok(())
    }
}

impl CertAuthStore for FileStorage {
    fn has_cert_hash(&self, _req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        Ok(!list_names(&self.cert_hash_dir(hash))?.is_empty())
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        let id = req.require_enroll_id()?;
        Ok(self.cert_id_path(&id.id).exists())
    }

    fn is_cert_hash_associated(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        let id = req.require_enroll_id()?;
        let record: Option<CertAuthRecord> = read_plist(&self.cert_id_path(&id.id))?;
        Ok(record.is_some_and(|r| r.sha256 == hash))
    }

    fn associate_cert_hash(
        &self,
        req: &Request,
        hash: &str,
        not_after: Option<chrono::DateTime<chrono::Utc>>,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let _guard = self.lock();

        let id_path = self.cert_id_path(&id.id);
        let marker = encode_component(&id.id);
        if let Some(previous) = read_plist::<CertAuthRecord>(&id_path)? {
            let old_marker = self.cert_hash_dir(&previous.sha256).join(&marker);
            if previous.sha256 != hash && old_marker.exists() {
                std::fs::remove_file(&old_marker)
                    .wrap_err_with(|| format!("failed to remove {}", old_marker.display()))?;
            }
        }

        write_plist(
            &id_path,
            &CertAuthRecord {
                sha256: hash.to_string(),
                not_after: not_after.map(|t| t.to_rfc3339()),
            },
        )?;
        write_atomic(&self.cert_hash_dir(hash).join(marker), &[])
    }
}

impl PushInfoStore for FileStorage {
    fn retrieve_push_info(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushInfo>> {
        let mut infos = HashMap::new();
        for id in ids {
            let Some(record) = self.read_record(id)? else {
                continue;
            };
            if !record.enabled || record.token_hex.is_empty() {
                continue;
            }
            infos.insert(
                id.clone(),
                PushInfo {
                    token: hex_field(&record.token_hex)?,
                    push_magic: record.push_magic,
                    topic: record.topic,
                },
            );
        }
        Ok(infos)
    }
}

impl PushCertStore for FileStorage {
    fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<()> {
        let _guard = self.lock();

        let path = self.push_cert_path(topic);
        let previous: Option<PushCertRecord> = read_plist(&path)?;
        write_plist(
            &path,
            &PushCertRecord {
                cert_pem: cert_pem.to_string(),
                key_pem: key_pem.to_string(),
                stale_token: previous.map_or(1, |p| p.stale_token + 1),
            },
        )
    }

    fn retrieve_push_cert(&self, topic: &str) -> color_eyre::eyre::Result<Option<PushCert>> {
        let record: Option<PushCertRecord> = read_plist(&self.push_cert_path(topic))?;
        Ok(record.map(|r| PushCert {
            topic: topic.to_string(),
            cert_pem: r.cert_pem,
            key_pem: r.key_pem,
            stale_token: r.stale_token.to_string(),
        }))
    }

    fn is_push_cert_stale(&self, topic: &str, stale_token: &str) -> color_eyre::eyre::Result<bool> {
        let record: Option<PushCertRecord> = read_plist(&self.push_cert_path(topic))?;
        Ok(record.is_none_or(|r| r.stale_token.to_string() != stale_token))
    }
}
