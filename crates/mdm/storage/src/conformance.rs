//! Behavior every storage backend must share.

use mdm_core::{
    Authenticate, Command, CommandResults, CommandStatus, EnrollId, EnrollIdError, EnrollType,
    Enrollment, GetBootstrapToken, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

use crate::traits::*;
use crate::StorageError;

pub(crate) const TOPIC: &str = "com.apple.mgmt.External.test";

pub(crate) fn device_req(id: &str) -> Request {
    Request::new().with_enroll_id(EnrollId::device(EnrollType::Device, id))
}

pub(crate) fn user_req(device: &str, user: &str) -> Request {
    Request::new().with_enroll_id(EnrollId {
        enroll_type: EnrollType::User,
        id: format!("{device}:{user}"),
        parent_id: Some(device.to_string()),
    })
}

fn authenticate(id: &str) -> Authenticate {
    Authenticate {
        enrollment: Enrollment {
            udid: Some(id.to_string()),
            ..Default::default()
        },
        topic: TOPIC.to_string(),
        serial_number: Some("C02TEST".to_string()),
        raw: b"<authenticate/>".to_vec(),
        ..Default::default()
    }
}

fn token_update(token: &[u8]) -> TokenUpdate {
    TokenUpdate {
        topic: TOPIC.to_string(),
        token: token.to_vec(),
        push_magic: "magic".to_string(),
        raw: b"<token-update/>".to_vec(),
        ..Default::default()
    }
}

/// Authenticate and TokenUpdate a device the way the check-in service does.
pub(crate) fn enroll_device<S: AllStorage + ?Sized>(store: &S, id: &str) -> Request {
    let req = device_req(id);
    store.store_authenticate(&req, &authenticate(id)).unwrap();
    store.disable(&req).unwrap();
    store.store_token_update(&req, &token_update(&[1, 2, 3])).unwrap();
    req
}

pub(crate) fn enroll_user<S: AllStorage + ?Sized>(store: &S, device: &str, user: &str) -> Request {
    let req = user_req(device, user);
    store.store_token_update(&req, &token_update(&[4, 5, 6])).unwrap();
    req
}

pub(crate) fn command(uuid: &str) -> Command {
    let raw = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict>
<key>CommandUUID</key><string>{uuid}</string>
<key>Command</key><dict><key>RequestType</key><string>DeviceInformation</string></dict>
</dict></plist>"#
    );
    Command::decode(raw.as_bytes()).unwrap()
}

pub(crate) fn report(req: &Request, uuid: &str, status: CommandStatus) -> CommandResults {
    let id = req.require_enroll_id().unwrap();
    CommandResults {
        enrollment: Enrollment {
            udid: Some(id.id.clone()),
            ..Default::default()
        },
        command_uuid: uuid.to_string(),
        status,
        error_chain: Vec::new(),
        raw: format!("<report status={status}/>").into_bytes(),
    }
}

fn next_uuid<S: AllStorage>(store: &S, req: &Request, skip_not_now: bool) -> Option<String> {
    store
        .retrieve_next_command(req, skip_not_now)
        .unwrap()
        .map(|c| c.command_uuid)
}

pub(crate) fn token_update_enables_and_counts<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");
    assert!(store.is_enabled("DEV-1").unwrap());
    assert_eq!(store.token_update_tally("DEV-1").unwrap(), 1);

    store.store_token_update(&req, &token_update(&[9])).unwrap();
    assert_eq!(store.token_update_tally("DEV-1").unwrap(), 2);

    store.disable(&req).unwrap();
    assert!(!store.is_enabled("DEV-1").unwrap());
    assert_eq!(store.token_update_tally("DEV-1").unwrap(), 0);

    // Re-authentication starts the tally over.
    store.store_authenticate(&req, &authenticate("DEV-1")).unwrap();
    store.disable(&req).unwrap();
    store.store_token_update(&req, &token_update(&[9])).unwrap();
    assert_eq!(store.token_update_tally("DEV-1").unwrap(), 1);

    assert!(!store.is_enabled("UNKNOWN").unwrap());
    let err = store.token_update_tally("UNKNOWN").unwrap_err();
    assert_eq!(
        StorageError::find(&err),
        Some(&StorageError::EnrollmentNotFound("UNKNOWN".into()))
    );
}

pub(crate) fn disable_cascades_to_user_channels<S: AllStorage>(store: &S) {
    let device = enroll_device(store, "DEV-1");
    enroll_user(store, "DEV-1", "U1");
    enroll_device(store, "DEV-2");
    assert!(store.is_enabled("DEV-1:U1").unwrap());

    store.disable(&device).unwrap();
    store.disable(&device).unwrap();
    assert!(!store.is_enabled("DEV-1").unwrap());
    assert!(!store.is_enabled("DEV-1:U1").unwrap());
    assert!(store.is_enabled("DEV-2").unwrap());
}

pub(crate) fn user_channel_cannot_disable_or_clear<S: AllStorage>(store: &S) {
    enroll_device(store, "DEV-1");
    let user = enroll_user(store, "DEV-1", "U1");

    for err in [
        store.disable(&user).unwrap_err(),
        store.clear_queue(&user).unwrap_err(),
    ] {
        assert!(
            err.chain().any(|e| matches!(
                e.downcast_ref::<EnrollIdError>(),
                Some(EnrollIdError::NotDeviceChannel { .. })
            ))
        );
    }
    assert!(store.is_enabled("DEV-1:U1").unwrap());
}

pub(crate) fn queue_is_fifo<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");
    assert_eq!(next_uuid(store, &req, false), None);

    for uuid in ["cmd-1", "cmd-2", "cmd-3"] {
        let report = store.enqueue_command(&["DEV-1".into()], &command(uuid)).unwrap();
        assert!(report.is_complete());
    }

    for uuid in ["cmd-1", "cmd-2", "cmd-3"] {
        assert_eq!(next_uuid(store, &req, false).as_deref(), Some(uuid));
        store
            .store_command_report(&req, &report(&req, uuid, CommandStatus::Acknowledged))
            .unwrap();
    }
    assert_eq!(next_uuid(store, &req, false), None);
}

pub(crate) fn not_now_deferral<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");
    store.enqueue_command(&["DEV-1".into()], &command("c1")).unwrap();
    store.enqueue_command(&["DEV-1".into()], &command("c2")).unwrap();

    assert_eq!(next_uuid(store, &req, false).as_deref(), Some("c1"));
    store
        .store_command_report(&req, &report(&req, "c1", CommandStatus::NotNow))
        .unwrap();

    // Right after NotNow only fresh commands are offered.
    assert_eq!(next_uuid(store, &req, true).as_deref(), Some("c2"));
    // A later poll re-offers the deferred command first.
    assert_eq!(next_uuid(store, &req, false).as_deref(), Some("c1"));

    store
        .store_command_report(&req, &report(&req, "c1", CommandStatus::NotNow))
        .unwrap();
    assert_eq!(next_uuid(store, &req, false).as_deref(), Some("c1"));

    store
        .store_command_report(&req, &report(&req, "c1", CommandStatus::Error))
        .unwrap();
    assert_eq!(next_uuid(store, &req, false).as_deref(), Some("c2"));
    store
        .store_command_report(&req, &report(&req, "c2", CommandStatus::Acknowledged))
        .unwrap();
    assert_eq!(next_uuid(store, &req, false), None);
    assert_eq!(next_uuid(store, &req, true), None);
}

pub(crate) fn clear_queue_cascades<S: AllStorage>(store: &S) {
    let device = enroll_device(store, "DEV-1");
    let user = enroll_user(store, "DEV-1", "U1");
    let other = enroll_device(store, "DEV-2");

    let targets = ["DEV-1".to_string(), "DEV-1:U1".to_string(), "DEV-2".to_string()];
    store.enqueue_command(&targets, &command("c1")).unwrap();
    store.enqueue_command(&["DEV-1:U1".into()], &command("c2")).unwrap();
    store
        .store_command_report(&user, &report(&user, "c1", CommandStatus::NotNow))
        .unwrap();

    store.clear_queue(&device).unwrap();
    assert_eq!(next_uuid(store, &device, false), None);
    assert_eq!(next_uuid(store, &user, false), None);
    assert_eq!(next_uuid(store, &other, false).as_deref(), Some("c1"));

    // Late reports for cleared commands are still accepted.
    store
        .store_command_report(&device, &report(&device, "c1", CommandStatus::Acknowledged))
        .unwrap();
    assert_eq!(next_uuid(store, &device, false), None);
}

pub(crate) fn command_delivered_as_stored<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");

    // The raw payload is opaque; the declared uuid and type are authoritative.
    let mut mismatched = command("payload-uuid");
    mismatched.command_uuid = "declared-uuid".into();
    let opaque = Command {
        command_uuid: "opaque".into(),
        request_type: "Custom".into(),
        raw: b"opaque".to_vec(),
    };
    for cmd in [&mismatched, &opaque] {
        assert!(store.enqueue_command(&["DEV-1".into()], cmd).unwrap().is_complete());
    }

    for expected in [&mismatched, &opaque] {
        let next = store.retrieve_next_command(&req, false).unwrap();
        assert_eq!(next.as_ref(), Some(expected));
        store
            .store_command_report(
                &req,
                &report(&req, &expected.command_uuid, CommandStatus::Acknowledged),
            )
            .unwrap();
    }
    assert_eq!(next_uuid(store, &req, false), None);
}

pub(crate) fn report_for_unknown_command<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");

    let err = store
        .store_command_report(&req, &report(&req, "ghost", CommandStatus::Acknowledged))
        .unwrap_err();
    assert_eq!(
        StorageError::find(&err),
        Some(&StorageError::UnknownCommand("ghost".into()))
    );

    store
        .store_command_report(&req, &report(&req, "", CommandStatus::Idle))
        .unwrap();
}

pub(crate) fn enqueue_reports_each_target<S: AllStorage>(store: &S) {
    enroll_device(store, "DEV-1");

    let report = store
        .enqueue_command(&["DEV-1".into(), "NOPE".into()], &command("c1"))
        .unwrap();
    assert_eq!(report.command_uuid, "c1");
    assert_eq!(report.enqueued, vec!["DEV-1".to_string()]);
    assert!(report.failed.contains_key("NOPE"));
    assert!(!report.is_complete());

    let again = store.enqueue_command(&["DEV-1".into()], &command("c1")).unwrap();
    assert!(again.enqueued.is_empty());
    assert!(again.failed.contains_key("DEV-1"));
}

pub(crate) fn bootstrap_token_cleared_by_authenticate<S: AllStorage>(store: &S) {
    let req = enroll_device(store, "DEV-1");
    let get = GetBootstrapToken::default();
    assert_eq!(store.retrieve_bootstrap_token(&req, &get).unwrap(), None);
    assert_eq!(
        store.retrieve_bootstrap_token(&device_req("NOPE"), &get).unwrap(),
        None
    );

    let set = SetBootstrapToken {
        bootstrap_token: b"escrowed".to_vec(),
        ..Default::default()
    };
    store.store_bootstrap_token(&req, &set).unwrap();
    let token = store.retrieve_bootstrap_token(&req, &get).unwrap().unwrap();
    assert_eq!(token.bootstrap_token, b"escrowed");

    store.store_authenticate(&req, &authenticate("DEV-1")).unwrap();
    assert_eq!(store.retrieve_bootstrap_token(&req, &get).unwrap(), None);
}

pub(crate) fn cert_hash_association<S: AllStorage>(store: &S) {
    let a = device_req("DEV-A");
    let b = device_req("DEV-B");
    assert!(!store.has_cert_hash(&a, "h1").unwrap());
    assert!(!store.enrollment_has_cert_hash(&a).unwrap());

    store.associate_cert_hash(&a, "h1", None).unwrap();
    assert!(store.has_cert_hash(&b, "h1").unwrap());
    assert!(store.enrollment_has_cert_hash(&a).unwrap());
    assert!(store.is_cert_hash_associated(&a, "h1").unwrap());
    assert!(!store.is_cert_hash_associated(&b, "h1").unwrap());
    assert!(!store.enrollment_has_cert_hash(&b).unwrap());

    // Re-association replaces the previous hash.
    store
        .associate_cert_hash(&a, "h2", Some(chrono::Utc::now()))
        .unwrap();
    assert!(!store.is_cert_hash_associated(&a, "h1").unwrap());
    assert!(store.is_cert_hash_associated(&a, "h2").unwrap());
    assert!(!store.has_cert_hash(&b, "h1").unwrap());
}

pub(crate) fn push_info_for_enabled_only<S: AllStorage>(store: &S) {
    enroll_device(store, "DEV-1");
    let disabled = enroll_device(store, "DEV-2");
    store.disable(&disabled).unwrap();
    store
        .store_authenticate(&device_req("DEV-3"), &authenticate("DEV-3"))
        .unwrap();

    let ids = ["DEV-1", "DEV-2", "DEV-3", "NOPE"].map(String::from);
    let infos = store.retrieve_push_info(&ids).unwrap();
    assert_eq!(infos.len(), 1);
    let info = &infos["DEV-1"];
    assert_eq!(info.token, vec![1, 2, 3]);
    assert_eq!(info.push_magic, "magic");
    assert_eq!(info.topic, TOPIC);
}

pub(crate) fn push_cert_stale_token<S: AllStorage>(store: &S) {
    assert_eq!(store.retrieve_push_cert(TOPIC).unwrap(), None);
    assert!(store.is_push_cert_stale(TOPIC, "1").unwrap());

    store.store_push_cert(TOPIC, "CERT-1", "KEY-1").unwrap();
    let first = store.retrieve_push_cert(TOPIC).unwrap().unwrap();
    assert_eq!(first.cert_pem, "CERT-1");
    assert_eq!(first.topic, TOPIC);
    assert!(!store.is_push_cert_stale(TOPIC, &first.stale_token).unwrap());

    store.store_push_cert(TOPIC, "CERT-2", "KEY-2").unwrap();
    let second = store.retrieve_push_cert(TOPIC).unwrap().unwrap();
    assert_eq!(second.key_pem, "KEY-2");
    assert_ne!(second.stale_token, first.stale_token);
    assert!(store.is_push_cert_stale(TOPIC, &first.stale_token).unwrap());
    assert!(!store.is_push_cert_stale(TOPIC, &second.stale_token).unwrap());
}

pub(crate) fn user_authenticate_is_stored<S: AllStorage>(store: &S) {
    enroll_device(store, "DEV-1");
    let req = user_req("DEV-1", "U1");
    let mut msg = UserAuthenticate {
        raw: b"<user-authenticate/>".to_vec(),
        ..Default::default()
    };
    store.store_user_authenticate(&req, &msg).unwrap();

    msg.digest_response = Some("response".into());
    store.store_user_authenticate(&req, &msg).unwrap();
}

/// Generate one `#[test]` per shared check for a backend.
///
/// `$make` must evaluate to `(guard, store)`; the guard is kept alive for the
/// duration of the test.
macro_rules! storage_conformance {
    ($make:expr) => {
        $crate::conformance::storage_conformance!(@tests $make;
            test_token_update_enables_and_counts => token_update_enables_and_counts,
            test_disable_cascades_to_user_channels => disable_cascades_to_user_channels,
            test_user_channel_cannot_disable_or_clear => user_channel_cannot_disable_or_clear,
            test_queue_is_fifo => queue_is_fifo,
            test_not_now_deferral => not_now_deferral,
            test_clear_queue_cascades => clear_queue_cascades,
            test_command_delivered_as_stored => command_delivered_as_stored,
            test_report_for_unknown_command => report_for_unknown_command,
            test_enqueue_reports_each_target => enqueue_reports_each_target,
            test_bootstrap_token_cleared_by_authenticate => bootstrap_token_cleared_by_authenticate,
            test_cert_hash_association => cert_hash_association,
            test_push_info_for_enabled_only => push_info_for_enabled_only,
            test_push_cert_stale_token => push_cert_stale_token,
            test_user_authenticate_is_stored => user_authenticate_is_stored,
        );
    };
    (@tests $make:expr; $($name:ident => $check:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let (_guard, store) = $make;
                $crate::conformance::$check(&store);
            }
        )*
    };
}

pub(crate) use storage_conformance;
