//! Fixtures shared by the service tests.

use mdm_core::{
    Authenticate, Command, CommandResults, CommandStatus, Enrollment, Request, TokenUpdate,
};
use mdm_storage::FileStorage;

use crate::Checkin;

pub(crate) const UDID: &str = "DEV-1";

pub(crate) fn device() -> Enrollment {
    Enrollment {
        udid: Some(UDID.to_string()),
        ..Default::default()
    }
}

pub(crate) fn file_store() -> (tempfile::TempDir, FileStorage) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStorage::new(dir.path()).unwrap();
    (dir, store)
}

pub(crate) fn command(uuid: &str, body: &str) -> Command {
    let raw = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict>
<key>CommandUUID</key><string>{uuid}</string>
<key>Command</key><dict><key>RequestType</key><string>Settings</string>{body}</dict>
</dict></plist>"#
    );
    Command::decode(raw.as_bytes()).unwrap()
}

pub(crate) fn report(uuid: &str, status: CommandStatus) -> CommandResults {
    CommandResults {
        enrollment: device(),
        command_uuid: uuid.to_string(),
        status,
        error_chain: Vec::new(),
        raw: b"<report/>".to_vec(),
    }
}

pub(crate) async fn enroll<C: Checkin>(service: &C, enrollment: Enrollment) {
    let req = Request::new();
    let auth = Authenticate {
        enrollment: enrollment.clone(),
        topic: "com.apple.mgmt.External.test".into(),
        ..Default::default()
    };
    service.authenticate(&req, &auth).await.unwrap();
    let update = TokenUpdate {
        enrollment,
        topic: "com.apple.mgmt.External.test".into(),
        token: vec![0xAB; 32],
        push_magic: "magic".into(),
        ..Default::default()
    };
    service.token_update(&req, &update).await.unwrap();
}
