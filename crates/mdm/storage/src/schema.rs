//! Diesel schema definitions.

diesel::table! {
    devices (id) {
        id -> Text,
        serial_number -> Nullable<Text>,
        authenticate -> Binary,
        unlock_token -> Nullable<Binary>,
        bootstrap_token -> Nullable<Binary>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Text,
        device_id -> Text,
        user_short_name -> Nullable<Text>,
        user_long_name -> Nullable<Text>,
        user_authenticate -> Nullable<Binary>,
        user_authenticate_digest -> Nullable<Binary>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Text,
        device_id -> Text,
        enroll_type -> Text,
        parent_id -> Nullable<Text>,
        topic -> Text,
        push_magic -> Text,
        token -> Binary,
        enabled -> Bool,
        token_update_tally -> Integer,
        token_update -> Nullable<Binary>,
        last_seen_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    commands (command_uuid) {
        command_uuid -> Text,
        request_type -> Text,
        command -> Binary,
        created_at -> Timestamp,
    }
}

diesel::table! {
    enrollment_queue (queue_id) {
        queue_id -> Integer,
        id -> Text,
        command_uuid -> Text,
        state -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    command_results (id, command_uuid) {
        id -> Text,
        command_uuid -> Text,
        status -> Text,
        result -> Binary,
        not_now_at -> Nullable<Timestamp>,
        not_now_tally -> Integer,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    cert_auth (id) {
        id -> Text,
        sha256 -> Text,
        cert_not_valid_after -> Nullable<Timestamp>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    push_certs (topic) {
        topic -> Text,
        cert_pem -> Text,
        key_pem -> Text,
        stale_token -> Integer,
        updated_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    devices,
    users,
    enrollments,
    commands,
    enrollment_queue,
    command_results,
    cert_auth,
    push_certs,
);
