diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        sequence -> Int8,
        aggregate_type -> Varchar,
        aggregate_id -> Varchar,
        event_type -> Varchar,
        payload -> Jsonb,
        created_at -> Timestamptz,
        published_at -> Nullable<Timestamptz>,
    }
}
