diesel::table! {
    payments (id) {
        id -> Uuid,
        order_id -> Uuid,
        amount -> Numeric,
        status -> Varchar,
        transaction_id -> Nullable<Varchar>,
        failure_reason -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}
