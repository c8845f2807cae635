diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Varchar,
        product_id -> Varchar,
        quantity -> Int4,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
