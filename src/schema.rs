// Mirrors `store::SCHEMA_SQL`; keep both in sync.

diesel::table! {
    terms (id) {
        id -> Integer,
        term -> Text,
        category -> Text,
        normalized_key -> Text,
        source -> Text,
        first_seen -> Text,
    }
}
