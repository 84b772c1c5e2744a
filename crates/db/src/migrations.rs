// Schema bootstrap for the PostgreSQL backend

pub const CREATE_KV_STORE: &str = include_str!("../migrations/001_kv_store.sql");

pub fn get_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        ("001", CREATE_KV_STORE),
    ]
}
