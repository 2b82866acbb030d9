use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_user_profiles")
        .depends_on(&["0001_core_tables"])
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE IF NOT EXISTS user_profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    bestie_name TEXT,
    plan_status TEXT NOT NULL DEFAULT 'pending',
    trial_start_date TEXT,
    plan_renews_at TEXT,
    gumroad_email TEXT,
    gumroad_customer_id TEXT,
    daily_counter_date TEXT,
    daily_msg_count INTEGER NOT NULL DEFAULT 0,
    daily_link_count INTEGER NOT NULL DEFAULT 0
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS user_profiles (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    bestie_name TEXT,
    plan_status TEXT NOT NULL DEFAULT 'pending',
    trial_start_date TEXT,
    plan_renews_at TEXT,
    gumroad_email TEXT,
    gumroad_customer_id TEXT,
    daily_counter_date TEXT,
    daily_msg_count INTEGER NOT NULL DEFAULT 0,
    daily_link_count INTEGER NOT NULL DEFAULT 0
)"#,
                ),
        )
}
