use crate::db::Database;
use crate::error::Result;

const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS climate_facts (
        farm_id TEXT NOT NULL,
        date TEXT NOT NULL,
        max_temp REAL NOT NULL DEFAULT 0,
        min_temp REAL NOT NULL DEFAULT 0,
        rain REAL NOT NULL DEFAULT 0,
        rain_accumulated REAL NOT NULL DEFAULT 0,
        humidity REAL NOT NULL DEFAULT 0,
        radiation REAL NOT NULL DEFAULT 0,
        wind_speed REAL NOT NULL DEFAULT 0,
        et0 REAL NOT NULL DEFAULT 0,
        pef REAL NOT NULL DEFAULT 0,
        soil_balance REAL NOT NULL DEFAULT 0,
        is_mock INTEGER NOT NULL DEFAULT 0,
        last_updated TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (farm_id, date)
    );

    CREATE TABLE IF NOT EXISTS api_quota (
        farm_id TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        date TEXT NOT NULL,
        last_success TEXT
    );

    CREATE TABLE IF NOT EXISTS trees (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'Viable',
        trunk_diameter_cm REAL,
        kc REAL,
        soil_balance REAL,
        start_of_day_balance REAL,
        last_balance_update TEXT,
        calculated_reg_area REAL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS irrigation_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tree_id TEXT NOT NULL REFERENCES trees(id) ON DELETE CASCADE,
        date TEXT NOT NULL,
        liters REAL NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,
    // Migration 2: Add indexes
    r#"
    CREATE INDEX IF NOT EXISTS idx_irrigation_events_date
        ON irrigation_events(date);
    CREATE INDEX IF NOT EXISTS idx_irrigation_events_tree_id
        ON irrigation_events(tree_id);
    CREATE INDEX IF NOT EXISTS idx_trees_status
        ON trees(status);
    "#,
];

pub fn run(db: &Database) -> Result<()> {
    db.with_conn_mut(|conn| {
        // Ensure schema_migrations table exists
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        // Get current version
        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // Apply pending migrations
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO schema_migrations (version) VALUES (?1)",
                    [version],
                )?;
            }
        }

        Ok(())
    })
}
