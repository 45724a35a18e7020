use sqlx::{Row, SqlitePool};

use crate::config::queue::{parse_key, ConfigKey, QueueConfig};

/// Load queue defaults; keys missing from the table keep their built-in value.
pub async fn load_config(pool: &SqlitePool) -> Result<QueueConfig, sqlx::Error> {
    let rows = sqlx::query("SELECT key, value FROM config")
        .fetch_all(pool)
        .await?;

    let mut config = QueueConfig::default();
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        let applied = parse_key(&key).and_then(|k| config.apply(k, &value));
        if let Err(e) = applied {
            tracing::warn!(key = %key, value = %value, error = %e, "Ignoring stored config value");
        }
    }
    Ok(config)
}

/// Upsert a single, already validated, config value.
pub async fn set_config(
    pool: &SqlitePool,
    key: ConfigKey,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO config (key, value) VALUES (?1, ?2)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key.as_str())
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
