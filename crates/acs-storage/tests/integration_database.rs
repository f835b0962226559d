//! Database connection, migration and persistence tests.

use acs_storage::connection::{Database, DatabaseConfig};
use acs_storage::{SettingKey, SettingsRepository, SqliteSettingsRepository};
use tempfile::TempDir;

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'settings'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_file_database_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("acs.db");

    let db = Database::new(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .unwrap();
    db.health_check().await.unwrap();
    db.close().await;

    assert!(path.exists());
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("acs.db").to_string_lossy().into_owned();

    {
        let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
        let repo = SqliteSettingsRepository::new(db.pool().clone());
        repo.set(SettingKey::ServerKey, "s3cret").await.unwrap();
        db.close().await;
    }

    let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
    let repo = SqliteSettingsRepository::new(db.pool().clone());
    assert_eq!(
        repo.get(SettingKey::ServerKey).await.unwrap().as_deref(),
        Some("s3cret")
    );
    db.close().await;
}

#[tokio::test]
async fn test_set_overwrites_and_remove_is_idempotent() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteSettingsRepository::new(db.pool().clone());

    assert_eq!(repo.get(SettingKey::ServerAddress).await.unwrap(), None);

    repo.set(SettingKey::ServerAddress, "10.0.0.1:4000").await.unwrap();
    repo.set(SettingKey::ServerAddress, "10.0.0.2:4000").await.unwrap();
    assert_eq!(
        repo.get(SettingKey::ServerAddress).await.unwrap().as_deref(),
        Some("10.0.0.2:4000")
    );

    repo.remove(SettingKey::ServerAddress).await.unwrap();
    repo.remove(SettingKey::ServerAddress).await.unwrap();
    assert_eq!(repo.get(SettingKey::ServerAddress).await.unwrap(), None);
}
