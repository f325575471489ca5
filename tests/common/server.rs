//! Test server management.
//!
//! Spawns and manages merehubd instances for integration testing.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;
use tokio::time::sleep;

use super::SECRET;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    db_path: PathBuf,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a hub on a free local port with its own database.
    pub async fn spawn() -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;
        let db_path = data_dir.path().join("hub.db");

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test-hub"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
path = "/ws"

[database]
path = "{db}"

[auth]
jwt_secret = "{SECRET}"

[session]
queue_capacity = 64
heartbeat_interval = 30
liveness_timeout = 60
"#,
            db = db_path.display(),
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_merehubd"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .spawn()?;

        let server = Self {
            child,
            port,
            db_path,
            _data_dir: data_dir,
        };

        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// Get the server address.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Open the server's database directly.
    pub async fn db(&self) -> anyhow::Result<SqlitePool> {
        let options = SqliteConnectOptions::new().filename(&self.db_path);
        Ok(SqlitePool::connect_with(options).await?)
    }

    /// Create a room with the given participants.
    pub async fn seed_room(&self, room: &str, participants: &[&str]) -> anyhow::Result<()> {
        let pool = self.db().await?;
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query("INSERT INTO rooms (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(room)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await?;
        for user in participants {
            sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES (?, ?)")
                .bind(room)
                .bind(*user)
                .execute(&pool)
                .await?;
        }
        pool.close().await;
        Ok(())
    }

    /// Create a new test client connected as `user`.
    pub async fn connect(&self, user: &str) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.address(), user).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
