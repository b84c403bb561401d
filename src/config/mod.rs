#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: Option<StorageConfig>,
    pub debug_errors: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl AppConfig {
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }

    /// Environment-driven configuration. Every key has a local-dev default so
    /// the server starts without a .env in place.
    pub fn from_env() -> Self {
        let env = |key: &str, default: &str| {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let storage = match std::env::var("DRIVE_SERVER") {
            Ok(endpoint) => Some(StorageConfig {
                endpoint,
                bucket: env("DRIVE_BUCKET", "courseserver"),
                access_key: env("DRIVE_ACCESS_KEY", ""),
                secret_key: env("DRIVE_SECRET_KEY", ""),
            }),
            Err(_) => None,
        };
        Self {
            server: ServerConfig {
                host: env("SERVER_HOST", "127.0.0.1"),
                port: env("SERVER_PORT", "8080").parse().unwrap_or(8080),
            },
            database: DatabaseConfig {
                username: env("DB_USER", "course"),
                password: env("DB_PASSWORD", ""),
                server: env("DB_HOST", "localhost"),
                port: env("DB_PORT", "5432").parse().unwrap_or(5432),
                database: env("DB_NAME", "courseserver"),
            },
            storage,
            debug_errors: env("DEBUG_ERRORS", "false") == "true",
        }
    }
}
