// ABOUTME: Normalized database engine hint.
// ABOUTME: Distinguishes networked engines from embedded ones like SQLite.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
    Mongodb,
    Sqlite,
    Other(String),
}

impl DatabaseEngine {
    pub fn parse(hint: &str) -> Self {
        match hint.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "psql" | "pg" => DatabaseEngine::Postgres,
            "mysql" | "mariadb" => DatabaseEngine::Mysql,
            "mongo" | "mongodb" => DatabaseEngine::Mongodb,
            "sqlite" | "sqlite3" => DatabaseEngine::Sqlite,
            other => DatabaseEngine::Other(other.to_string()),
        }
    }

    /// Whether the app keeps a network connection open to this database.
    pub fn needs_persistent_connection(&self) -> bool {
        !matches!(self, DatabaseEngine::Sqlite)
    }

    /// Managed service backing this engine, if one is provisioned.
    pub fn managed_service(&self) -> Option<&'static str> {
        match self {
            DatabaseEngine::Postgres => Some("rds-postgres"),
            DatabaseEngine::Mysql => Some("rds-mysql"),
            DatabaseEngine::Mongodb => Some("documentdb"),
            DatabaseEngine::Sqlite | DatabaseEngine::Other(_) => None,
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseEngine::Postgres => Some(5432),
            DatabaseEngine::Mysql => Some(3306),
            DatabaseEngine::Mongodb => Some(27017),
            DatabaseEngine::Sqlite | DatabaseEngine::Other(_) => None,
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseEngine::Postgres => write!(f, "postgres"),
            DatabaseEngine::Mysql => write!(f, "mysql"),
            DatabaseEngine::Mongodb => write!(f, "mongodb"),
            DatabaseEngine::Sqlite => write!(f, "sqlite"),
            DatabaseEngine::Other(name) => write!(f, "{name}"),
        }
    }
}
