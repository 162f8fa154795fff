//! Migrations compiled into the binary

use sha2::{Digest, Sha256};

/// One embedded migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// Hex SHA-256 of the SQL body, recorded when the migration is applied
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

/// Migrations in application order
pub const MIGRATIONS: &[Migration] = &[Migration {
    id: "001_histories",
    sql: include_str!("../../migrations/001_histories.sql"),
}];
