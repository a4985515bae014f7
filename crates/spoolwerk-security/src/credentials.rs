// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Credential store: durable users and role grants.
//
// Schema:
//   roles(name TEXT PRIMARY KEY)
//   role_permissions(
//     role      TEXT NOT NULL REFERENCES roles(name),
//     operation TEXT NOT NULL,              -- e.g. "print", "topQueue"
//     PRIMARY KEY (role, operation)
//   )
//   users(
//     username      TEXT PRIMARY KEY,
//     password_hash BLOB NOT NULL,          -- PBKDF2 output
//     salt          BLOB NOT NULL,
//     role          TEXT NOT NULL REFERENCES roles(name)
//   )

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{Operation, UserRecord};
use tracing::{debug, info, instrument, warn};

/// Roles created on first open, with their granted operations.
pub const DEFAULT_ROLES: &[(&str, &[Operation])] = &[
    ("admin", &Operation::ALL),
    (
        "technician",
        &[
            Operation::Start,
            Operation::Stop,
            Operation::Restart,
            Operation::Status,
            Operation::ReadConfig,
            Operation::SetConfig,
        ],
    ),
    (
        "power_user",
        &[
            Operation::Print,
            Operation::Queue,
            Operation::TopQueue,
            Operation::Restart,
            Operation::Status,
        ],
    ),
    ("user", &[Operation::Print, Operation::Queue, Operation::Status]),
];

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// The durable user/role collaborator consumed by the dispatcher.
///
/// Implementations must be safe to call from many request threads at once.
/// Any failure to reach the backing storage is reported as
/// [`SpoolError::CredentialStore`].
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup by username.
    fn lookup(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Insert a new user unless the username is taken.
    fn insert(&self, user: &UserRecord) -> Result<InsertOutcome>;

    /// The set of operations granted to `role`.  Unknown roles have none.
    fn permissions_for_role(&self, role: &str) -> Result<HashSet<Operation>>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS roles (
        name TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS role_permissions (
        role      TEXT NOT NULL REFERENCES roles(name),
        operation TEXT NOT NULL,
        PRIMARY KEY (role, operation)
    );
    CREATE TABLE IF NOT EXISTS users (
        username      TEXT PRIMARY KEY,
        password_hash BLOB NOT NULL,
        salt          BLOB NOT NULL,
        role          TEXT NOT NULL REFERENCES roles(name)
    );
"#;

/// Convert a `rusqlite::Error` into a `SpoolError::CredentialStore`.
fn db_err(e: rusqlite::Error) -> SpoolError {
    SpoolError::CredentialStore(e.to_string())
}

/// Credential store backed by a SQLite database.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so the connection sits
/// behind a mutex.  Every query is a single short statement.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the credential database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        let store = Self::init(conn)?;
        info!("credential store opened");
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self::init(conn)?;
        debug!("in-memory credential store opened");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;

        // Seed only a fresh database; later grants and revokes are the operator's.
        let existing: u64 = conn
            .query_row("SELECT COUNT(*) FROM roles", [], |row| row.get(0))
            .map_err(db_err)?;
        if existing == 0 {
            Self::seed_default_roles(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn seed_default_roles(conn: &Connection) -> Result<()> {
        for (role, operations) in DEFAULT_ROLES {
            conn.execute("INSERT OR IGNORE INTO roles (name) VALUES (?1)", params![role])
                .map_err(db_err)?;
            for op in operations.iter() {
                conn.execute(
                    "INSERT OR IGNORE INTO role_permissions (role, operation) VALUES (?1, ?2)",
                    params![role, op.as_str()],
                )
                .map_err(db_err)?;
            }
        }
        debug!(roles = DEFAULT_ROLES.len(), "default roles seeded");
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `username` to `role`.  Returns `false` if the user does not exist.
    ///
    /// Takes effect on the user's next authentication.
    #[instrument(skip(self))]
    pub fn set_user_role(&self, username: &str, role: &str) -> Result<bool> {
        let conn = self.conn();
        conn.execute("INSERT OR IGNORE INTO roles (name) VALUES (?1)", params![role])
            .map_err(db_err)?;
        let rows = conn
            .execute(
                "UPDATE users SET role = ?1 WHERE username = ?2",
                params![role, username],
            )
            .map_err(db_err)?;
        info!(updated = rows > 0, "user role changed");
        Ok(rows > 0)
    }

    /// Grant `operation` to `role`, creating the role if needed.
    #[instrument(skip(self))]
    pub fn grant(&self, role: &str, operation: Operation) -> Result<()> {
        let conn = self.conn();
        conn.execute("INSERT OR IGNORE INTO roles (name) VALUES (?1)", params![role])
            .map_err(db_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO role_permissions (role, operation) VALUES (?1, ?2)",
            params![role, operation.as_str()],
        )
        .map_err(db_err)?;
        info!("permission granted");
        Ok(())
    }

    /// Withdraw `operation` from `role`.  Returns `false` if it was not granted.
    #[instrument(skip(self))]
    pub fn revoke(&self, role: &str, operation: Operation) -> Result<bool> {
        let rows = self
            .conn()
            .execute(
                "DELETE FROM role_permissions WHERE role = ?1 AND operation = ?2",
                params![role, operation.as_str()],
            )
            .map_err(db_err)?;
        info!(revoked = rows > 0, "permission revoked");
        Ok(rows > 0)
    }

    /// Number of registered users.
    pub fn user_count(&self) -> Result<u64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(db_err)
    }
}

impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip(self))]
    fn lookup(&self, username: &str) -> Result<Option<UserRecord>> {
        self.conn()
            .query_row(
                "SELECT username, password_hash, salt, role FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        username: row.get(0)?,
                        password_hash: row.get(1)?,
                        salt: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    #[instrument(skip_all, fields(username = %user.username, role = %user.role))]
    fn insert(&self, user: &UserRecord) -> Result<InsertOutcome> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO roles (name) VALUES (?1)",
            params![user.role],
        )
        .map_err(db_err)?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO users (username, password_hash, salt, role)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user.username, user.password_hash, user.salt, user.role],
            )
            .map_err(db_err)?;

        if rows == 0 {
            debug!("username already registered");
            return Ok(InsertOutcome::AlreadyExists);
        }
        info!("user registered");
        Ok(InsertOutcome::Inserted)
    }

    #[instrument(skip(self))]
    fn permissions_for_role(&self, role: &str) -> Result<HashSet<Operation>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT operation FROM role_permissions WHERE role = ?1")
            .map_err(db_err)?;
        let names = stmt
            .query_map(params![role], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(parse_operations(role, names))
    }
}

/// Parse stored operation names, skipping (and logging) unknown ones.
fn parse_operations(role: &str, names: impl IntoIterator<Item = String>) -> HashSet<Operation> {
    names
        .into_iter()
        .filter_map(|name| match name.parse::<Operation>() {
            Ok(op) => Some(op),
            Err(_) => {
                warn!(%role, operation = %name, "ignoring unknown operation grant");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryTables {
    users: HashMap<String, UserRecord>,
    roles: HashMap<String, HashSet<Operation>>,
}

/// Volatile credential store seeded with [`DEFAULT_ROLES`].
///
/// Used by tests and by embedders that manage users elsewhere.
pub struct MemoryCredentialStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        let roles = DEFAULT_ROLES
            .iter()
            .map(|(role, ops)| ((*role).to_owned(), ops.iter().copied().collect()))
            .collect();
        Self {
            tables: Mutex::new(MemoryTables {
                users: HashMap::new(),
                roles,
            }),
        }
    }

    fn tables(&self) -> MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `username` to `role`.  Returns `false` if the user does not exist.
    pub fn set_user_role(&self, username: &str, role: &str) -> bool {
        match self.tables().users.get_mut(username) {
            Some(user) => {
                user.role = role.to_owned();
                true
            }
            None => false,
        }
    }

    /// Grant `operation` to `role`, creating the role if needed.
    pub fn grant(&self, role: &str, operation: Operation) {
        self.tables()
            .roles
            .entry(role.to_owned())
            .or_default()
            .insert(operation);
    }

    /// Withdraw `operation` from `role`.
    pub fn revoke(&self, role: &str, operation: Operation) -> bool {
        self.tables()
            .roles
            .get_mut(role)
            .is_some_and(|ops| ops.remove(&operation))
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.tables().users.get(username).cloned())
    }

    fn insert(&self, user: &UserRecord) -> Result<InsertOutcome> {
        let mut tables = self.tables();
        if tables.users.contains_key(&user.username) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        tables.users.insert(user.username.clone(), user.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn permissions_for_role(&self, role: &str) -> Result<HashSet<Operation>> {
        Ok(self.tables().roles.get(role).cloned().unwrap_or_default())
    }
}
