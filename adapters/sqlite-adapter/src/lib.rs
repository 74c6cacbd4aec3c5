//! sqlite-adapter — SQLite implementation of the AccountRepository port for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based repository to run the platform
//!   locally without cloud dependencies.
//! - Implements the `AccountRepository` trait from the `domain` crate.
//! - Carries the storage-level safety net for username uniqueness: a partial
//!   unique index over active rows. The advisory availability check in the
//!   domain can race between concurrent signups; the index cannot, and a
//!   constraint violation surfaces as `CoreError::AlreadyExists` which the
//!   service reports as "taken".
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as seconds since UNIX_EPOCH (u64).
//! - Usernames are persisted already normalized (lowercase); lookups still
//!   compare with NOCASE so the check runs against the stored value directly.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{Account, AccountRepository, AccountRole, CoreError, Email, PortfolioItem, Username};
use rusqlite::{params, Connection};

/// SQLite-backed repository for local development.
pub struct SqliteAccountRepo {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteAccountRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/accounts.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/accounts.db".to_string());
        // Ensure directory exists
        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            phone TEXT,
            full_name TEXT,
            tagline TEXT,
            bio TEXT,
            video_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            deleted_at INTEGER
        );
        -- At most one *active* row per case-insensitive username. Soft-deleted
        -- rows keep their username string so grace-period checks can see it.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_username_active
            ON accounts(username COLLATE NOCASE) WHERE deleted_at IS NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_email_active
            ON accounts(email) WHERE deleted_at IS NULL;
        CREATE TABLE IF NOT EXISTS portfolio_items (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            link_url TEXT,
            video_url TEXT,
            position INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_portfolio_items_account
            ON portfolio_items(account_id);
        "#,
    )
    .map_err(map_sqerr)?;
    Ok(())
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn map_constraint(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return CoreError::AlreadyExists;
        }
    }
    map_sqerr(e)
}

fn system_time_to_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
fn secs_to_system_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

const ACCOUNT_COLS: &str = "id, username, email, role, phone, full_name, tagline, bio, video_url, created_at, updated_at, deleted_at";

fn row_to_account(row: &rusqlite::Row) -> Result<Account, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let username_str: String = row.get(1).map_err(map_sqerr)?;
    let email_str: String = row.get(2).map_err(map_sqerr)?;
    let role_str: String = row.get(3).map_err(map_sqerr)?;
    let phone: Option<String> = row.get(4).map_err(map_sqerr)?;
    let full_name: Option<String> = row.get(5).map_err(map_sqerr)?;
    let tagline: Option<String> = row.get(6).map_err(map_sqerr)?;
    let bio: Option<String> = row.get(7).map_err(map_sqerr)?;
    let video_url: Option<String> = row.get(8).map_err(map_sqerr)?;
    let created_at: i64 = row.get(9).map_err(map_sqerr)?;
    let updated_at: Option<i64> = row.get(10).map_err(map_sqerr)?;
    let deleted_at: Option<i64> = row.get(11).map_err(map_sqerr)?;

    let username = Username::new(username_str)
        .map_err(|e| CoreError::Repository(format!("bad username in db: {e}")))?;
    let email = Email::new(email_str).map_err(|_| CoreError::Repository("bad email".into()))?;
    let role = AccountRole::parse(&role_str)
        .ok_or_else(|| CoreError::Repository(format!("bad role in db: {role_str}")))?;
    Ok(Account {
        id,
        username,
        email,
        role,
        phone,
        full_name,
        tagline,
        bio,
        video_url,
        created_at: secs_to_system_time(created_at as u64),
        updated_at: updated_at.map(|t| secs_to_system_time(t as u64)),
        deleted_at: deleted_at.map(|t| secs_to_system_time(t as u64)),
    })
}

impl AccountRepository for SqliteAccountRepo {
    fn find_by_id(&self, id: &str) -> Result<Option<Account>, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let sql = format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt.query(params![id]).map_err(map_sqerr)?;
        if let Some(row) = rows.next().map_err(map_sqerr)? {
            Ok(Some(row_to_account(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_by_username(&self, username: &str) -> Result<Option<Account>, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        // Active holder wins; otherwise the most recently deleted row, so
        // grace-period checks look at the right deleted_at.
        let sql = format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE username = ?1 COLLATE NOCASE
             ORDER BY (deleted_at IS NULL) DESC, deleted_at DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt.query(params![username]).map_err(map_sqerr)?;
        if let Some(row) = rows.next().map_err(map_sqerr)? {
            Ok(Some(row_to_account(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_by_email(&self, email: &Email) -> Result<Option<Account>, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let sql = format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE email = ?1 AND deleted_at IS NULL"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt.query(params![email.as_str()]).map_err(map_sqerr)?;
        if let Some(row) = rows.next().map_err(map_sqerr)? {
            Ok(Some(row_to_account(row)?))
        } else {
            Ok(None)
        }
    }

    fn insert(&self, account: Account) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let updated_at: Option<i64> = account.updated_at.map(|t| system_time_to_secs(t) as i64);
        let deleted_at: Option<i64> = account.deleted_at.map(|t| system_time_to_secs(t) as i64);
        conn.execute(
            "INSERT INTO accounts(id, username, email, role, phone, full_name, tagline, bio, video_url, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                account.id,
                account.username.as_str(),
                account.email.as_str(),
                account.role.as_str(),
                account.phone,
                account.full_name,
                account.tagline,
                account.bio,
                account.video_url,
                system_time_to_secs(account.created_at) as i64,
                updated_at,
                deleted_at,
            ],
        )
        .map(|_| ())
        .map_err(map_constraint)
    }

    fn update(&self, account: &Account) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let updated_at: Option<i64> = account.updated_at.map(|t| system_time_to_secs(t) as i64);
        let changed = conn
            .execute(
                "UPDATE accounts SET username = ?1, email = ?2, phone = ?3, full_name = ?4, tagline = ?5, bio = ?6, video_url = ?7, updated_at = ?8 WHERE id = ?9",
                params![
                    account.username.as_str(),
                    account.email.as_str(),
                    account.phone,
                    account.full_name,
                    account.tagline,
                    account.bio,
                    account.video_url,
                    updated_at,
                    account.id,
                ],
            )
            .map_err(map_constraint)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn soft_delete(&self, id: &str, deleted_at: SystemTime) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let deleted_at_secs = system_time_to_secs(deleted_at) as i64;
        let changed = conn
            .execute(
                "UPDATE accounts SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![deleted_at_secs, id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<Account>, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let sql = format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE deleted_at IS NULL ORDER BY created_at DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt.query(params![limit as i64]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_account(row)?);
        }
        Ok(out)
    }

    fn add_item(&self, item: PortfolioItem) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        conn.execute(
            "INSERT INTO portfolio_items(id, account_id, title, description, link_url, video_url, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id,
                item.account_id,
                item.title,
                item.description,
                item.link_url,
                item.video_url,
                item.position as i64,
                system_time_to_secs(item.created_at) as i64,
            ],
        )
        .map(|_| ())
        .map_err(map_constraint)
    }

    fn list_items(&self, account_id: &str) -> Result<Vec<PortfolioItem>, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, title, description, link_url, video_url, position, created_at
                 FROM portfolio_items WHERE account_id = ?1 ORDER BY position, created_at",
            )
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![account_id]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_item(row)?);
        }
        Ok(out)
    }

    fn remove_item(&self, account_id: &str, item_id: &str) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let changed = conn
            .execute(
                "DELETE FROM portfolio_items WHERE account_id = ?1 AND id = ?2",
                params![account_id, item_id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

fn row_to_item(row: &rusqlite::Row) -> Result<PortfolioItem, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let account_id: String = row.get(1).map_err(map_sqerr)?;
    let title: String = row.get(2).map_err(map_sqerr)?;
    let description: Option<String> = row.get(3).map_err(map_sqerr)?;
    let link_url: Option<String> = row.get(4).map_err(map_sqerr)?;
    let video_url: Option<String> = row.get(5).map_err(map_sqerr)?;
    let position: i64 = row.get(6).map_err(map_sqerr)?;
    let created_at: i64 = row.get(7).map_err(map_sqerr)?;
    Ok(PortfolioItem {
        id,
        account_id,
        title,
        description,
        link_url,
        video_url,
        position: position as u32,
        created_at: secs_to_system_time(created_at as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::AccountRole;

    fn tmp_db() -> (SqliteAccountRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteAccountRepo::new(path).unwrap();
        (repo, dir)
    }

    fn mk_account(id: &str, username: &str, email: &str) -> Account {
        Account::new(
            id.to_string(),
            Username::new(username).unwrap(),
            Email::new(email).unwrap(),
            AccountRole::Individual,
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn insert_find_roundtrip() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        let got = repo.find_by_id("1").unwrap().unwrap();
        assert_eq!(got.username.as_str(), "alice");
        assert_eq!(got.role, AccountRole::Individual);
        assert!(got.deleted_at.is_none());
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        let got = repo.find_by_username("ALICE").unwrap().unwrap();
        assert_eq!(got.id, "1");
        assert!(repo.find_by_username("missing").unwrap().is_none());
    }

    #[test]
    fn active_username_collision_is_conflict() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        let err = repo
            .insert(mk_account("2", "ALICE", "b@acme.com"))
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn partial_index_frees_name_after_soft_delete() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        repo.soft_delete("1", UNIX_EPOCH + Duration::from_secs(100))
            .unwrap();

        // The deleted row still answers the lookup (grace-period input)...
        let held = repo.find_by_username("alice").unwrap().unwrap();
        assert!(held.is_deleted());

        // ...but the unique index only covers active rows, so the write
        // itself succeeds once policy allows it.
        repo.insert(mk_account("2", "alice", "b@acme.com")).unwrap();
        let active = repo.find_by_username("alice").unwrap().unwrap();
        assert_eq!(active.id, "2");
        assert!(!active.is_deleted());
    }

    #[test]
    fn update_renames_and_respects_index() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        repo.insert(mk_account("2", "bob", "b@acme.com")).unwrap();

        let mut bob = repo.find_by_id("2").unwrap().unwrap();
        bob.username = Username::new("alice").unwrap();
        let err = repo.update(&bob).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));

        bob.username = Username::new("robert").unwrap();
        bob.updated_at = Some(UNIX_EPOCH + Duration::from_secs(5));
        repo.update(&bob).unwrap();
        assert_eq!(repo.find_by_username("robert").unwrap().unwrap().id, "2");
        assert!(repo.find_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn soft_delete_missing_or_deleted_is_not_found() {
        let (repo, _dir) = tmp_db();
        assert!(matches!(
            repo.soft_delete("nope", UNIX_EPOCH),
            Err(CoreError::NotFound)
        ));
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        repo.soft_delete("1", UNIX_EPOCH).unwrap();
        assert!(matches!(
            repo.soft_delete("1", UNIX_EPOCH),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn list_orders_and_limits() {
        let (repo, _dir) = tmp_db();
        for i in 0..5u64 {
            let mut a = mk_account(&format!("{i}"), &format!("user-{i}"), &format!("u{i}@e.com"));
            a.created_at = UNIX_EPOCH + Duration::from_secs(i);
            repo.insert(a).unwrap();
        }
        let items = repo.list(3).unwrap();
        assert_eq!(items.len(), 3);
        // First item should be the latest (i=4)
        assert_eq!(items[0].username.as_str(), "user-4");
    }

    #[test]
    fn portfolio_items_roundtrip_in_order() {
        let (repo, _dir) = tmp_db();
        repo.insert(mk_account("1", "alice", "a@acme.com")).unwrap();
        for (id, pos) in [("b", 1u32), ("a", 0u32)] {
            repo.add_item(PortfolioItem {
                id: id.into(),
                account_id: "1".into(),
                title: format!("item {id}"),
                description: None,
                link_url: None,
                video_url: Some("https://youtu.be/dQw4w9WgXcQ".into()),
                position: pos,
                created_at: UNIX_EPOCH,
            })
            .unwrap();
        }
        let items = repo.list_items("1").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].video_id().unwrap().as_str(), "dQw4w9WgXcQ");

        repo.remove_item("1", "a").unwrap();
        assert_eq!(repo.list_items("1").unwrap().len(), 1);
        assert!(matches!(
            repo.remove_item("1", "a"),
            Err(CoreError::NotFound)
        ));
    }
}
