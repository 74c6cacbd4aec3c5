//! Domain library for the profile publishing platform.
//!
//! This crate is dependency-light (serde for DTO derives only) and holds the
//! domain types, ports (traits), and error definitions. Keep adapters and
//! IO concerns out of this crate.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

/// How long a soft-deleted account keeps its username reserved.
///
/// Reuse requires strictly more than this much time since `deleted_at`;
/// exactly 30 days to the second still blocks.
pub const USERNAME_GRACE_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// A canonical username: lowercase letters, digits, and single interior
/// hyphens, 3-30 characters. Construction enforces the syntax rules only;
/// reservation and uniqueness are checked by the policy/service layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Username(String);

impl Username {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into().to_lowercase();
        validate::validate_format(&val).map_err(CoreError::InvalidUsername)?;
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email address of an account holder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Email(String);

impl Email {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        // Lightweight check; full RFC compliance not required here
        if val.is_empty() || !val.contains('@') {
            return Err(CoreError::InvalidEmail);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Account kind chosen at signup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountRole {
    Individual,
    Business,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Individual => "individual",
            AccountRole::Business => "business",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "individual" => Some(AccountRole::Individual),
            "business" => Some(AccountRole::Business),
            _ => None,
        }
    }
}

/// Input data for registering a new account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub id: String,
    pub email: Email,
    /// Raw username as submitted; normalized and checked by the service.
    pub username: String,
    pub role: AccountRole,
    pub phone: Option<String>,
    pub full_name: Option<String>,
}

/// Stored account. `deleted_at` is the sole liveness marker: the row
/// persists after soft deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub username: Username,
    pub email: Email,
    pub role: AccountRole,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub tagline: Option<String>,
    pub bio: Option<String>,
    /// Externally hosted intro video; rendered as an embed when an
    /// identifier can be extracted from it.
    pub video_url: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
    /// Soft delete timestamp. If set, the account is considered deleted.
    pub deleted_at: Option<SystemTime>,
}

impl Account {
    /// Create a new active account with empty profile fields.
    pub fn new(
        id: String,
        username: Username,
        email: Email,
        role: AccountRole,
        created_at: SystemTime,
    ) -> Self {
        Self {
            id,
            username,
            email,
            role,
            phone: None,
            full_name: None,
            tagline: None,
            bio: None,
            video_url: None,
            created_at,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Check if the account has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check whether this row still blocks reuse of its username at `now`.
    ///
    /// Active rows always block. Soft-deleted rows block until strictly more
    /// than [`USERNAME_GRACE_PERIOD`] has elapsed since `deleted_at`.
    pub fn blocks_username(&self, now: SystemTime) -> bool {
        match self.deleted_at {
            None => true,
            Some(deleted_at) => now
                .duration_since(deleted_at)
                .map(|elapsed| elapsed <= USERNAME_GRACE_PERIOD)
                .unwrap_or(true),
        }
    }
}

/// A portfolio entry on an account's public page (project, service,
/// previous work). Owns an optional externally hosted video URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortfolioItem {
    pub id: String,
    pub account_id: String,
    pub title: String,
    pub description: Option<String>,
    pub link_url: Option<String>,
    pub video_url: Option<String>,
    pub position: u32,
    pub created_at: SystemTime,
}

impl PortfolioItem {
    /// Extract the embeddable video identifier, if the stored URL carries one.
    pub fn video_id(&self) -> Option<video::VideoId> {
        self.video_url.as_deref().and_then(video::VideoId::from_url)
    }
}

/// Fixed, case-insensitive set of usernames that can never be assigned.
/// Loaded once at startup and immutable thereafter.
#[derive(Clone, Debug)]
pub struct ReservedUsernames(BTreeSet<String>);

impl ReservedUsernames {
    /// The platform's built-in reserved set: route prefixes, infrastructure
    /// names, and role words.
    pub fn builtin() -> Self {
        const BUILTIN: &[&str] = &[
            "login", "signup", "logout", "dashboard", "admin", "api", "static", "uploads",
            "about", "contact", "help", "support", "terms", "privacy", "settings", "profile",
            "user", "users", "public", "app", "dev", "test", "staging", "production", "www",
            "mail", "ftp", "blog", "shop", "store", "account", "billing", "pay", "payment",
            "subscribe", "download", "cdn", "assets", "media", "images", "css", "js", "fonts",
            "root", "administrator", "moderator", "guest", "pehchaan",
        ];
        Self(BUILTIN.iter().map(|s| (*s).to_string()).collect())
    }

    /// Builtin set plus extra names (e.g. from deployment config).
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::builtin();
        for name in extra {
            let name = name.as_ref().trim().to_lowercase();
            if !name.is_empty() {
                set.0.insert(name);
            }
        }
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Time source abstraction to make grace-period logic testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Repository port for persisting and loading accounts and their portfolio
/// items. Lookups by username include soft-deleted rows; grace-period logic
/// belongs to the policy layer, not the store.
pub trait AccountRepository: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<Account>, CoreError>;
    /// Case-insensitive lookup against the stored (already normalized) value.
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, CoreError>;
    fn find_by_email(&self, email: &Email) -> Result<Option<Account>, CoreError>;
    /// Insert a new account. The store enforces username uniqueness among
    /// active rows and reports collision as `AlreadyExists`.
    fn insert(&self, account: Account) -> Result<(), CoreError>;
    /// Update an existing account by id (profile fields and username).
    fn update(&self, account: &Account) -> Result<(), CoreError>;
    /// Mark an account soft-deleted.
    fn soft_delete(&self, id: &str, deleted_at: SystemTime) -> Result<(), CoreError>;
    /// List active accounts up to the given limit.
    fn list(&self, limit: usize) -> Result<Vec<Account>, CoreError>;

    fn add_item(&self, item: PortfolioItem) -> Result<(), CoreError>;
    /// Items for an account, ordered by position then creation time.
    fn list_items(&self, account_id: &str) -> Result<Vec<PortfolioItem>, CoreError>;
    fn remove_item(&self, account_id: &str, item_id: &str) -> Result<(), CoreError>;
}

/// Core domain errors (no external error crates to keep deps minimal).
#[derive(Debug)]
pub enum CoreError {
    InvalidUsername(validate::UsernameIssue),
    InvalidEmail,
    AlreadyExists,
    NotFound,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidUsername(issue) => write!(f, "invalid username: {}", issue),
            CoreError::InvalidEmail => write!(f, "invalid email"),
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} — domain library loaded", pkg, ver)
}

pub mod adapters;
pub mod service;
pub mod slug;
pub mod validate;
pub mod video;
