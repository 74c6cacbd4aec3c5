use std::time::SystemTime;

use crate::slug::normalize;
use crate::validate::{check_username, UsernameIssue};
use crate::{
    Account, AccountRepository, Clock, CoreError, NewAccount, PortfolioItem, ReservedUsernames,
    Username,
};

/// Profile field updates applied by [`AccountService::update_profile`].
/// `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub full_name: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub tagline: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
}

/// Application service orchestrating account registration, renames, and
/// public profile lookups.
///
/// It remains generic over repository and clock. The availability check is
/// advisory: the repository's uniqueness constraint on active usernames is
/// the authoritative backstop, and a write-time collision is reported as the
/// `taken` reason rather than a fault.
pub struct AccountService<R: AccountRepository, C: Clock> {
    repo: R,
    reserved: ReservedUsernames,
    clock: C,
}

impl<R: AccountRepository, C: Clock> AccountService<R, C> {
    pub fn new(repo: R, reserved: ReservedUsernames, clock: C) -> Self {
        Self {
            repo,
            reserved,
            clock,
        }
    }

    /// Normalize a raw candidate and run the full username policy.
    /// Returns the canonical username on success, or the first failing
    /// reason wrapped in `CoreError::InvalidUsername`.
    pub fn check_username(&self, raw: &str) -> Result<Username, CoreError> {
        let candidate = normalize(raw);
        let holder = self.repo.find_by_username(&candidate)?;
        check_username(&candidate, &self.reserved, holder.as_ref(), self.clock.now())
            .map_err(CoreError::InvalidUsername)?;
        Username::new(candidate)
    }

    /// Register a new account under a policy-checked username.
    pub fn register(&self, input: NewAccount) -> Result<Account, CoreError> {
        let username = self.check_username(&input.username)?;
        if self.repo.find_by_email(&input.email)?.is_some() {
            return Err(CoreError::AlreadyExists);
        }
        let mut account = Account::new(
            input.id,
            username,
            input.email,
            input.role,
            self.clock.now(),
        );
        account.phone = input.phone;
        account.full_name = input.full_name;
        match self.repo.insert(account.clone()) {
            Ok(()) => Ok(account),
            // Lost a race with a concurrent signup for the same name.
            Err(CoreError::AlreadyExists) => {
                Err(CoreError::InvalidUsername(UsernameIssue::Taken))
            }
            Err(e) => Err(e),
        }
    }

    /// Rename an account. Renaming to the current username (in any casing or
    /// raw spelling that normalizes to it) is a no-op success.
    pub fn rename(&self, id: &str, raw: &str) -> Result<Account, CoreError> {
        let mut account = self.repo.find_by_id(id)?.ok_or(CoreError::NotFound)?;
        let candidate = normalize(raw);
        if candidate == account.username.as_str() {
            return Ok(account);
        }
        let username = self.check_username(raw)?;
        account.username = username;
        account.updated_at = Some(self.clock.now());
        match self.repo.update(&account) {
            Ok(()) => Ok(account),
            Err(CoreError::AlreadyExists) => {
                Err(CoreError::InvalidUsername(UsernameIssue::Taken))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply profile field updates.
    pub fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<Account, CoreError> {
        let mut account = self.repo.find_by_id(id)?.ok_or(CoreError::NotFound)?;
        if let Some(full_name) = patch.full_name {
            account.full_name = full_name;
        }
        if let Some(phone) = patch.phone {
            account.phone = phone;
        }
        if let Some(tagline) = patch.tagline {
            account.tagline = tagline;
        }
        if let Some(bio) = patch.bio {
            account.bio = bio;
        }
        if let Some(video_url) = patch.video_url {
            account.video_url = video_url;
        }
        account.updated_at = Some(self.clock.now());
        self.repo.update(&account)?;
        Ok(account)
    }

    /// Resolve a public profile by username. Soft-deleted accounts are not
    /// served, even inside the reuse grace period.
    pub fn profile(&self, raw_username: &str) -> Result<Account, CoreError> {
        let candidate = normalize(raw_username);
        match self.repo.find_by_username(&candidate)? {
            Some(account) if !account.is_deleted() => Ok(account),
            _ => Err(CoreError::NotFound),
        }
    }

    /// Look up the account behind an authenticated email.
    pub fn account_by_email(&self, email: &crate::Email) -> Result<Account, CoreError> {
        match self.repo.find_by_email(email)? {
            Some(account) if !account.is_deleted() => Ok(account),
            _ => Err(CoreError::NotFound),
        }
    }

    pub fn account_by_id(&self, id: &str) -> Result<Option<Account>, CoreError> {
        self.repo.find_by_id(id)
    }

    /// Soft-delete an account; its username stays blocked for the grace
    /// period.
    pub fn deactivate(&self, id: &str) -> Result<(), CoreError> {
        self.repo.soft_delete(id, self.clock.now())
    }

    /// List active accounts up to the given limit.
    pub fn list(&self, limit: usize) -> Result<Vec<Account>, CoreError> {
        self.repo.list(limit)
    }

    pub fn add_portfolio_item(&self, item: PortfolioItem) -> Result<(), CoreError> {
        if self.repo.find_by_id(&item.account_id)?.is_none() {
            return Err(CoreError::NotFound);
        }
        self.repo.add_item(item)
    }

    pub fn portfolio(&self, account_id: &str) -> Result<Vec<PortfolioItem>, CoreError> {
        self.repo.list_items(account_id)
    }

    pub fn remove_portfolio_item(&self, account_id: &str, item_id: &str) -> Result<(), CoreError> {
        self.repo.remove_item(account_id, item_id)
    }
}
