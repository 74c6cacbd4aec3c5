use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::{Account, AccountRepository, CoreError, Email, PortfolioItem};

/// Simple in-memory repository for tests and local demos. Not thread-safe
/// for high concurrency beyond the internal mutexes guarding the maps.
///
/// Mirrors the storage contract: username uniqueness is enforced among
/// active rows only, so a soft-deleted row never trips the insert check.
pub struct InMemoryAccountRepo {
    accounts: Mutex<BTreeMap<String, Account>>,
    items: Mutex<Vec<PortfolioItem>>,
}

impl InMemoryAccountRepo {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(BTreeMap::new()),
            items: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAccountRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn active_name_conflict(map: &BTreeMap<String, Account>, account: &Account) -> bool {
    map.values().any(|other| {
        other.id != account.id
            && other.deleted_at.is_none()
            && other
                .username
                .as_str()
                .eq_ignore_ascii_case(account.username.as_str())
    })
}

impl AccountRepository for InMemoryAccountRepo {
    fn find_by_id(&self, id: &str) -> Result<Option<Account>, CoreError> {
        let map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.get(id).cloned())
    }

    fn find_by_username(&self, username: &str) -> Result<Option<Account>, CoreError> {
        let map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        // Prefer the active holder; fall back to the most recent deleted row
        // so grace-period checks see it.
        let mut deleted: Option<&Account> = None;
        for account in map.values() {
            if !account.username.as_str().eq_ignore_ascii_case(username) {
                continue;
            }
            if account.deleted_at.is_none() {
                return Ok(Some(account.clone()));
            }
            if deleted.map_or(true, |prev| prev.deleted_at < account.deleted_at) {
                deleted = Some(account);
            }
        }
        Ok(deleted.cloned())
    }

    fn find_by_email(&self, email: &Email) -> Result<Option<Account>, CoreError> {
        let map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map
            .values()
            .find(|a| a.email.as_str() == email.as_str() && a.deleted_at.is_none())
            .cloned())
    }

    fn insert(&self, account: Account) -> Result<(), CoreError> {
        let mut map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if map.contains_key(&account.id) || active_name_conflict(&map, &account) {
            return Err(CoreError::AlreadyExists);
        }
        map.insert(account.id.clone(), account);
        Ok(())
    }

    fn update(&self, account: &Account) -> Result<(), CoreError> {
        let mut map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if !map.contains_key(&account.id) {
            return Err(CoreError::NotFound);
        }
        if active_name_conflict(&map, account) {
            return Err(CoreError::AlreadyExists);
        }
        map.insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn soft_delete(&self, id: &str, deleted_at: SystemTime) -> Result<(), CoreError> {
        let mut map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match map.get_mut(id) {
            Some(account) if account.deleted_at.is_none() => {
                account.deleted_at = Some(deleted_at);
                Ok(())
            }
            _ => Err(CoreError::NotFound),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<Account>, CoreError> {
        let map = self
            .accounts
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map
            .values()
            .filter(|a| a.deleted_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    fn add_item(&self, item: PortfolioItem) -> Result<(), CoreError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if items.iter().any(|i| i.id == item.id) {
            return Err(CoreError::AlreadyExists);
        }
        items.push(item);
        Ok(())
    }

    fn list_items(&self, account_id: &str) -> Result<Vec<PortfolioItem>, CoreError> {
        let items = self
            .items
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let mut matching: Vec<_> = items
            .iter()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(matching)
    }

    fn remove_item(&self, account_id: &str, item_id: &str) -> Result<(), CoreError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let before = items.len();
        items.retain(|i| !(i.account_id == account_id && i.id == item_id));
        if items.len() == before {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}
