//! Account directory kept in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{AccountId, OriginId};
use crate::ports::{AccountContext, AccountDirectory, OriginContext, OriginType};

#[derive(Debug)]
pub struct InMemoryAccountDirectory {
    origins: HashMap<OriginId, OriginContext>,
    accounts: HashMap<AccountId, AccountContext>,
    ready: AtomicBool,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self {
            origins: HashMap::new(),
            accounts: HashMap::new(),
            ready: AtomicBool::new(true),
        }
    }

    pub fn with_origin(mut self, origin: OriginId, origin_type: OriginType, name: &str) -> Self {
        self.origins.insert(
            origin,
            OriginContext {
                origin,
                origin_type,
                name: name.to_string(),
            },
        );
        self
    }

    /// Add an account on an origin registered with [`Self::with_origin`].
    /// Accounts on unknown origins are ignored.
    pub fn with_account(
        mut self,
        account: AccountId,
        origin: OriginId,
        username: &str,
        credentials_verified: bool,
    ) -> Self {
        if let Some(origin) = self.origins.get(&origin).cloned() {
            self.accounts.insert(
                account,
                AccountContext {
                    account,
                    origin,
                    username: username.to_string(),
                    credentials_verified,
                },
            );
        }
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for InMemoryAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn account(&self, id: AccountId) -> Option<AccountContext> {
        self.accounts.get(&id).cloned()
    }

    fn origin(&self, id: OriginId) -> Option<OriginContext> {
        self.origins.get(&id).cloned()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_resolve_with_their_origin() {
        let dir = InMemoryAccountDirectory::new()
            .with_origin(OriginId::new(1), OriginType::ActivityPub, "mastodon.social")
            .with_account(AccountId::new(10), OriginId::new(1), "alice", true)
            .with_account(AccountId::new(11), OriginId::new(9), "bob", true);

        let alice = dir.account(AccountId::new(10)).unwrap();
        assert_eq!(alice.origin.origin_type, OriginType::ActivityPub);
        assert!(alice.credentials_verified);
        assert!(dir.account(AccountId::new(11)).is_none());
        assert!(dir.account(AccountId::EMPTY).is_none());
        assert_eq!(dir.origin(OriginId::new(1)).unwrap().name, "mastodon.social");
    }
}
