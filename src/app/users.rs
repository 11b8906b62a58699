use anyhow::Result;

use crate::domain::user::User;
use crate::domain::Id;
use crate::infra::store::SharedStore;

/// Read access to accounts; they are created and managed elsewhere.
#[derive(Clone)]
pub struct UserService {
    store: SharedStore,
}

impl UserService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn get_user(&self, user_id: Id) -> Result<Option<User>> {
        self.store.get_user(user_id).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.store.get_user_by_username(username).await
    }
}
