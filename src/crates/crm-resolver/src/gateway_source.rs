//! Wires the resolver's `ContactSearch`/`UserSearch` traits to the real
//! effect runner (§4.D: reads still go through retry/circuit-breaker, just
//! not the dedupe guard).

use crate::resolver::{ContactSearch, UserSearch};
use async_trait::async_trait;
use crm_domain::{Contact, User};
use crm_gateway::{EffectRunner, GatewayError};
use std::sync::Arc;

pub struct GatewayContactSource {
    runner: Arc<EffectRunner>,
}

impl GatewayContactSource {
    pub fn new(runner: Arc<EffectRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ContactSearch for GatewayContactSource {
    async fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<Contact>, GatewayError> {
        self.runner
            .read("contacts.search", "contact_search", || self.runner.gateway().search_contacts(query, limit))
            .await
            .map_err(|enhanced| enhanced.into())
    }
}

pub struct GatewayUserSource {
    runner: Arc<EffectRunner>,
}

impl GatewayUserSource {
    pub fn new(runner: Arc<EffectRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl UserSearch for GatewayUserSource {
    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<User>, GatewayError> {
        self.runner
            .read("users.search", "user_search", || self.runner.gateway().search_users(query, limit))
            .await
            .map_err(|enhanced| enhanced.into())
    }

    async fn current_user(&self) -> Result<User, GatewayError> {
        self.runner
            .read("users.current", "user_search", || self.runner.gateway().get_current_user())
            .await
            .map_err(|enhanced| enhanced.into())
    }
}
