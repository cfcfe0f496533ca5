pub mod auth;
pub mod bans;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod permissions;
pub mod routes;

use std::sync::Arc;

use auth::credentials::{CredentialKeys, CredentialVerifier, TokenIssuer};
use auth::login::{LoginService, OperatorAccount};
use bans::delegate::StatusBanDelegate;
use bans::notifier::{BanCoordinator, BanNotifier};
use config::{Config, RoomBackend};
use db::kv::{KeyValueStore, MemoryStore};
use db::status::UserStatusTable;
use feed::ChangeFeed;
use gateway::dispatcher::Dispatcher;
use gateway::history::CommandLog;
use gateway::registry::ConnectionRegistry;
use gateway::rooms::{BackplaneRouter, InMemoryRouter, RoomRouter};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<CredentialVerifier>,
    pub logins: Arc<LoginService>,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<dyn RoomRouter>,
    pub dispatcher: Arc<Dispatcher>,
    pub bans: Arc<BanCoordinator>,
    pub statuses: Arc<UserStatusTable>,
    pub commands: Arc<CommandLog>,
}

impl AppState {
    /// Wire every service together over an in-memory KV store.
    ///
    /// Must be called inside a tokio runtime when the backplane router is
    /// selected, since it spawns the relay task.
    pub fn new(config: Config, accounts: Vec<OperatorAccount>) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        Self::with_store(config, accounts, kv)
    }

    /// Wire every service together over the given revocation store.
    pub fn with_store(config: Config, accounts: Vec<OperatorAccount>, kv: Arc<dyn KeyValueStore>) -> Self {
        let keys = Arc::new(CredentialKeys::from_config(&config));
        let issuer = Arc::new(TokenIssuer::new(keys.clone()));
        let verifier = Arc::new(CredentialVerifier::new(keys, kv));
        let logins = Arc::new(LoginService::new(
            accounts,
            issuer.clone(),
            verifier.clone(),
            config.lockout,
        ));

        let registry = Arc::new(ConnectionRegistry::new(verifier.clone()));
        let router: Arc<dyn RoomRouter> = match config.room_backend {
            RoomBackend::Memory => Arc::new(InMemoryRouter::new(registry.clone())),
            RoomBackend::Backplane => Arc::new(BackplaneRouter::spawn(registry.clone())),
        };

        let statuses = Arc::new(UserStatusTable::new(ChangeFeed::new()));
        let commands = Arc::new(CommandLog::new());
        let delegate = Arc::new(StatusBanDelegate::new(statuses.clone(), verifier.clone()));
        let bans = Arc::new(BanCoordinator::new(
            delegate,
            BanNotifier::new(router.clone()),
            commands.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            router.clone(),
            bans.clone(),
            commands.clone(),
        ));

        Self {
            config: Arc::new(config),
            issuer,
            verifier,
            logins,
            registry,
            router,
            dispatcher,
            bans,
            statuses,
            commands,
        }
    }
}
