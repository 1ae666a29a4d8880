pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod notifications;
pub mod server;
pub mod services;
pub mod tls;

pub use db::DbPool;

use auth::TokenCodec;
use config::Config;
use notifications::MailService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenCodec,
    pub mail: MailService,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, mail: MailService) -> Self {
        let tokens = TokenCodec::from_config(&config.auth);
        Self {
            config,
            db,
            tokens,
            mail,
        }
    }
}
