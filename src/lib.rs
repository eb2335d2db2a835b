pub mod config;
pub mod credentials;
pub mod error;
pub mod mail;
pub mod routes;
pub mod sms;
pub mod telemetry;
pub mod token_refresher;
pub mod token_store;

pub use config::Config;
pub use credentials::{CredentialHolder, CredentialPair};
pub use error::{RelayError, Result};
pub use mail::{EmailLogEntry, MailFetcher};
pub use routes::{router, AppState};
pub use sms::{SmsFetcher, SmsLogEntry};
pub use token_refresher::TokenRefresher;
pub use token_store::TokenStore;
