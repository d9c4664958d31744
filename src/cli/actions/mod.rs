pub mod server;

use crate::api::handlers::auth::AuthConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        auth: AuthConfig,
        access_secret: SecretString,
        refresh_secret: SecretString,
        resend_api_key: Option<SecretString>,
    },
}
