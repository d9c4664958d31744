use crate::api;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            auth,
            access_secret,
            refresh_secret,
            resend_api_key,
        } => {
            api::new(port, dsn, auth, access_secret, refresh_secret, resend_api_key).await?;
        }
    }

    Ok(())
}
