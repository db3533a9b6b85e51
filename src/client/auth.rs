//! NNTP authentication (AUTHINFO USER/PASS)

use super::state::ConnectionState;
use super::NntpClient;
use crate::commands;
use crate::error::{PostError, Result};
use crate::response::codes;
use tracing::debug;

impl NntpClient {
    /// Authenticate with the credentials from the server configuration
    ///
    /// Sends `AUTHINFO USER` followed by `AUTHINFO PASS`. When both the
    /// username and the password are empty the server is assumed to be
    /// open and the exchange is skipped entirely.
    ///
    /// # Errors
    ///
    /// - [`PostError::AuthFailed`] - server rejected either step
    /// - [`PostError::Timeout`] - server did not respond in time
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.config.username.is_empty() && self.config.password.is_empty() {
            debug!("No credentials configured, skipping AUTHINFO");
            self.state = ConnectionState::Authenticated;
            return Ok(());
        }

        debug!("Authenticating as {}", self.config.username);

        let cmd = commands::authinfo_user(&self.config.username);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        // 381 asks for the password; 281 means the server accepted the
        // username alone
        if response.code == codes::AUTH_CONTINUE {
            let cmd = commands::authinfo_pass(&self.config.password);
            self.send_command(&cmd).await?;
            let response = self.read_response().await?;

            if response.code != codes::AUTH_ACCEPTED {
                return Err(PostError::AuthFailed(format!(
                    "{} {}",
                    response.code, response.message
                )));
            }
        } else if response.code != codes::AUTH_ACCEPTED {
            return Err(PostError::AuthFailed(format!(
                "{} {}",
                response.code, response.message
            )));
        }

        self.state = ConnectionState::Authenticated;
        debug!("Authentication successful");
        Ok(())
    }
}
