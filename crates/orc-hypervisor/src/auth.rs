//! Authentication modes for the hypervisor API: password-based ticket auth
//! with a 2-hour cache and re-auth 5 minutes before expiry, or a long-lived
//! API token carried as a header with no ticket at all.

use crate::error::{HypervisorError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const TICKET_LIFETIME: chrono::Duration = chrono::Duration::hours(2);
const REAUTH_MARGIN: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone)]
pub enum AuthMode {
    Password { username: String, password: String },
    Token { token_id: String, secret: String },
}

#[derive(Debug, Clone)]
struct Ticket {
    ticket: String,
    csrf_token: String,
    issued_at: chrono::DateTime<chrono::Utc>,
}

impl Ticket {
    fn needs_renewal(&self) -> bool {
        chrono::Utc::now() - self.issued_at >= TICKET_LIFETIME - REAUTH_MARGIN
    }
}

#[derive(Deserialize)]
struct TicketResponseEnvelope {
    data: TicketResponseData,
}

#[derive(Deserialize)]
struct TicketResponseData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_prevention_token: String,
}

/// Holds the current auth mode and, for password mode, a cached ticket.
/// Cloneable and cheap to share across concurrent callers: the ticket cache
/// lives behind an `Arc<RwLock<_>>`.
#[derive(Clone)]
pub struct HypervisorAuth {
    mode: AuthMode,
    base_url: String,
    ticket: Arc<RwLock<Option<Ticket>>>,
}

impl HypervisorAuth {
    pub fn new(mode: AuthMode, base_url: impl Into<String>) -> Self {
        Self { mode, base_url: base_url.into(), ticket: Arc::new(RwLock::new(None)) }
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Applies the appropriate auth to a write request: cookie + CSRF header
    /// in password mode, `Authorization` header in token mode.
    pub async fn apply(&self, client: &Client, mut builder: reqwest::RequestBuilder, is_write: bool) -> Result<reqwest::RequestBuilder> {
        match &self.mode {
            AuthMode::Token { token_id, secret } => {
                builder = builder.header("Authorization", format!("PVEAPIToken={token_id}={secret}"));
            }
            AuthMode::Password { .. } => {
                let ticket = self.ensure_ticket(client).await?;
                builder = builder.header("Cookie", format!("PVEAuthCookie={}", ticket.ticket));
                if is_write {
                    builder = builder.header("CSRFPreventionToken", ticket.csrf_token.clone());
                }
            }
        }
        Ok(builder)
    }

    /// The ticket cookie value for WebSocket console endpoints. Token mode
    /// has no ticket; this is a known limitation — the caller relies on the
    /// header instead.
    pub async fn console_ticket_cookie(&self, client: &Client) -> Result<String> {
        match &self.mode {
            AuthMode::Token { .. } => Ok(String::new()),
            AuthMode::Password { .. } => {
                let ticket = self.ensure_ticket(client).await?;
                Ok(ticket.ticket)
            }
        }
    }

    async fn ensure_ticket(&self, client: &Client) -> Result<Ticket> {
        {
            let guard = self.ticket.read().await;
            if let Some(ticket) = guard.as_ref() {
                if !ticket.needs_renewal() {
                    return Ok(ticket.clone());
                }
            }
        }
        self.authenticate(client).await
    }

    async fn authenticate(&self, client: &Client) -> Result<Ticket> {
        let (username, password) = match &self.mode {
            AuthMode::Password { username, password } => (username.clone(), password.clone()),
            AuthMode::Token { .. } => {
                return Err(HypervisorError::AuthFailed("authenticate() called in token mode".into()))
            }
        };

        debug!("authenticating against hypervisor ticket endpoint");
        let response = client
            .post(format!("{}/access/ticket", self.base_url))
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HypervisorError::AuthFailed(format!("ticket request returned {}", response.status())));
        }

        let envelope: TicketResponseEnvelope = response.json().await?;
        let ticket = Ticket {
            ticket: envelope.data.ticket,
            csrf_token: envelope.data.csrf_prevention_token,
            issued_at: chrono::Utc::now(),
        };

        info!("hypervisor ticket (re)issued");
        *self.ticket.write().await = Some(ticket.clone());
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ticket_does_not_need_renewal() {
        let ticket = Ticket { ticket: "t".into(), csrf_token: "c".into(), issued_at: chrono::Utc::now() };
        assert!(!ticket.needs_renewal());
    }

    #[test]
    fn ticket_within_five_minutes_of_expiry_needs_renewal() {
        let issued_at = chrono::Utc::now() - (TICKET_LIFETIME - chrono::Duration::minutes(1));
        let ticket = Ticket { ticket: "t".into(), csrf_token: "c".into(), issued_at };
        assert!(ticket.needs_renewal());
    }

    #[tokio::test]
    async fn token_mode_console_ticket_is_empty() {
        let auth = HypervisorAuth::new(
            AuthMode::Token { token_id: "user@pve!orc".into(), secret: "s".into() },
            "https://example.invalid/api2/json",
        );
        let client = Client::new();
        assert_eq!(auth.console_ticket_cookie(&client).await.unwrap(), "");
    }
}
