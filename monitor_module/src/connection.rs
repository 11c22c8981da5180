//! Connect/disconnect state machine for the browser session.

use std::time::Duration;

use tracing::{info, warn};

use crate::browser::{DriverError, SessionDriver};
use crate::monitor::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    AwaitingAuthentication,
    Connected,
}

pub type SessionFactory<D> = Box<dyn Fn() -> Result<D, DriverError> + Send>;

/// Timeouts and page markers for the connect sequence.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// URL of the web client.
    pub service_url: String,
    /// Selector present once the client is authenticated.
    pub authenticated_selector: String,
    /// Selector of the authentication challenge (QR canvas).
    pub challenge_selector: String,
    /// Wait for an already-authenticated session before falling back to the
    /// challenge wait.
    pub connect_timeout: Duration,
    /// Wait for the user to complete the authentication challenge.
    pub auth_timeout: Duration,
}

/// Owns the single browser session and drives the connect state machine.
///
/// `connect()` either ends `Connected` with a live session or `Disconnected`
/// with the session torn down; it never returns while awaiting
/// authentication and never leaves a half-open session behind.
pub struct ConnectionManager<D: SessionDriver> {
    factory: SessionFactory<D>,
    options: ConnectOptions,
    session: Option<D>,
    state: ConnectionState,
}

impl<D: SessionDriver> ConnectionManager<D> {
    pub fn new(factory: SessionFactory<D>, options: ConnectOptions) -> Self {
        Self {
            factory,
            options,
            session: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.session.is_some()
    }

    /// Mutable access to the live session, if connected. The session handle
    /// never leaves this manager.
    pub fn session_mut(&mut self) -> Option<&mut D> {
        if self.state == ConnectionState::Connected {
            self.session.as_mut()
        } else {
            None
        }
    }

    /// Establish an authenticated session. No-op when already connected.
    pub fn connect(&mut self) -> Result<(), MonitorError> {
        if self.is_connected() {
            return Ok(());
        }

        info!("connecting to {}", self.options.service_url);
        let mut session = (self.factory)()?;

        if let Err(err) = session.navigate(&self.options.service_url) {
            self.teardown(session);
            return Err(err.into());
        }

        self.state = ConnectionState::AwaitingAuthentication;
        match session.wait_for(
            &self.options.authenticated_selector,
            self.options.connect_timeout,
        ) {
            Ok(_) => {}
            Err(DriverError::WaitTimeout(..)) => {
                match session.find_element(&self.options.challenge_selector) {
                    Ok(_) => info!(
                        "authentication challenge displayed; waiting up to {}s for scan",
                        self.options.auth_timeout.as_secs()
                    ),
                    Err(err) => warn!("no authentication challenge found: {}", err),
                }
                if let Err(err) = session.wait_for(
                    &self.options.authenticated_selector,
                    self.options.auth_timeout,
                ) {
                    self.teardown(session);
                    return match err {
                        DriverError::WaitTimeout(..) => {
                            Err(MonitorError::AuthTimeout(self.options.auth_timeout.as_secs()))
                        }
                        other => Err(other.into()),
                    };
                }
            }
            Err(err) => {
                self.teardown(session);
                return Err(err.into());
            }
        }

        self.state = ConnectionState::Connected;
        self.session = Some(session);
        info!("connected to {}", self.options.service_url);
        Ok(())
    }

    /// Tear down the session if present. Idempotent; teardown failures are
    /// logged and swallowed.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            self.teardown(session);
            info!("disconnected");
        } else {
            self.state = ConnectionState::Disconnected;
        }
    }

    fn teardown(&mut self, mut session: D) {
        if let Err(err) = session.quit() {
            warn!("session teardown failed: {}", err);
        }
        self.state = ConnectionState::Disconnected;
    }
}
