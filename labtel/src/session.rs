//! Session driver: the glue between transport, parser, screen, and
//! classifier.
//!
//! One [`Session`] owns one host connection, the current [`Screen`], and the
//! history ring. Everything is single-threaded and half-duplex: callers
//! strictly alternate `send` and `read`, and every wait is bounded. Higher
//! layers build their workflows from exactly five verbs — `connect`,
//! `send`, `read`, `return_to_main_menu`, `disconnect`.

use std::io;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ansi::tokenize;
use crate::classify::ScreenClassifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::op::translate;
use crate::screen::{Screen, ScreenHistory};
use crate::transport::{Transport, EOT};

// ── Call options ──────────────────────────────────────────────────────────

/// Timing knobs for [`Session::read_with`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOpts {
    /// Total drain budget.
    pub max_wait: Duration,
    /// Pause between re-reads while draining.
    pub slice_wait: Duration,
    /// Keep waiting when the first read comes back empty.
    pub wait_if_empty: bool,
}

impl Default for ReadOpts {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(2000),
            slice_wait: Duration::from_millis(200),
            wait_if_empty: true,
        }
    }
}

/// How long `send` waits for the host to echo the keystrokes back.
const ECHO_WAIT: Duration = Duration::from_millis(1000);
/// Tries before `return_to_main_menu` gives up.
const DEFAULT_MAX_TRIES: usize = 10;

// ── Session ───────────────────────────────────────────────────────────────

/// One scripted session against the host.
pub struct Session {
    config: Config,
    classifier: Box<dyn ScreenClassifier>,
    transport: Option<Transport>,
    screen: Screen,
    history: ScreenHistory,
    /// Connected to the training sub-system rather than the live one.
    training: bool,
    /// The login dialogue completed; navigation is meaningful.
    logged_in: bool,
}

impl Session {
    pub fn new(config: Config, classifier: Box<dyn ScreenClassifier>) -> Self {
        let history_len = config.host.history_len;
        Self {
            config,
            classifier,
            transport: None,
            screen: Screen::default(),
            history: ScreenHistory::new(history_len),
            training: false,
            logged_in: false,
        }
    }

    /// The current screen.
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Recent screens, oldest first.
    pub fn history(&self) -> &ScreenHistory {
        &self.history
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn transport(&mut self) -> Result<&mut Transport> {
        self.transport.as_mut().ok_or_else(|| {
            Error::Transport(io::Error::new(io::ErrorKind::NotConnected, "not connected"))
        })
    }

    // ── connect ───────────────────────────────────────────────────────────

    /// Open the transport and run the login dialogue until the classifier
    /// reports the main menu.
    ///
    /// With `training` set, the driver switches to the training sub-system
    /// after login and navigation targets its main menu from then on.
    pub async fn connect(&mut self, training: bool) -> Result<()> {
        let dialect = self.config.dialect.clone();
        if dialect.user_prompt.is_some() && self.config.host.user.is_none() {
            return Err(Error::LoginFailure(
                "a user prompt is configured but no user was supplied".to_owned(),
            ));
        }
        if dialect.password_prompt.is_some() && self.config.host.password.is_none() {
            return Err(Error::LoginFailure(
                "a password prompt is configured but no password was supplied".to_owned(),
            ));
        }

        info!(address = %self.config.host.address, "opening connection to host");
        self.transport = Some(Transport::connect(&self.config.host).await?);
        let deadline = Instant::now() + self.config.host.login_deadline;

        match self.login_dialogue(&dialect, deadline, training).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The session never reached a navigable state; hang up
                // rather than attempt menu recovery.
                self.hangup().await;
                Err(e)
            }
        }
    }

    async fn login_dialogue(
        &mut self,
        dialect: &crate::config::Dialect,
        deadline: Instant,
        training: bool,
    ) -> Result<()> {
        let login_prompt = dialect.login_prompt.clone();
        self.transport()?
            .read_until(login_prompt.as_bytes(), remaining(deadline))
            .await?;
        self.send(&dialect.system_user).await?;

        debug!("waiting for the terminal-identity request");
        let enq = self
            .transport()?
            .wait_for_enq(remaining(deadline))
            .await?;
        if !enq {
            return Err(Error::LoginFailure(
                "host never requested the terminal identity".to_owned(),
            ));
        }

        if let Some(prompt) = dialect.user_prompt.clone() {
            self.transport()?
                .read_until(prompt.as_bytes(), remaining(deadline))
                .await?;
            let user = self.config.host.user.clone().unwrap_or_default();
            self.send(&user).await?;
        }
        if let Some(prompt) = dialect.password_prompt.clone() {
            self.transport()?
                .read_until(prompt.as_bytes(), remaining(deadline))
                .await?;
            let password = self.config.host.password.clone().unwrap_or_default();
            self.send_quiet(&password).await?;
            if !password.is_empty() {
                // The host echoes the password as asterisks.
                let stars = vec![b'*'; password.len()];
                self.transport()?
                    .read_until(&stars, ECHO_WAIT)
                    .await?;
            }
        }

        debug!("credentials sent; reading screens until the main menu");
        loop {
            if Instant::now() >= deadline {
                return Err(Error::LoginFailure(
                    "main menu not reached within the login deadline".to_owned(),
                ));
            }
            match self.read().await {
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
            let kind = self.screen.kind.as_str();
            if kind == dialect.main_menu {
                break;
            }
            if kind == dialect.change_password {
                return Err(Error::LoginFailure(
                    "host demands a password change".to_owned(),
                ));
            }
            debug!(kind, "not the main menu yet");
        }

        self.logged_in = true;
        info!("logged in; main menu reached");

        if training {
            info!("switching to the training sub-system");
            self.send(&dialect.training_system).await?;
            match self.read().await {
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
            self.training = true;
        }
        Ok(())
    }

    // ── send ──────────────────────────────────────────────────────────────

    /// Encode `message`, append a carriage return, write, and consume the
    /// echoed bytes so the next read sees only the response.
    pub async fn send(&mut self, message: &str) -> Result<()> {
        self.send_with(message, true, ECHO_WAIT).await
    }

    /// [`Session::send`] with explicit echo-drain behaviour.
    pub async fn send_with(
        &mut self,
        message: &str,
        echo_readback: bool,
        max_wait: Duration,
    ) -> Result<()> {
        debug!(message, "sending");
        self.write_line(message, echo_readback, max_wait).await
    }

    /// Send without logging the text (passwords).
    async fn send_quiet(&mut self, message: &str) -> Result<()> {
        debug!("sending (suppressed)");
        self.write_line(message, false, ECHO_WAIT).await
    }

    async fn write_line(
        &mut self,
        message: &str,
        echo_readback: bool,
        max_wait: Duration,
    ) -> Result<()> {
        let mut bytes = message.as_bytes().to_vec();
        bytes.push(b'\r');
        let transport = self.transport()?;
        transport.write_bytes(&bytes).await?;
        if echo_readback && !message.is_empty() {
            // The host does not echo the caret of a `^X` control mnemonic,
            // only the letter.
            let expect = match message.as_bytes() {
                [b'^', rest @ ..] if rest.len() == 1 => rest,
                all => all,
            };
            transport.read_until(expect, max_wait).await?;
        }
        Ok(())
    }

    /// Write pre-encoded bytes verbatim (control characters).
    pub async fn send_raw(&mut self, bytes: &[u8], echo_readback: bool) -> Result<()> {
        debug!(?bytes, "sending raw");
        let transport = self.transport()?;
        transport.write_bytes(bytes).await?;
        if echo_readback {
            transport.read_until(bytes, ECHO_WAIT).await?;
        }
        Ok(())
    }

    /// Send, then drain and discard whatever comes back.
    pub async fn send_and_ignore(&mut self, message: &str) -> Result<()> {
        self.send(message).await?;
        let transport = self.transport()?;
        let _ = transport
            .read_eager(Duration::from_millis(200), Duration::from_millis(50), false)
            .await?;
        Ok(())
    }

    // ── read ──────────────────────────────────────────────────────────────

    /// Drain the transport, parse, render against the previous frame,
    /// classify, and push to history.
    ///
    /// `Ok(None)` means no bytes were available and `wait_if_empty` was
    /// off: an empty frame, history untouched. A full wait with nothing is
    /// [`Error::Timeout`].
    pub async fn read(&mut self) -> Result<Option<&Screen>> {
        self.read_with(ReadOpts::default()).await
    }

    /// [`Session::read`] with explicit timing.
    pub async fn read_with(&mut self, opts: ReadOpts) -> Result<Option<&Screen>> {
        let wait_if_empty = opts.wait_if_empty;
        let buf = self
            .transport()?
            .read_eager(opts.max_wait, opts.slice_wait, wait_if_empty)
            .await?;
        if buf.is_empty() {
            return if wait_if_empty {
                Err(Error::Timeout)
            } else {
                Ok(None)
            };
        }

        let frame = translate(&tokenize(&buf));
        let mut screen = Screen::render(frame, &self.screen.lines);
        let classification = self.classifier.classify(&screen.lines);
        screen.kind = classification.kind;
        screen.options = classification.options;
        screen.option_str = classification.option_str;
        screen.default_option = classification.default_option;
        if screen.has_errors {
            warn!(errors = ?screen.errors, "host reported errors");
        }
        debug!(
            kind = %screen.kind,
            lines = screen.len(),
            ops = screen.ops.len(),
            "frame rendered"
        );

        self.screen = screen;
        self.history.push(self.screen.clone());
        Ok(Some(&self.screen))
    }

    // ── navigation ────────────────────────────────────────────────────────

    /// Send the cancel-action key until the main menu comes back.
    ///
    /// Already on the main menu means zero sends. Outside force mode a
    /// training session targets the training main menu.
    pub async fn return_to_main_menu(&mut self, force: bool, max_tries: usize) -> Result<()> {
        let target = if self.training && !force {
            self.config.dialect.main_menu_training.clone()
        } else {
            self.config.dialect.main_menu.clone()
        };
        let cancel = self.config.dialect.cancel_action.clone();
        debug!(menu = %target, "returning to the main menu");

        let mut tries = 0;
        while self.screen.kind != target {
            if tries >= max_tries {
                return Err(Error::NavigationLost { tries: max_tries });
            }
            self.send(&cancel).await?;
            match self.read().await {
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
            tries += 1;
        }
        Ok(())
    }

    // ── disconnect ────────────────────────────────────────────────────────

    /// Best-effort logout and close. All I/O errors are logged and
    /// swallowed; the session always ends disconnected.
    pub async fn disconnect(&mut self) {
        if self.transport.is_none() {
            return;
        }
        info!("disconnecting");
        if self.logged_in {
            if let Err(e) = self.return_to_main_menu(true, DEFAULT_MAX_TRIES).await {
                warn!(error = %e, "could not reach the main menu before logout");
            }
            let logout = self.config.dialect.empty.clone();
            if let Err(e) = self.send_with(&logout, false, ECHO_WAIT).await {
                warn!(error = %e, "logout keystroke failed");
            }
        }
        self.hangup().await;
    }

    /// Terminate the transport without menu navigation.
    async fn hangup(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.write_bytes(&[EOT]).await {
                debug!(error = %e, "EOT not delivered");
            }
            if let Err(e) = transport.close().await {
                debug!(error = %e, "close reported an error");
            }
        }
        self.logged_in = false;
        self.training = false;
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
