//! Host configuration and dialect mnemonics.
//!
//! [`HostConfig`] says where the host is and how to introduce ourselves;
//! [`Dialect`] carries everything site-specific the driver sends by name —
//! login prompts, the cancel key, and the menu mnemonics the workflows
//! type. Both load from a plain directive file:
//!
//! ```text
//! ; labtel.conf
//! host 192.168.0.1
//! port 23
//! answerback "PTERM:CHM\r"
//! terminal VT100
//! terminal VT102
//! system-user AIX
//! user-prompt "User ID :"
//! password-prompt "Password:"
//! mnemonic specimen-enquiry SENQ
//! ```
//!
//! Unknown or malformed lines are collected as per-line errors; loading
//! never fails wholesale.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

// ── Errors ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

// ── HostConfig ────────────────────────────────────────────────────────────

/// Where the host is and what terminal we claim to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub address: String,
    pub port: u16,
    /// Wrap the telnet session in TLS (for hosts behind a TLS proxy).
    pub tls: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Bytes sent in response to ENQ; the host recognises only its
    /// configured terminal models.
    pub answerback: Vec<u8>,
    /// Terminal names offered in order when the host keeps asking.
    pub terminals: Vec<String>,
    /// NAWS dimensions. The height is absurd on purpose: a tall window
    /// stops the host paginating long tables.
    pub window: (u16, u16),
    /// Screens retained for frame composition and diagnostics.
    pub history_len: usize,
    /// Overall budget for the login dialogue.
    pub login_deadline: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 23,
            tls: false,
            user: None,
            password: None,
            answerback: b"VT100\r".to_vec(),
            terminals: vec![
                String::new(),
                "VT100".to_owned(),
                "VT102".to_owned(),
                "NETWORK-VIRTUAL-TERMINAL".to_owned(),
                "UNKNWN".to_owned(),
            ],
            window: (128, 5000),
            history_len: 5,
            login_deadline: Duration::from_secs(30),
        }
    }
}

// ── Dialect ───────────────────────────────────────────────────────────────

/// Site-specific strings: prompts, screen-type tags, and menu mnemonics.
///
/// The driver treats every mnemonic as an opaque string to send by name;
/// which screens they lead to is the host's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Identifier sent at the first login prompt (selects the host module).
    pub system_user: String,
    pub login_prompt: String,
    /// Prompt before the per-user identifier, if the host asks.
    pub user_prompt: Option<String>,
    /// Prompt before the password, if the host asks.
    pub password_prompt: Option<String>,
    /// Classifier tag of the live main menu.
    pub main_menu: String,
    /// Classifier tag of the training-system main menu.
    pub main_menu_training: String,
    /// Classifier tag of the forced password-change screen.
    pub change_password: String,
    /// Key(s) the host reads as "cancel / back".
    pub cancel_action: String,
    /// Switch to the training sub-system.
    pub training_system: String,

    // Menu mnemonics, in the order the workflows reach for them.
    pub specimen_enquiry: String,
    pub patient_enquiry: String,
    pub update_set_result: String,
    pub privileges: String,
    pub set_maintenance: String,
    pub auth_intervention: String,
    pub auth_rules: String,
    pub auto_comments: String,
    pub overdue_samples: String,
    pub overdue_automation: String,
    pub overdue_sendaways: String,
    pub set_history: String,
    pub release: String,
    pub na: String,
    pub quit: String,
    /// Bare carriage return, used to step back out of sub-screens.
    pub empty: String,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            system_user: "AIX".to_owned(),
            login_prompt: "login: ".to_owned(),
            user_prompt: Some("User ID :".to_owned()),
            password_prompt: Some("Password:".to_owned()),
            main_menu: "MainMenu".to_owned(),
            main_menu_training: "MainMenuTraining".to_owned(),
            change_password: "ChangePassword".to_owned(),
            cancel_action: "^".to_owned(),
            training_system: "TRAIN".to_owned(),
            specimen_enquiry: "SENQ".to_owned(),
            patient_enquiry: "PENQ".to_owned(),
            update_set_result: "U".to_owned(),
            privileges: "PRIVS".to_owned(),
            set_maintenance: "SETM".to_owned(),
            auth_intervention: "NPSET".to_owned(),
            auth_rules: "SNPCL".to_owned(),
            auto_comments: "AUCOM".to_owned(),
            overdue_samples: "OVRW".to_owned(),
            overdue_automation: "AUTO".to_owned(),
            overdue_sendaways: "AWAY".to_owned(),
            set_history: "H".to_owned(),
            release: "R".to_owned(),
            na: "NA".to_owned(),
            quit: "Q".to_owned(),
            empty: String::new(),
        }
    }
}

impl Dialect {
    /// Look up a mnemonic by its directive name.
    fn mnemonic_slot(&mut self, name: &str) -> Option<&mut String> {
        Some(match name {
            "specimen-enquiry" => &mut self.specimen_enquiry,
            "patient-enquiry" => &mut self.patient_enquiry,
            "update-result" => &mut self.update_set_result,
            "privileges" => &mut self.privileges,
            "set-maintenance" => &mut self.set_maintenance,
            "auth-intervention" => &mut self.auth_intervention,
            "auth-rules" => &mut self.auth_rules,
            "auto-comments" => &mut self.auto_comments,
            "overdue-samples" => &mut self.overdue_samples,
            "overdue-automation" => &mut self.overdue_automation,
            "overdue-sendaways" => &mut self.overdue_sendaways,
            "set-history" => &mut self.set_history,
            "release" => &mut self.release,
            "na" => &mut self.na,
            "quit" => &mut self.quit,
            "empty" => &mut self.empty,
            "training" => &mut self.training_system,
            _ => return None,
        })
    }
}

// ── Config ────────────────────────────────────────────────────────────────

/// Everything loaded from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub host: HostConfig,
    pub dialect: Dialect,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a directive string on top of the defaults.
    ///
    /// Returns the config and any per-line errors; recognised lines apply
    /// even when other lines are bad.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();
        let mut err = |line: usize, message: String| errors.push(ConfigError { line, message });
        // The built-in terminal list is replaced, not extended, the first
        // time a `terminal` directive appears.
        let mut terminals_reset = false;

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let (key, rest) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));
            let args = split_args(rest.trim());

            let expect_one = || -> Option<String> {
                if args.len() == 1 {
                    Some(args[0].clone())
                } else {
                    None
                }
            };

            match key {
                "host" => match expect_one() {
                    Some(v) => config.host.address = v,
                    None => err(lineno, "host takes one value".into()),
                },
                "port" => match expect_one().and_then(|v| v.parse().ok()) {
                    Some(p) => config.host.port = p,
                    None => err(lineno, "port takes one number".into()),
                },
                "tls" => match expect_one().as_deref() {
                    Some("on") => config.host.tls = true,
                    Some("off") => config.host.tls = false,
                    _ => err(lineno, "tls takes 'on' or 'off'".into()),
                },
                "user" => config.host.user = expect_one(),
                "password" => config.host.password = expect_one(),
                "answerback" => match expect_one() {
                    Some(v) => config.host.answerback = v.into_bytes(),
                    None => err(lineno, "answerback takes one (quoted) value".into()),
                },
                "terminal" => {
                    if !terminals_reset {
                        config.host.terminals.clear();
                        terminals_reset = true;
                    }
                    config.host.terminals.push(args.first().cloned().unwrap_or_default());
                }
                "window" => {
                    let dims: Vec<u16> =
                        args.iter().filter_map(|a| a.parse().ok()).collect();
                    match dims.as_slice() {
                        [w, h] => config.host.window = (*w, *h),
                        _ => err(lineno, "window takes width and height".into()),
                    }
                }
                "history" => match expect_one().and_then(|v| v.parse().ok()) {
                    Some(n) => config.host.history_len = n,
                    None => err(lineno, "history takes one number".into()),
                },
                "login-deadline-ms" => match expect_one().and_then(|v| v.parse().ok()) {
                    Some(ms) => config.host.login_deadline = Duration::from_millis(ms),
                    None => err(lineno, "login-deadline-ms takes one number".into()),
                },
                "system-user" => match expect_one() {
                    Some(v) => config.dialect.system_user = v,
                    None => err(lineno, "system-user takes one value".into()),
                },
                "login-prompt" => match expect_one() {
                    Some(v) => config.dialect.login_prompt = v,
                    None => err(lineno, "login-prompt takes one value".into()),
                },
                "user-prompt" => config.dialect.user_prompt = expect_one(),
                "password-prompt" => config.dialect.password_prompt = expect_one(),
                "cancel" => match expect_one() {
                    Some(v) => config.dialect.cancel_action = v,
                    None => err(lineno, "cancel takes one value".into()),
                },
                "main-menu-type" => match expect_one() {
                    Some(v) => config.dialect.main_menu = v,
                    None => err(lineno, "main-menu-type takes one value".into()),
                },
                "training-menu-type" => match expect_one() {
                    Some(v) => config.dialect.main_menu_training = v,
                    None => err(lineno, "training-menu-type takes one value".into()),
                },
                "change-password-type" => match expect_one() {
                    Some(v) => config.dialect.change_password = v,
                    None => err(lineno, "change-password-type takes one value".into()),
                },
                "mnemonic" => match args.as_slice() {
                    [name, value] => match config.dialect.mnemonic_slot(name) {
                        Some(slot) => *slot = value.clone(),
                        None => err(lineno, format!("unknown mnemonic '{name}'")),
                    },
                    [name] => match config.dialect.mnemonic_slot(name) {
                        Some(slot) => slot.clear(),
                        None => err(lineno, format!("unknown mnemonic '{name}'")),
                    },
                    _ => err(lineno, "mnemonic takes a name and a value".into()),
                },
                other => err(lineno, format!("unknown directive '{other}'")),
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// The conventional config location (`…/labtel/labtel.conf`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "labtel").map(|d| d.config_dir().join("labtel.conf"))
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────

/// Split a directive's argument text into tokens, honouring double quotes.
///
/// Inside quotes, `\r` `\n` `\t` `\\` `\"` and `\e` escapes are decoded so
/// answerbacks and prompts can carry control bytes.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut any = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if !in_quotes => {
                in_quotes = true;
                any = true;
            }
            '"' if in_quotes => in_quotes = false,
            '\\' if in_quotes => {
                let escaped = match chars.next() {
                    Some('r') => '\r',
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('e') => '\x1b',
                    Some(c) => c,
                    None => break,
                };
                cur.push(escaped);
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if any {
                    args.push(std::mem::take(&mut cur));
                    any = false;
                }
            }
            c => {
                cur.push(c);
                any = true;
            }
        }
    }
    if any {
        args.push(cur);
    }
    args
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.host.port, 23);
        assert_eq!(c.dialect.cancel_action, "^");
        assert_eq!(c.dialect.main_menu, "MainMenu");
        assert!(c.host.terminals.len() > 1);
    }

    #[test]
    fn load_basic_directives() {
        let (c, errs) = Config::load_str(
            "; site config\n\
             host 10.1.2.3\n\
             port 2300\n\
             user J.BLOGGS\n\
             answerback \"PTERM:CHM\\r\"\n\
             system-user CHM\n",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.host.address, "10.1.2.3");
        assert_eq!(c.host.port, 2300);
        assert_eq!(c.host.user.as_deref(), Some("J.BLOGGS"));
        assert_eq!(c.host.answerback, b"PTERM:CHM\r");
        assert_eq!(c.dialect.system_user, "CHM");
    }

    #[test]
    fn terminal_directives_replace_defaults() {
        let (c, errs) = Config::load_str("terminal VT220\nterminal VT320\n");
        assert!(errs.is_empty());
        assert_eq!(c.host.terminals, vec!["VT220".to_owned(), "VT320".to_owned()]);
    }

    #[test]
    fn mnemonic_overrides() {
        let (c, errs) = Config::load_str("mnemonic specimen-enquiry ENQ_S\nmnemonic quit STOP\n");
        assert!(errs.is_empty());
        assert_eq!(c.dialect.specimen_enquiry, "ENQ_S");
        assert_eq!(c.dialect.quit, "STOP");
    }

    #[test]
    fn unknown_directive_reports_line() {
        let (_, errs) = Config::load_str("host h\nnonsense here\n");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 2);
    }

    #[test]
    fn unknown_mnemonic_reported() {
        let (_, errs) = Config::load_str("mnemonic frobnicate F\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("frobnicate"));
    }

    #[test]
    fn quoted_prompt_keeps_trailing_space() {
        let (c, errs) = Config::load_str("login-prompt \"login: \"\n");
        assert!(errs.is_empty());
        assert_eq!(c.dialect.login_prompt, "login: ");
    }

    #[test]
    fn window_parses_dimensions() {
        let (c, errs) = Config::load_str("window 80 24\n");
        assert!(errs.is_empty());
        assert_eq!(c.host.window, (80, 24));
    }

    #[test]
    fn bad_lines_do_not_stop_good_ones() {
        let (c, errs) = Config::load_str("port fish\nhost ok\n");
        assert_eq!(errs.len(), 1);
        assert_eq!(c.host.address, "ok");
    }

    #[test]
    fn split_args_quotes_and_escapes() {
        assert_eq!(split_args("a b"), vec!["a", "b"]);
        assert_eq!(split_args("\"a b\" c"), vec!["a b", "c"]);
        assert_eq!(split_args("\"x\\r\""), vec!["x\r"]);
        assert_eq!(split_args("\"\""), vec![""]);
        assert!(split_args("").is_empty());
    }

    #[test]
    fn load_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labtel.conf");
        std::fs::write(&path, "host filehost\nport 24\n").unwrap();
        let (c, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(c.host.address, "filehost");
        assert_eq!(c.host.port, 24);
    }
}
