use std::io::IsTerminal;
use std::process::ExitCode;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use labtel::classify::default_dialect;
use labtel::cli::{self, ConfigFile};
use labtel::config::Config;
use labtel::error::Error;
use labtel::session::Session;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("labtel: {e}");
            eprintln!();
            eprintln!("Usage: labtel [-f[<file>]] [-td] [<host> [<port>]]");
            eprintln!("Options:");
            eprintln!("  -f        don't load a config file");
            eprintln!("  -f<file>  load <file> instead of the default config");
            eprintln!("  -t        connect to the training sub-system");
            eprintln!("  -d        debug logging");
            eprintln!("Arguments:");
            eprintln!("  <host>    hostname or IP address (overrides config)");
            eprintln!("  <port>    port number (default 23)");
            return ExitCode::FAILURE;
        }
    };

    init_logging(args.debug);

    let mut config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("labtel: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = &args.host {
        config.host.address = host.clone();
    }
    if let Some(port) = args.port {
        config.host.port = port;
    }
    if config.host.address.is_empty() {
        eprintln!("labtel: no host configured; pass one or set `host` in the config file");
        return ExitCode::FAILURE;
    }

    // Ask for anything the host will prompt for that the config leaves out;
    // the password is read with echo off.
    if config.dialect.user_prompt.is_some() && config.host.user.is_none() {
        match cli::prompt_line("Username: ") {
            Ok(u) => config.host.user = Some(u),
            Err(e) => {
                eprintln!("labtel: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    if config.dialect.password_prompt.is_some() && config.host.password.is_none() {
        match cli::prompt_secret("Password: ") {
            Ok(p) => config.host.password = Some(p),
            Err(e) => {
                eprintln!("labtel: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut session = Session::new(config, Box::new(default_dialect()));
    let outcome = run(&mut session, args.training).await;
    // Whatever happened, end the telnet session before reporting.
    session.disconnect().await;

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "labtel=debug" } else { "labtel=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let ansi = std::io::stderr().is_terminal();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(ansi).compact())
        .init();
}

fn load_config(choice: &ConfigFile) -> Result<Config, String> {
    let path = match choice {
        ConfigFile::Skip => return Ok(Config::default()),
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => Config::default_path().filter(|p| p.exists()),
    };
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let (config, errors) =
        Config::load_file(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    for err in &errors {
        eprintln!("labtel: {}: {err}", path.display());
    }
    Ok(config)
}

/// Connect and run the inspection loop: typed mnemonics go to the host,
/// each response is rendered, classified, and printed.
async fn run(session: &mut Session, training: bool) -> Result<(), Error> {
    session.connect(training).await?;
    print_screen(session);

    loop {
        let line = match cli::prompt_line("labtel> ") {
            Ok(l) => l,
            Err(_) => break,
        };
        match line.trim() {
            "/quit" | "/q" => break,
            "/screen" => {
                print_screen(session);
                continue;
            }
            "/menu" => {
                session.return_to_main_menu(false, 10).await?;
                print_screen(session);
                continue;
            }
            "/read" => {}
            text => session.send(text).await?,
        }
        match session.read().await {
            Ok(_) => print_screen(session),
            Err(Error::Timeout) => println!("(no response)"),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn print_screen(session: &Session) {
    let screen = session.screen();
    println!("┌── {} ──", screen.kind);
    for line in &screen.lines {
        println!("│ {line}");
    }
    println!("└──");
    if !screen.options.is_empty() {
        println!(
            "options: {} (default <{}>)",
            screen.options.join(" / "),
            screen.default_option
        );
    }
    for err in &screen.errors {
        println!("host error: {err}");
    }
    for aux in &screen.aux_data {
        println!("aux capture: {} bytes", aux.len());
    }
    if screen.bell {
        println!("(bell)");
    }
}
