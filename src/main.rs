//! keygrab passthrough tool.
//!
//! The smallest possible decision engine: grab every keyboard, hand each
//! captured transition straight back through the virtual keyboard, release
//! on SIGINT/SIGTERM. Useful for verifying a driver installation and as the
//! skeleton a real remapping engine starts from.

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run()
}

#[cfg(target_os = "macos")]
const USAGE: &str = "\
Usage: keygrab [--product NAME] [--config FILE]

Seizes every keyboard and forwards each key through the virtual keyboard
driver unchanged.

Options:
  --product NAME   capture only the keyboard with this product name
  --config FILE    load grab options from a TOML file
  -h, --help       print this help";

#[cfg(target_os = "macos")]
fn run() -> ExitCode {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use keygrab::{SendKeyError, Session};

    let options = match cli_options() {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // First signal asks the loop to release at the next event; a second
    // one exits immediately (exit code 130), letting the OS reclaim the
    // seized devices.
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) =
            signal_hook::flag::register_conditional_shutdown(signal, 130, Arc::clone(&stop))
        {
            log::warn!("could not register forced shutdown for signal {signal}: {err}");
        }
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            log::warn!("could not register handler for signal {signal}: {err}");
        }
    }

    log::info!("keygrab v{}", env!("CARGO_PKG_VERSION"));

    let mut session = match Session::grab(options) {
        Ok(session) => session,
        Err(err) => {
            log::error!("grab failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("passthrough running, press Ctrl-C to release");

    while !stop.load(Ordering::Relaxed) {
        let Some(event) = session.wait_key() else {
            log::warn!("capture side shut down, exiting");
            break;
        };
        match session.send_key(&event) {
            Ok(()) => {}
            Err(err @ (SendKeyError::UnrecognizedPage(_) | SendKeyError::InvalidValue(_))) => {
                // Keyboards also emit non-key elements (LED pages, vendor
                // telemetry); skip them and keep forwarding.
                log::debug!("skipped {event:?}: {err}");
            }
            Err(err) => {
                log::error!("send failed: {err}");
                break;
            }
        }
    }

    match session.release() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Hand-rolled argument loop; `Ok(None)` means help was printed.
#[cfg(target_os = "macos")]
fn cli_options() -> Result<Option<keygrab::GrabOptions>, String> {
    let mut options = keygrab::GrabOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--product" => {
                let name = args.next().ok_or("--product requires a value")?;
                options.product_filter = Some(name);
            }
            "--config" => {
                let path = args.next().ok_or("--config requires a value")?;
                let text = std::fs::read_to_string(&path)
                    .map_err(|err| format!("could not read {path}: {err}"))?;
                let file_options: keygrab::GrabOptions = toml::from_str(&text)
                    .map_err(|err| format!("could not parse {path}: {err}"))?;
                // A --product given before --config still wins.
                let filter = options.product_filter.take();
                options = file_options;
                if filter.is_some() {
                    options.product_filter = filter;
                }
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Some(options))
}

#[cfg(not(target_os = "macos"))]
fn run() -> ExitCode {
    log::error!("keygrab requires macOS (IOKit HID capture)");
    ExitCode::FAILURE
}
