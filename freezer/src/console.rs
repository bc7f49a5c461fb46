use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::device::{
    Provision, Session, SessionError, SessionState, TelemetrySettings, Transport,
};
use crate::util::interrupt::Interrupt;

const HELP: &str = "\
Commands:
  connect             provision the device and start publishing telemetry
  disconnect          stop telemetry and close the connection
  status              show the device state and telemetry settings
  interval <secs>     set the telemetry interval
  low <celsius>       set the lower temperature bound
  high <celsius>      set the upper temperature bound
  overheat on|off     simulate an overheating freezer
  help                show this message
  quit                disconnect and exit";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Connect,
    Disconnect,
    Status,
    Interval(Duration),
    Low(f64),
    High(f64),
    Overheat(bool),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for the list of commands")]
    Unknown(String),

    #[error("'{0}' expects {1}")]
    InvalidArgument(&'static str, &'static str),
}

fn argument<T: FromStr>(
    arg: Option<&str>,
    name: &'static str,
    expected: &'static str,
) -> Result<T, CommandError> {
    arg.and_then(|a| a.parse().ok())
        .ok_or(CommandError::InvalidArgument(name, expected))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let name = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();

        let command = match name.as_str() {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "status" => Command::Status,
            "interval" => {
                let secs: u64 = argument(arg, "interval", "a number of seconds")?;
                if secs == 0 {
                    return Err(CommandError::InvalidArgument(
                        "interval",
                        "a number of seconds greater than zero",
                    ));
                }
                Command::Interval(Duration::from_secs(secs))
            }
            "low" => Command::Low(argument(arg, "low", "a temperature")?),
            "high" => Command::High(argument(arg, "high", "a temperature")?),
            "overheat" => match arg.map(str::to_lowercase).as_deref() {
                Some("on" | "true") => Command::Overheat(true),
                Some("off" | "false") => Command::Overheat(false),
                _ => return Err(CommandError::InvalidArgument("overheat", "'on' or 'off'")),
            },
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(CommandError::Unknown(s.trim().to_owned())),
        };

        Ok(command)
    }
}

enum Step {
    Continue(String),
    Quit,
}

fn status<P, T>(session: &Session<P, T>) -> String
where
    P: Provision,
    T: Transport,
{
    let settings = session.settings();
    let state = match (session.state(), session.endpoint()) {
        (SessionState::Connected, Some(endpoint)) => {
            format!("connected to {}", endpoint.assigned_hub)
        }
        _ => "disconnected".to_owned(),
    };
    let temperature = match settings.fixed_temperature {
        Some(t) => format!("fixed at {t}"),
        None => format!(
            "between {} and {}",
            settings.temperature_low, settings.temperature_high
        ),
    };

    format!(
        "device {}: {state}\ntelemetry every {}s, temperature {temperature}, overheat {}",
        session.identity().device_id,
        settings.interval.as_secs(),
        if session.overheat() { "on" } else { "off" }
    )
}

async fn execute<P, T>(session: &mut Session<P, T>, command: Command, shutdown: &Interrupt) -> Step
where
    P: Provision,
    T: Transport,
{
    let controls = session.state().controls();

    let reply = match command {
        Command::Connect if !controls.connect => SessionError::AlreadyConnected.to_string(),
        Command::Connect => match session.connect(shutdown).await {
            Ok(()) => status(session),
            Err(e) => format!("connect failed: {e}"),
        },
        Command::Disconnect if !controls.disconnect => SessionError::NotConnected.to_string(),
        Command::Disconnect => match session.disconnect().await {
            Ok(()) => "disconnected".to_owned(),
            Err(e) => format!("disconnect failed: {e}"),
        },
        Command::Interval(_) | Command::Low(_) | Command::High(_) if !controls.edit_settings => {
            SessionError::SettingsLocked.to_string()
        }
        Command::Interval(interval) => update(session, |s| s.interval = interval)
            .unwrap_or_else(|| format!("interval set to {}s", interval.as_secs())),
        Command::Low(low) => {
            update(session, |s| s.temperature_low = low).unwrap_or_else(|| format!("low set to {low}"))
        }
        Command::High(high) => update(session, |s| s.temperature_high = high)
            .unwrap_or_else(|| format!("high set to {high}")),
        Command::Overheat(enabled) => {
            session.set_overheat(enabled);
            format!("overheat {}", if enabled { "on" } else { "off" })
        }
        Command::Status => status(session),
        Command::Help => HELP.to_owned(),
        Command::Quit => return Step::Quit,
    };

    Step::Continue(reply)
}

/// Apply a settings change, returning the error message if it was rejected
fn update<P, T, F>(session: &mut Session<P, T>, edit: F) -> Option<String>
where
    P: Provision,
    T: Transport,
    F: FnOnce(&mut TelemetrySettings),
{
    session.update_settings(edit).err().map(|e| e.to_string())
}

/// Read lines from stdin on a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it is kept out of the
/// runtime. The channel closes on EOF.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run the interactive console until the user quits, the input ends or
/// the shutdown interrupt is triggered. The device is disconnected before
/// returning.
#[instrument(name = "console", skip_all, err)]
pub async fn run<P, T>(
    mut session: Session<P, T>,
    mut input: mpsc::Receiver<String>,
    shutdown: Interrupt,
) -> Result<(), SessionError>
where
    P: Provision,
    T: Transport,
{
    println!("Freezer - {}", session.identity().device_id);
    println!("Type 'help' for the list of commands.");

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            line = input.recv() => line,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match execute(&mut session, command, &shutdown).await {
            Step::Continue(reply) => println!("{reply}"),
            Step::Quit => break,
        }
    }

    if session.is_connected() {
        if let Err(e) = session.disconnect().await {
            warn!("{e}");
            return Err(e);
        }
    }

    Ok(())
}
