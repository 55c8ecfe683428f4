//! Server configuration from command-line arguments.

use crate::connection::DEFAULT_MAX_FRAME_SIZE;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use thiserror::Error;

pub const HELP: &str = r#"
pxkv - A minimal in-memory key-value server

USAGE:
    pxkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>            Port to listen on (default: 6379)
        --max-frame-size <BYTES> Largest request accepted (default: 65536)
    -v, --version                Print version information
        --help                   Print this help message

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=debug) to change the log level.

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET color teal PX 60000
    OK
    127.0.0.1:6379> GET color
    teal
"#;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Largest request a connection will buffer
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid frame size: {0}")]
    InvalidFrameSize(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses command-line arguments (without the program name).
    pub fn from_args<I, T>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue("--host"))?;
                }
                "--port" | "-p" => {
                    let raw = args.next().ok_or(ConfigError::MissingValue("--port"))?;
                    config.port = raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?;
                }
                "--max-frame-size" => {
                    let raw = args
                        .next()
                        .ok_or(ConfigError::MissingValue("--max-frame-size"))?;
                    config.max_frame_size = match raw.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => return Err(ConfigError::InvalidFrameSize(raw)),
                    };
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
