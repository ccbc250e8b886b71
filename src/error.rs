use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config read error ({path}): {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config schema ({path}): {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("curl not found in PATH")]
    TransportMissing,
    #[error("Seed failed (rc={}): {stderr}", describe_code(.code))]
    SeedFailed { code: Option<i32>, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Notification error: {0}")]
    Notify(String),
}

impl Error {
    /// Process exit status reported for a fatal error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ConfigRead { .. }
            | Error::ConfigParse { .. }
            | Error::Config(_)
            | Error::UrlParse(_) => 2,
            Error::TransportMissing => 127,
            Error::SeedFailed { code, .. } => code
                .and_then(|c| u8::try_from(c).ok())
                .filter(|c| *c != 0)
                .unwrap_or(1),
            Error::Io(_) | Error::Notify(_) => 1,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

pub type Result<T> = std::result::Result<T, Error>;
