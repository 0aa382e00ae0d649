//! The CLI's own error type, for failures that happen above the engine: logger setup, settings
//! and import files, and a signer-side misuse the engine itself has no way to report because its
//! own error variants aren't constructible outside its crate.

use snafu::Snafu;
use std::path::PathBuf;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("{source}"))]
    Engine { source: tufrepo::Error },

    #[snafu(display("failed to initialize logger: {source}"))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse settings file {}: {source}", path.display()))]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("failed to read import file {}: {source}", path.display()))]
    ImportRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse import file {}: {source}", path.display()))]
    ImportParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("failed to read operator input: {source}"))]
    OperatorInput { source: std::io::Error },

    #[snafu(display("delegation {name:?} already exists"))]
    DelegationExists { name: String },

    #[snafu(display("no delegation named {name:?} was found"))]
    DelegationMissing { name: String },

    #[snafu(display("key id {keyid:?} is not valid hex"))]
    InvalidKeyId { keyid: String },
}

impl From<tufrepo::Error> for Error {
    fn from(source: tufrepo::Error) -> Self {
        Error::Engine { source }
    }
}
