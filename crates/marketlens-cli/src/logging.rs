use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_ONCE: OnceLock<()> = OnceLock::new();
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber once. Logs go to stderr so stdout carries
/// only command output.
pub fn init_logging() {
    LOGGER_ONCE.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter);

        if let Err(error) = tracing_subscriber::registry().with(fmt_layer).try_init() {
            eprintln!("logging disabled: {error}");
        }
    });
}

/// Outcome of the optional `.env` load, kept until logging is up.
#[derive(Debug, PartialEq, Eq)]
pub enum DotenvLoad {
    Loaded(PathBuf),
    Missing,
    Failed(String),
}

impl DotenvLoad {
    pub fn from_result(result: Result<PathBuf, dotenvy::Error>) -> Self {
        match result {
            Ok(path) => Self::Loaded(path),
            Err(error) if error.not_found() => Self::Missing,
            Err(error) => Self::Failed(error.to_string()),
        }
    }

    pub fn log(&self) {
        match self {
            Self::Loaded(path) => debug!(path = %path.display(), "loaded .env"),
            Self::Missing => {}
            Self::Failed(error) => debug!(%error, ".env present but not loaded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn missing_env_file_is_not_an_error() {
        let missing = dotenvy::Error::Io(io::Error::new(io::ErrorKind::NotFound, "no .env"));
        assert_eq!(DotenvLoad::from_result(Err(missing)), DotenvLoad::Missing);
    }

    #[test]
    fn unreadable_env_file_is_reported() {
        let malformed = dotenvy::Error::LineParse(String::from("API KEY=x"), 3);
        assert!(matches!(
            DotenvLoad::from_result(Err(malformed)),
            DotenvLoad::Failed(_)
        ));

        let denied = dotenvy::Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(
            DotenvLoad::from_result(Err(denied)),
            DotenvLoad::Failed(_)
        ));
    }

    #[test]
    fn loaded_file_keeps_its_path() {
        let path = PathBuf::from("/srv/marketlens/.env");
        assert_eq!(
            DotenvLoad::from_result(Ok(path.clone())),
            DotenvLoad::Loaded(path)
        );
    }
}
