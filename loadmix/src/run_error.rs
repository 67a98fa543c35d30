use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration errors raised by the engine are input errors; anything else is a runtime
    /// failure.
    pub fn classify(context: &'static str, err: loadmix_core::Error) -> Self {
        if err.is_config() {
            Self::InvalidInput(anyhow::Error::new(err).context(context))
        } else {
            Self::RuntimeError(anyhow::Error::new(err).context(context))
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_errors_are_invalid_input() {
        let err = RunError::classify(
            "scenario run failed",
            loadmix_core::ConfigError::EmptyCredentials.into(),
        );
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().contains("credential pool must not be empty"));

        let io = std::io::Error::other("disk full");
        let err = RunError::classify("scenario run failed", io.into());
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
    }
}
