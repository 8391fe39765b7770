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

    /// Config errors are the user's input; everything else surfaced by the core is a runtime
    /// failure.
    pub fn from_core(context: &'static str, err: surge_core::Error) -> Self {
        match err {
            surge_core::Error::Config(_) => {
                Self::InvalidInput(anyhow::Error::new(err).context(context))
            }
            surge_core::Error::Metrics(_) | surge_core::Error::Join(_) => {
                Self::RuntimeError(anyhow::Error::new(err).context(context))
            }
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
    fn config_errors_are_invalid_input() {
        let err = RunError::from_core(
            "invalid workload",
            surge_core::ConfigError::MissingBaseUrl.into(),
        );
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("invalid workload: missing target base URL"));
    }

    #[test]
    fn display_and_source_expose_the_whole_chain() {
        use std::error::Error as _;

        let err = RunError::RuntimeError(anyhow::anyhow!("disk full").context("failed to write"));
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
        assert_eq!(err.to_string(), "failed to write: disk full");
        assert_eq!(err.anyhow().root_cause().to_string(), "disk full");
        assert!(err.source().is_some());
    }
}
