// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Errors raised while masking a statement or an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskError {
    /// Statement text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Statement could not be planned against the catalog.
    #[error("plan error: {0}")]
    Plan(String),
    /// A marker in the rewritten statement has no recorded original value.
    #[error("marker {0} is not registered")]
    MarkerNotRegistered(i64),
    /// No type could be inferred for a value.
    #[error("no type inferred for value {0}")]
    TypeInferenceGap(String),
    /// The original value could not be cast to its inferred type.
    #[error("cast error: {0}")]
    Cast(String),
    /// The mask function rejected the value.
    #[error("mask function error: {0}")]
    MaskFunction(String),
    /// An identifier had no entry in the name map.
    #[error("name map has no entry for {0}")]
    NameMapLookupMiss(String),
    #[error("no prepared statement found for id {0}")]
    PreparedStatementNotFound(u64),
    #[error("parameter count mismatch: expected {expected}, got {actual}")]
    ParamCountMismatch { expected: usize, actual: usize },
    #[error("unknown mask function `{0}`")]
    UnknownMaskFunction(String),
    #[error("config error: {0}")]
    Config(String),
    /// Accumulated soft errors.
    #[error("{}", join(.0))]
    Multiple(Vec<MaskError>),
}

fn join(errors: &[MaskError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl MaskError {
    /// Soft errors affect a single value; the rest of the statement is still
    /// usable.
    pub fn is_soft(&self) -> bool {
        match self {
            MaskError::TypeInferenceGap(_)
            | MaskError::Cast(_)
            | MaskError::MaskFunction(_)
            | MaskError::NameMapLookupMiss(_) => true,
            MaskError::Multiple(errors) => errors.iter().all(|e| e.is_soft()),
            _ => false,
        }
    }

    /// Combine accumulated errors into one, or None if there are none.
    pub fn from_many(mut errors: Vec<MaskError>) -> Option<MaskError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(MaskError::Multiple(errors)),
        }
    }

    /// Number of individual errors carried.
    pub fn count(&self) -> usize {
        match self {
            MaskError::Multiple(errors) => errors.iter().map(|e| e.count()).sum(),
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for MaskError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<MaskError>() {
            Ok(e) => e,
            Err(e) => MaskError::Plan(format!("{e:#}")),
        }
    }
}

/// Result of masking one statement or event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Every value was masked.
    Masked(T),
    /// Output is usable, but some values kept their original form.
    Problematic { output: T, errors: Vec<MaskError> },
    /// Nothing could be masked. `fallback` is the best-effort payload to forward.
    Failed { fallback: T, error: MaskError },
}

impl<T> Outcome<T> {
    pub fn from_parts(output: T, errors: Vec<MaskError>) -> Self {
        if errors.is_empty() {
            Outcome::Masked(output)
        } else {
            Outcome::Problematic { output, errors }
        }
    }

    /// The payload to forward, whatever the outcome.
    pub fn output(&self) -> &T {
        match self {
            Outcome::Masked(o) => o,
            Outcome::Problematic { output, .. } => output,
            Outcome::Failed { fallback, .. } => fallback,
        }
    }

    pub fn into_output(self) -> T {
        match self {
            Outcome::Masked(o) => o,
            Outcome::Problematic { output, .. } => output,
            Outcome::Failed { fallback, .. } => fallback,
        }
    }

    pub fn error(&self) -> Option<MaskError> {
        match self {
            Outcome::Masked(_) => None,
            Outcome::Problematic { errors, .. } => MaskError::from_many(errors.clone()),
            Outcome::Failed { error, .. } => Some(error.clone()),
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, Outcome::Masked(_))
    }

    pub fn is_problematic(&self) -> bool {
        matches!(self, Outcome::Problematic { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Masked(o) => Outcome::Masked(f(o)),
            Outcome::Problematic { output, errors } => Outcome::Problematic {
                output: f(output),
                errors,
            },
            Outcome::Failed { fallback, error } => Outcome::Failed {
                fallback: f(fallback),
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_hard() {
        assert!(MaskError::Cast("x".into()).is_soft());
        assert!(!MaskError::PreparedStatementNotFound(1).is_soft());
        let many = MaskError::from_many(vec![
            MaskError::Cast("a".into()),
            MaskError::TypeInferenceGap("1".into()),
        ]);
        assert!(matches!(&many, Some(e) if e.is_soft() && e.count() == 2));
        assert_eq!(
            many.map(|e| e.to_string()),
            Some("cast error: a; no type inferred for value 1".to_string())
        );
    }

    #[test]
    fn anyhow_roundtrip() {
        let e = anyhow::Error::new(MaskError::MarkerNotRegistered(1000));
        assert_eq!(MaskError::from(e), MaskError::MarkerNotRegistered(1000));
        let e = anyhow::anyhow!("unknown column");
        assert_eq!(MaskError::from(e), MaskError::Plan("unknown column".into()));
    }
}
