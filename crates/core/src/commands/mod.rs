pub mod destination;
pub mod synthesizer;
pub mod templates;
pub mod vocabulary;

use thiserror::Error;

use crate::commands::templates::Field;
use crate::domain::intent::IntentKind;

pub use destination::Destination;
pub use synthesizer::CommandSynthesizer;
pub use templates::{template_for, Arity, CommandTemplate, TEMPLATES};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("`{kind}` is missing required field `{field}`")]
    MissingField { kind: IntentKind, field: Field },
    #[error("`{value}` is not a recognised {field}")]
    UnknownVocabulary { field: Field, value: String },
    #[error("field `{field}` contains unsafe text `{value}`")]
    InvalidToken { field: Field, value: String },
    #[error("destination `{0}` is neither coordinates, a name, nor a known structure")]
    UnresolvedDestination(String),
}

impl SynthesisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::UnknownVocabulary { .. } => "unknown_vocabulary",
            Self::InvalidToken { .. } => "invalid_token",
            Self::UnresolvedDestination(_) => "unresolved_destination",
        }
    }
}
