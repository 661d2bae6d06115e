//! The grammar side of a streaming RELAX NG validator: name classes, the
//! pattern tree with its named rules, and the datatype libraries consulted by
//! `data` and `value` patterns.
//!
//! Turning schema source text into a [`model::Pattern`] is left to the
//! caller; [`model::Grammar`] collects the rules however they were produced.

pub mod datatype;
pub mod model;
pub mod name_class;
pub mod restrictions;

pub use datatype::{Datatype, DatatypeError, ValidationContext};
pub use name_class::{NameClass, QName, Specificity};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("reference to undefined pattern {name:?}")]
    UndefinedReference { name: String },
    /// no rule named `start` was defined
    #[error("grammar has no start rule")]
    StartRuleNotDefined,
    #[error("pattern {name:?} is defined more than once")]
    DuplicateDefinition { name: String },
    /// the rule was combined using both choice and interleave
    #[error("pattern {name:?} mixes choice and interleave combination")]
    IncompatibleCombination { name: String },
    #[error("{pattern_name} is not allowed inside {context}")]
    RestrictedPattern {
        pattern_name: &'static str,
        context: &'static str,
    },
    #[error("an attribute may not be named xmlns")]
    XmlnsAttributeForbidden,
    #[error("an attribute may not be in the xmlns namespace")]
    XmlnsNamespaceForbidden,
    #[error("anyName is not allowed in the except of anyName")]
    AnyNameInExcept,
    #[error("anyName is not allowed in the except of nsName")]
    AnyNameInNsNameExcept,
    #[error("nsName is not allowed in the except of nsName")]
    NsNameInNsNameExcept,
    #[error(transparent)]
    Datatype(#[from] DatatypeError),
}
