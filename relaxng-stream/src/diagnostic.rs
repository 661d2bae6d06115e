use relaxng_grammar::QName;
use std::fmt;
use std::ops::Range;

/// The kinds of validity error a [`crate::Validator`] reports.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ErrorKind {
    /// The grammar matches no document at all.
    SchemaAllowsNothing,
    /// An element was accepted only by assuming earlier required siblings.
    RequiredElementsMissing,
    /// No element of this name appears anywhere in the grammar.
    UnknownElement,
    OutOfContextElement,
    ImpossibleAttributeIgnored,
    BadAttributeValue,
    RequiredAttributesMissing,
    /// Element content where only a data value may appear.
    OnlyTextNotAllowed,
    /// The character content of a data-valued element is not a valid value.
    StringNotAllowed,
    TextNotAllowed,
    UnfinishedElement,
}

impl ErrorKind {
    /// A stable identifier for the kind, suitable for matching in tests and
    /// tooling.
    pub fn key(self) -> &'static str {
        match self {
            ErrorKind::SchemaAllowsNothing => "schema_allows_nothing",
            ErrorKind::RequiredElementsMissing => "required_elements_missing",
            ErrorKind::UnknownElement => "unknown_element",
            ErrorKind::OutOfContextElement => "out_of_context_element",
            ErrorKind::ImpossibleAttributeIgnored => "impossible_attribute_ignored",
            ErrorKind::BadAttributeValue => "bad_attribute_value",
            ErrorKind::RequiredAttributesMissing => "required_attributes_missing",
            ErrorKind::OnlyTextNotAllowed => "only_text_not_allowed",
            ErrorKind::StringNotAllowed => "string_not_allowed",
            ErrorKind::TextNotAllowed => "text_not_allowed",
            ErrorKind::UnfinishedElement => "unfinished_element",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One validity error.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    /// The element or attribute the error concerns, where there is one.
    pub name: Option<QName>,
    /// Byte range in the source document, when the event source supplies
    /// positions.
    pub span: Option<Range<usize>>,
    /// What the grammar would have accepted instead.
    pub expected: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
        match self.kind {
            ErrorKind::SchemaAllowsNothing => f.write_str("schema does not allow any document"),
            ErrorKind::RequiredElementsMissing => {
                write!(f, "element {name} found before required elements")
            }
            ErrorKind::UnknownElement => write!(f, "element {name} not allowed anywhere"),
            ErrorKind::OutOfContextElement => write!(f, "element {name} not allowed here"),
            ErrorKind::ImpossibleAttributeIgnored => write!(f, "attribute {name} not allowed here"),
            ErrorKind::BadAttributeValue => write!(f, "bad value for attribute {name}"),
            ErrorKind::RequiredAttributesMissing => {
                write!(f, "element {name} missing required attributes")
            }
            ErrorKind::OnlyTextNotAllowed if self.name.is_some() => {
                write!(f, "element {name} not allowed here; only text is expected")
            }
            ErrorKind::OnlyTextNotAllowed => f.write_str("text-only content not allowed here"),
            ErrorKind::StringNotAllowed => write!(f, "character content of element {name} is invalid"),
            ErrorKind::TextNotAllowed => f.write_str("text not allowed here"),
            ErrorKind::UnfinishedElement => write!(f, "element {name} incomplete"),
        }?;
        if let Some(expected) = &self.expected {
            write!(f, "; expected {expected}")?;
        }
        Ok(())
    }
}

/// Receives the diagnostics of a validation run.
pub trait DiagnosticSink {
    fn error(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn error(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic)
    }
}
