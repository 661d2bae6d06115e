//! The two datatypes every RELAX NG implementation provides.

use super::{Datatype, DatatypeError, ValidationContext};

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum BuiltinDatatypes {
    String,
    Token,
}

impl BuiltinDatatypes {
    pub fn compile(name: &str, params: &[(String, String)]) -> Result<Self, DatatypeError> {
        let dt = match name {
            "string" => BuiltinDatatypes::String,
            "token" => BuiltinDatatypes::Token,
            _ => {
                return Err(DatatypeError::Unsupported {
                    library: super::RELAX_NG_LIBRARY.to_string(),
                    name: name.to_string(),
                });
            }
        };
        if !params.is_empty() {
            return Err(DatatypeError::ParamsNotAllowed {
                name: name.to_string(),
            });
        }
        Ok(dt)
    }
}

impl Datatype for BuiltinDatatypes {
    fn is_valid(&self, _value: &str, _ctx: &dyn ValidationContext) -> bool {
        true
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum BuiltinDatatypeValues {
    String(String),
    /// Stored whitespace-normalized.
    Token(String),
}

impl BuiltinDatatypeValues {
    pub fn compile(name: &str, value: &str) -> Result<Self, DatatypeError> {
        match name {
            "string" => Ok(BuiltinDatatypeValues::String(value.to_string())),
            "token" => Ok(BuiltinDatatypeValues::Token(normalize_whitespace(value))),
            _ => Err(DatatypeError::Unsupported {
                library: super::RELAX_NG_LIBRARY.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

impl Datatype for BuiltinDatatypeValues {
    fn is_valid(&self, value: &str, _ctx: &dyn ValidationContext) -> bool {
        match self {
            BuiltinDatatypeValues::String(s) => s == value,
            BuiltinDatatypeValues::Token(s) => *s == normalize_whitespace(value),
        }
    }
}

pub fn is_whitespace_char(c: char) -> bool {
    matches!(c, '\x20' | '\x09' | '\x0d' | '\x0a')
}

/// Strip leading and trailing whitespace and collapse internal runs to a single
/// space.
pub fn normalize_whitespace(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for token in value.split(is_whitespace_char).filter(|t| !t.is_empty()) {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(token);
    }
    result
}
