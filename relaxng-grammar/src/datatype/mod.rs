//! The datatype capability consumed by `data` and `value` patterns.
//!
//! The validator treats datatypes as opaque: it only asks whether a literal is
//! acceptable in a given namespace context.  Two libraries are built in (the
//! RELAX NG `string`/`token` pair and a subset of XML Schema datatypes);
//! anything else can be plugged in through [`ExternalDatatype`] and
//! [`ExternalValue`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use thiserror::Error;

pub mod relax;
pub mod xsd;

/// The library URI of the RELAX NG built-in datatypes.
pub const RELAX_NG_LIBRARY: &str = "";

/// In-scope information a datatype may need to interpret a literal.
pub trait ValidationContext {
    fn resolve_namespace_prefix(&self, prefix: &str) -> Option<&str>;

    fn base_uri(&self) -> Option<&str> {
        None
    }

    fn is_unparsed_entity(&self, _name: &str) -> bool {
        false
    }

    fn is_notation(&self, _name: &str) -> bool {
        false
    }
}

/// A context with no namespace bindings at all.
pub struct EmptyContext;

impl ValidationContext for EmptyContext {
    fn resolve_namespace_prefix(&self, _prefix: &str) -> Option<&str> {
        None
    }
}

/// A fixed list of `(prefix, namespace_uri)` bindings, later entries shadowing
/// earlier ones.  The empty prefix names the default namespace.
pub struct PrefixBindings<'a>(pub &'a [(String, String)]);

impl ValidationContext for PrefixBindings<'_> {
    fn resolve_namespace_prefix(&self, prefix: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

pub trait Datatype {
    fn is_valid(&self, value: &str, ctx: &dyn ValidationContext) -> bool;

    /// Compare a literal against a value spelled out in the schema.
    fn same_value(&self, expected: &str, value: &str, ctx: &dyn ValidationContext) -> bool {
        self.is_valid(value, ctx) && expected == value
    }

    /// True if the outcome of `is_valid` may depend on the context, in which
    /// case results must not be cached across documents.
    fn is_context_dependent(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
pub enum DatatypeError {
    #[error("unknown datatype library {0:?}")]
    UnknownLibrary(String),
    #[error("datatype {name:?} is not supported by library {library:?}")]
    Unsupported { library: String, name: String },
    #[error("datatype {name:?} does not accept parameters")]
    ParamsNotAllowed { name: String },
    #[error("invalid facet for {type_name}: {facet}")]
    Facet {
        type_name: &'static str,
        facet: FacetError,
    },
    #[error("{value:?} is not a valid value of {type_name}")]
    InvalidValue { type_name: String, value: String },
}

#[derive(Debug, Error)]
pub enum FacetError {
    #[error("conflicting facets: {0}")]
    ConflictingFacet(&'static str),
    #[error("facet {0:?} is not allowed here")]
    UnknownFacet(String),
    #[error("{0:?} is not a valid integer")]
    InvalidInt(String),
    #[error("{0:?} is not a valid number")]
    InvalidNumber(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Datatypes usable in `data` patterns.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Datatypes {
    Relax(relax::BuiltinDatatypes),
    Xsd(xsd::XsdDatatypes),
    External(ExternalDatatype),
}

impl Datatype for Datatypes {
    fn is_valid(&self, value: &str, ctx: &dyn ValidationContext) -> bool {
        match self {
            Datatypes::Relax(dt) => dt.is_valid(value, ctx),
            Datatypes::Xsd(dt) => dt.is_valid(value, ctx),
            Datatypes::External(dt) => dt.imp.is_valid(value, ctx),
        }
    }

    fn is_context_dependent(&self) -> bool {
        match self {
            Datatypes::Relax(_) => false,
            Datatypes::Xsd(dt) => dt.is_context_dependent(),
            Datatypes::External(dt) => dt.imp.is_context_dependent(),
        }
    }
}

/// Fixed values usable in `value` patterns.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum DatatypeValues {
    Relax(relax::BuiltinDatatypeValues),
    Xsd(xsd::XsdDatatypeValues),
    External(ExternalValue),
}

impl Datatype for DatatypeValues {
    fn is_valid(&self, value: &str, ctx: &dyn ValidationContext) -> bool {
        match self {
            DatatypeValues::Relax(v) => v.is_valid(value, ctx),
            DatatypeValues::Xsd(v) => v.is_valid(value, ctx),
            DatatypeValues::External(v) => v.imp.same_value(&v.value, value, ctx),
        }
    }

    fn is_context_dependent(&self) -> bool {
        match self {
            DatatypeValues::Relax(_) => false,
            DatatypeValues::Xsd(v) => v.is_context_dependent(),
            DatatypeValues::External(v) => v.imp.is_context_dependent(),
        }
    }
}

/// A datatype implemented outside this crate, identified for interning
/// purposes by its library, name and parameters.
#[derive(Clone)]
pub struct ExternalDatatype {
    library: String,
    name: String,
    params: Vec<(String, String)>,
    imp: Rc<dyn Datatype>,
}

impl ExternalDatatype {
    pub fn new(
        library: impl Into<String>,
        name: impl Into<String>,
        params: Vec<(String, String)>,
        imp: Rc<dyn Datatype>,
    ) -> ExternalDatatype {
        ExternalDatatype {
            library: library.into(),
            name: name.into(),
            params,
            imp,
        }
    }
}

impl PartialEq for ExternalDatatype {
    fn eq(&self, other: &Self) -> bool {
        self.library == other.library && self.name == other.name && self.params == other.params
    }
}
impl Eq for ExternalDatatype {}
impl Hash for ExternalDatatype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.library.hash(state);
        self.name.hash(state);
        self.params.hash(state);
    }
}
impl fmt::Debug for ExternalDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalDatatype")
            .field("library", &self.library)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Clone)]
pub struct ExternalValue {
    library: String,
    name: String,
    value: String,
    imp: Rc<dyn Datatype>,
}

impl ExternalValue {
    pub fn new(
        library: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        imp: Rc<dyn Datatype>,
    ) -> ExternalValue {
        ExternalValue {
            library: library.into(),
            name: name.into(),
            value: value.into(),
            imp,
        }
    }
}

impl PartialEq for ExternalValue {
    fn eq(&self, other: &Self) -> bool {
        self.library == other.library && self.name == other.name && self.value == other.value
    }
}
impl Eq for ExternalValue {}
impl Hash for ExternalValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.library.hash(state);
        self.name.hash(state);
        self.value.hash(state);
    }
}
impl fmt::Debug for ExternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalValue")
            .field("library", &self.library)
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}

/// Resolves datatype references from the built-in libraries.
#[derive(Default)]
pub struct Compiler {
    xsd: xsd::Compiler,
}

impl Compiler {
    pub fn datatype_name(
        &self,
        library: &str,
        name: &str,
        params: &[(String, String)],
    ) -> Result<Datatypes, DatatypeError> {
        match library {
            RELAX_NG_LIBRARY => relax::BuiltinDatatypes::compile(name, params).map(Datatypes::Relax),
            xsd::NAMESPACE_URI => self.xsd.compile(name, params).map(Datatypes::Xsd),
            _ => Err(DatatypeError::UnknownLibrary(library.to_string())),
        }
    }

    /// `ns` holds the namespace bindings in scope where the value was written,
    /// needed for QName-valued datatypes.
    pub fn datatype_value(
        &self,
        library: &str,
        name: &str,
        value: &str,
        ns: &[(String, String)],
    ) -> Result<DatatypeValues, DatatypeError> {
        match library {
            RELAX_NG_LIBRARY => {
                relax::BuiltinDatatypeValues::compile(name, value).map(DatatypeValues::Relax)
            }
            xsd::NAMESPACE_URI => self
                .xsd
                .compile_value(name, value, &PrefixBindings(ns))
                .map(DatatypeValues::Xsd),
            _ => Err(DatatypeError::UnknownLibrary(library.to_string())),
        }
    }
}
