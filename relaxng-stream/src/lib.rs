//! Streaming RELAX NG validation by derivatives.
//!
//! A [`Schema`] interns the patterns of a compiled grammar and memoizes their
//! derivatives.  A [`Validator`] walks one document at a time through the
//! schema, reporting [`Diagnostic`]s to a [`DiagnosticSink`] and recovering
//! so that one mistake does not produce a cascade of follow-on errors.
//! [`Reader`] drives a validator from XML text.
//!
//! ```
//! use relaxng_grammar::model::{Grammar, Pattern};
//! use relaxng_grammar::NameClass;
//! use relaxng_stream::{Config, Reader, ReaderOptions, Schema, Validator};
//!
//! let mut g = Grammar::new();
//! g.define("start", Pattern::element(NameClass::local("doc"), Pattern::Text)).unwrap();
//! let schema = Schema::compile(&g.finish().unwrap(), Config::default());
//!
//! let mut v = Validator::collecting(schema);
//! Reader::new("<doc>hello</doc>", ReaderOptions::default()).run(&mut v).unwrap();
//! assert!(v.into_sink().is_empty());
//! ```

mod config;
mod deriv;
pub mod diagnostic;
mod pattern;
pub mod reader;
pub mod report;
mod schema;
mod validator;

pub use config::Config;
pub use diagnostic::{Diagnostic, DiagnosticSink, ErrorKind};
pub use pattern::{ContentType, PatId};
pub use reader::{Reader, ReaderError, ReaderOptions};
pub use schema::{Schema, Stats};
pub use validator::{Attribute, Validator, XML_NAMESPACE};
