//! The event-driven validator.
//!
//! A [`Validator`] holds the current pattern of one validation run and moves
//! it forward through the derivatives of each document event.  When an event
//! cannot be matched it reports a [`Diagnostic`] and substitutes a recovery
//! pattern, so that a single mistake does not hide the rest of the document.

use crate::diagnostic::{Diagnostic, DiagnosticSink, ErrorKind};
use crate::pattern::{ContentType, PatId};
use crate::report;
use crate::schema::Schema;
use fnv::FnvHashMap;
use relaxng_grammar::QName;
use relaxng_grammar::datatype::PrefixBindings;
use relaxng_grammar::datatype::relax::is_whitespace_char;
use std::ops::Range;
use std::rc::Rc;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// An attribute of an element start event, with its name already resolved.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
    pub span: Option<Range<usize>>,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Attribute {
        Attribute {
            name,
            value: value.into(),
            span: None,
        }
    }
}

pub struct Validator<S = Vec<Diagnostic>> {
    schema: Rc<Schema>,
    sink: S,
    memo: PatId,
    had_error: bool,
    complete: bool,
    collecting_characters: bool,
    char_buf: String,
    prefix_mappings: Vec<(String, String)>,
    /// `find_element()` results for this run, by element name
    recover_table: FnvHashMap<QName, PatId>,
    span: Option<Range<usize>>,
}

impl Validator<Vec<Diagnostic>> {
    /// A validator collecting its diagnostics in a `Vec`.
    pub fn collecting(schema: Rc<Schema>) -> Self {
        Validator::new(schema, vec![])
    }
}

impl<S: DiagnosticSink> Validator<S> {
    pub fn new(schema: Rc<Schema>, sink: S) -> Self {
        let memo = schema.start();
        Validator {
            schema,
            sink,
            memo,
            had_error: false,
            complete: false,
            collecting_characters: false,
            char_buf: String::new(),
            prefix_mappings: vec![initial_binding()],
            recover_table: FnvHashMap::default(),
            span: None,
        }
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// False once any diagnostic has been reported in this run.
    pub fn is_valid_so_far(&self) -> bool {
        !self.had_error
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Source position of the event about to be delivered; attached to any
    /// diagnostic it causes.
    pub fn set_span(&mut self, span: Option<Range<usize>>) {
        self.span = span;
    }

    /// Rewind to the start of a fresh run against the same schema.  Derivative
    /// caches on the schema are kept.
    pub fn reset(&mut self) {
        self.memo = self.schema.start();
        self.had_error = false;
        self.complete = false;
        self.collecting_characters = false;
        self.char_buf.clear();
        self.prefix_mappings.clear();
        self.prefix_mappings.push(initial_binding());
        self.recover_table.clear();
        self.span = None;
    }

    pub fn start_document(&mut self) {
        if self.schema.is_not_allowed(self.memo) {
            self.error(ErrorKind::SchemaAllowsNothing, None, None);
        }
    }

    pub fn end_document(&mut self) {
        self.complete = true;
    }

    /// Bind `prefix` (empty for the default namespace) until the matching
    /// [`Validator::end_prefix_mapping`].
    pub fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.prefix_mappings
            .push((prefix.to_string(), uri.to_string()));
    }

    pub fn end_prefix_mapping(&mut self, prefix: &str) {
        // index 0 is the permanent xml binding
        if let Some(i) = self
            .prefix_mappings
            .iter()
            .rposition(|(p, _)| p == prefix)
            .filter(|i| *i > 0)
        {
            self.prefix_mappings.remove(i);
        }
    }

    pub fn start_element(&mut self, name: &QName, attributes: &[Attribute]) {
        let parent_collecting = self.collecting_characters;
        if parent_collecting {
            self.flush_characters();
        }
        let next = self.schema.start_tag_open_deriv(self.memo, name);
        if !self.set_memo(next) {
            let next = self.recover_start_tag(name, parent_collecting);
            self.memo = next;
        }
        for att in attributes {
            let next = self.schema.start_attribute_deriv(self.memo, &att.name);
            if !self.set_memo(next) {
                self.error(
                    ErrorKind::ImpossibleAttributeIgnored,
                    Some(&att.name),
                    att.span.clone(),
                );
                continue;
            }
            let next = self.schema.data_deriv(
                self.memo,
                &att.value,
                &PrefixBindings(&self.prefix_mappings),
            );
            if !self.set_memo(next) {
                self.error(ErrorKind::BadAttributeValue, Some(&att.name), att.span.clone());
                self.memo = self.schema.recover_after(self.memo);
            }
        }
        let next = self.schema.end_attributes_deriv(self.memo);
        if !self.set_memo(next) {
            self.error(ErrorKind::RequiredAttributesMissing, Some(name), None);
            self.memo = self.schema.ignore_missing_attributes_deriv(self.memo);
        }
        if self.schema.content_type(self.memo) == ContentType::Data {
            self.collecting_characters = true;
            self.char_buf.clear();
        }
    }

    fn recover_start_tag(&mut self, name: &QName, parent_collecting: bool) -> PatId {
        let recovered = self.schema.start_tag_open_recover_deriv(self.memo, name);
        if !self.schema.is_not_allowed(recovered) {
            self.error(ErrorKind::RequiredElementsMissing, Some(name), None);
            return recovered;
        }
        let found = self.find_element(name);
        if parent_collecting {
            // the parent admits only a data value; treat it as satisfied
            self.error(ErrorKind::OnlyTextNotAllowed, Some(name), None);
            let rest = self.schema.recover_after(self.memo);
            let parent = self.schema.after(self.schema.empty(), rest);
            return self.schema.after(found, parent);
        }
        let next = self.schema.after(found, self.memo);
        let kind = if self.schema.is_not_allowed(next) {
            ErrorKind::UnknownElement
        } else {
            ErrorKind::OutOfContextElement
        };
        self.error(kind, Some(name), None);
        next
    }

    fn find_element(&mut self, name: &QName) -> PatId {
        if let Some(found) = self.recover_table.get(name) {
            return *found;
        }
        let found = self.schema.find_element(name);
        self.recover_table.insert(name.clone(), found);
        found
    }

    pub fn characters(&mut self, text: &str) {
        if self.collecting_characters {
            self.char_buf.push_str(text);
        } else if !is_whitespace(text) {
            self.text();
        }
    }

    fn flush_characters(&mut self) {
        self.collecting_characters = false;
        if !is_whitespace(&self.char_buf) {
            self.text();
        }
        self.char_buf.clear();
    }

    fn text(&mut self) {
        let next = self.schema.mixed_text_deriv(self.memo);
        if !self.set_memo(next) {
            self.error(ErrorKind::TextNotAllowed, None, None);
        }
    }

    pub fn end_element(&mut self, name: &QName) {
        if self.collecting_characters {
            self.collecting_characters = false;
            let next = self.schema.text_only_deriv(self.memo);
            if !self.set_memo(next) {
                self.error(ErrorKind::OnlyTextNotAllowed, None, None);
                self.memo = self.schema.recover_after(self.memo);
                self.char_buf.clear();
                return;
            }
            let data = std::mem::take(&mut self.char_buf);
            let next = self.schema.data_deriv(
                self.memo,
                &data,
                &PrefixBindings(&self.prefix_mappings),
            );
            if !self.set_memo(next) {
                self.close_failed(ErrorKind::StringNotAllowed, name, |v| {
                    let fixed = v.schema.fix_after(v.memo);
                    let d = v.schema.data_deriv(fixed, &data, &PrefixBindings(&v.prefix_mappings));
                    v.schema.is_not_allowed(d)
                });
            }
        } else {
            let next = self.schema.end_tag_deriv(self.memo);
            if !self.set_memo(next) {
                self.close_failed(ErrorKind::UnfinishedElement, name, |v| {
                    let fixed = v.schema.fix_after(v.memo);
                    v.schema.is_not_allowed(v.schema.end_tag_deriv(fixed))
                });
            }
        }
    }

    /// Report a failed close only when it is not solely inherited from the
    /// failure of something after the current element: either recovery has
    /// somewhere to go, or the close fails even with nothing required after
    /// it.
    fn close_failed(
        &mut self,
        kind: ErrorKind,
        name: &QName,
        independent: impl FnOnce(&Self) -> bool,
    ) {
        let recovered = self.schema.recover_after(self.memo);
        if !self.schema.is_not_allowed(self.memo)
            && (!self.schema.is_not_allowed(recovered) || independent(self))
        {
            self.error(kind, Some(name), None);
        }
        self.memo = recovered;
    }

    fn set_memo(&mut self, next: PatId) -> bool {
        if self.schema.is_not_allowed(next) {
            false
        } else {
            self.memo = next;
            true
        }
    }

    fn error(&mut self, kind: ErrorKind, name: Option<&QName>, span: Option<Range<usize>>) {
        if self.had_error && self.schema.is_not_allowed(self.memo) {
            log::trace!("suppressed {kind} after earlier error");
            return;
        }
        self.had_error = true;
        let expected = report::describe_expected(&self.schema, self.memo);
        let diagnostic = Diagnostic {
            kind,
            name: name.cloned(),
            span: span.or_else(|| self.span.clone()),
            expected: (!expected.is_empty()).then_some(expected),
        };
        log::trace!("{diagnostic}");
        self.sink.error(diagnostic);
    }
}

fn initial_binding() -> (String, String) {
    ("xml".to_string(), XML_NAMESPACE.to_string())
}

fn is_whitespace(text: &str) -> bool {
    text.chars().all(is_whitespace_char)
}
