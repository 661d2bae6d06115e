//! An event source driving a [`Validator`] from XML text, built on
//! `xmlparser`'s tokenizer.
//!
//! Namespace prefixes are resolved here, entity references in text and
//! attribute values are expanded (internal entities only), and the span of
//! each event is passed along so diagnostics can point into the source.

use crate::diagnostic::DiagnosticSink;
use crate::validator::{Attribute, Validator, XML_NAMESPACE};
use fnv::FnvHashMap;
use relaxng_grammar::QName;
use std::borrow::Cow;
use std::ops::Range;
use thiserror::Error;
use xmlparser::{ElementEnd, EntityDefinition, StrSpan, Token, Tokenizer};

/// Failures of the XML front end.  These end the validation run.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Xml(#[from] xmlparser::Error),
    #[error("the prefix {prefix:?} is not defined")]
    UndefinedNamespacePrefix { prefix: String, span: Range<usize> },
    #[error("the entity &{name}; is not defined")]
    UndefinedEntity { name: String, span: Range<usize> },
    #[error("invalid or unclosed entity reference")]
    InvalidOrUnclosedEntity { span: Range<usize> },
    #[error("external entity {name:?} is not supported")]
    ExternalEntity { name: String, span: Range<usize> },
    #[error("end tag </{found}> does not match start tag <{expected}>")]
    MismatchedEndTag {
        expected: String,
        found: String,
        span: Range<usize>,
    },
    #[error("element <{name}> is never closed")]
    UnclosedElement { name: String, span: Range<usize> },
}

impl ReaderError {
    /// Byte range of the problem in the source, where known.  Syntax errors
    /// carry a line/column position instead.
    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            ReaderError::Xml(_) => None,
            ReaderError::UndefinedNamespacePrefix { span, .. }
            | ReaderError::UndefinedEntity { span, .. }
            | ReaderError::InvalidOrUnclosedEntity { span }
            | ReaderError::ExternalEntity { span, .. }
            | ReaderError::MismatchedEndTag { span, .. }
            | ReaderError::UnclosedElement { span, .. } => Some(span.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReaderOptions {
    /// Treat an undeclared namespace prefix as an error rather than as no
    /// namespace.
    pub strict_namespaces: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            strict_namespaces: true,
        }
    }
}

pub struct Reader<'a> {
    tokenizer: Tokenizer<'a>,
    options: ReaderOptions,
    stack: ElementStack<'a>,
    entities: FnvHashMap<String, String>,
    text: String,
    text_span: Option<Range<usize>>,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, options: ReaderOptions) -> Reader<'a> {
        let entities = [
            ("lt", "<"),
            ("gt", ">"),
            ("amp", "&"),
            ("apos", "'"),
            ("quot", "\""),
        ]
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
        Reader {
            tokenizer: Tokenizer::from(source),
            options,
            stack: ElementStack::default(),
            entities,
            text: String::new(),
            text_span: None,
        }
    }

    /// Feed the whole document through `validator`.  Validity problems go to
    /// the validator's sink; only malformed input is returned as an error.
    pub fn run<S: DiagnosticSink>(mut self, validator: &mut Validator<S>) -> Result<(), ReaderError> {
        validator.start_document();
        while let Some(token) = self.tokenizer.next() {
            self.token(token?, validator)?;
        }
        if let Some(open) = self.stack.elements.last() {
            return Err(ReaderError::UnclosedElement {
                name: open.qualified_name(),
                span: open.start..open.start + 1,
            });
        }
        validator.end_document();
        Ok(())
    }

    fn token<S: DiagnosticSink>(
        &mut self,
        token: Token<'a>,
        validator: &mut Validator<S>,
    ) -> Result<(), ReaderError> {
        match token {
            // no effect on validation, and text either side stays one run
            Token::Declaration { .. }
            | Token::ProcessingInstruction { .. }
            | Token::Comment { .. }
            | Token::DtdStart { .. }
            | Token::EmptyDtd { .. }
            | Token::DtdEnd { .. } => {}
            Token::EntityDeclaration {
                name,
                definition,
                span,
            } => match definition {
                EntityDefinition::EntityValue(value) => {
                    self.entities
                        .insert(name.to_string(), value.to_string());
                }
                EntityDefinition::ExternalId(_) => {
                    return Err(ReaderError::ExternalEntity {
                        name: name.to_string(),
                        span: span.range(),
                    });
                }
            },
            Token::ElementStart {
                prefix,
                local,
                span,
            } => {
                self.flush_text(validator);
                self.stack.push(prefix, local, span.start());
            }
            Token::Attribute {
                prefix,
                local,
                value,
                span,
            } => self.stack.add_attr(prefix, local, value, span),
            Token::ElementEnd { end, span } => match end {
                ElementEnd::Open => {
                    self.start_element(span.end(), validator)?;
                }
                ElementEnd::Empty => {
                    let name = self.start_element(span.end(), validator)?;
                    self.end_element(name, span.range(), validator);
                }
                ElementEnd::Close(prefix, local) => {
                    self.flush_text(validator);
                    let name = self.check_end_tag(prefix, local, span)?;
                    self.end_element(name, span.range(), validator);
                }
            },
            Token::Text { text } => {
                if !self.stack.elements.is_empty() {
                    let expanded = expand_entities(text, &self.entities)?;
                    self.push_text(&normalize_line_ends(&expanded), text.range());
                }
            }
            Token::Cdata { text, span } => {
                if !self.stack.elements.is_empty() {
                    self.push_text(&normalize_line_ends(text.as_str()), span.range());
                }
            }
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str, span: Range<usize>) {
        self.text.push_str(text);
        self.text_span = Some(match self.text_span.take() {
            Some(existing) => existing.start..span.end,
            None => span,
        });
    }

    fn flush_text<S: DiagnosticSink>(&mut self, validator: &mut Validator<S>) {
        if let Some(span) = self.text_span.take() {
            validator.set_span(Some(span));
            validator.characters(&self.text);
            self.text.clear();
        }
    }

    /// Resolve the element whose start tag just ended and deliver it.
    fn start_element<S: DiagnosticSink>(
        &mut self,
        tag_end: usize,
        validator: &mut Validator<S>,
    ) -> Result<QName, ReaderError> {
        let strict = self.options.strict_namespaces;
        let name = self.stack.current_element(strict)?;
        let mut attributes = self.stack.current_attributes(strict)?;
        for att in attributes.iter_mut() {
            att.value = expand_attribute_value(&att.value, att.span.clone(), &self.entities)?;
        }
        for (prefix, uri) in self.stack.current_namespaces() {
            validator.start_prefix_mapping(prefix, uri);
        }
        let start = self.stack.elements.last().map_or(0, |e| e.start);
        validator.set_span(Some(start..tag_end));
        validator.start_element(&name, &attributes);
        Ok(name)
    }

    fn check_end_tag(
        &self,
        prefix: StrSpan<'a>,
        local: StrSpan<'a>,
        span: StrSpan<'a>,
    ) -> Result<QName, ReaderError> {
        let found = if prefix.as_str().is_empty() {
            local.to_string()
        } else {
            format!("{}:{}", prefix.as_str(), local.as_str())
        };
        match self.stack.elements.last() {
            Some(open) if open.prefix.as_str() == prefix.as_str() && open.local.as_str() == local.as_str() => {
                self.stack.current_element(self.options.strict_namespaces)
            }
            Some(open) => Err(ReaderError::MismatchedEndTag {
                expected: open.qualified_name(),
                found,
                span: span.range(),
            }),
            // xmlparser rejects a close tag with nothing open
            None => Err(ReaderError::MismatchedEndTag {
                expected: String::new(),
                found,
                span: span.range(),
            }),
        }
    }

    fn end_element<S: DiagnosticSink>(
        &mut self,
        name: QName,
        span: Range<usize>,
        validator: &mut Validator<S>,
    ) {
        validator.set_span(Some(span));
        validator.end_element(&name);
        if let Some(element) = self.stack.elements.pop() {
            for ns in element.namespaces.iter().rev() {
                validator.end_prefix_mapping(ns.prefix.as_str());
            }
        }
    }
}

fn normalize_line_ends(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Expand character and entity references in `text`.
fn expand_entities<'t>(
    text: StrSpan<'t>,
    entities: &FnvHashMap<String, String>,
) -> Result<Cow<'t, str>, ReaderError> {
    expand_at(text.as_str(), text.start(), entities)
}

fn expand_at<'t>(
    text: &'t str,
    pos: usize,
    entities: &FnvHashMap<String, String>,
) -> Result<Cow<'t, str>, ReaderError> {
    if !text.contains('&') {
        return Ok(Cow::Borrowed(text));
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut offset = pos;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let reference = &rest[amp + 1..];
        let semi = reference
            .find(';')
            .ok_or(ReaderError::InvalidOrUnclosedEntity {
                span: offset + amp..offset + rest.len(),
            })?;
        let name = &reference[..semi];
        let span = offset + amp..offset + amp + semi + 2;
        match name.strip_prefix('#') {
            Some(number) => out.push(
                char_reference(number)
                    .ok_or(ReaderError::InvalidOrUnclosedEntity { span: span.clone() })?,
            ),
            None => out.push_str(entities.get(name).ok_or_else(|| {
                ReaderError::UndefinedEntity {
                    name: name.to_string(),
                    span: span.clone(),
                }
            })?),
        }
        let consumed = amp + semi + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

fn char_reference(number: &str) -> Option<char> {
    let code = match number.strip_prefix('x') {
        Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            u32::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => {
            number.parse().ok()?
        }
        None => return None,
    };
    char::from_u32(code)
}

/// Attribute-value normalization for CDATA attributes: literal whitespace
/// characters become spaces, then references are expanded.
fn expand_attribute_value(
    raw: &str,
    span: Option<Range<usize>>,
    entities: &FnvHashMap<String, String>,
) -> Result<String, ReaderError> {
    let normalized = normalize_line_ends(raw).replace(['\t', '\n'], " ");
    // positions inside the value are approximate once line ends were folded
    let pos = span.map_or(0, |s| s.start);
    Ok(expand_at(&normalized, pos, entities)?.into_owned())
}

#[derive(Default)]
struct ElementStack<'a> {
    elements: Vec<ElementState<'a>>,
}

impl<'a> ElementStack<'a> {
    fn lookup_namespace_uri(&self, prefix: &str) -> Option<&'a str> {
        self.elements
            .iter()
            .rev()
            .find_map(|elem| elem.lookup_namespace_uri(prefix))
    }

    fn resolve_prefix(&self, prefix: StrSpan<'a>, strict: bool) -> Result<&'a str, ReaderError> {
        match prefix.as_str() {
            // an empty default namespace means no namespace
            "" => Ok(self.lookup_namespace_uri("").unwrap_or("")),
            "xml" => Ok(XML_NAMESPACE),
            p => match self.lookup_namespace_uri(p) {
                Some(uri) => Ok(uri),
                None if strict => Err(ReaderError::UndefinedNamespacePrefix {
                    prefix: p.to_string(),
                    span: prefix.range(),
                }),
                None => Ok(""),
            },
        }
    }

    fn push(&mut self, prefix: StrSpan<'a>, local: StrSpan<'a>, start: usize) {
        self.elements.push(ElementState {
            prefix,
            local,
            start,
            namespaces: vec![],
            attributes: vec![],
        })
    }

    fn add_attr(
        &mut self,
        prefix: StrSpan<'a>,
        local: StrSpan<'a>,
        value: StrSpan<'a>,
        span: StrSpan<'a>,
    ) {
        let Some(element) = self.elements.last_mut() else {
            return;
        };
        if prefix.as_str() == "xmlns" {
            element.namespaces.push(Ns {
                prefix: local,
                namespace_uri: value,
            })
        } else if prefix.as_str().is_empty() && local.as_str() == "xmlns" {
            element.namespaces.push(Ns {
                prefix,
                namespace_uri: value,
            })
        } else {
            element.attributes.push(UnresolvedAttr {
                prefix,
                local,
                value,
                span,
            })
        }
    }

    fn current_namespaces(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.elements
            .last()
            .into_iter()
            .flat_map(|e| e.namespaces.iter())
            .map(|ns| (ns.prefix.as_str(), ns.namespace_uri.as_str()))
    }

    fn current_element(&self, strict: bool) -> Result<QName, ReaderError> {
        let Some(curr) = self.elements.last() else {
            return Ok(QName::local(""));
        };
        let namespace_uri = self.resolve_prefix(curr.prefix, strict)?;
        Ok(QName::new(namespace_uri, curr.local.as_str()))
    }

    fn current_attributes(&self, strict: bool) -> Result<Vec<Attribute>, ReaderError> {
        let Some(curr) = self.elements.last() else {
            return Ok(vec![]);
        };
        curr.attributes
            .iter()
            .map(|unresolved| {
                // unprefixed attributes are in no namespace
                let namespace_uri = if unresolved.prefix.as_str().is_empty() {
                    ""
                } else {
                    self.resolve_prefix(unresolved.prefix, strict)?
                };
                Ok(Attribute {
                    name: QName::new(namespace_uri, unresolved.local.as_str()),
                    value: unresolved.value.to_string(),
                    span: Some(unresolved.span.range()),
                })
            })
            .collect()
    }
}

struct UnresolvedAttr<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    value: StrSpan<'a>,
    span: StrSpan<'a>,
}

struct ElementState<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    start: usize,
    namespaces: Vec<Ns<'a>>,
    attributes: Vec<UnresolvedAttr<'a>>,
}

impl<'a> ElementState<'a> {
    fn lookup_namespace_uri(&self, prefix: &str) -> Option<&'a str> {
        self.namespaces
            .iter()
            .find(|ns| ns.prefix.as_str() == prefix)
            .map(|ns| ns.namespace_uri.as_str())
    }

    fn qualified_name(&self) -> String {
        if self.prefix.as_str().is_empty() {
            self.local.to_string()
        } else {
            format!("{}:{}", self.prefix.as_str(), self.local.as_str())
        }
    }
}

struct Ns<'a> {
    prefix: StrSpan<'a>,
    namespace_uri: StrSpan<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, ErrorKind};
    use crate::schema::Schema;
    use crate::Config;
    use assert_matches::assert_matches;
    use relaxng_grammar::NameClass;
    use relaxng_grammar::datatype::relax::{BuiltinDatatypeValues, BuiltinDatatypes};
    use relaxng_grammar::datatype::{DatatypeValues, Datatypes};
    use std::rc::Rc;

    const NS: &str = "urn:example";

    /// element ex:a { attribute x { "1 2" }?, text }
    fn schema() -> Rc<Schema> {
        let s = Schema::new(Config::default());
        let x = s.attribute(
            NameClass::local("x"),
            s.value(DatatypeValues::Relax(BuiltinDatatypeValues::String(
                "1 2".to_string(),
            ))),
        );
        let a = s.element(
            NameClass::named(NS, "a"),
            s.group(s.choice(x, s.empty()), s.text()),
        );
        s.set_start(a);
        Rc::new(s)
    }

    fn validate(doc: &str) -> Result<Vec<Diagnostic>, ReaderError> {
        let mut v = Validator::collecting(schema());
        Reader::new(doc, ReaderOptions::default()).run(&mut v)?;
        assert!(v.is_complete());
        Ok(v.into_sink())
    }

    #[test]
    fn namespaces_resolved() {
        assert_eq!(validate(&format!("<a xmlns='{NS}'/>")).unwrap(), vec![]);
        assert_eq!(
            validate(&format!("<ex:a xmlns:ex='{NS}'>hi</ex:a>")).unwrap(),
            vec![]
        );
        let diags = validate("<a/>").unwrap();
        assert_matches!(
            diags.as_slice(),
            [Diagnostic {
                kind: ErrorKind::UnknownElement,
                span: Some(_),
                ..
            }]
        );
        assert_eq!(diags[0].span, Some(0..4));
    }

    #[test]
    fn undefined_prefix() {
        assert_matches!(
            validate("<ex:a/>"),
            Err(ReaderError::UndefinedNamespacePrefix { prefix, span }) if prefix == "ex" && span == (1..3)
        );
        let mut v = Validator::collecting(schema());
        let lenient = ReaderOptions {
            strict_namespaces: false,
        };
        Reader::new("<ex:a/>", lenient).run(&mut v).unwrap();
        assert_eq!(v.sink().len(), 1);
    }

    #[test]
    fn attribute_value_normalized() {
        let doc = format!("<a xmlns='{NS}' x='1&#x20;2'/>");
        assert_eq!(validate(&doc).unwrap(), vec![]);
        let doc = format!("<a xmlns='{NS}' x='1\n2'/>");
        assert_eq!(validate(&doc).unwrap(), vec![]);
        let doc = format!("<a xmlns='{NS}' x='1  2'/>");
        assert_matches!(
            validate(&doc).unwrap().as_slice(),
            [Diagnostic {
                kind: ErrorKind::BadAttributeValue,
                ..
            }]
        );
    }

    #[test]
    fn entities() {
        let doc = format!(
            "<!DOCTYPE a [<!ENTITY who \"world\">]><a xmlns='{NS}'>hello &who; &amp; &#233;</a>"
        );
        assert_eq!(validate(&doc).unwrap(), vec![]);
        assert_matches!(
            validate(&format!("<a xmlns='{NS}'>&nope;</a>")),
            Err(ReaderError::UndefinedEntity { name, .. }) if name == "nope"
        );
        assert_matches!(
            validate(&format!("<a xmlns='{NS}'>&#xZZ;</a>")),
            Err(ReaderError::InvalidOrUnclosedEntity { .. })
        );
    }

    #[test]
    fn expand_spans() {
        let entities = FnvHashMap::default();
        assert_matches!(
            expand_at("ab&c", 10, &entities),
            Err(ReaderError::InvalidOrUnclosedEntity { span }) if span == (12..14)
        );
        assert_matches!(
            expand_at("x&y;", 0, &entities),
            Err(ReaderError::UndefinedEntity { span, .. }) if span == (1..4)
        );
        assert_eq!(expand_at("plain", 0, &entities).unwrap(), "plain");
        assert_eq!(char_reference("+5"), None);
        assert_eq!(char_reference("x41"), Some('A'));
    }

    #[test]
    fn text_split_by_comment_is_one_run() {
        let s = Schema::new(Config::default());
        let a = s.element(
            NameClass::local("a"),
            s.data(Datatypes::Relax(BuiltinDatatypes::Token)),
        );
        let v_ok = s.value(DatatypeValues::Relax(BuiltinDatatypeValues::Token(
            "xy".to_string(),
        )));
        let b = s.element(NameClass::local("b"), v_ok);
        s.set_start(s.choice(a, b));
        let mut v = Validator::collecting(Rc::new(s));
        Reader::new("<b>x<!-- c -->y</b>", ReaderOptions::default())
            .run(&mut v)
            .unwrap();
        assert_eq!(v.sink(), &vec![]);
    }

    #[test]
    fn malformed() {
        assert_matches!(
            validate(&format!("<a xmlns='{NS}'>")),
            Err(ReaderError::UnclosedElement { .. } | ReaderError::Xml(_))
        );
        assert_matches!(
            validate("<a><b></a>"),
            Err(ReaderError::MismatchedEndTag { expected, found, .. }) if expected == "b" && found == "a"
        );
        assert_matches!(validate("<a"), Err(_));
    }
}
