//! Rendering of diagnostics with `codemap-diagnostic`.

use crate::diagnostic::Diagnostic;
use crate::pattern::{Pat, PatId};
use crate::reader::ReaderError;
use crate::schema::Schema;
use codemap::{CodeMap, File, Span};
use codemap_diagnostic::{Level, SpanLabel, SpanStyle};
use fnv::FnvHashSet;
use relaxng_grammar::NameClass;
use std::ops::Range;
use std::sync::Arc;

const MAX_NAMES: usize = 4;

/// Convert validation diagnostics into `codemap-diagnostic` form, each with a
/// help note listing what was expected.
pub fn diagnostics(
    name: String,
    source: String,
    diagnostics: &[Diagnostic],
) -> (CodeMap, Vec<codemap_diagnostic::Diagnostic>) {
    let mut map = CodeMap::new();
    let file = map.add_file(name, source);
    let mut result = vec![];
    for d in diagnostics {
        let message = Diagnostic {
            expected: None,
            ..d.clone()
        }
        .to_string();
        let spans = d
            .span
            .as_ref()
            .map(|span| SpanLabel {
                span: subspan(&file, span),
                label: Some("not allowed".to_string()),
                style: SpanStyle::Primary,
            })
            .into_iter()
            .collect();
        result.push(codemap_diagnostic::Diagnostic {
            level: Level::Error,
            message,
            code: Some(d.kind.key().to_string()),
            spans,
        });
        if let Some(expected) = &d.expected {
            result.push(codemap_diagnostic::Diagnostic {
                level: Level::Help,
                message: format!("expected {expected}"),
                code: None,
                spans: vec![],
            });
        }
    }
    (map, result)
}

/// Convert a failure of the XML front end.
pub fn reader_diagnostic(
    name: String,
    source: String,
    err: &ReaderError,
) -> (CodeMap, Vec<codemap_diagnostic::Diagnostic>) {
    let mut map = CodeMap::new();
    let file = map.add_file(name, source);
    let span = match err {
        ReaderError::Xml(e) => {
            let pos = e.pos();
            let row = (pos.row as usize).saturating_sub(1);
            if row < file.num_lines() {
                let line = file.line_span(row);
                let col = (pos.col as u64).saturating_sub(1).min(line.len());
                Some(line.subspan(col, col))
            } else {
                None
            }
        }
        other => other.span().map(|span| subspan(&file, &span)),
    };
    let label = match err {
        ReaderError::UndefinedNamespacePrefix { prefix, .. } => Some(format!(
            "add an xmlns:{prefix}=\"..\" attribute to define this prefix"
        )),
        _ => None,
    };
    let diagnostic = codemap_diagnostic::Diagnostic {
        level: Level::Error,
        message: err.to_string(),
        code: None,
        spans: span
            .map(|span| SpanLabel {
                span,
                label,
                style: SpanStyle::Primary,
            })
            .into_iter()
            .collect(),
    };
    (map, vec![diagnostic])
}

fn subspan(file: &Arc<File>, span: &Range<usize>) -> Span {
    let len = file.source().len();
    let end = span.end.min(len);
    let start = span.start.min(end);
    file.span.subspan(start as u64, end as u64)
}

/// A short description of the events `id` would accept next, or an empty
/// string if it accepts none of interest.
pub(crate) fn describe_expected(schema: &Schema, id: PatId) -> String {
    let mut heads = Heads::default();
    heads.collect(schema, id);
    let mut parts = vec![];
    if !heads.elements.is_empty() {
        parts.push(format!("element {}", describe_names(&heads.elements)));
    }
    if !heads.attributes.is_empty() {
        parts.push(format!("attribute {}", describe_names(&heads.attributes)));
    }
    if heads.text {
        parts.push("text".to_string());
    }
    parts.join(" or ")
}

// https://www.kohsuke.org/relaxng/implbook/Validation1.html#IDATGOO
#[derive(Default)]
struct Heads {
    seen: FnvHashSet<PatId>,
    elements: Vec<NameClass>,
    attributes: Vec<NameClass>,
    text: bool,
}

impl Heads {
    fn collect(&mut self, schema: &Schema, id: PatId) {
        if !self.seen.insert(id) {
            return;
        }
        match schema.pat(id) {
            Pat::Choice(p1, p2) | Pat::Interleave(p1, p2) => {
                self.collect(schema, p1);
                self.collect(schema, p2);
            }
            Pat::Group(p1, p2) => {
                self.collect(schema, p1);
                if schema.is_nullable(p1) {
                    self.collect(schema, p2);
                }
            }
            Pat::OneOrMore(p) | Pat::After(p, _) => self.collect(schema, p),
            Pat::Element(nc, _) => push_unique(&mut self.elements, &nc),
            Pat::Attribute(nc, _) => push_unique(&mut self.attributes, &nc),
            Pat::Text | Pat::Data(_) | Pat::DataExcept(_, _) | Pat::Value(_) | Pat::List(_) => {
                self.text = true
            }
            Pat::Empty | Pat::NotAllowed | Pat::Placeholder(_) => {}
        }
    }
}

fn push_unique(names: &mut Vec<NameClass>, nc: &NameClass) {
    if !names.contains(nc) {
        names.push(nc.clone());
    }
}

fn describe_names(names: &[NameClass]) -> String {
    let mut desc = names
        .iter()
        .take(MAX_NAMES)
        .map(|nc| nc.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > MAX_NAMES {
        desc.push_str(&format!(" .. or one of {} more", names.len() - MAX_NAMES));
    }
    desc
}
