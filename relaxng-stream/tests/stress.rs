// Stress tests: grammars and documents generated at sizes that exercise the
// memo tables and the interning of derivative patterns.
//
// Run the larger sizes: cargo test --test stress -- --ignored

use relaxng_grammar::NameClass;
use relaxng_grammar::datatype::xsd;
use relaxng_grammar::model::{Grammar, Pattern};
use relaxng_stream::{Config, Diagnostic, ErrorKind, Reader, ReaderOptions, Schema, Validator};
use std::fmt::Write;
use std::rc::Rc;
use std::time::Instant;

fn el(name: &str, content: Pattern) -> Pattern {
    Pattern::element(NameClass::local(name), content)
}

fn compile(start: Pattern) -> Rc<Schema> {
    let mut g = Grammar::new();
    g.define("start", start).expect("define start");
    Schema::compile(&g.finish().expect("finish grammar"), Config::default())
}

fn validate(schema: &Rc<Schema>, doc: &str) -> Vec<Diagnostic> {
    let mut v = Validator::collecting(schema.clone());
    Reader::new(doc, ReaderOptions::default())
        .run(&mut v)
        .expect("well-formed document");
    v.into_sink()
}

fn timed(label: &str, schema: &Rc<Schema>, doc: &str) -> Vec<Diagnostic> {
    let start = Instant::now();
    let diags = validate(schema, doc);
    eprintln!(
        "  [stress] {label} {:.2}ms, {:?}",
        start.elapsed().as_secs_f64() * 1000.0,
        schema.stats()
    );
    diags
}

fn kinds(diags: &[Diagnostic]) -> Vec<ErrorKind> {
    diags.iter().map(|d| d.kind).collect()
}

// n optional children in any order, supplied in reverse

fn interleave_schema(n: usize) -> Rc<Schema> {
    let children = (0..n)
        .map(|i| Pattern::optional(el(&format!("e{i}"), Pattern::Text)))
        .collect();
    compile(el("root", Pattern::Interleave(children)))
}

fn interleave_doc(n: usize) -> String {
    let mut xml = String::with_capacity(n * 50);
    xml.push_str("<?xml version=\"1.0\"?>\n<root>\n");
    for i in (0..n).rev() {
        writeln!(xml, "  <e{i}>value {i}</e{i}>").unwrap();
    }
    xml.push_str("</root>\n");
    xml
}

fn validate_interleave(n: usize) {
    let schema = interleave_schema(n);
    let diags = timed(&format!("interleave-{n}"), &schema, &interleave_doc(n));
    assert_eq!(diags, vec![]);
}

#[test]
fn interleave_stress_10() {
    validate_interleave(10);
}

#[test]
fn interleave_stress_20() {
    validate_interleave(20);
}

#[test]
#[ignore]
fn interleave_stress_40() {
    validate_interleave(40);
}

#[test]
fn interleave_repeated_child() {
    let schema = interleave_schema(5);
    let doc = "<root><e1/><e3/><e1/></root>";
    assert_eq!(kinds(&validate(&schema, doc)), vec![ErrorKind::OutOfContextElement]);
}

// many required and optional attributes on one element

fn wide_attr_schema(n_required: usize, n_optional: usize) -> Rc<Schema> {
    let mut g = Grammar::new();
    let string = || {
        g.data(xsd::NAMESPACE_URI, "string", &[])
            .expect("xsd string")
    };
    let mut attrs: Vec<Pattern> = (0..n_required)
        .map(|i| Pattern::attribute(NameClass::local(format!("req{i}")), string()))
        .collect();
    attrs.extend((0..n_optional).map(|i| {
        Pattern::optional(Pattern::attribute(
            NameClass::local(format!("opt{i}")),
            string(),
        ))
    }));
    attrs.push(Pattern::Empty);
    g.define("start", el("root", Pattern::Group(attrs)))
        .expect("define start");
    Schema::compile(&g.finish().expect("finish grammar"), Config::default())
}

fn wide_attr_doc(required: impl Iterator<Item = usize>, n_optional: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<root");
    for i in required {
        write!(xml, " req{i}=\"v{i}\"").unwrap();
    }
    for i in 0..n_optional {
        write!(xml, " opt{i}=\"v{i}\"").unwrap();
    }
    xml.push_str("/>\n");
    xml
}

#[test]
fn wide_attrs_20_required_20_optional() {
    let schema = wide_attr_schema(20, 20);
    let doc = wide_attr_doc(0..20, 10);
    assert_eq!(timed("wide attrs 20r+10o", &schema, &doc), vec![]);
}

#[test]
fn wide_attrs_50_required_reversed() {
    let schema = wide_attr_schema(50, 0);
    let doc = wide_attr_doc((0..50).rev(), 0);
    assert_eq!(timed("wide attrs 50r", &schema, &doc), vec![]);
}

#[test]
fn wide_attrs_missing_required() {
    let schema = wide_attr_schema(10, 0);
    let diags = validate(&schema, &wide_attr_doc(0..9, 0));
    assert_eq!(kinds(&diags), vec![ErrorKind::RequiredAttributesMissing]);
}

// nesting depth

fn deep_schema(depth: usize) -> Rc<Schema> {
    let p = (0..depth)
        .rev()
        .fold(Pattern::Text, |content, i| el(&format!("e{i}"), content));
    compile(p)
}

fn deep_doc(depth: usize, leaf: &str) -> String {
    let mut xml = String::with_capacity(depth * 20);
    for i in 0..depth {
        write!(xml, "<e{i}>").unwrap();
    }
    write!(xml, "<{leaf}>leaf</{leaf}>").unwrap();
    for i in (0..depth).rev() {
        write!(xml, "</e{i}>").unwrap();
    }
    xml
}

#[test]
fn deep_nesting_100() {
    let schema = deep_schema(101);
    let diags = timed("deep nesting 100", &schema, &deep_doc(100, "e100"));
    assert_eq!(diags, vec![]);
}

#[test]
fn deep_nesting_wrong_leaf() {
    let schema = deep_schema(50);
    let diags = validate(&schema, &deep_doc(49, "wrong"));
    // e49 is still owed once the unknown element is skipped, but the run is
    // already in error
    assert_eq!(kinds(&diags), vec![ErrorKind::UnknownElement]);
}

// wide choice under oneOrMore

fn choice_schema(n_branches: usize) -> Rc<Schema> {
    let branches = (0..n_branches)
        .map(|i| el(&format!("branch{i}"), Pattern::Text))
        .collect();
    compile(el("root", Pattern::one_or_more(Pattern::Choice(branches))))
}

fn choice_doc(n_branches: usize, n_children: usize) -> String {
    let mut xml = String::with_capacity(n_children * 40);
    xml.push_str("<root>\n");
    for i in 0..n_children {
        let branch = i % n_branches;
        writeln!(xml, "  <branch{branch}>text</branch{branch}>").unwrap();
    }
    xml.push_str("</root>\n");
    xml
}

#[test]
fn choice_50_branches_200_children() {
    let schema = choice_schema(50);
    let diags = timed("choice 50x200", &schema, &choice_doc(50, 200));
    assert_eq!(diags, vec![]);
}

#[test]
fn choice_100_branches_500_children() {
    let schema = choice_schema(100);
    let diags = timed("choice 100x500", &schema, &choice_doc(100, 500));
    assert_eq!(diags, vec![]);
}

#[test]
fn choice_wrong_branch_name() {
    let schema = choice_schema(10);
    let mut doc = choice_doc(10, 5);
    let pos = doc.rfind("</root>").unwrap();
    doc.insert_str(pos, "  <nonexistent>x</nonexistent>\n");
    assert_eq!(kinds(&validate(&schema, &doc)), vec![ErrorKind::UnknownElement]);
}

#[test]
fn revalidation_reuses_memo() {
    let schema = choice_schema(20);
    let doc = choice_doc(20, 100);
    assert_eq!(validate(&schema, &doc), vec![]);
    let after_first = schema.stats();
    assert_eq!(validate(&schema, &doc), vec![]);
    assert_eq!(schema.stats(), after_first);
}
