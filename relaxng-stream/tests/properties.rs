// Algebraic laws of the pattern builder and of the validator's error state,
// checked over generated inputs.

use proptest::prelude::*;
use relaxng_grammar::datatype::EmptyContext;
use relaxng_grammar::{NameClass, QName};
use relaxng_stream::{Attribute, Config, PatId, Schema, Validator};
use std::rc::Rc;

#[derive(Clone, Debug)]
enum Expr {
    Empty,
    NotAllowed,
    Text,
    Element(u8, Box<Expr>),
    Attribute(u8),
    Choice(Box<Expr>, Box<Expr>),
    Group(Box<Expr>, Box<Expr>),
    Interleave(Box<Expr>, Box<Expr>),
    OneOrMore(Box<Expr>),
}

const NAMES: [&str; 3] = ["a", "b", "c"];

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        Just(Expr::Empty),
        Just(Expr::NotAllowed),
        Just(Expr::Text),
        (0..3u8).prop_map(Expr::Attribute),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (0..3u8, inner.clone()).prop_map(|(n, e)| Expr::Element(n, Box::new(e))),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Expr::Choice(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Expr::Group(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Expr::Interleave(Box::new(l), Box::new(r))),
            inner.prop_map(|e| Expr::OneOrMore(Box::new(e))),
        ]
    })
}

fn build(s: &Schema, e: &Expr) -> PatId {
    match e {
        Expr::Empty => s.empty(),
        Expr::NotAllowed => s.not_allowed(),
        Expr::Text => s.text(),
        Expr::Element(n, c) => s.element(NameClass::local(NAMES[*n as usize]), build(s, c)),
        Expr::Attribute(n) => s.attribute(NameClass::local(NAMES[*n as usize]), s.text()),
        Expr::Choice(l, r) => s.choice(build(s, l), build(s, r)),
        Expr::Group(l, r) => s.group(build(s, l), build(s, r)),
        Expr::Interleave(l, r) => s.interleave(build(s, l), build(s, r)),
        Expr::OneOrMore(p) => s.one_or_more(build(s, p)),
    }
}

proptest! {
    #[test]
    fn interning_gives_identity(e in expr()) {
        let s = Schema::new(Config::default());
        prop_assert_eq!(build(&s, &e), build(&s, &e));
    }

    #[test]
    fn not_allowed_absorbs(e in expr()) {
        let s = Schema::new(Config::default());
        let p = build(&s, &e);
        let na = s.not_allowed();
        prop_assert!(s.is_not_allowed(s.group(p, na)));
        prop_assert!(s.is_not_allowed(s.group(na, p)));
        prop_assert!(s.is_not_allowed(s.interleave(p, na)));
        prop_assert_eq!(s.choice(p, na), p);
        prop_assert_eq!(s.choice(na, p), p);
        prop_assert_eq!(s.choice(p, p), p);
    }

    #[test]
    fn every_derivative_of_not_allowed_is_not_allowed(
        ns in prop_oneof![Just(""), Just("urn:x")],
        local in "[a-c]{1,3}",
        literal in "[ a-z0-9]{0,8}",
    ) {
        let s = Schema::new(Config::default());
        let na = s.not_allowed();
        let name = QName::new(ns, local);
        let derived = [
            s.start_tag_open_deriv(na, &name),
            s.start_tag_open_recover_deriv(na, &name),
            s.start_attribute_deriv(na, &name),
            s.data_deriv(na, &literal, &EmptyContext),
            s.end_attributes_deriv(na),
            s.ignore_missing_attributes_deriv(na),
            s.text_only_deriv(na),
            s.mixed_text_deriv(na),
            s.end_tag_deriv(na),
            s.recover_after(na),
            s.fix_after(na),
        ];
        for d in derived {
            prop_assert!(s.is_not_allowed(d));
        }
    }

    #[test]
    fn nullability_composes(l in expr(), r in expr()) {
        let s = Schema::new(Config::default());
        let (pl, pr) = (build(&s, &l), build(&s, &r));
        let (nl, nr) = (s.is_nullable(pl), s.is_nullable(pr));
        prop_assert_eq!(s.is_nullable(s.choice(pl, pr)), nl || nr);
        prop_assert_eq!(s.is_nullable(s.group(pl, pr)), nl && nr);
        prop_assert_eq!(s.is_nullable(s.interleave(pl, pr)), nl && nr);
        prop_assert_eq!(s.is_nullable(s.one_or_more(pl)), nl);
    }

    #[test]
    fn validity_never_recovers(
        e in expr(),
        events in prop::collection::vec((0..4u8, 0..3u8), 0..12),
    ) {
        let s = Schema::new(Config::default());
        let root = s.element(NameClass::local("root"), build(&s, &e));
        s.set_start(root);
        let mut v = Validator::collecting(Rc::new(s));
        v.start_document();
        v.start_element(&QName::local("root"), &[]);
        let mut open = vec![];
        let mut was_valid = v.is_valid_so_far();
        for (op, n) in events {
            let name = QName::local(NAMES[n as usize]);
            match op {
                0 => {
                    v.start_element(&name, &[Attribute::new(QName::local("a"), "x")]);
                    open.push(name);
                }
                1 => {
                    v.start_element(&name, &[]);
                    open.push(name);
                }
                2 => v.characters("text"),
                _ => {
                    if let Some(name) = open.pop() {
                        v.end_element(&name);
                    }
                }
            }
            let valid = v.is_valid_so_far();
            prop_assert!(was_valid || !valid);
            was_valid = valid;
        }
        while let Some(name) = open.pop() {
            v.end_element(&name);
        }
        v.end_element(&QName::local("root"));
        v.end_document();
        prop_assert!(v.is_complete());
        prop_assert_eq!(v.is_valid_so_far(), v.sink().is_empty());
    }
}
