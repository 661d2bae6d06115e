//! The interning pattern builder.
//!
//! Every pattern the validator ever sees, whether compiled from the grammar
//! or produced while deriving, lives in one arena owned by a [`Schema`].
//! Structurally equal patterns share a [`PatId`], which is what keeps the
//! derivative memo tables small and makes pattern comparison a `u32` compare.

use crate::Config;
use crate::deriv::PatternMemo;
use crate::pattern::{ContentType, Flags, Pat, PatId};
use fnv::{FnvHashMap, FnvHashSet};
use relaxng_grammar::NameClass;
use relaxng_grammar::datatype::{DatatypeValues, Datatypes};
use relaxng_grammar::model::{self, DefineRule};
use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

const EMPTY: PatId = PatId(0);
const NOT_ALLOWED: PatId = PatId(1);
const TEXT: PatId = PatId(2);

#[derive(Default)]
pub(crate) struct Inner {
    intern: FnvHashMap<Pat, PatId>,
    patterns: Vec<Pat>,
    flags: Vec<Flags>,
    refs: FnvHashMap<usize, PatId>,
    /// Ids handed out as placeholders for named rules.
    rule_slots: FnvHashSet<PatId>,
    /// `(placeholder, target)` pairs whose target was itself still a
    /// placeholder when the rule finished compiling.
    deferred: Vec<(PatId, PatId)>,
    placeholders_created: bool,
    pub(crate) memos: FnvHashMap<PatId, PatternMemo>,
    pub(crate) context_dependent: FnvHashMap<PatId, bool>,
}

/// Counters describing how much work a schema has cached so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    pub patterns: usize,
    pub memo_entries: usize,
    pub element_searches: usize,
}

/// A compiled grammar: the pattern arena together with the derivative caches
/// built up by every [`crate::Validator`] that shares it.
///
/// A `Schema` is single-threaded; validators on one thread share it through
/// an `Rc`.
pub struct Schema {
    pub(crate) inner: RefCell<Inner>,
    pub(crate) config: Config,
    start: Cell<PatId>,
    pub(crate) element_searches: Cell<usize>,
}

impl Schema {
    pub fn new(config: Config) -> Schema {
        let schema = Schema {
            inner: RefCell::new(Inner::default()),
            config,
            start: Cell::new(NOT_ALLOWED),
            element_searches: Cell::new(0),
        };
        // fixed ids for the leaves the builder hands out most
        schema.push(Pat::Empty);
        schema.push(Pat::NotAllowed);
        schema.push(Pat::Text);
        schema
    }

    /// Compile the start rule of a grammar produced by
    /// [`relaxng_grammar::model::Grammar::finish`].
    pub fn compile(start: &DefineRule, config: Config) -> Rc<Schema> {
        let schema = Schema::new(config);
        let id = schema.add(start.pattern());
        schema.set_start(id);
        log::debug!(
            "compiled grammar {:?}: {} patterns",
            start.name(),
            schema.inner.borrow().patterns.len()
        );
        Rc::new(schema)
    }

    pub fn start(&self) -> PatId {
        self.start.get()
    }

    pub fn set_start(&self, id: PatId) {
        self.start.set(id);
    }

    fn push(&self, p: Pat) -> PatId {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.intern.get(&p) {
            return *id;
        }
        if inner.patterns.len() >= self.config.pattern_limit {
            panic!(
                "schema derivative complexity limit exceeded ({} patterns)",
                self.config.pattern_limit
            )
        }
        let Inner {
            patterns, flags, ..
        } = &mut *inner;
        let f = p.flags(|id| flags[id.index()]);
        let id = PatId(patterns.len() as u32);
        patterns.push(p.clone());
        flags.push(f);
        inner.intern.insert(p, id);
        id
    }

    pub(crate) fn pat(&self, id: PatId) -> Pat {
        self.inner.borrow().patterns[id.index()].clone()
    }

    fn flags(&self, id: PatId) -> Flags {
        self.inner.borrow().flags[id.index()]
    }

    pub fn is_nullable(&self, id: PatId) -> bool {
        self.flags(id).nullable
    }

    pub fn content_type(&self, id: PatId) -> ContentType {
        self.flags(id).content_type
    }

    pub fn is_not_allowed(&self, id: PatId) -> bool {
        // a resolved ref slot may hold NotAllowed under a different id
        id == NOT_ALLOWED || matches!(self.inner.borrow().patterns[id.index()], Pat::NotAllowed)
    }

    fn is_empty(&self, id: PatId) -> bool {
        id == EMPTY || matches!(self.inner.borrow().patterns[id.index()], Pat::Empty)
    }

    pub fn empty(&self) -> PatId {
        EMPTY
    }

    pub fn not_allowed(&self) -> PatId {
        NOT_ALLOWED
    }

    pub fn text(&self) -> PatId {
        TEXT
    }

    pub fn choice(&self, left: PatId, right: PatId) -> PatId {
        // Drop choice-leaves already present on the left, keeping choice
        // trees linear in the number of distinct alternatives.
        // See https://relaxng.org/jclark/derivative.html#Avoiding_exponential_blowup
        if self.is_not_allowed(left) {
            return right;
        }
        if self.is_not_allowed(right) {
            return left;
        }
        if left == right {
            return left;
        }
        if self.is_empty(left) && self.is_nullable(right) {
            return right;
        }
        if self.is_empty(right) && self.is_nullable(left) {
            return left;
        }
        let mut left_leaves = FnvHashSet::default();
        self.collect_choice_leaves(left, &mut left_leaves);
        match self.filter_choice(right, &left_leaves) {
            None => left,
            Some(filtered_right) => self.push(Pat::Choice(left, filtered_right)),
        }
    }

    fn collect_choice_leaves(&self, id: PatId, leaves: &mut FnvHashSet<PatId>) {
        let inner = self.inner.borrow();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match &inner.patterns[id.index()] {
                Pat::Choice(l, r) => {
                    stack.push(*r);
                    stack.push(*l);
                }
                _ => {
                    leaves.insert(id);
                }
            }
        }
    }

    /// Rebuild a choice tree without the leaves in `exclude`; `None` if
    /// nothing is left.
    fn filter_choice(&self, id: PatId, exclude: &FnvHashSet<PatId>) -> Option<PatId> {
        if exclude.contains(&id) {
            return None;
        }
        match self.pat(id) {
            Pat::Choice(l, r) => {
                match (self.filter_choice(l, exclude), self.filter_choice(r, exclude)) {
                    (None, None) => None,
                    (Some(kept), None) | (None, Some(kept)) => Some(kept),
                    (Some(fl), Some(fr)) if fl == l && fr == r => Some(id),
                    (Some(fl), Some(fr)) => Some(self.push(Pat::Choice(fl, fr))),
                }
            }
            _ => Some(id),
        }
    }

    pub fn group(&self, left: PatId, right: PatId) -> PatId {
        if self.is_not_allowed(left) || self.is_not_allowed(right) {
            NOT_ALLOWED
        } else if self.is_empty(left) {
            right
        } else if self.is_empty(right) {
            left
        } else {
            self.push(Pat::Group(left, right))
        }
    }

    pub fn interleave(&self, left: PatId, right: PatId) -> PatId {
        if self.is_not_allowed(left) || self.is_not_allowed(right) {
            NOT_ALLOWED
        } else if self.is_empty(left) {
            right
        } else if self.is_empty(right) {
            left
        } else {
            self.push(Pat::Interleave(left, right))
        }
    }

    pub(crate) fn after(&self, child: PatId, residual: PatId) -> PatId {
        if self.is_not_allowed(child) || self.is_not_allowed(residual) {
            NOT_ALLOWED
        } else {
            self.push(Pat::After(child, residual))
        }
    }

    pub fn one_or_more(&self, p: PatId) -> PatId {
        match self.pat(p) {
            Pat::Empty | Pat::NotAllowed | Pat::Text | Pat::OneOrMore(_) => p,
            _ => self.push(Pat::OneOrMore(p)),
        }
    }

    pub fn mixed(&self, p: PatId) -> PatId {
        self.interleave(p, TEXT)
    }

    pub fn element(&self, name: NameClass, content: PatId) -> PatId {
        self.push(Pat::Element(Rc::new(name), content))
    }

    pub fn attribute(&self, name: NameClass, value: PatId) -> PatId {
        self.push(Pat::Attribute(Rc::new(name), value))
    }

    pub fn data(&self, datatype: Datatypes) -> PatId {
        self.push(Pat::Data(Rc::new(datatype)))
    }

    pub fn data_except(&self, datatype: Datatypes, except: PatId) -> PatId {
        if self.is_not_allowed(except) {
            self.data(datatype)
        } else {
            self.push(Pat::DataExcept(Rc::new(datatype), except))
        }
    }

    pub fn value(&self, value: DatatypeValues) -> PatId {
        self.push(Pat::Value(Rc::new(value)))
    }

    pub fn list(&self, p: PatId) -> PatId {
        if self.is_not_allowed(p) {
            NOT_ALLOWED
        } else {
            self.push(Pat::List(p))
        }
    }

    /// Intern a grammar pattern, expanding `optional`, `zeroOrMore` and
    /// `mixed` and resolving named rules.
    pub fn add(&self, p: &model::Pattern) -> PatId {
        let id = self.compile_pattern(p);
        if std::mem::take(&mut self.inner.borrow_mut().placeholders_created) {
            self.resolve_deferred();
            self.recompute_flags();
        }
        id
    }

    fn compile_pattern(&self, p: &model::Pattern) -> PatId {
        match p {
            model::Pattern::Choice(v) => self.compile_seq(v, NOT_ALLOWED, Schema::choice),
            model::Pattern::Interleave(v) => self.compile_seq(v, EMPTY, Schema::interleave),
            model::Pattern::Group(v) => self.compile_seq(v, EMPTY, Schema::group),
            model::Pattern::Mixed(p) => self.mixed(self.compile_pattern(p)),
            model::Pattern::Empty => EMPTY,
            model::Pattern::Text => TEXT,
            model::Pattern::NotAllowed => NOT_ALLOWED,
            model::Pattern::Optional(p) => self.choice(self.compile_pattern(p), EMPTY),
            model::Pattern::ZeroOrMore(p) => {
                let repeated = self.one_or_more(self.compile_pattern(p));
                self.choice(repeated, EMPTY)
            }
            model::Pattern::OneOrMore(p) => self.one_or_more(self.compile_pattern(p)),
            model::Pattern::Attribute(name, p) => {
                self.attribute(name.clone(), self.compile_pattern(p))
            }
            model::Pattern::Element(name, p) => self.element(name.clone(), self.compile_pattern(p)),
            model::Pattern::Ref(name, r) => {
                let key = r.key();
                if let Some(id) = self.get_ref(key) {
                    return id;
                }
                let placeholder = self.ref_placeholder(key);
                match r.0.borrow().as_ref() {
                    Some(rule) => {
                        let id = self.compile_pattern(rule.pattern());
                        self.resolve_ref(key, placeholder, id)
                    }
                    None => {
                        log::warn!("reference to undefined pattern {name:?}; treating as notAllowed");
                        self.resolve_ref(key, placeholder, NOT_ALLOWED)
                    }
                }
            }
            model::Pattern::DatatypeValue { datatype } => self.value(datatype.clone()),
            model::Pattern::DatatypeName { datatype, except } => match except {
                Some(except) => self.data_except(datatype.clone(), self.compile_pattern(except)),
                None => self.data(datatype.clone()),
            },
            model::Pattern::List(p) => self.list(self.compile_pattern(p)),
        }
    }

    fn compile_seq(
        &self,
        v: &[model::Pattern],
        unit: PatId,
        combine: fn(&Schema, PatId, PatId) -> PatId,
    ) -> PatId {
        v.iter()
            .rev()
            .map(|p| self.compile_pattern(p))
            .reduce(|right, left| combine(self, left, right))
            .unwrap_or(unit)
    }

    fn get_ref(&self, key: usize) -> Option<PatId> {
        self.inner.borrow().refs.get(&key).copied()
    }

    fn ref_placeholder(&self, key: usize) -> PatId {
        let id = self.push(Pat::Placeholder(key));
        let mut inner = self.inner.borrow_mut();
        inner.refs.insert(key, id);
        inner.rule_slots.insert(id);
        inner.placeholders_created = true;
        id
    }

    /// Make the placeholder slot denote the compiled rule body `target`, and
    /// return the id that references to the rule resolve to from now on.
    ///
    /// A body interned while compiling this rule moves into the placeholder
    /// slot, so recursive references and the rule itself share one id.
    fn resolve_ref(&self, key: usize, placeholder: PatId, target: PatId) -> PatId {
        let body = self.pat(target);
        if placeholder == target
            || (!matches!(body, Pat::Placeholder(_))
                && self.reaches_without_element(target, placeholder))
        {
            log::warn!("reference cycle without an element; treating as notAllowed");
            self.inner.borrow_mut().refs.insert(key, NOT_ALLOWED);
            self.fill_placeholder(placeholder, Pat::NotAllowed);
            return NOT_ALLOWED;
        }
        let mut inner = self.inner.borrow_mut();
        if let Pat::Placeholder(_) = body {
            inner.refs.insert(key, target);
            inner.deferred.push((placeholder, target));
            return target;
        }
        let fresh = target > placeholder
            && target.index() + 1 == inner.patterns.len()
            && !inner.rule_slots.contains(&target);
        let resolved = if fresh {
            inner.patterns.pop();
            inner.flags.pop();
            inner.intern.insert(body.clone(), placeholder);
            placeholder
        } else {
            target
        };
        inner.refs.insert(key, resolved);
        drop(inner);
        self.fill_placeholder(placeholder, body);
        resolved
    }

    /// Whether `to` is reachable from `from` without entering element
    /// content.
    fn reaches_without_element(&self, from: PatId, to: PatId) -> bool {
        let inner = self.inner.borrow();
        let mut seen = FnvHashSet::default();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            match &inner.patterns[id.index()] {
                Pat::Choice(p1, p2)
                | Pat::Group(p1, p2)
                | Pat::Interleave(p1, p2)
                | Pat::After(p1, p2) => {
                    stack.push(*p1);
                    stack.push(*p2);
                }
                Pat::OneOrMore(p)
                | Pat::List(p)
                | Pat::Attribute(_, p)
                | Pat::DataExcept(_, p) => stack.push(*p),
                Pat::Element(_, _)
                | Pat::Empty
                | Pat::NotAllowed
                | Pat::Text
                | Pat::Data(_)
                | Pat::Value(_)
                | Pat::Placeholder(_) => {}
            }
        }
        false
    }

    fn fill_placeholder(&self, placeholder: PatId, body: Pat) {
        let mut inner = self.inner.borrow_mut();
        let Inner {
            patterns, flags, ..
        } = &mut *inner;
        debug_assert!(matches!(patterns[placeholder.index()], Pat::Placeholder(_)));
        flags[placeholder.index()] = body.flags(|id| flags[id.index()]);
        patterns[placeholder.index()] = body;
    }

    /// Resolve rules defined as a bare reference to a rule that was still
    /// being compiled at the time.
    fn resolve_deferred(&self) {
        loop {
            let deferred = std::mem::take(&mut self.inner.borrow_mut().deferred);
            if deferred.is_empty() {
                return;
            }
            let mut progress = false;
            let mut pending = vec![];
            for (placeholder, target) in deferred {
                match self.pat(target) {
                    Pat::Placeholder(_) => pending.push((placeholder, target)),
                    body => {
                        self.fill_placeholder(placeholder, body);
                        progress = true;
                    }
                }
            }
            if !progress {
                for (placeholder, _) in pending {
                    log::warn!("reference cycle without an element; treating as notAllowed");
                    self.fill_placeholder(placeholder, Pat::NotAllowed);
                }
                return;
            }
            self.inner.borrow_mut().deferred = pending;
        }
    }

    /// Patterns built while a placeholder was unresolved saw default flags for
    /// it, so iterate until the flags are stable.  Flags only ever grow, which
    /// bounds the number of passes.
    fn recompute_flags(&self) {
        let mut inner = self.inner.borrow_mut();
        let Inner {
            patterns, flags, ..
        } = &mut *inner;
        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            for i in 0..patterns.len() {
                let f = patterns[i].flags(|id| flags[id.index()]);
                if f != flags[i] {
                    flags[i] = f;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        log::trace!("pattern flags stable after {passes} passes");
    }

    pub fn stats(&self) -> Stats {
        let inner = self.inner.borrow();
        Stats {
            patterns: inner.patterns.len(),
            memo_entries: inner.memos.values().map(PatternMemo::len).sum(),
            element_searches: self.element_searches.get(),
        }
    }

    /// Write an indented dump of the pattern graph below `pat`, printing
    /// shared sub-patterns once.
    pub fn dump<W: io::Write>(&self, pat: PatId, w: &mut W) -> Result<(), io::Error> {
        let mut seen = FnvHashSet::default();
        self.dump_rec(0, pat, w, &mut seen)
    }

    fn dump_rec<W: io::Write>(
        &self,
        depth: usize,
        pat: PatId,
        w: &mut W,
        seen: &mut FnvHashSet<PatId>,
    ) -> Result<(), io::Error> {
        for _ in 0..depth {
            w.write_all(b"  ")?;
        }
        let p = self.pat(pat);
        let (label, children): (String, Vec<PatId>) = match &p {
            Pat::Empty => ("Empty".into(), vec![]),
            Pat::NotAllowed => ("NotAllowed".into(), vec![]),
            Pat::Text => ("Text".into(), vec![]),
            Pat::Choice(p1, p2) => ("Choice".into(), vec![*p1, *p2]),
            Pat::Group(p1, p2) => ("Group".into(), vec![*p1, *p2]),
            Pat::Interleave(p1, p2) => ("Interleave".into(), vec![*p1, *p2]),
            Pat::After(p1, p2) => ("After".into(), vec![*p1, *p2]),
            Pat::OneOrMore(p) => ("OneOrMore".into(), vec![*p]),
            Pat::List(p) => ("List".into(), vec![*p]),
            Pat::Attribute(nc, p) => (format!("Attribute[{nc}]"), vec![*p]),
            Pat::Element(nc, p) => (format!("Element[{nc}]"), vec![*p]),
            Pat::Data(dt) => (format!("{dt:?}"), vec![]),
            Pat::DataExcept(dt, p) => (format!("{dt:?}-"), vec![*p]),
            Pat::Value(v) => (format!("{v:?}"), vec![]),
            Pat::Placeholder(_) => ("Placeholder".into(), vec![]),
        };
        if children.is_empty() {
            return writeln!(w, "{label}{}", pat.0);
        }
        if !seen.insert(pat) {
            return writeln!(w, "{label}{}!", pat.0);
        }
        writeln!(w, "{label}{}(", pat.0)?;
        for child in children {
            self.dump_rec(depth + 1, child, w, seen)?;
        }
        for _ in 0..depth {
            w.write_all(b"  ")?;
        }
        writeln!(w, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relaxng_grammar::datatype::relax::BuiltinDatatypes;
    use relaxng_grammar::QName;
    use relaxng_grammar::model::{Grammar, Pattern};

    fn schema() -> Schema {
        Schema::new(Config::default())
    }

    fn el(s: &Schema, name: &str) -> PatId {
        s.element(NameClass::local(name), s.empty())
    }

    #[test]
    fn interning_identity() {
        let s = schema();
        let a = el(&s, "a");
        let b = el(&s, "b");
        assert_eq!(a, el(&s, "a"));
        assert_ne!(a, b);
        assert_eq!(s.group(a, b), s.group(a, b));
        assert_ne!(s.group(a, b), s.group(b, a));
    }

    #[test]
    fn not_allowed_absorbs() {
        let s = schema();
        let a = el(&s, "a");
        let na = s.not_allowed();
        assert_eq!(s.choice(a, na), a);
        assert_eq!(s.choice(na, a), a);
        assert_eq!(s.group(a, na), na);
        assert_eq!(s.interleave(na, a), na);
        assert_eq!(s.after(a, na), na);
        assert_eq!(s.after(na, a), na);
        assert_eq!(s.one_or_more(na), na);
        assert_eq!(s.list(na), na);
    }

    #[test]
    fn empty_is_identity() {
        let s = schema();
        let a = el(&s, "a");
        assert_eq!(s.group(s.empty(), a), a);
        assert_eq!(s.interleave(a, s.empty()), a);
        assert_eq!(s.one_or_more(s.empty()), s.empty());
        assert_eq!(s.one_or_more(s.text()), s.text());
    }

    #[test]
    fn choice_dedupes_leaves() {
        let s = schema();
        let (a, b, c) = (el(&s, "a"), el(&s, "b"), el(&s, "c"));
        let ab = s.choice(a, b);
        assert_eq!(s.choice(ab, a), ab);
        assert_eq!(s.choice(ab, ab), ab);
        let bc = s.choice(b, c);
        let abc = s.choice(ab, bc);
        assert_eq!(abc, s.choice(ab, c));
    }

    #[test]
    fn choice_with_empty() {
        let s = schema();
        let a = el(&s, "a");
        let opt = s.choice(a, s.empty());
        assert!(s.is_nullable(opt));
        assert!(!s.is_nullable(a));
        // already nullable, so the extra empty disappears
        assert_eq!(s.choice(opt, s.empty()), opt);
        assert_eq!(s.choice(s.empty(), s.text()), s.text());
    }

    #[test]
    fn content_types() {
        let s = schema();
        let a = el(&s, "a");
        let data = s.data(Datatypes::Relax(BuiltinDatatypes::Token));
        assert_eq!(s.content_type(s.empty()), ContentType::Empty);
        assert_eq!(s.content_type(a), ContentType::Complex);
        assert_eq!(s.content_type(s.mixed(a)), ContentType::Mixed);
        assert_eq!(s.content_type(data), ContentType::Data);
        let att = s.attribute(NameClass::local("x"), data);
        assert_eq!(s.content_type(att), ContentType::Empty);
        assert!(!s.is_nullable(att));
    }

    #[test]
    fn recursive_rule() {
        // start = element list { item* }
        // item = element item { item* }
        let mut g = Grammar::new();
        let item = g.reference("item");
        g.define(
            "item",
            Pattern::element(NameClass::local("item"), Pattern::zero_or_more(item.clone())),
        )
        .unwrap();
        g.define(
            "start",
            Pattern::element(NameClass::local("list"), Pattern::zero_or_more(item)),
        )
        .unwrap();
        let start = g.finish().unwrap();
        let s = Schema::compile(&start, Config::default());
        assert_matches!(s.pat(s.start()), Pat::Element(_, _));
        let Pat::Element(_, content) = s.pat(s.start()) else {
            unreachable!()
        };
        assert!(s.is_nullable(content));
        assert!(
            s.inner
                .borrow()
                .patterns
                .iter()
                .all(|p| !matches!(p, Pat::Placeholder(_)))
        );
    }

    #[test]
    fn recursive_rule_is_interned_once() {
        // start = element list { item* }
        // item = element item { item* }
        let mut g = Grammar::new();
        let item = g.reference("item");
        g.define(
            "item",
            Pattern::element(NameClass::local("item"), Pattern::zero_or_more(item.clone())),
        )
        .unwrap();
        g.define(
            "start",
            Pattern::element(NameClass::local("list"), Pattern::zero_or_more(item)),
        )
        .unwrap();
        let s = Schema::compile(&g.finish().unwrap(), Config::default());
        {
            let inner = s.inner.borrow();
            let mut distinct = FnvHashSet::default();
            for p in inner.patterns.iter() {
                assert!(distinct.insert(p.clone()), "{p:?} stored twice");
            }
        }
        let Pat::Element(_, list_content) = s.pat(s.start()) else {
            panic!("start should be an element");
        };
        let Pat::Choice(repeated, _) = s.pat(list_content) else {
            panic!("zeroOrMore should be a choice");
        };
        let Pat::OneOrMore(item) = s.pat(repeated) else {
            panic!("expected oneOrMore");
        };
        let Pat::Element(_, item_content) = s.pat(item) else {
            panic!("item should be an element");
        };
        assert_eq!(item_content, list_content);
        assert_eq!(s.element(NameClass::local("item"), item_content), item);
    }

    #[test]
    fn ref_cycle_without_element() {
        // start = element doc { r }
        // r = r | element a { empty }
        let mut g = Grammar::new();
        let r = g.reference("r");
        g.define(
            "r",
            Pattern::Choice(vec![
                r.clone(),
                Pattern::element(NameClass::local("a"), Pattern::Empty),
            ]),
        )
        .unwrap();
        g.define("start", Pattern::element(NameClass::local("doc"), r))
            .unwrap();
        let s = Schema::compile(&g.finish().unwrap(), Config::default());
        let Pat::Element(_, content) = s.pat(s.start()) else {
            panic!("start should be an element");
        };
        assert!(s.is_not_allowed(content));
        assert!(s.is_not_allowed(s.find_element(&QName::local("a"))));
    }

    #[test]
    fn rule_defined_as_itself() {
        // start = element doc { a }
        // a = a
        let mut g = Grammar::new();
        let a = g.reference("a");
        g.define("a", a.clone()).unwrap();
        g.define("start", Pattern::element(NameClass::local("doc"), a))
            .unwrap();
        let s = Schema::compile(&g.finish().unwrap(), Config::default());
        let Pat::Element(_, content) = s.pat(s.start()) else {
            panic!("start should be an element");
        };
        assert!(s.is_not_allowed(content));
    }

    #[test]
    fn alias_of_rule_in_progress() {
        // start = a
        // a = element a { b? }
        // b = a
        let mut g = Grammar::new();
        let a = g.reference("a");
        let b = g.reference("b");
        g.define("start", a.clone()).unwrap();
        g.define(
            "a",
            Pattern::element(NameClass::local("a"), Pattern::optional(b)),
        )
        .unwrap();
        g.define("b", a).unwrap();
        let start = g.finish().unwrap();
        let s = Schema::compile(&start, Config::default());
        assert!(
            s.inner
                .borrow()
                .patterns
                .iter()
                .all(|p| !matches!(p, Pat::Placeholder(_)))
        );
        let Pat::Element(_, content) = s.pat(s.start()) else {
            panic!("start should be an element");
        };
        assert!(s.is_nullable(content));
    }

    #[test]
    fn nullability_through_placeholder() {
        // start = element a { r }
        // r = element b { r }?   -- r is nullable only once resolved
        let mut g = Grammar::new();
        let r = g.reference("r");
        g.define(
            "r",
            Pattern::optional(Pattern::element(NameClass::local("b"), r.clone())),
        )
        .unwrap();
        g.define(
            "start",
            Pattern::element(
                NameClass::local("a"),
                Pattern::Group(vec![r, Pattern::element(NameClass::local("c"), Pattern::Empty)]),
            ),
        )
        .unwrap();
        let start = g.finish().unwrap();
        let s = Schema::compile(&start, Config::default());
        let inner = s.inner.borrow();
        for (i, p) in inner.patterns.iter().enumerate() {
            let fresh = p.flags(|id| inner.flags[id.index()]);
            assert_eq!(fresh, inner.flags[i], "stale flags for {p:?}");
        }
    }

    #[test]
    #[should_panic(expected = "complexity limit")]
    fn pattern_limit() {
        let s = Schema::new(Config {
            pattern_limit: 8,
            ..Config::default()
        });
        for i in 0..10 {
            el(&s, &format!("e{i}"));
        }
    }

    #[test]
    fn dump_marks_shared() {
        let s = schema();
        let a = el(&s, "a");
        let g = s.group(a, s.choice(a, s.empty()));
        let mut out = vec![];
        s.dump(g, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Group"));
        assert!(out.contains("Element[a]"));
        assert!(out.contains('!'));
    }
}
