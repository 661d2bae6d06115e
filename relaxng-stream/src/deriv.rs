//! Derivatives of interned patterns with respect to document events.
//! See https://relaxng.org/jclark/derivative.html
//!
//! Every derivative is cached on the [`PatternMemo`] of the pattern it was
//! taken of, and sub-derivatives go through the same cached entry points, so
//! a schema that has seen a document once validates the next one mostly by
//! table lookup.

use crate::pattern::{Pat, PatId};
use crate::schema::Schema;
use fnv::{FnvHashMap, FnvHashSet};
use relaxng_grammar::datatype::relax::is_whitespace_char;
use relaxng_grammar::{Datatype, QName, Specificity, ValidationContext};

/// Cached derivatives of a single pattern.
#[derive(Default)]
pub(crate) struct PatternMemo {
    start_tag_open: FnvHashMap<QName, PatId>,
    start_tag_open_recover: FnvHashMap<QName, PatId>,
    start_attribute: FnvHashMap<QName, PatId>,
    data: FnvHashMap<String, PatId>,
    end_attributes: Option<PatId>,
    ignore_missing_attributes: Option<PatId>,
    text_only: Option<PatId>,
    mixed_text: Option<PatId>,
    end_tag: Option<PatId>,
    recover_after: Option<PatId>,
    fix_after: Option<PatId>,
}

impl PatternMemo {
    pub(crate) fn len(&self) -> usize {
        let maps = self.start_tag_open.len()
            + self.start_tag_open_recover.len()
            + self.start_attribute.len()
            + self.data.len();
        let single = [
            self.end_attributes,
            self.ignore_missing_attributes,
            self.text_only,
            self.mixed_text,
            self.end_tag,
            self.recover_after,
            self.fix_after,
        ];
        maps + single.iter().filter(|d| d.is_some()).count()
    }
}

/// The single-result derivatives, each with its own slot in the memo.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Unary {
    EndAttributes,
    IgnoreMissingAttributes,
    TextOnly,
    MixedText,
    EndTag,
    RecoverAfter,
    FixAfter,
}

impl Unary {
    fn slot(self, memo: &mut PatternMemo) -> &mut Option<PatId> {
        match self {
            Unary::EndAttributes => &mut memo.end_attributes,
            Unary::IgnoreMissingAttributes => &mut memo.ignore_missing_attributes,
            Unary::TextOnly => &mut memo.text_only,
            Unary::MixedText => &mut memo.mixed_text,
            Unary::EndTag => &mut memo.end_tag,
            Unary::RecoverAfter => &mut memo.recover_after,
            Unary::FixAfter => &mut memo.fix_after,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Named {
    StartTagOpen,
    StartTagOpenRecover,
    StartAttribute,
}

impl Named {
    fn table(self, memo: &mut PatternMemo) -> &mut FnvHashMap<QName, PatId> {
        match self {
            Named::StartTagOpen => &mut memo.start_tag_open,
            Named::StartTagOpenRecover => &mut memo.start_tag_open_recover,
            Named::StartAttribute => &mut memo.start_attribute,
        }
    }
}

impl Schema {
    fn memo<T>(&self, id: PatId, f: impl FnOnce(&mut PatternMemo) -> T) -> T {
        f(self.inner.borrow_mut().memos.entry(id).or_default())
    }

    fn unary(&self, id: PatId, op: Unary) -> PatId {
        if self.is_not_allowed(id) {
            return self.not_allowed();
        }
        if let Some(result) = self.memo(id, |m| *op.slot(m)) {
            return result;
        }
        let result = self.compute_unary(id, op);
        self.memo(id, |m| *op.slot(m) = Some(result));
        result
    }

    fn named(&self, id: PatId, op: Named, name: &QName) -> PatId {
        if self.is_not_allowed(id) {
            return self.not_allowed();
        }
        if let Some(result) = self.memo(id, |m| op.table(m).get(name).copied()) {
            return result;
        }
        let result = match op {
            Named::StartTagOpen => self.compute_start_tag_open(id, name, false),
            Named::StartTagOpenRecover => self.compute_start_tag_open(id, name, true),
            Named::StartAttribute => self.compute_start_attribute(id, name),
        };
        self.memo(id, |m| op.table(m).insert(name.clone(), result));
        result
    }

    /// The pattern matching what may follow once an element named `name` has
    /// been opened.
    pub fn start_tag_open_deriv(&self, id: PatId, name: &QName) -> PatId {
        self.named(id, Named::StartTagOpen, name)
    }

    /// Like [`Schema::start_tag_open_deriv`], but a group may skip its first
    /// member even when it is not nullable: the element is accepted as if the
    /// required siblings before it had been present.
    pub fn start_tag_open_recover_deriv(&self, id: PatId, name: &QName) -> PatId {
        self.named(id, Named::StartTagOpenRecover, name)
    }

    pub fn start_attribute_deriv(&self, id: PatId, name: &QName) -> PatId {
        self.named(id, Named::StartAttribute, name)
    }

    /// Close the attribute list of the element just opened; any attribute
    /// still required becomes `notAllowed`.
    pub fn end_attributes_deriv(&self, id: PatId) -> PatId {
        self.unary(id, Unary::EndAttributes)
    }

    /// Like [`Schema::end_attributes_deriv`], but missing attributes are
    /// treated as present.
    pub fn ignore_missing_attributes_deriv(&self, id: PatId) -> PatId {
        self.unary(id, Unary::IgnoreMissingAttributes)
    }

    /// Restrict the current content to what a text-only element may match.
    pub fn text_only_deriv(&self, id: PatId) -> PatId {
        self.unary(id, Unary::TextOnly)
    }

    /// Accept non-whitespace text in mixed content.
    pub fn mixed_text_deriv(&self, id: PatId) -> PatId {
        self.unary(id, Unary::MixedText)
    }

    pub fn end_tag_deriv(&self, id: PatId) -> PatId {
        self.unary(id, Unary::EndTag)
    }

    /// Abandon the content of the current element and continue with what
    /// follows it.
    pub fn recover_after(&self, id: PatId) -> PatId {
        self.unary(id, Unary::RecoverAfter)
    }

    /// Replace what follows the current element with `empty`, to tell apart
    /// errors in the element itself from errors in what comes after it.
    pub fn fix_after(&self, id: PatId) -> PatId {
        self.unary(id, Unary::FixAfter)
    }

    fn compute_start_tag_open(&self, id: PatId, name: &QName, recover: bool) -> PatId {
        let op = if recover {
            Named::StartTagOpenRecover
        } else {
            Named::StartTagOpen
        };
        match self.pat(id) {
            Pat::Choice(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let d2 = self.named(p2, op, name);
                self.choice(d1, d2)
            }
            Pat::Group(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let x = self.apply_after(d1, &|p| self.group(p, p2));
                if recover || self.is_nullable(p1) {
                    let d2 = self.named(p2, op, name);
                    self.choice(x, d2)
                } else {
                    x
                }
            }
            Pat::Interleave(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let c1 = self.apply_after(d1, &|p| self.interleave(p, p2));
                let d2 = self.named(p2, op, name);
                let c2 = self.apply_after(d2, &|p| self.interleave(p1, p));
                self.choice(c1, c2)
            }
            Pat::After(p1, p2) => {
                let d1 = self.named(p1, op, name);
                self.apply_after(d1, &|p| self.after(p, p2))
            }
            Pat::OneOrMore(p1) => {
                let d1 = self.named(p1, op, name);
                self.apply_after(d1, &|p| self.group(p, self.choice(id, self.empty())))
            }
            Pat::Element(nc, content) => {
                if nc.contains(name) {
                    self.after(content, self.empty())
                } else {
                    self.not_allowed()
                }
            }
            Pat::Empty
            | Pat::NotAllowed
            | Pat::Text
            | Pat::Attribute(_, _)
            | Pat::Data(_)
            | Pat::DataExcept(_, _)
            | Pat::Value(_)
            | Pat::List(_) => self.not_allowed(),
            Pat::Placeholder(key) => unreachable!("unresolved placeholder {key:#x}"),
        }
    }

    fn compute_start_attribute(&self, id: PatId, name: &QName) -> PatId {
        let op = Named::StartAttribute;
        match self.pat(id) {
            Pat::Choice(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let d2 = self.named(p2, op, name);
                self.choice(d1, d2)
            }
            Pat::Group(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let c1 = self.apply_after(d1, &|p| self.group(p, p2));
                let d2 = self.named(p2, op, name);
                let c2 = self.apply_after(d2, &|p| self.group(p1, p));
                self.choice(c1, c2)
            }
            Pat::Interleave(p1, p2) => {
                let d1 = self.named(p1, op, name);
                let c1 = self.apply_after(d1, &|p| self.interleave(p, p2));
                let d2 = self.named(p2, op, name);
                let c2 = self.apply_after(d2, &|p| self.interleave(p1, p));
                self.choice(c1, c2)
            }
            Pat::After(p1, p2) => {
                let d1 = self.named(p1, op, name);
                self.apply_after(d1, &|p| self.after(p, p2))
            }
            Pat::OneOrMore(p1) => {
                let d1 = self.named(p1, op, name);
                self.apply_after(d1, &|p| self.group(p, self.choice(id, self.empty())))
            }
            Pat::Attribute(nc, value) => {
                if nc.contains(name) {
                    self.after(value, self.empty())
                } else {
                    self.not_allowed()
                }
            }
            Pat::Empty
            | Pat::NotAllowed
            | Pat::Text
            | Pat::Element(_, _)
            | Pat::Data(_)
            | Pat::DataExcept(_, _)
            | Pat::Value(_)
            | Pat::List(_) => self.not_allowed(),
            Pat::Placeholder(key) => unreachable!("unresolved placeholder {key:#x}"),
        }
    }

    fn compute_unary(&self, id: PatId, op: Unary) -> PatId {
        match op {
            Unary::EndAttributes | Unary::IgnoreMissingAttributes | Unary::TextOnly => {
                self.strip(id, op)
            }
            Unary::MixedText => self.compute_mixed_text(id),
            Unary::EndTag => match self.pat(id) {
                Pat::Choice(p1, p2) => {
                    let d1 = self.end_tag_deriv(p1);
                    let d2 = self.end_tag_deriv(p2);
                    self.choice(d1, d2)
                }
                Pat::After(p1, p2) if self.is_nullable(p1) => p2,
                _ => self.not_allowed(),
            },
            Unary::RecoverAfter => match self.pat(id) {
                Pat::Choice(p1, p2) => {
                    let d1 = self.recover_after(p1);
                    let d2 = self.recover_after(p2);
                    self.choice(d1, d2)
                }
                Pat::After(_, p2) => p2,
                _ => self.not_allowed(),
            },
            Unary::FixAfter => match self.pat(id) {
                Pat::Choice(p1, p2) => {
                    let d1 = self.fix_after(p1);
                    let d2 = self.fix_after(p2);
                    self.choice(d1, d2)
                }
                Pat::After(p1, _) => self.after(p1, self.empty()),
                _ => id,
            },
        }
    }

    /// The derivatives that rewrite the leaves of the current content without
    /// consuming anything: attributes are dropped (or satisfied), and for
    /// text-only content so are elements.
    fn strip(&self, id: PatId, op: Unary) -> PatId {
        match self.pat(id) {
            Pat::After(p1, p2) => {
                let d1 = self.unary(p1, op);
                self.after(d1, p2)
            }
            Pat::Choice(p1, p2) => {
                let d1 = self.unary(p1, op);
                let d2 = self.unary(p2, op);
                self.choice(d1, d2)
            }
            Pat::Group(p1, p2) => {
                let d1 = self.unary(p1, op);
                let d2 = self.unary(p2, op);
                self.group(d1, d2)
            }
            Pat::Interleave(p1, p2) => {
                let d1 = self.unary(p1, op);
                let d2 = self.unary(p2, op);
                self.interleave(d1, d2)
            }
            Pat::OneOrMore(p1) => {
                let d1 = self.unary(p1, op);
                self.one_or_more(d1)
            }
            Pat::Attribute(_, _) if op == Unary::IgnoreMissingAttributes => self.empty(),
            Pat::Attribute(_, _) => self.not_allowed(),
            Pat::Element(_, _) if op == Unary::TextOnly => self.not_allowed(),
            _ => id,
        }
    }

    fn compute_mixed_text(&self, id: PatId) -> PatId {
        match self.pat(id) {
            Pat::Choice(p1, p2) => {
                let d1 = self.mixed_text_deriv(p1);
                let d2 = self.mixed_text_deriv(p2);
                self.choice(d1, d2)
            }
            Pat::Group(p1, p2) => {
                let d1 = self.mixed_text_deriv(p1);
                let x = self.group(d1, p2);
                if self.is_nullable(p1) {
                    let d2 = self.mixed_text_deriv(p2);
                    self.choice(x, d2)
                } else {
                    x
                }
            }
            Pat::Interleave(p1, p2) => {
                let d1 = self.mixed_text_deriv(p1);
                let c1 = self.interleave(d1, p2);
                let d2 = self.mixed_text_deriv(p2);
                let c2 = self.interleave(p1, d2);
                self.choice(c1, c2)
            }
            Pat::After(p1, p2) => {
                let d1 = self.mixed_text_deriv(p1);
                self.after(d1, p2)
            }
            Pat::OneOrMore(p1) => {
                let d1 = self.mixed_text_deriv(p1);
                self.group(d1, self.choice(id, self.empty()))
            }
            Pat::Text => id,
            _ => self.not_allowed(),
        }
    }

    // the function argument comes last here, unlike applyAfter() in the paper
    fn apply_after(&self, id: PatId, f: &dyn Fn(PatId) -> PatId) -> PatId {
        match self.pat(id) {
            Pat::After(p1, p2) => self.after(p1, f(p2)),
            Pat::Choice(p1, p2) => {
                let c1 = self.apply_after(p1, f);
                let c2 = self.apply_after(p2, f);
                self.choice(c1, c2)
            }
            Pat::NotAllowed => self.not_allowed(),
            p => unreachable!("only After, Choice or NotAllowed may be passed to apply_after(): {p:?}"),
        }
    }

    /// The pattern matching the remaining content once `text` has been
    /// consumed as the whole data value (or attribute value) of the current
    /// element.
    pub fn data_deriv(&self, id: PatId, text: &str, ctx: &dyn ValidationContext) -> PatId {
        let mut local = FnvHashMap::default();
        self.data_deriv_rec(id, text, ctx, &mut local)
    }

    fn data_deriv_rec(
        &self,
        id: PatId,
        text: &str,
        ctx: &dyn ValidationContext,
        local: &mut FnvHashMap<PatId, PatId>,
    ) -> PatId {
        if self.is_not_allowed(id) {
            return self.not_allowed();
        }
        if let Some(&result) = local.get(&id) {
            return result;
        }
        let shared = self.config.cache_data_derivs && !self.is_context_dependent(id);
        if shared {
            if let Some(result) = self.memo(id, |m| m.data.get(text).copied()) {
                local.insert(id, result);
                return result;
            }
        }
        let result = match self.pat(id) {
            Pat::Choice(p1, p2) => {
                let d1 = self.data_deriv_rec(p1, text, ctx, local);
                let d2 = self.data_deriv_rec(p2, text, ctx, local);
                self.choice(d1, d2)
            }
            Pat::Group(p1, p2) => {
                let d1 = self.data_deriv_rec(p1, text, ctx, local);
                let x = self.group(d1, p2);
                if self.is_nullable(p1) {
                    let d2 = self.data_deriv_rec(p2, text, ctx, local);
                    self.choice(x, d2)
                } else {
                    x
                }
            }
            Pat::Interleave(p1, p2) => {
                let d1 = self.data_deriv_rec(p1, text, ctx, local);
                let c1 = self.interleave(d1, p2);
                let d2 = self.data_deriv_rec(p2, text, ctx, local);
                let c2 = self.interleave(p1, d2);
                self.choice(c1, c2)
            }
            Pat::OneOrMore(p1) => {
                let d1 = self.data_deriv_rec(p1, text, ctx, local);
                self.group(d1, self.choice(id, self.empty()))
            }
            Pat::After(p1, p2) => {
                let d1 = self.data_deriv_rec(p1, text, ctx, local);
                if self.is_nullable(d1) || (self.is_nullable(p1) && is_whitespace(text)) {
                    p2
                } else {
                    self.not_allowed()
                }
            }
            Pat::Text => id,
            Pat::Data(dt) => self.empty_if(dt.is_valid(text, ctx)),
            Pat::DataExcept(dt, except) => {
                let valid = dt.is_valid(text, ctx) && {
                    let d = self.data_deriv_rec(except, text, ctx, local);
                    !self.is_nullable(d)
                };
                self.empty_if(valid)
            }
            Pat::Value(v) => self.empty_if(v.is_valid(text, ctx)),
            Pat::List(p1) => {
                let mut current = p1;
                for token in text.split(is_whitespace_char).filter(|t| !t.is_empty()) {
                    current = self.data_deriv(current, token, ctx);
                    if self.is_not_allowed(current) {
                        break;
                    }
                }
                self.empty_if(self.is_nullable(current))
            }
            Pat::Empty | Pat::NotAllowed | Pat::Attribute(_, _) | Pat::Element(_, _) => {
                self.not_allowed()
            }
            Pat::Placeholder(key) => unreachable!("unresolved placeholder {key:#x}"),
        };
        local.insert(id, result);
        if shared {
            self.memo(id, |m| m.data.insert(text.to_string(), result));
        }
        result
    }

    fn empty_if(&self, cond: bool) -> PatId {
        if cond {
            self.empty()
        } else {
            self.not_allowed()
        }
    }

    /// Whether the data derivative of `id` may depend on the namespace
    /// bindings in scope.
    pub(crate) fn is_context_dependent(&self, id: PatId) -> bool {
        if let Some(&known) = self.inner.borrow().context_dependent.get(&id) {
            return known;
        }
        self.inner
            .borrow_mut()
            .context_dependent
            .insert(id, false);
        let result = match self.pat(id) {
            Pat::Choice(p1, p2) | Pat::Group(p1, p2) | Pat::Interleave(p1, p2) => {
                self.is_context_dependent(p1) || self.is_context_dependent(p2)
            }
            Pat::OneOrMore(p1) | Pat::List(p1) | Pat::After(p1, _) => self.is_context_dependent(p1),
            Pat::Data(dt) => dt.is_context_dependent(),
            Pat::DataExcept(dt, except) => {
                dt.is_context_dependent() || self.is_context_dependent(except)
            }
            Pat::Value(v) => v.is_context_dependent(),
            _ => false,
        };
        self.inner
            .borrow_mut()
            .context_dependent
            .insert(id, result);
        result
    }

    /// The content of every element in the grammar whose name class matches
    /// `name` most specifically, as a choice; `notAllowed` if none does.
    /// Used to carry on validating inside an element that appeared where it
    /// was not expected.
    pub fn find_element(&self, name: &QName) -> PatId {
        self.element_searches.set(self.element_searches.get() + 1);
        let mut seen = FnvHashSet::default();
        let mut stack = vec![self.start()];
        let mut best = Specificity::None;
        let mut result = self.not_allowed();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.pat(id) {
                Pat::Choice(p1, p2)
                | Pat::Group(p1, p2)
                | Pat::Interleave(p1, p2)
                | Pat::After(p1, p2) => {
                    stack.push(p2);
                    stack.push(p1);
                }
                Pat::OneOrMore(p1) => stack.push(p1),
                Pat::Element(nc, content) => {
                    let specificity = nc.contains_specificity(name);
                    if specificity > best {
                        best = specificity;
                        result = content;
                    } else if specificity == best && specificity > Specificity::None {
                        result = self.choice(result, content);
                    }
                    stack.push(content);
                }
                _ => {}
            }
        }
        log::debug!("element {name} found with specificity {best:?}");
        result
    }
}

fn is_whitespace(text: &str) -> bool {
    text.chars().all(is_whitespace_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::pattern::ContentType;
    use relaxng_grammar::NameClass;
    use relaxng_grammar::datatype::relax::{BuiltinDatatypeValues, BuiltinDatatypes};
    use relaxng_grammar::datatype::xsd::{self, XsdDatatypes};
    use relaxng_grammar::datatype::{DatatypeValues, Datatypes, EmptyContext, PrefixBindings};

    fn schema() -> Schema {
        Schema::new(Config::default())
    }

    fn q(name: &str) -> QName {
        QName::local(name)
    }

    fn token(s: &Schema) -> PatId {
        s.data(Datatypes::Relax(BuiltinDatatypes::Token))
    }

    fn integer(s: &Schema) -> PatId {
        let dt = xsd::Compiler.compile("integer", &[]).unwrap();
        s.data(Datatypes::Xsd(dt))
    }

    /// Open element `name`, close its attribute list, and return the state
    /// inside it.
    fn open(s: &Schema, id: PatId, name: &str) -> PatId {
        let d = s.start_tag_open_deriv(id, &q(name));
        s.end_attributes_deriv(d)
    }

    #[test]
    fn element_sequence() {
        // element doc { element a { empty }, element b { empty } }
        let s = schema();
        let a = s.element(NameClass::local("a"), s.empty());
        let b = s.element(NameClass::local("b"), s.empty());
        let doc = s.element(NameClass::local("doc"), s.group(a, b));

        let inside = open(&s, doc, "doc");
        assert!(!s.is_not_allowed(inside));
        assert!(s.is_not_allowed(s.start_tag_open_deriv(inside, &q("b"))));
        let in_a = open(&s, inside, "a");
        let after_a = s.end_tag_deriv(in_a);
        assert!(!s.is_not_allowed(after_a));
        // doc is not finished until b has been seen
        assert!(s.is_not_allowed(s.end_tag_deriv(after_a)));
        let after_b = s.end_tag_deriv(open(&s, after_a, "b"));
        let done = s.end_tag_deriv(after_b);
        assert!(s.is_nullable(done));
    }

    #[test]
    fn recover_skips_required_sibling() {
        let s = schema();
        let a = s.element(NameClass::local("a"), s.empty());
        let b = s.element(NameClass::local("b"), s.empty());
        let doc = s.element(NameClass::local("doc"), s.group(a, b));
        let inside = open(&s, doc, "doc");
        assert!(s.is_not_allowed(s.start_tag_open_deriv(inside, &q("b"))));
        let recovered = s.start_tag_open_recover_deriv(inside, &q("b"));
        assert!(!s.is_not_allowed(recovered));
    }

    #[test]
    fn attributes() {
        // element a { attribute x { token }, attribute y { token }? }
        let s = schema();
        let x = s.attribute(NameClass::local("x"), token(&s));
        let y = s.attribute(NameClass::local("y"), token(&s));
        let a = s.element(
            NameClass::local("a"),
            s.group(x, s.choice(y, s.empty())),
        );
        let opened = s.start_tag_open_deriv(a, &q("a"));

        // x missing
        assert!(s.is_not_allowed(s.end_attributes_deriv(opened)));
        assert!(!s.is_not_allowed(s.ignore_missing_attributes_deriv(opened)));

        let with_x = s.start_attribute_deriv(opened, &q("x"));
        let with_x = s.data_deriv(with_x, "v", &EmptyContext);
        assert!(!s.is_not_allowed(s.end_attributes_deriv(with_x)));

        assert!(s.is_not_allowed(s.start_attribute_deriv(opened, &q("z"))));
    }

    #[test]
    fn data_content() {
        let s = schema();
        let a = s.element(NameClass::local("a"), integer(&s));
        let inside = open(&s, a, "a");
        assert_eq!(s.content_type(inside), ContentType::Data);
        let ok = s.data_deriv(s.text_only_deriv(inside), " 42 ", &EmptyContext);
        assert!(s.is_nullable(ok));
        let bad = s.data_deriv(s.text_only_deriv(inside), "forty-two", &EmptyContext);
        assert!(s.is_not_allowed(bad));
    }

    #[test]
    fn whitespace_where_data_is_optional() {
        // element a { integer? }
        let s = schema();
        let a = s.element(NameClass::local("a"), s.choice(integer(&s), s.empty()));
        let inside = open(&s, a, "a");
        assert!(s.is_nullable(s.data_deriv(inside, "  \n", &EmptyContext)));
        assert!(s.is_not_allowed(s.data_deriv(inside, " x ", &EmptyContext)));
    }

    #[test]
    fn data_except() {
        // token - "no"
        let s = schema();
        let no = s.value(DatatypeValues::Relax(BuiltinDatatypeValues::Token(
            "no".to_string(),
        )));
        let p = s.data_except(Datatypes::Relax(BuiltinDatatypes::Token), no);
        let a = s.element(NameClass::local("a"), p);
        let inside = open(&s, a, "a");
        assert!(s.is_nullable(s.data_deriv(inside, "yes", &EmptyContext)));
        assert!(s.is_not_allowed(s.data_deriv(inside, " no ", &EmptyContext)));
    }

    #[test]
    fn list_tokens_are_derived_in_turn() {
        // list { integer, integer+ }
        let s = schema();
        let ints = s.group(integer(&s), s.one_or_more(integer(&s)));
        let a = s.element(NameClass::local("a"), s.list(ints));
        let inside = open(&s, a, "a");
        assert!(s.is_nullable(s.data_deriv(inside, "1 2 3", &EmptyContext)));
        assert!(s.is_nullable(s.data_deriv(inside, "\n1\t2 ", &EmptyContext)));
        assert!(s.is_not_allowed(s.data_deriv(inside, "1", &EmptyContext)));
        assert!(s.is_not_allowed(s.data_deriv(inside, "1 x", &EmptyContext)));
    }

    #[test]
    fn mixed_text() {
        let s = schema();
        let b = s.element(NameClass::local("b"), s.empty());
        let a = s.element(NameClass::local("a"), s.mixed(s.one_or_more(b)));
        let inside = open(&s, a, "a");
        let after_text = s.mixed_text_deriv(inside);
        assert!(!s.is_not_allowed(after_text));

        let c = s.element(NameClass::local("c"), s.one_or_more(b));
        let inside_c = open(&s, c, "c");
        assert!(s.is_not_allowed(s.mixed_text_deriv(inside_c)));
    }

    #[test]
    fn interleave_either_order() {
        let s = schema();
        let a = s.element(NameClass::local("a"), s.empty());
        let b = s.element(NameClass::local("b"), s.empty());
        let doc = s.element(NameClass::local("doc"), s.interleave(a, b));
        let inside = open(&s, doc, "doc");
        for (first, second) in [("a", "b"), ("b", "a")] {
            let p = s.end_tag_deriv(open(&s, inside, first));
            let p = s.end_tag_deriv(open(&s, p, second));
            assert!(s.is_nullable(s.end_tag_deriv(p)), "{first} then {second}");
        }
    }

    #[test]
    fn recover_and_fix_after() {
        let s = schema();
        let a = s.element(NameClass::local("a"), integer(&s));
        let doc = s.element(NameClass::local("doc"), s.one_or_more(a));
        let inside_doc = open(&s, doc, "doc");
        let inside_a = open(&s, inside_doc, "a");
        let rest = s.recover_after(inside_a);
        assert!(!s.is_not_allowed(rest));
        // after abandoning a, another a may follow
        assert!(!s.is_not_allowed(s.start_tag_open_deriv(rest, &q("a"))));

        let fixed = s.fix_after(inside_a);
        assert_matches::assert_matches!(s.pat(fixed), Pat::After(_, e) if e == s.empty());
        assert_eq!(s.fix_after(s.empty()), s.empty());
        assert!(s.is_not_allowed(s.recover_after(s.empty())));
    }

    #[test]
    fn memo_hits() {
        let s = schema();
        let a = s.element(NameClass::local("a"), token(&s));
        let doc = s.element(NameClass::local("doc"), s.one_or_more(a));
        let walk = || {
            let inside = open(&s, doc, "doc");
            let inside_a = s.text_only_deriv(open(&s, inside, "a"));
            let p = s.data_deriv(inside_a, "x", &EmptyContext);
            s.end_tag_deriv(s.end_tag_deriv(p))
        };
        let first = walk();
        let stats = s.stats();
        assert_eq!(walk(), first);
        assert_eq!(s.stats(), stats);
    }

    #[test]
    fn context_dependent_data_not_cached() {
        let s = schema();
        let qname = s.data(Datatypes::Xsd(XsdDatatypes::QName(None)));
        let a = s.element(NameClass::local("a"), qname);
        let inside = open(&s, a, "a");
        assert!(s.is_context_dependent(inside));
        assert!(!s.is_context_dependent(open(&s, s.element(NameClass::local("b"), token(&s)), "b")));

        let bound = [("p".to_string(), "urn:p".to_string())];
        assert!(s.is_nullable(s.data_deriv(inside, "p:x", &PrefixBindings(&bound))));
        assert!(s.is_not_allowed(s.data_deriv(inside, "p:x", &EmptyContext)));
    }

    #[test]
    fn data_cache_can_be_disabled() {
        let s = Schema::new(Config {
            cache_data_derivs: false,
            ..Config::default()
        });
        let a = s.element(NameClass::local("a"), token(&s));
        let inside = open(&s, a, "a");
        let before = s.stats().memo_entries;
        assert!(s.is_nullable(s.data_deriv(inside, "x", &EmptyContext)));
        assert_eq!(s.stats().memo_entries, before);
    }

    #[test]
    fn find_element_prefers_specific_name() {
        let s = schema();
        let specific = s.element(NameClass::local("a"), s.text());
        let wildcard = s.element(NameClass::any_name(None), s.empty());
        let doc = s.element(
            NameClass::local("doc"),
            s.group(s.one_or_more(specific), s.choice(wildcard, s.empty())),
        );
        s.set_start(doc);
        assert_eq!(s.find_element(&q("a")), s.text());
        assert_eq!(s.find_element(&q("zzz")), s.empty());
        assert_eq!(s.find_element(&q("doc")), s.group(s.one_or_more(specific), s.choice(wildcard, s.empty())));
        assert_eq!(s.stats().element_searches, 3);
    }

    #[test]
    fn find_element_joins_equally_specific() {
        let s = schema();
        let a1 = s.element(NameClass::local("a"), s.text());
        let a2 = s.element(NameClass::local("a"), s.empty());
        let doc = s.element(NameClass::local("doc"), s.choice(a1, a2));
        s.set_start(doc);
        let found = s.find_element(&q("a"));
        assert!(s.is_nullable(found));
        assert_eq!(s.content_type(found), ContentType::Mixed);
        assert!(s.is_not_allowed(s.find_element(&q("b"))));
    }
}
