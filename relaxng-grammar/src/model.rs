//! The grammar handed to the validator: an un-interned pattern tree whose
//! named rules may refer to one another (and to themselves) through
//! [`PatRef`] handles.

use crate::GrammarError;
use crate::datatype::{self, DatatypeValues, Datatypes};
use crate::name_class::NameClass;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub enum Pattern {
    Choice(Vec<Pattern>),
    Interleave(Vec<Pattern>),
    Group(Vec<Pattern>),
    Mixed(Box<Pattern>),
    Empty,
    Text,
    NotAllowed,
    Optional(Box<Pattern>),
    ZeroOrMore(Box<Pattern>),
    OneOrMore(Box<Pattern>),
    Attribute(NameClass, Box<Pattern>),
    Element(NameClass, Box<Pattern>),
    Ref(String, PatRef),
    DatatypeValue {
        datatype: DatatypeValues,
    },
    DatatypeName {
        datatype: Datatypes,
        except: Option<Box<Pattern>>,
    },
    List(Box<Pattern>),
}

impl Pattern {
    pub fn element(name: NameClass, content: Pattern) -> Pattern {
        Pattern::Element(name, Box::new(content))
    }

    pub fn attribute(name: NameClass, content: Pattern) -> Pattern {
        Pattern::Attribute(name, Box::new(content))
    }

    pub fn optional(p: Pattern) -> Pattern {
        Pattern::Optional(Box::new(p))
    }

    pub fn zero_or_more(p: Pattern) -> Pattern {
        Pattern::ZeroOrMore(Box::new(p))
    }

    pub fn one_or_more(p: Pattern) -> Pattern {
        Pattern::OneOrMore(Box::new(p))
    }

    pub fn mixed(p: Pattern) -> Pattern {
        Pattern::Mixed(Box::new(p))
    }

    pub fn list(p: Pattern) -> Pattern {
        Pattern::List(Box::new(p))
    }

    pub fn data(datatype: Datatypes) -> Pattern {
        Pattern::DatatypeName {
            datatype,
            except: None,
        }
    }

    pub fn data_except(datatype: Datatypes, except: Pattern) -> Pattern {
        Pattern::DatatypeName {
            datatype,
            except: Some(Box::new(except)),
        }
    }

    pub fn value(datatype: DatatypeValues) -> Pattern {
        Pattern::DatatypeValue { datatype }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineRule {
    Choice,
    Interleave,
}

/// The body of a named rule.
#[derive(Clone, Debug)]
pub enum DefineRule {
    /// `name = pattern`, possibly with further `|=` / `&=` contributions.
    Assign(String, Option<CombineRule>, Pattern),
    /// Only `|=` / `&=` contributions so far.
    CombineOnly(String, CombineRule, Pattern),
}

impl DefineRule {
    pub fn name(&self) -> &str {
        match self {
            DefineRule::Assign(name, _, _) => name,
            DefineRule::CombineOnly(name, _, _) => name,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        match self {
            DefineRule::Assign(_, _, p) => p,
            DefineRule::CombineOnly(_, _, p) => p,
        }
    }

    fn into_pattern(self) -> Pattern {
        match self {
            DefineRule::Assign(_, _, p) => p,
            DefineRule::CombineOnly(_, _, p) => p,
        }
    }

    fn combine_rule(&self) -> Option<CombineRule> {
        match self {
            DefineRule::Assign(_, c, _) => *c,
            DefineRule::CombineOnly(_, c, _) => Some(*c),
        }
    }
}

/// A shared, late-bound handle on a named rule.  The handle exists as soon as
/// the name is first mentioned; the rule fills it in when defined.
#[derive(Clone)]
pub struct PatRef(pub Rc<RefCell<Option<DefineRule>>>);

impl PatRef {
    pub fn is_resolved(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Identity of the underlying rule, stable for the lifetime of the grammar.
    pub fn key(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for PatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // rules may be recursive, so never descend into the body
        match self.0.borrow().as_ref() {
            Some(rule) => write!(f, "PatRef({:?})", rule.name()),
            None => f.write_str("PatRef(<undefined>)"),
        }
    }
}

pub const START: &str = "start";

/// Collects named rules and resolves references between them.
///
/// ```
/// use relaxng_grammar::model::{Grammar, Pattern};
/// use relaxng_grammar::NameClass;
///
/// let mut g = Grammar::new();
/// let item = g.reference("item");
/// g.define("item", Pattern::element(NameClass::local("item"), Pattern::Text)).unwrap();
/// g.define("start", Pattern::element(NameClass::local("list"), Pattern::zero_or_more(item))).unwrap();
/// let start = g.finish().unwrap();
/// assert_eq!(start.name(), "start");
/// ```
#[derive(Default)]
pub struct Grammar {
    refs: HashMap<String, PatRef>,
    datatypes: datatype::Compiler,
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar::default()
    }

    /// A pattern referring to the rule `name`, which need not be defined yet.
    pub fn reference(&mut self, name: &str) -> Pattern {
        Pattern::Ref(name.to_string(), self.acquire_ref(name))
    }

    fn acquire_ref(&mut self, name: &str) -> PatRef {
        self.refs
            .entry(name.to_string())
            .or_insert_with(|| PatRef(Rc::new(RefCell::new(None))))
            .clone()
    }

    /// `name = pattern`
    pub fn define(&mut self, name: &str, pattern: Pattern) -> Result<(), GrammarError> {
        self.add(DefineRule::Assign(name.to_string(), None, pattern))
    }

    /// `name |= pattern` or `name &= pattern`
    pub fn combine(
        &mut self,
        name: &str,
        rule: CombineRule,
        pattern: Pattern,
    ) -> Result<(), GrammarError> {
        self.add(DefineRule::CombineOnly(name.to_string(), rule, pattern))
    }

    fn add(&mut self, rule: DefineRule) -> Result<(), GrammarError> {
        let r = self.acquire_ref(rule.name());
        let mut slot = r.0.borrow_mut();
        let merged = match slot.as_ref() {
            None => rule,
            Some(existing) => Self::merge(existing.clone(), rule)?,
        };
        *slot = Some(merged);
        Ok(())
    }

    fn merge(a: DefineRule, b: DefineRule) -> Result<DefineRule, GrammarError> {
        let name = a.name().to_string();
        let a_assigns = matches!(a, DefineRule::Assign(..));
        let b_assigns = matches!(b, DefineRule::Assign(..));
        if a_assigns && b_assigns {
            return Err(GrammarError::DuplicateDefinition { name });
        }
        let combine = match (a.combine_rule(), b.combine_rule()) {
            (Some(x), Some(y)) if x != y => {
                return Err(GrammarError::IncompatibleCombination { name });
            }
            (Some(x), _) | (None, Some(x)) => x,
            (None, None) => return Err(GrammarError::DuplicateDefinition { name }),
        };
        let (pa, pb) = (a.into_pattern(), b.into_pattern());
        let pattern = match combine {
            CombineRule::Choice => match pa {
                Pattern::Choice(mut v) => {
                    v.push(pb);
                    Pattern::Choice(v)
                }
                pa => Pattern::Choice(vec![pa, pb]),
            },
            CombineRule::Interleave => match pa {
                Pattern::Interleave(mut v) => {
                    v.push(pb);
                    Pattern::Interleave(v)
                }
                pa => Pattern::Interleave(vec![pa, pb]),
            },
        };
        Ok(if a_assigns || b_assigns {
            DefineRule::Assign(name, Some(combine), pattern)
        } else {
            DefineRule::CombineOnly(name, combine, pattern)
        })
    }

    /// A `data` pattern for a datatype from one of the built-in libraries.
    pub fn data(
        &self,
        library: &str,
        name: &str,
        params: &[(String, String)],
    ) -> Result<Pattern, GrammarError> {
        Ok(Pattern::data(
            self.datatypes.datatype_name(library, name, params)?,
        ))
    }

    /// A `value` pattern; `ns` lists the namespace bindings in scope where the
    /// value was written.
    pub fn value(
        &self,
        library: &str,
        name: &str,
        value: &str,
        ns: &[(String, String)],
    ) -> Result<Pattern, GrammarError> {
        Ok(Pattern::value(
            self.datatypes.datatype_value(library, name, value, ns)?,
        ))
    }

    /// Check every mentioned rule is defined and return the start rule.
    pub fn finish(self) -> Result<DefineRule, GrammarError> {
        let mut undefined: Vec<&String> = self
            .refs
            .iter()
            .filter(|(name, r)| name.as_str() != START && !r.is_resolved())
            .map(|(name, _)| name)
            .collect();
        undefined.sort();
        if let Some(name) = undefined.first() {
            return Err(GrammarError::UndefinedReference {
                name: name.to_string(),
            });
        }
        let start = self
            .refs
            .get(START)
            .and_then(|r| r.0.borrow().clone())
            .ok_or(GrammarError::StartRuleNotDefined)?;
        log::debug!("grammar finished with {} named rules", self.refs.len());
        Ok(start)
    }
}
