//! Structural restriction checking for grammars.
//!
//! The validator accepts any grammar it is given; a grammar that breaks these
//! restrictions simply validates in ways nobody intended.  Callers building
//! grammars from untrusted input can run [`check_restrictions`] first.
//!
//! Reference: <https://relaxng.org/spec-20011203.html#section7>

use crate::GrammarError;
use crate::model::{DefineRule, Pattern};
use crate::name_class::NameClass;
use std::collections::HashSet;

/// Check the restrictions on the grammar reachable from `start_rule`.
pub fn check_restrictions(start_rule: &DefineRule) -> Result<(), GrammarError> {
    let pattern = start_rule.pattern();

    let mut seen = HashSet::new();
    check_start(pattern, &mut seen)?;

    let mut seen = HashSet::new();
    check_pattern(pattern, WalkContext::default(), &mut seen)
}

// The start pattern may only contain element, choice, ref and notAllowed.
// Optional, ZeroOrMore and Mixed are rejected too since their expansions
// contain forbidden patterns.

fn check_start(pattern: &Pattern, seen: &mut HashSet<usize>) -> Result<(), GrammarError> {
    let forbidden = match pattern {
        Pattern::Element(_, _) | Pattern::NotAllowed => return Ok(()),
        Pattern::Choice(alternatives) => {
            for alt in alternatives {
                check_start(alt, seen)?;
            }
            return Ok(());
        }
        Pattern::Ref(_, pat_ref) => {
            if !seen.insert(pat_ref.key()) {
                return Ok(());
            }
            return match pat_ref.0.borrow().as_ref() {
                Some(rule) => check_start(rule.pattern(), seen),
                None => Ok(()),
            };
        }
        Pattern::Text => "text",
        Pattern::Empty => "empty",
        Pattern::Attribute(_, _) => "attribute",
        Pattern::List(_) => "list",
        Pattern::Group(_) => "group",
        Pattern::Interleave(_) => "interleave",
        Pattern::OneOrMore(_) => "oneOrMore",
        Pattern::ZeroOrMore(_) => "zeroOrMore",
        Pattern::Optional(_) => "optional",
        Pattern::Mixed(_) => "mixed",
        Pattern::DatatypeValue { .. } => "value",
        Pattern::DatatypeName { .. } => "data",
    };
    Err(restricted(forbidden, "start"))
}

/// Which restriction-relevant constructs enclose the pattern being checked.
/// Element boundaries reset everything.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
struct WalkContext {
    in_list: bool,
    in_data_except: bool,
    in_attribute: bool,
    in_one_or_more: bool,
    /// A group or interleave somewhere below a oneOrMore.
    in_one_or_more_group: bool,
}

impl WalkContext {
    /// The innermost enclosing construct that forbids `element` and friends.
    fn enclosing(&self) -> Option<&'static str> {
        if self.in_data_except {
            Some("data/except")
        } else if self.in_list {
            Some("list")
        } else if self.in_attribute {
            Some("attribute")
        } else {
            None
        }
    }
}

// A named rule is rechecked once per distinct context it is reached from, so
// seen entries are keyed on both.
fn check_pattern(
    pattern: &Pattern,
    ctx: WalkContext,
    seen: &mut HashSet<(usize, WalkContext)>,
) -> Result<(), GrammarError> {
    match pattern {
        Pattern::Element(name_class, content) => {
            if let Some(context) = ctx.enclosing() {
                return Err(restricted("element", context));
            }
            check_name_class(name_class)?;
            check_pattern(content, WalkContext::default(), seen)
        }

        Pattern::Attribute(name_class, content) => {
            if ctx.in_attribute {
                return Err(restricted("attribute", "attribute"));
            }
            if ctx.in_list {
                return Err(restricted("attribute", "list"));
            }
            if ctx.in_data_except {
                return Err(restricted("attribute", "data/except"));
            }
            if ctx.in_one_or_more_group {
                return Err(restricted("attribute", "oneOrMore//group"));
            }
            check_attribute_name_class(name_class)?;
            check_name_class(name_class)?;
            check_pattern(
                content,
                WalkContext {
                    in_attribute: true,
                    ..ctx
                },
                seen,
            )
        }

        Pattern::List(content) => {
            if ctx.in_list {
                return Err(restricted("list", "list"));
            }
            if ctx.in_data_except {
                return Err(restricted("list", "data/except"));
            }
            check_pattern(
                content,
                WalkContext {
                    in_list: true,
                    ..ctx
                },
                seen,
            )
        }

        Pattern::DatatypeName { except, .. } => match except {
            Some(except) => check_pattern(
                except,
                WalkContext {
                    in_data_except: true,
                    ..ctx
                },
                seen,
            ),
            None => Ok(()),
        },

        Pattern::Choice(alternatives) => {
            for alt in alternatives {
                check_pattern(alt, ctx, seen)?;
            }
            Ok(())
        }

        Pattern::Group(members) | Pattern::Interleave(members) => {
            let kind = if matches!(pattern, Pattern::Group(_)) {
                "group"
            } else {
                "interleave"
            };
            if ctx.in_data_except {
                return Err(restricted(kind, "data/except"));
            }
            if kind == "interleave" && ctx.in_list {
                return Err(restricted(kind, "list"));
            }
            let child_ctx = WalkContext {
                in_one_or_more_group: ctx.in_one_or_more_group || ctx.in_one_or_more,
                ..ctx
            };
            for m in members {
                check_pattern(m, child_ctx, seen)?;
            }
            Ok(())
        }

        Pattern::Mixed(content) => {
            // interleave with text
            if ctx.in_list {
                return Err(restricted("interleave", "list"));
            }
            if ctx.in_data_except {
                return Err(restricted("interleave", "data/except"));
            }
            check_pattern(
                content,
                WalkContext {
                    in_one_or_more_group: ctx.in_one_or_more_group || ctx.in_one_or_more,
                    ..ctx
                },
                seen,
            )
        }

        Pattern::OneOrMore(content) | Pattern::ZeroOrMore(content) => {
            if ctx.in_data_except {
                return Err(restricted("oneOrMore", "data/except"));
            }
            check_pattern(
                content,
                WalkContext {
                    in_one_or_more: true,
                    ..ctx
                },
                seen,
            )
        }

        Pattern::Optional(content) => {
            if ctx.in_data_except {
                return Err(restricted("empty", "data/except"));
            }
            check_pattern(content, ctx, seen)
        }

        Pattern::Ref(_, pat_ref) => {
            if !seen.insert((pat_ref.key(), ctx)) {
                return Ok(());
            }
            match pat_ref.0.borrow().as_ref() {
                Some(rule) => check_pattern(rule.pattern(), ctx, seen),
                None => Ok(()),
            }
        }

        Pattern::Text => {
            if ctx.in_list {
                return Err(restricted("text", "list"));
            }
            if ctx.in_data_except {
                return Err(restricted("text", "data/except"));
            }
            Ok(())
        }

        Pattern::Empty => {
            if ctx.in_data_except {
                return Err(restricted("empty", "data/except"));
            }
            Ok(())
        }

        Pattern::NotAllowed | Pattern::DatatypeValue { .. } => Ok(()),
    }
}

fn check_name_class(name_class: &NameClass) -> Result<(), GrammarError> {
    match name_class {
        NameClass::AnyName {
            except: Some(except),
        } => check_anyname_except(except),
        NameClass::NsName {
            except: Some(except),
            ..
        } => check_nsname_except(except),
        NameClass::Choice(members) => members.iter().try_for_each(check_name_class),
        NameClass::AnyName { except: None }
        | NameClass::NsName { except: None, .. }
        | NameClass::Named { .. } => Ok(()),
    }
}

const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns";

fn check_attribute_name_class(name_class: &NameClass) -> Result<(), GrammarError> {
    match name_class {
        NameClass::Named {
            namespace_uri,
            name,
        } => {
            if namespace_uri.is_empty() && name == "xmlns" {
                return Err(GrammarError::XmlnsAttributeForbidden);
            }
            if namespace_uri == XMLNS_NAMESPACE {
                return Err(GrammarError::XmlnsNamespaceForbidden);
            }
            Ok(())
        }
        NameClass::NsName {
            namespace_uri,
            except,
        } => {
            if namespace_uri == XMLNS_NAMESPACE {
                return Err(GrammarError::XmlnsNamespaceForbidden);
            }
            except
                .as_deref()
                .map_or(Ok(()), check_attribute_name_class)
        }
        NameClass::AnyName { except } => except
            .as_deref()
            .map_or(Ok(()), check_attribute_name_class),
        NameClass::Choice(members) => members.iter().try_for_each(check_attribute_name_class),
    }
}

// anyName must not appear below an anyName except; neither nsName nor anyName
// may appear below an nsName except.

fn check_anyname_except(except: &NameClass) -> Result<(), GrammarError> {
    match except {
        NameClass::AnyName { .. } => Err(GrammarError::AnyNameInExcept),
        NameClass::Choice(members) => members.iter().try_for_each(check_anyname_except),
        NameClass::NsName { except, .. } => {
            except.as_deref().map_or(Ok(()), check_anyname_except)
        }
        NameClass::Named { .. } => Ok(()),
    }
}

fn check_nsname_except(except: &NameClass) -> Result<(), GrammarError> {
    match except {
        NameClass::AnyName { .. } => Err(GrammarError::AnyNameInNsNameExcept),
        NameClass::NsName { .. } => Err(GrammarError::NsNameInNsNameExcept),
        NameClass::Choice(members) => members.iter().try_for_each(check_nsname_except),
        NameClass::Named { .. } => Ok(()),
    }
}

fn restricted(pattern_name: &'static str, context: &'static str) -> GrammarError {
    GrammarError::RestrictedPattern {
        pattern_name,
        context,
    }
}
