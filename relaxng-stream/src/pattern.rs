use relaxng_grammar::NameClass;
use relaxng_grammar::datatype::{DatatypeValues, Datatypes};
use std::rc::Rc;

/// Handle on an interned pattern.  Two handles from the same [`crate::Schema`]
/// are equal exactly when the patterns they denote are structurally equal.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub struct PatId(pub(crate) u32);

impl PatId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of content may appear directly inside a pattern, ordered so that
/// combining two patterns takes the maximum.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Debug, Default)]
pub enum ContentType {
    #[default]
    Empty,
    /// element children only
    Complex,
    Mixed,
    /// a single data value
    Data,
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub(crate) struct Flags {
    pub nullable: bool,
    pub content_type: ContentType,
}

// NameClass and datatype payloads sit behind Rc so that `Schema::pat()` can
// hand out clones cheaply while deriving.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub(crate) enum Pat {
    Empty,
    NotAllowed,
    Text,
    Choice(PatId, PatId),
    Group(PatId, PatId),
    Interleave(PatId, PatId),
    OneOrMore(PatId),
    /// `child` must complete, then `residual` applies
    After(PatId, PatId),
    Attribute(Rc<NameClass>, PatId),
    Element(Rc<NameClass>, PatId),
    Data(Rc<Datatypes>),
    DataExcept(Rc<Datatypes>, PatId),
    Value(Rc<DatatypeValues>),
    List(PatId),
    /// A named rule whose body is still being compiled, keyed by rule identity.
    Placeholder(usize),
}

impl Pat {
    /// Flags of this pattern given the flags of its operands.
    pub(crate) fn flags(&self, operand: impl Fn(PatId) -> Flags) -> Flags {
        match self {
            Pat::Empty => Flags {
                nullable: true,
                content_type: ContentType::Empty,
            },
            Pat::NotAllowed | Pat::Attribute(_, _) | Pat::Placeholder(_) => Flags::default(),
            Pat::Text => Flags {
                nullable: true,
                content_type: ContentType::Mixed,
            },
            Pat::Choice(p1, p2) => {
                let (f1, f2) = (operand(*p1), operand(*p2));
                Flags {
                    nullable: f1.nullable || f2.nullable,
                    content_type: f1.content_type.max(f2.content_type),
                }
            }
            Pat::Group(p1, p2) | Pat::Interleave(p1, p2) => {
                let (f1, f2) = (operand(*p1), operand(*p2));
                Flags {
                    nullable: f1.nullable && f2.nullable,
                    content_type: f1.content_type.max(f2.content_type),
                }
            }
            Pat::OneOrMore(p) => operand(*p),
            Pat::After(p1, _) => Flags {
                nullable: false,
                content_type: operand(*p1).content_type,
            },
            Pat::Element(_, _) => Flags {
                nullable: false,
                content_type: ContentType::Complex,
            },
            Pat::Data(_) | Pat::DataExcept(_, _) | Pat::Value(_) | Pat::List(_) => Flags {
                nullable: false,
                content_type: ContentType::Data,
            },
        }
    }
}
