//! Name classes: predicates over qualified names.
//!
//! A name class decides which element or attribute names a pattern admits.
//! Besides plain membership, a name class can report *how specifically* it
//! matches a name, which the validator uses to pick the most plausible rule
//! when reporting an element that appeared out of context.

use std::fmt;

/// A namespace-qualified name.  An empty `namespace_uri` means the name is in
/// no namespace.
#[derive(PartialEq, Eq, Hash, Clone, Debug, PartialOrd, Ord)]
pub struct QName {
    pub namespace_uri: String,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace_uri: impl Into<String>, local_name: impl Into<String>) -> QName {
        QName {
            namespace_uri: namespace_uri.into(),
            local_name: local_name.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local_name: impl Into<String>) -> QName {
        QName::new("", local_name)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_name)
        }
    }
}

/// How specifically a name class matched a name, lowest first.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum Specificity {
    None,
    AnyName,
    NsName,
    Name,
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum NameClass {
    Named {
        namespace_uri: String,
        name: String,
    },
    NsName {
        namespace_uri: String,
        except: Option<Box<NameClass>>,
    },
    AnyName {
        except: Option<Box<NameClass>>,
    },
    Choice(Vec<NameClass>),
}

impl NameClass {
    pub fn named(namespace_uri: impl Into<String>, name: impl Into<String>) -> NameClass {
        NameClass::Named {
            namespace_uri: namespace_uri.into(),
            name: name.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(name: impl Into<String>) -> NameClass {
        NameClass::named("", name)
    }

    pub fn ns_name(namespace_uri: impl Into<String>, except: Option<NameClass>) -> NameClass {
        NameClass::NsName {
            namespace_uri: namespace_uri.into(),
            except: except.map(Box::new),
        }
    }

    pub fn any_name(except: Option<NameClass>) -> NameClass {
        NameClass::AnyName {
            except: except.map(Box::new),
        }
    }

    pub fn contains(&self, name: &QName) -> bool {
        match self {
            NameClass::Named {
                namespace_uri,
                name: local,
            } => *namespace_uri == name.namespace_uri && *local == name.local_name,
            NameClass::NsName {
                namespace_uri,
                except,
            } => {
                *namespace_uri == name.namespace_uri
                    && !except.as_ref().is_some_and(|nc| nc.contains(name))
            }
            NameClass::AnyName { except } => !except.as_ref().is_some_and(|nc| nc.contains(name)),
            NameClass::Choice(members) => members.iter().any(|nc| nc.contains(name)),
        }
    }

    /// Like [`NameClass::contains`], but reports the kind of name class that
    /// admitted `name`.
    pub fn contains_specificity(&self, name: &QName) -> Specificity {
        match self {
            NameClass::Named { .. } => {
                if self.contains(name) {
                    Specificity::Name
                } else {
                    Specificity::None
                }
            }
            NameClass::NsName { .. } => {
                if self.contains(name) {
                    Specificity::NsName
                } else {
                    Specificity::None
                }
            }
            NameClass::AnyName { .. } => {
                if self.contains(name) {
                    Specificity::AnyName
                } else {
                    Specificity::None
                }
            }
            NameClass::Choice(members) => members
                .iter()
                .map(|nc| nc.contains_specificity(name))
                .max()
                .unwrap_or(Specificity::None),
        }
    }

    /// True if the class admits infinitely many names.
    pub fn is_open(&self) -> bool {
        match self {
            NameClass::Named { .. } => false,
            NameClass::NsName { .. } | NameClass::AnyName { .. } => true,
            NameClass::Choice(members) => members.iter().any(NameClass::is_open),
        }
    }

    /// The explicitly named members of this class.
    ///
    /// Names that only occur inside an `except` are excluded, except that an
    /// `nsName` nested in an `anyName` exception re-admits the names listed in
    /// its own exception, provided they belong to that namespace.
    pub fn split(&self) -> Vec<QName> {
        let mut names = vec![];
        self.split_into(false, &mut names);
        names
    }

    fn split_into(&self, negative: bool, names: &mut Vec<QName>) {
        match self {
            NameClass::Named {
                namespace_uri,
                name,
            } => {
                if !negative {
                    names.push(QName::new(namespace_uri.clone(), name.clone()));
                }
            }
            NameClass::Choice(members) => {
                for nc in members {
                    nc.split_into(negative, names);
                }
            }
            NameClass::AnyName { except } => {
                if !negative {
                    if let Some(except) = except {
                        except.split_into(true, names);
                    }
                }
            }
            NameClass::NsName {
                namespace_uri,
                except,
            } => {
                if negative {
                    if let Some(except) = except {
                        let start = names.len();
                        except.split_into(false, names);
                        let mut i = start;
                        while i < names.len() {
                            if names[i].namespace_uri != *namespace_uri {
                                names.remove(i);
                            } else {
                                i += 1;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for NameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameClass::Named { name, .. } => f.write_str(name),
            NameClass::NsName {
                namespace_uri,
                except,
            } => {
                write!(f, "{namespace_uri}:*")?;
                if let Some(except) = except {
                    write!(f, "-{except}")?;
                }
                Ok(())
            }
            NameClass::AnyName { except } => {
                f.write_str("*")?;
                if let Some(except) = except {
                    write!(f, "-{except}")?;
                }
                Ok(())
            }
            NameClass::Choice(members) => {
                for (i, nc) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{nc}")?;
                }
                Ok(())
            }
        }
    }
}
