use super::relax::normalize_whitespace;
use super::{Datatype, DatatypeError, FacetError, ValidationContext};
use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use num_bigint::BigInt;
use std::fmt;
use std::str::FromStr;

pub const NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

lazy_static! {
    static ref LANG_RE: regex::Regex = regex::Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref INTEGER_RE: regex::Regex = regex::Regex::new(r"^[+-]?\d+$").unwrap();
    static ref DECIMAL_RE: regex::Regex = regex::Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap();
    static ref DOUBLE_RE: regex::Regex = regex::Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|-?INF|NaN)$").unwrap();
    static ref DATE_RE: regex::Regex = regex::Regex::new(r"^(-?\d{4,}-\d{2}-\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DATETIME_RE: regex::Regex = regex::Regex::new(r"^(-?\d{4,}-\d{2}-\d{2})T(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref TIME_RE: regex::Regex = regex::Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DURATION_RE: regex::Regex = regex::Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap();
    static ref GYEAR_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GYEARMONTH_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}-(0[1-9]|1[0-2])(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref BASE64_RE: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9+/\s]*={0,2}$").unwrap();
    static ref HEXBINARY_RE: regex::Regex = regex::Regex::new(r"^([0-9A-Fa-f]{2})*$").unwrap();
}

/// The string-like types whose values are whitespace-collapsed tokens.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum TokenKind {
    Token,
    Language,
    Name,
    NcName,
    NmToken,
    Id,
    IdRef,
    Entity,
    AnyUri,
}

impl TokenKind {
    fn from_name(name: &str) -> Option<TokenKind> {
        Some(match name {
            "token" => TokenKind::Token,
            "language" => TokenKind::Language,
            "Name" => TokenKind::Name,
            "NCName" => TokenKind::NcName,
            "NMTOKEN" => TokenKind::NmToken,
            "ID" => TokenKind::Id,
            "IDREF" => TokenKind::IdRef,
            "ENTITY" => TokenKind::Entity,
            "anyURI" => TokenKind::AnyUri,
            _ => return None,
        })
    }

    fn is_lexically_valid(self, value: &str) -> bool {
        match self {
            TokenKind::Token | TokenKind::AnyUri => true,
            TokenKind::Language => LANG_RE.is_match(value),
            TokenKind::Name => is_valid_name(value),
            TokenKind::NcName | TokenKind::Id | TokenKind::IdRef | TokenKind::Entity => {
                is_valid_ncname(value)
            }
            TokenKind::NmToken => is_valid_nmtoken(value),
        }
    }
}

/// The integer-derived types, which differ only in their value range.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum IntegerKind {
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
}

impl IntegerKind {
    fn from_name(name: &str) -> Option<IntegerKind> {
        Some(match name {
            "integer" => IntegerKind::Integer,
            "nonNegativeInteger" => IntegerKind::NonNegativeInteger,
            "positiveInteger" => IntegerKind::PositiveInteger,
            "nonPositiveInteger" => IntegerKind::NonPositiveInteger,
            "negativeInteger" => IntegerKind::NegativeInteger,
            "long" => IntegerKind::Long,
            "int" => IntegerKind::Int,
            "short" => IntegerKind::Short,
            "byte" => IntegerKind::Byte,
            "unsignedLong" => IntegerKind::UnsignedLong,
            "unsignedInt" => IntegerKind::UnsignedInt,
            "unsignedShort" => IntegerKind::UnsignedShort,
            "unsignedByte" => IntegerKind::UnsignedByte,
            _ => return None,
        })
    }

    fn bounds(self) -> (Option<BigInt>, Option<BigInt>) {
        match self {
            IntegerKind::Integer => (None, None),
            IntegerKind::NonNegativeInteger => (Some(BigInt::from(0)), None),
            IntegerKind::PositiveInteger => (Some(BigInt::from(1)), None),
            IntegerKind::NonPositiveInteger => (None, Some(BigInt::from(0))),
            IntegerKind::NegativeInteger => (None, Some(BigInt::from(-1))),
            IntegerKind::Long => (Some(BigInt::from(i64::MIN)), Some(BigInt::from(i64::MAX))),
            IntegerKind::Int => (Some(BigInt::from(i32::MIN)), Some(BigInt::from(i32::MAX))),
            IntegerKind::Short => (Some(BigInt::from(i16::MIN)), Some(BigInt::from(i16::MAX))),
            IntegerKind::Byte => (Some(BigInt::from(i8::MIN)), Some(BigInt::from(i8::MAX))),
            IntegerKind::UnsignedLong => (Some(BigInt::from(0)), Some(BigInt::from(u64::MAX))),
            IntegerKind::UnsignedInt => (Some(BigInt::from(0)), Some(BigInt::from(u32::MAX))),
            IntegerKind::UnsignedShort => (Some(BigInt::from(0)), Some(BigInt::from(u16::MAX))),
            IntegerKind::UnsignedByte => (Some(BigInt::from(0)), Some(BigInt::from(u8::MAX))),
        }
    }

    fn contains(self, v: &BigInt) -> bool {
        let (min, max) = self.bounds();
        min.is_none_or(|min| min <= *v) && max.is_none_or(|max| *v <= max)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum XsdDatatypes {
    String(StringFacets),
    NormalizedString(StringFacets),
    Token(TokenKind, StringFacets),
    NmTokens(LengthFacet),
    IdRefs(LengthFacet),
    QName(Option<PatternFacet>),
    Boolean(Option<PatternFacet>),
    Decimal {
        min_max: MinMaxFacet<BigDecimal>,
        pattern: Option<PatternFacet>,
        total_digits: Option<u32>,
        fraction_digits: Option<u32>,
    },
    Integer {
        kind: IntegerKind,
        min_max: MinMaxFacet<BigInt>,
        pattern: Option<PatternFacet>,
    },
    Double(Option<PatternFacet>),
    Float(Option<PatternFacet>),
    Date(Option<PatternFacet>),
    DateTime(Option<PatternFacet>),
    Time(Option<PatternFacet>),
    Duration(Option<PatternFacet>),
    GYear(Option<PatternFacet>),
    GYearMonth(Option<PatternFacet>),
    Base64Binary(LengthFacet),
    HexBinary(LengthFacet),
}

impl Datatype for XsdDatatypes {
    fn is_valid(&self, value: &str, ctx: &dyn ValidationContext) -> bool {
        match self {
            XsdDatatypes::String(facets) => facets.is_valid(value),
            XsdDatatypes::NormalizedString(facets) => {
                facets.is_valid(&replace_whitespace(value))
            }
            _ => self.is_valid_collapsed(&normalize_whitespace(value), ctx),
        }
    }

    fn is_context_dependent(&self) -> bool {
        matches!(self, XsdDatatypes::QName(_))
    }
}

impl XsdDatatypes {
    fn is_valid_collapsed(&self, value: &str, ctx: &dyn ValidationContext) -> bool {
        match self {
            XsdDatatypes::String(_) | XsdDatatypes::NormalizedString(_) => true,
            XsdDatatypes::Token(kind, facets) => {
                kind.is_lexically_valid(value) && facets.is_valid(value)
            }
            XsdDatatypes::NmTokens(len) => {
                let tokens: Vec<&str> = value.split(' ').filter(|t| !t.is_empty()).collect();
                !tokens.is_empty()
                    && tokens.iter().all(|t| is_valid_nmtoken(t))
                    && len.is_valid_count(tokens.len())
            }
            XsdDatatypes::IdRefs(len) => {
                let tokens: Vec<&str> = value.split(' ').filter(|t| !t.is_empty()).collect();
                !tokens.is_empty()
                    && tokens.iter().all(|t| is_valid_ncname(t))
                    && len.is_valid_count(tokens.len())
            }
            XsdDatatypes::QName(pattern) => {
                QNameVal::resolve(value, ctx).is_some() && matches_pattern(pattern, value)
            }
            XsdDatatypes::Boolean(pattern) => {
                parse_boolean(value).is_some() && matches_pattern(pattern, value)
            }
            XsdDatatypes::Decimal {
                min_max,
                pattern,
                total_digits,
                fraction_digits,
            } => {
                DECIMAL_RE.is_match(value)
                    && BigDecimal::from_str(value).is_ok_and(|v| min_max.is_valid(&v))
                    && digits_within(value, *total_digits, *fraction_digits)
                    && matches_pattern(pattern, value)
            }
            XsdDatatypes::Integer {
                kind,
                min_max,
                pattern,
            } => {
                parse_integer(value).is_some_and(|v| kind.contains(&v) && min_max.is_valid(&v))
                    && matches_pattern(pattern, value)
            }
            XsdDatatypes::Double(pattern) | XsdDatatypes::Float(pattern) => {
                DOUBLE_RE.is_match(value) && matches_pattern(pattern, value)
            }
            XsdDatatypes::Date(pattern) => {
                DATE_RE
                    .captures(value)
                    .is_some_and(|c| is_valid_date(&c[1]))
                    && matches_pattern(pattern, value)
            }
            XsdDatatypes::DateTime(pattern) => {
                DATETIME_RE.captures(value).is_some_and(|c| {
                    is_valid_date(&c[1]) && is_valid_time_of_day(&c[2], &c[3], &c[4])
                }) && matches_pattern(pattern, value)
            }
            XsdDatatypes::Time(pattern) => {
                TIME_RE
                    .captures(value)
                    .is_some_and(|c| is_valid_time_of_day(&c[1], &c[2], &c[3]))
                    && matches_pattern(pattern, value)
            }
            XsdDatatypes::Duration(pattern) => {
                // at least one component, and no dangling 'T'
                DURATION_RE.is_match(value)
                    && value.chars().any(|c| c.is_ascii_digit())
                    && !value.ends_with('T')
                    && matches_pattern(pattern, value)
            }
            XsdDatatypes::GYear(pattern) => {
                GYEAR_RE.is_match(value) && matches_pattern(pattern, value)
            }
            XsdDatatypes::GYearMonth(pattern) => {
                GYEARMONTH_RE.is_match(value) && matches_pattern(pattern, value)
            }
            XsdDatatypes::Base64Binary(len) => {
                BASE64_RE.is_match(value) && {
                    // length counts decoded octets
                    let stripped: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                    let pad = stripped.chars().rev().take_while(|&c| c == '=').count();
                    stripped.len() % 4 == 0 && {
                        let octets = if stripped.is_empty() {
                            0
                        } else {
                            stripped.len() / 4 * 3 - pad
                        };
                        len.is_valid_count(octets)
                    }
                }
            }
            XsdDatatypes::HexBinary(len) => {
                HEXBINARY_RE.is_match(value) && len.is_valid_count(value.len() / 2)
            }
        }
    }
}

/// Values for `value` patterns, held in their value space so that lexically
/// different spellings of the same value compare equal.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum XsdDatatypeValues {
    String(String),
    NormalizedString(String),
    Token(String),
    QName(QNameVal),
    Integer(BigInt),
    Decimal(BigDecimal),
    Boolean(bool),
}

impl Datatype for XsdDatatypeValues {
    fn is_valid(&self, value: &str, ctx: &dyn ValidationContext) -> bool {
        match self {
            XsdDatatypeValues::String(s) => s == value,
            XsdDatatypeValues::NormalizedString(s) => *s == replace_whitespace(value),
            XsdDatatypeValues::Token(s) => *s == normalize_whitespace(value),
            XsdDatatypeValues::QName(v) => {
                QNameVal::resolve(&normalize_whitespace(value), ctx).is_some_and(|q| q == *v)
            }
            XsdDatatypeValues::Integer(v) => {
                parse_integer(&normalize_whitespace(value)).is_some_and(|i| i == *v)
            }
            XsdDatatypeValues::Decimal(v) => {
                let value = normalize_whitespace(value);
                DECIMAL_RE.is_match(&value)
                    && BigDecimal::from_str(&value).is_ok_and(|d| d == *v)
            }
            XsdDatatypeValues::Boolean(v) => {
                parse_boolean(&normalize_whitespace(value)).is_some_and(|b| b == *v)
            }
        }
    }

    fn is_context_dependent(&self) -> bool {
        matches!(self, XsdDatatypeValues::QName(_))
    }
}

/// An XML Schema QName in its value space: the resolved namespace URI (empty
/// for no namespace) and the local part.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct QNameVal(pub String, pub String);

impl QNameVal {
    pub fn resolve(value: &str, ctx: &dyn ValidationContext) -> Option<QNameVal> {
        if let Some((prefix, local)) = value.split_once(':') {
            if !is_valid_ncname(prefix) || !is_valid_ncname(local) {
                return None;
            }
            let uri = ctx.resolve_namespace_prefix(prefix)?;
            Some(QNameVal(uri.to_string(), local.to_string()))
        } else if is_valid_ncname(value) {
            let uri = ctx.resolve_namespace_prefix("").unwrap_or("");
            Some(QNameVal(uri.to_string(), value.to_string()))
        } else {
            None
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub struct StringFacets {
    len: LengthFacet,
    pattern: Option<PatternFacet>,
}

impl StringFacets {
    fn is_valid(&self, value: &str) -> bool {
        self.len.is_valid_count(value.chars().count()) && matches_pattern(&self.pattern, value)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub enum LengthFacet {
    #[default]
    Unbounded,
    MinLength(usize),
    MaxLength(usize),
    MinMaxLength(usize, usize),
    Length(usize),
}

impl LengthFacet {
    fn is_valid_count(&self, actual: usize) -> bool {
        match self {
            LengthFacet::Unbounded => true,
            LengthFacet::MinLength(min) => *min <= actual,
            LengthFacet::MaxLength(max) => actual <= *max,
            LengthFacet::MinMaxLength(min, max) => *min <= actual && actual <= *max,
            LengthFacet::Length(len) => actual == *len,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
enum Min<T> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
enum Max<T> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct MinMaxFacet<T> {
    min: Min<T>,
    max: Max<T>,
}

impl<T> Default for MinMaxFacet<T> {
    fn default() -> Self {
        MinMaxFacet {
            min: Min::Unbounded,
            max: Max::Unbounded,
        }
    }
}

impl<T: PartialOrd> MinMaxFacet<T> {
    pub fn bounded(&self) -> bool {
        !matches!((&self.min, &self.max), (Min::Unbounded, Max::Unbounded))
    }

    fn is_valid(&self, v: &T) -> bool {
        let min_ok = match &self.min {
            Min::Unbounded => true,
            Min::Inclusive(min) => min <= v,
            Min::Exclusive(min) => min < v,
        };
        let max_ok = match &self.max {
            Max::Unbounded => true,
            Max::Inclusive(max) => v <= max,
            Max::Exclusive(max) => v < max,
        };
        min_ok && max_ok
    }
}

#[derive(Clone)]
pub struct PatternFacet(String, regex::Regex);

impl PartialEq for PatternFacet {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for PatternFacet {}
impl std::hash::Hash for PatternFacet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}
impl fmt::Debug for PatternFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("PatternFacet").field(&self.0).finish()
    }
}

impl PatternFacet {
    pub fn new(raw: &str) -> Result<PatternFacet, FacetError> {
        // XSD patterns are implicitly anchored at both ends
        let anchored = format!("^(?:{raw})$");
        let re = regex::Regex::new(&anchored)?;
        Ok(PatternFacet(raw.to_string(), re))
    }

    fn is_valid(&self, value: &str) -> bool {
        self.1.is_match(value)
    }
}

fn matches_pattern(pattern: &Option<PatternFacet>, value: &str) -> bool {
    pattern.as_ref().is_none_or(|p| p.is_valid(value))
}

/// Resolves XML Schema datatype names and their facet parameters.
#[derive(Default)]
pub struct Compiler;

impl Compiler {
    pub fn compile(
        &self,
        name: &str,
        params: &[(String, String)],
    ) -> Result<XsdDatatypes, DatatypeError> {
        let unsupported = || DatatypeError::Unsupported {
            library: NAMESPACE_URI.to_string(),
            name: name.to_string(),
        };
        let type_name = TYPE_NAMES
            .iter()
            .copied()
            .find(|n| *n == name)
            .ok_or_else(unsupported)?;
        let mut p = Params::new(params);
        let dt = build(type_name, &mut p)
            .and_then(|dt| p.finish().map(|()| dt))
            .map_err(|facet| DatatypeError::Facet { type_name, facet })?;
        dt.ok_or_else(unsupported)
    }

    pub fn compile_value(
        &self,
        name: &str,
        value: &str,
        ctx: &dyn ValidationContext,
    ) -> Result<XsdDatatypeValues, DatatypeError> {
        let dt = self.compile(name, &[])?;
        let invalid = || DatatypeError::InvalidValue {
            type_name: name.to_string(),
            value: value.to_string(),
        };
        if !dt.is_valid(value, ctx) {
            return Err(invalid());
        }
        let collapsed = normalize_whitespace(value);
        Ok(match dt {
            XsdDatatypes::String(_) => XsdDatatypeValues::String(value.to_string()),
            XsdDatatypes::NormalizedString(_) => {
                XsdDatatypeValues::NormalizedString(replace_whitespace(value))
            }
            XsdDatatypes::QName(_) => {
                XsdDatatypeValues::QName(QNameVal::resolve(&collapsed, ctx).ok_or_else(invalid)?)
            }
            XsdDatatypes::Integer { .. } => {
                XsdDatatypeValues::Integer(parse_integer(&collapsed).ok_or_else(invalid)?)
            }
            XsdDatatypes::Decimal { .. } => XsdDatatypeValues::Decimal(
                BigDecimal::from_str(&collapsed).map_err(|_| invalid())?,
            ),
            XsdDatatypes::Boolean(_) => {
                XsdDatatypeValues::Boolean(parse_boolean(&collapsed).ok_or_else(invalid)?)
            }
            _ => XsdDatatypeValues::Token(collapsed),
        })
    }
}

const TYPE_NAMES: &[&str] = &[
    "string",
    "normalizedString",
    "token",
    "language",
    "Name",
    "NCName",
    "NMTOKEN",
    "NMTOKENS",
    "ID",
    "IDREF",
    "IDREFS",
    "ENTITY",
    "anyURI",
    "QName",
    "boolean",
    "decimal",
    "integer",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "negativeInteger",
    "long",
    "int",
    "short",
    "byte",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
    "double",
    "float",
    "date",
    "dateTime",
    "time",
    "duration",
    "gYear",
    "gYearMonth",
    "base64Binary",
    "hexBinary",
];

fn build(type_name: &str, p: &mut Params) -> Result<Option<XsdDatatypes>, FacetError> {
    if let Some(kind) = TokenKind::from_name(type_name) {
        return Ok(Some(XsdDatatypes::Token(kind, p.string_facets()?)));
    }
    if let Some(kind) = IntegerKind::from_name(type_name) {
        return Ok(Some(XsdDatatypes::Integer {
            kind,
            min_max: p.min_max(parse_integer)?,
            pattern: p.pattern()?,
        }));
    }
    Ok(Some(match type_name {
        "string" => XsdDatatypes::String(p.string_facets()?),
        "normalizedString" => XsdDatatypes::NormalizedString(p.string_facets()?),
        "NMTOKENS" => XsdDatatypes::NmTokens(p.length()?),
        "IDREFS" => XsdDatatypes::IdRefs(p.length()?),
        "QName" => XsdDatatypes::QName(p.pattern()?),
        "boolean" => XsdDatatypes::Boolean(p.pattern()?),
        "decimal" => XsdDatatypes::Decimal {
            min_max: p.min_max(|v| {
                if DECIMAL_RE.is_match(v) {
                    BigDecimal::from_str(v).ok()
                } else {
                    None
                }
            })?,
            pattern: p.pattern()?,
            total_digits: p.digits("totalDigits")?,
            fraction_digits: p.digits("fractionDigits")?,
        },
        "double" => XsdDatatypes::Double(p.pattern()?),
        "float" => XsdDatatypes::Float(p.pattern()?),
        "date" => XsdDatatypes::Date(p.pattern()?),
        "dateTime" => XsdDatatypes::DateTime(p.pattern()?),
        "time" => XsdDatatypes::Time(p.pattern()?),
        "duration" => XsdDatatypes::Duration(p.pattern()?),
        "gYear" => XsdDatatypes::GYear(p.pattern()?),
        "gYearMonth" => XsdDatatypes::GYearMonth(p.pattern()?),
        "base64Binary" => XsdDatatypes::Base64Binary(p.length()?),
        "hexBinary" => XsdDatatypes::HexBinary(p.length()?),
        _ => return Ok(None),
    }))
}

/// Facet parameters not yet consumed by the datatype being built.
struct Params<'a> {
    remaining: Vec<(&'a str, &'a str)>,
}

impl<'a> Params<'a> {
    fn new(params: &'a [(String, String)]) -> Params<'a> {
        Params {
            remaining: params
                .iter()
                .map(|(n, v)| (n.as_str(), v.as_str()))
                .collect(),
        }
    }

    fn take(&mut self, name: &str) -> Option<&'a str> {
        let pos = self.remaining.iter().position(|(n, _)| *n == name)?;
        Some(self.remaining.remove(pos).1)
    }

    fn finish(self) -> Result<(), FacetError> {
        match self.remaining.first() {
            Some((name, _)) => Err(FacetError::UnknownFacet(name.to_string())),
            None => Ok(()),
        }
    }

    fn usize(&mut self, name: &str) -> Result<Option<usize>, FacetError> {
        self.take(name)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| FacetError::InvalidInt(v.to_string()))
            })
            .transpose()
    }

    fn digits(&mut self, name: &str) -> Result<Option<u32>, FacetError> {
        self.take(name)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| FacetError::InvalidInt(v.to_string()))
            })
            .transpose()
    }

    fn length(&mut self) -> Result<LengthFacet, FacetError> {
        let length = self.usize("length")?;
        let min = self.usize("minLength")?;
        let max = self.usize("maxLength")?;
        Ok(match (length, min, max) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(FacetError::ConflictingFacet(
                    "length with minLength or maxLength",
                ));
            }
            (Some(len), None, None) => LengthFacet::Length(len),
            (None, Some(min), Some(max)) => {
                if min > max {
                    return Err(FacetError::ConflictingFacet(
                        "minLength greater than maxLength",
                    ));
                }
                LengthFacet::MinMaxLength(min, max)
            }
            (None, Some(min), None) => LengthFacet::MinLength(min),
            (None, None, Some(max)) => LengthFacet::MaxLength(max),
            (None, None, None) => LengthFacet::Unbounded,
        })
    }

    fn pattern(&mut self) -> Result<Option<PatternFacet>, FacetError> {
        self.take("pattern").map(PatternFacet::new).transpose()
    }

    fn string_facets(&mut self) -> Result<StringFacets, FacetError> {
        Ok(StringFacets {
            len: self.length()?,
            pattern: self.pattern()?,
        })
    }

    fn min_max<T: PartialOrd>(
        &mut self,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<MinMaxFacet<T>, FacetError> {
        let mut bound = |name: &str| {
            self.take(name)
                .map(|v| {
                    let v = normalize_whitespace(v);
                    parse(&v).ok_or(FacetError::InvalidNumber(v))
                })
                .transpose()
        };
        let min_inclusive = bound("minInclusive")?;
        let min_exclusive = bound("minExclusive")?;
        let max_inclusive = bound("maxInclusive")?;
        let max_exclusive = bound("maxExclusive")?;
        let min = match (min_inclusive, min_exclusive) {
            (Some(_), Some(_)) => {
                return Err(FacetError::ConflictingFacet(
                    "minInclusive conflicts with minExclusive",
                ));
            }
            (Some(v), None) => Min::Inclusive(v),
            (None, Some(v)) => Min::Exclusive(v),
            (None, None) => Min::Unbounded,
        };
        let max = match (max_inclusive, max_exclusive) {
            (Some(_), Some(_)) => {
                return Err(FacetError::ConflictingFacet(
                    "maxInclusive conflicts with maxExclusive",
                ));
            }
            (Some(v), None) => Max::Inclusive(v),
            (None, Some(v)) => Max::Exclusive(v),
            (None, None) => Max::Unbounded,
        };
        let empty_range = match (&min, &max) {
            (Min::Inclusive(lo), Max::Inclusive(hi)) => lo > hi,
            (Min::Inclusive(lo), Max::Exclusive(hi))
            | (Min::Exclusive(lo), Max::Inclusive(hi))
            | (Min::Exclusive(lo), Max::Exclusive(hi)) => lo >= hi,
            _ => false,
        };
        if empty_range {
            return Err(FacetError::ConflictingFacet("lower bound above upper bound"));
        }
        Ok(MinMaxFacet { min, max })
    }
}

fn replace_whitespace(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

fn parse_integer(value: &str) -> Option<BigInt> {
    if !INTEGER_RE.is_match(value) {
        return None;
    }
    BigInt::from_str(value.strip_prefix('+').unwrap_or(value)).ok()
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn digits_within(value: &str, total: Option<u32>, fraction: Option<u32>) -> bool {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0').len();
    let frac_digits = frac_part.trim_end_matches('0').len();
    total.is_none_or(|t| int_digits + frac_digits <= t as usize)
        && fraction.is_none_or(|f| frac_digits <= f as usize)
}

fn is_valid_date(date: &str) -> bool {
    // chrono only handles four digit, non-negative years
    if date.starts_with('-') || date.len() != 10 {
        return true;
    }
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

fn is_valid_time_of_day(hour: &str, minute: &str, second: &str) -> bool {
    let (Ok(h), Ok(m), Ok(s)) = (hour.parse::<u32>(), minute.parse::<u32>(), second.parse::<u32>())
    else {
        return false;
    };
    (h < 24 && m < 60 && s < 60) || (h == 24 && m == 0 && s == 0)
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_valid_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        None => false,
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
    }
}

fn is_valid_ncname(text: &str) -> bool {
    !text.contains(':') && is_valid_name(text)
}

fn is_valid_nmtoken(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_name_char)
}
