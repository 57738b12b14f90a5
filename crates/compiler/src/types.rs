//! The Droe type lattice
//!
//! Primitives, collections, and nominal records. `decimal` is a 64-bit
//! signed integer with an implicit scale of 100; the arithmetic rules in
//! the checker and VM preserve that invariant.

use droe_core::schema::TypeTag;

/// A source-level type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Int,
    Decimal,
    Text,
    Flag,
    Date,
    File,
    ListOf(Box<Ty>),
    GroupOf(Box<Ty>),
    /// Nominal record reference
    Record(String),
}

impl Ty {
    /// Parse a primitive type name, accepting the legacy aliases
    /// (`number` for `int`).
    pub fn from_name(name: &str) -> Option<Ty> {
        match name {
            "int" | "number" => Some(Ty::Int),
            "decimal" => Some(Ty::Decimal),
            "text" => Some(Ty::Text),
            "flag" => Some(Ty::Flag),
            "date" => Some(Ty::Date),
            "file" => Some(Ty::File),
            _ => None,
        }
    }

    /// Assignment compatibility: equal types, or a date/file accepting
    /// its text spelling. Numeric widening is not implicit.
    pub fn accepts(&self, value: &Ty) -> bool {
        if self == value {
            return true;
        }
        matches!(
            (self, value),
            (Ty::Date, Ty::Text) | (Ty::File, Ty::Text)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Decimal)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Ty::ListOf(_) | Ty::GroupOf(_))
    }

    /// Element type for `for each` iteration: collections yield their
    /// element type, text yields text (characters).
    pub fn element(&self) -> Option<Ty> {
        match self {
            Ty::ListOf(t) | Ty::GroupOf(t) => Some((**t).clone()),
            Ty::Text => Some(Ty::Text),
            _ => None,
        }
    }

    /// Serializable form for schemas and action signatures.
    pub fn to_tag(&self) -> TypeTag {
        match self {
            Ty::Int => TypeTag::Int,
            Ty::Decimal => TypeTag::Decimal,
            Ty::Text => TypeTag::Text,
            Ty::Flag => TypeTag::Flag,
            Ty::Date => TypeTag::Date,
            Ty::File => TypeTag::File,
            Ty::ListOf(t) => TypeTag::ListOf(Box::new(t.to_tag())),
            Ty::GroupOf(t) => TypeTag::GroupOf(Box::new(t.to_tag())),
            Ty::Record(name) => TypeTag::Record(name.clone()),
        }
    }

    pub fn from_tag(tag: &TypeTag) -> Ty {
        match tag {
            TypeTag::Int => Ty::Int,
            TypeTag::Decimal => Ty::Decimal,
            TypeTag::Text => Ty::Text,
            TypeTag::Flag => Ty::Flag,
            TypeTag::Date => Ty::Date,
            TypeTag::File => Ty::File,
            TypeTag::ListOf(t) => Ty::ListOf(Box::new(Ty::from_tag(t))),
            TypeTag::GroupOf(t) => Ty::GroupOf(Box::new(Ty::from_tag(t))),
            TypeTag::Record(name) => Ty::Record(name.clone()),
        }
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Int => write!(f, "int"),
            Ty::Decimal => write!(f, "decimal"),
            Ty::Text => write!(f, "text"),
            Ty::Flag => write!(f, "flag"),
            Ty::Date => write!(f, "date"),
            Ty::File => write!(f, "file"),
            Ty::ListOf(t) => write!(f, "list of {}", t),
            Ty::GroupOf(t) => write!(f, "group of {}", t),
            Ty::Record(name) => write!(f, "{}", name),
        }
    }
}

/// Format patterns valid for each formattable type. Fixed sets; anything
/// else is a `type.bad_format_pattern` error.
pub const DATE_PATTERNS: &[&str] = &["MM/dd/yyyy", "dd/MM/yyyy", "MMM dd, yyyy", "long"];
pub const DECIMAL_PATTERNS: &[&str] = &["0.00", "#,##0.00", "$0.00"];
pub const INT_PATTERNS: &[&str] = &["#,##0", "0000", "hex"];

/// Check a format pattern against the type of the formatted expression.
pub fn pattern_applies(ty: &Ty, pattern: &str) -> bool {
    match ty {
        Ty::Date => DATE_PATTERNS.contains(&pattern),
        Ty::Decimal => DECIMAL_PATTERNS.contains(&pattern),
        Ty::Int => INT_PATTERNS.contains(&pattern),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_alias() {
        assert_eq!(Ty::from_name("number"), Some(Ty::Int));
        assert_eq!(Ty::from_name("int"), Some(Ty::Int));
        assert_eq!(Ty::from_name("unknown"), None);
    }

    #[test]
    fn test_no_implicit_widening() {
        assert!(!Ty::Decimal.accepts(&Ty::Int));
        assert!(!Ty::Int.accepts(&Ty::Decimal));
        assert!(Ty::Int.accepts(&Ty::Int));
    }

    #[test]
    fn test_date_accepts_text_literal() {
        assert!(Ty::Date.accepts(&Ty::Text));
        assert!(!Ty::Text.accepts(&Ty::Date));
    }

    #[test]
    fn test_element_types() {
        assert_eq!(Ty::ListOf(Box::new(Ty::Int)).element(), Some(Ty::Int));
        assert_eq!(Ty::Text.element(), Some(Ty::Text));
        assert_eq!(Ty::Int.element(), None);
    }

    #[test]
    fn test_pattern_validation() {
        assert!(pattern_applies(&Ty::Decimal, "#,##0.00"));
        assert!(pattern_applies(&Ty::Int, "hex"));
        assert!(pattern_applies(&Ty::Date, "long"));
        assert!(!pattern_applies(&Ty::Decimal, "hex"));
        assert!(!pattern_applies(&Ty::Text, "0.00"));
    }

    #[test]
    fn test_tag_roundtrip() {
        let ty = Ty::GroupOf(Box::new(Ty::Record("Order".to_string())));
        assert_eq!(Ty::from_tag(&ty.to_tag()), ty);
    }
}
