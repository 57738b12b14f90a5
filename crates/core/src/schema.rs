//! Record schemas and artifact tables
//!
//! Serializable descriptions of everything the compiler registers for the
//! host: record types with annotated fields, the module/action table that
//! `Call` instructions index into, and the endpoint table the host wires
//! its HTTP surface from.

use serde::{Deserialize, Serialize};

/// Serializable type descriptor used in schemas and action signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    Int,
    Decimal,
    Text,
    Flag,
    Date,
    File,
    ListOf(Box<TypeTag>),
    GroupOf(Box<TypeTag>),
    /// Nominal reference to a record schema by name
    Record(String),
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeTag::Int => write!(f, "int"),
            TypeTag::Decimal => write!(f, "decimal"),
            TypeTag::Text => write!(f, "text"),
            TypeTag::Flag => write!(f, "flag"),
            TypeTag::Date => write!(f, "date"),
            TypeTag::File => write!(f, "file"),
            TypeTag::ListOf(t) => write!(f, "list of {}", t),
            TypeTag::GroupOf(t) => write!(f, "group of {}", t),
            TypeTag::Record(name) => write!(f, "{}", name),
        }
    }
}

/// Field annotations carried through to the host's persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldAnnotation {
    Key,
    Auto,
    Required,
    Optional,
    Unique,
    /// Literal default rendered to text by the emitter
    Default(String),
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub ty: TypeTag,
    pub annotations: Vec<FieldAnnotation>,
}

/// A named record type; field order is declaration order and is the order
/// `MakeRecord` consumes operands in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A parameter of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: String,
    pub ty: TypeTag,
}

/// One callable action or task.
///
/// `entry` is the absolute instruction index of the body's `EnterFrame`;
/// `locals` counts parameters plus local variables. Tasks have
/// `returns: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub name: String,
    pub params: Vec<ParamEntry>,
    pub returns: Option<TypeTag>,
    pub entry: u32,
    pub locals: u16,
}

/// A module groups actions; `Call` addresses `(module index, action index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub actions: Vec<ActionEntry>,
}

impl ModuleEntry {
    pub fn action_index(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }
}

/// HTTP methods an endpoint declaration can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared HTTP endpoint.
///
/// `path_template` keeps the `:param` segments verbatim; `path_params`
/// lists the parameter names in segment order so hosts can bind them
/// without re-parsing the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub method: HttpMethod,
    pub path_template: String,
    pub path_params: Vec<String>,
    pub handler_entry: u32,
}

impl EndpointEntry {
    /// Count of literal (non-parameter) segments, used for
    /// longest-literal-prefix endpoint matching.
    pub fn literal_segments(&self) -> usize {
        self.path_template
            .split('/')
            .filter(|s| !s.is_empty() && !s.starts_with(':'))
            .count()
    }
}

/// Storage operations forwarded to the host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbOpCode {
    Find,
    FindAll,
    Create,
    Update,
    Delete,
}

impl DbOpCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbOpCode::Find => "find",
            DbOpCode::FindAll => "find_all",
            DbOpCode::Create => "create",
            DbOpCode::Update => "update",
            DbOpCode::Delete => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_display() {
        assert_eq!(TypeTag::Int.to_string(), "int");
        assert_eq!(
            TypeTag::ListOf(Box::new(TypeTag::Decimal)).to_string(),
            "list of decimal"
        );
        assert_eq!(
            TypeTag::GroupOf(Box::new(TypeTag::Record("User".into()))).to_string(),
            "group of User"
        );
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("POST"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("PATCH"), None);
    }

    #[test]
    fn test_literal_segments() {
        let e = EndpointEntry {
            method: HttpMethod::Get,
            path_template: "/users/:id/orders".to_string(),
            path_params: vec!["id".to_string()],
            handler_entry: 0,
        };
        assert_eq!(e.literal_segments(), 2);
    }

    #[test]
    fn test_record_field_index() {
        let schema = RecordSchema {
            name: "User".to_string(),
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![FieldAnnotation::Key, FieldAnnotation::Auto],
                },
                FieldSchema {
                    name: "name".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![FieldAnnotation::Required],
                },
            ],
        };
        assert_eq!(schema.field_index("name"), Some(1));
        assert_eq!(schema.field_index("missing"), None);
    }
}
