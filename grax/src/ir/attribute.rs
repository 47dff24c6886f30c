use std::fmt::Display;
use std::fmt::Formatter;

/// A printable operator attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Int(i64),
    Ints(Vec<i64>),
    Size(usize),
    Str(String),
    Bool(bool),
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::Int(value) => write!(f, "{value}"),
            Attribute::Ints(values) => {
                let values = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "[{values}]")
            }
            Attribute::Size(value) => write!(f, "{value}"),
            Attribute::Str(value) => write!(f, "{value}"),
            Attribute::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// An ordered set of named attributes, used for printing and introspection.
///
/// Operators own their configuration as plain struct fields; `attributes`
/// exposes those fields generically so the printer and the tracer do not
/// need to know every operator type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, Attribute)>,
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes { entries: vec![] }
    }
    pub fn with(mut self, name: &str, value: Attribute) -> Attributes {
        self.entries.push((name.to_string(), value));
        self
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return Ok(());
        }
        let entries = self
            .entries
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{{{entries}}}")
    }
}

#[test]
fn test_attributes_display() {
    let attrs = Attributes::new()
        .with("offset", Attribute::Size(8))
        .with("axes", Attribute::Ints(vec![0, 2]));
    assert_eq!(format!("{attrs}"), "{offset = 8, axes = [0, 2]}");
}
