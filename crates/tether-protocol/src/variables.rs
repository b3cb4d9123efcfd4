//! Parser for the variable-dump grammar emitted by the `tethervars` helper.
//!
//! The helper renders an environment as a single line:
//!
//! - primitives as `type(repr)`, e.g. `int(5)` or `str('a,b')`
//! - sequences as `type[item,item,...]`, e.g. `list[int(1),int(2)]`
//! - mappings as a one-character flag, the type, and `key:value` pairs:
//!   `tdict{str('a'):int(1)}` for true mappings, `fPoint<str('x'):int(0)>`
//!   for objects rendered through their attribute dict
//!
//! Reprs may contain commas, colons, brackets, quotes, and backslash
//! escapes, so splitting tracks quote state, escapes, and bracket depth.
//! Anything unparseable becomes a well-known error leaf so that one bad
//! repr never poisons its siblings.

use std::fmt;

/// Type name of the error leaf substituted for unparseable input.
pub const ERROR_TYPE: &str = "Error";
/// Value of the error leaf.
pub const ERROR_VALUE: &str = "Unable to identify this object.";

/// A leaf value: the debugger rendered it as a single repr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveVariable {
    /// Python type name.
    pub ty: String,
    /// The repr text, quotes and all.
    pub value: String,
    /// Expression suffix used to drill into this value from its parent.
    pub identifier: Option<String>,
}

/// A container value with parsed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexVariable {
    /// Python type name.
    pub ty: String,
    /// Keys, present only for mapping-shaped dumps. Always the same length
    /// as `values` when present.
    pub keys: Option<Vec<Variable>>,
    /// Child values in dump order.
    pub values: Vec<Variable>,
    /// True for real mappings (`dict`), false for objects dumped through
    /// their attribute dict.
    pub true_mapping: bool,
    /// Expression suffix used to drill into this value from its parent.
    pub identifier: Option<String>,
    identifiers_filled: bool,
}

/// One parsed variable tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    Primitive(PrimitiveVariable),
    Complex(ComplexVariable),
}

impl Variable {
    /// Parse one dump expression. Unparseable input yields [`Variable::error`],
    /// never a panic or an `Err`.
    pub fn parse(input: &str) -> Variable {
        let input = input.trim();
        let Some((pos, bracket)) = input
            .char_indices()
            .skip(1)
            .find(|&(_, c)| matches!(c, '(' | '[' | '{' | '<'))
        else {
            tracing::debug!(input, "variable dump fragment has no opening bracket");
            return Variable::error();
        };
        let Some(last) = input.chars().last() else {
            return Variable::error();
        };
        let body_end = input.len() - last.len_utf8();
        if pos >= body_end {
            tracing::debug!(input, "variable dump fragment is unterminated");
            return Variable::error();
        }
        let ty = &input[..pos];
        let body = &input[pos + bracket.len_utf8()..body_end];
        match bracket {
            '(' => Variable::Primitive(PrimitiveVariable {
                ty: ty.to_string(),
                value: body.to_string(),
                identifier: None,
            }),
            '[' => parse_sequence(ty, body),
            _ => parse_mapping(ty, body),
        }
    }

    /// The error leaf substituted for unparseable input.
    pub fn error() -> Variable {
        Variable::Primitive(PrimitiveVariable {
            ty: ERROR_TYPE.to_string(),
            value: ERROR_VALUE.to_string(),
            identifier: None,
        })
    }

    /// Whether this node is the error leaf.
    pub fn is_error(&self) -> bool {
        matches!(self, Variable::Primitive(p) if p.ty == ERROR_TYPE)
    }

    /// Python type name of this node.
    pub fn ty(&self) -> &str {
        match self {
            Variable::Primitive(p) => &p.ty,
            Variable::Complex(c) => &c.ty,
        }
    }

    /// Expression suffix assigned by the parent container, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Variable::Primitive(p) => p.identifier.as_deref(),
            Variable::Complex(c) => c.identifier.as_deref(),
        }
    }

    /// Set the expression suffix for this node.
    pub fn set_identifier(&mut self, identifier: String) {
        match self {
            Variable::Primitive(p) => p.identifier = Some(identifier),
            Variable::Complex(c) => c.identifier = Some(identifier),
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveVariable> {
        match self {
            Variable::Primitive(p) => Some(p),
            Variable::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexVariable> {
        match self {
            Variable::Complex(c) => Some(c),
            Variable::Primitive(_) => None,
        }
    }

    pub fn as_complex_mut(&mut self) -> Option<&mut ComplexVariable> {
        match self {
            Variable::Complex(c) => Some(c),
            Variable::Primitive(_) => None,
        }
    }
}

impl ComplexVariable {
    /// Assign drill-down identifiers to direct children. Sequences get
    /// positional suffixes (`[0]`, `[1]`, ...); mapping children inherit
    /// their key's repr with surrounding single quotes stripped. Called
    /// lazily when a container is first expanded; repeated calls are
    /// no-ops so identifiers set by hand survive.
    pub fn fill_child_identifiers(&mut self) {
        if self.identifiers_filled {
            return;
        }
        self.identifiers_filled = true;
        let ComplexVariable { keys, values, .. } = self;
        match keys {
            None => {
                for (index, value) in values.iter_mut().enumerate() {
                    value.set_identifier(format!("[{index}]"));
                }
            }
            Some(keys) => {
                for (key, value) in keys.iter().zip(values.iter_mut()) {
                    value.set_identifier(key_identifier(key));
                }
            }
        }
    }
}

/// Identifier text a mapping child inherits from its key.
fn key_identifier(key: &Variable) -> String {
    match key {
        Variable::Primitive(p) => {
            let value = p.value.as_str();
            value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(value)
                .to_string()
        }
        Variable::Complex(c) => {
            if c.true_mapping {
                key.to_string()
            } else {
                c.ty.clone()
            }
        }
    }
}

fn parse_sequence(ty: &str, body: &str) -> Variable {
    let values = split_top_level(body, ',')
        .into_iter()
        .map(Variable::parse)
        .collect();
    Variable::Complex(ComplexVariable {
        ty: ty.to_string(),
        keys: None,
        values,
        true_mapping: false,
        identifier: None,
        identifiers_filled: false,
    })
}

fn parse_mapping(ty: &str, body: &str) -> Variable {
    let mut flag_chars = ty.chars();
    let Some(flag) = flag_chars.next() else {
        tracing::debug!(body, "mapping dump is missing its kind flag");
        return Variable::error();
    };
    let ty = flag_chars.as_str();
    let mut keys = Vec::new();
    let mut values = Vec::new();
    for pair in split_top_level(body, ',') {
        match split_pair(pair) {
            Some((key, value)) => {
                keys.push(Variable::parse(key));
                values.push(Variable::parse(value));
            }
            None => {
                tracing::debug!(pair, "mapping entry has no key separator");
                keys.push(Variable::error());
                values.push(Variable::error());
            }
        }
    }
    Variable::Complex(ComplexVariable {
        ty: ty.to_string(),
        keys: Some(keys),
        values,
        true_mapping: flag == 't',
        identifier: None,
        identifiers_filled: false,
    })
}

/// Scanner state shared by the splitting helpers.
#[derive(Default)]
struct ScanState {
    quote: Option<char>,
    escaped: bool,
    depth: i32,
}

impl ScanState {
    /// Whether the next character sits outside all quotes and brackets.
    fn at_top_level(&self) -> bool {
        self.quote.is_none() && self.depth == 0 && !self.escaped
    }

    fn step(&mut self, c: char) {
        if self.escaped {
            self.escaped = false;
            return;
        }
        match c {
            '\\' => self.escaped = true,
            '\'' | '"' => match self.quote {
                None => self.quote = Some(c),
                Some(q) if q == c => self.quote = None,
                Some(_) => {}
            },
            '(' | '[' | '{' | '<' if self.quote.is_none() => self.depth += 1,
            ')' | ']' | '}' | '>' if self.quote.is_none() => self.depth -= 1,
            _ => {}
        }
    }
}

/// Split `input` on top-level occurrences of `sep`. Separators inside
/// quotes, after a backslash, or inside any bracket pair do not count.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut state = ScanState::default();
    let mut start = 0;
    for (i, c) in input.char_indices() {
        if c == sep && state.at_top_level() {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        } else {
            state.step(c);
        }
    }
    if input.len() > start {
        parts.push(&input[start..]);
    }
    parts
}

/// Split a mapping entry at its first top-level `:` into key and value.
fn split_pair(input: &str) -> Option<(&str, &str)> {
    let mut state = ScanState::default();
    for (i, c) in input.char_indices() {
        if c == ':' && state.at_top_level() {
            return Some((&input[..i], &input[i + 1..]));
        }
        state.step(c);
    }
    None
}

/// Shallow rendering used inside container displays.
fn shallow(var: &Variable) -> &str {
    match var {
        Variable::Primitive(p) => &p.value,
        Variable::Complex(c) => &c.ty,
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Primitive(p) => f.write_str(&p.value),
            Variable::Complex(c) => c.fmt(f),
        }
    }
}

impl fmt::Display for ComplexVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.keys {
            None => {
                write!(f, "{}[", self.ty)?;
                for (i, value) in self.values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(shallow(value))?;
                }
                f.write_str("]")
            }
            Some(keys) => {
                if !self.true_mapping {
                    f.write_str(&self.ty)?;
                }
                f.write_str("{")?;
                for (i, (key, value)) in keys.iter().zip(&self.values).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", shallow(key), shallow(value))?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complex(var: &Variable) -> &ComplexVariable {
        var.as_complex().expect("expected a container")
    }

    #[test]
    fn parse_primitive() {
        let var = Variable::parse("int(5)");
        let prim = var.as_primitive().unwrap();
        assert_eq!(prim.ty, "int");
        assert_eq!(prim.value, "5");
        assert!(var.identifier().is_none());
    }

    #[test]
    fn parse_primitive_empty_repr() {
        let prim = Variable::parse("str('')");
        assert_eq!(prim.as_primitive().unwrap().value, "''");
    }

    #[test]
    fn parse_sequence_of_primitives() {
        let var = Variable::parse("list[int(1),int(2)]");
        let c = complex(&var);
        assert_eq!(c.ty, "list");
        assert!(c.keys.is_none());
        assert!(!c.true_mapping);
        assert_eq!(c.values.len(), 2);
        assert_eq!(c.values[1].as_primitive().unwrap().value, "2");
    }

    #[test]
    fn parse_empty_sequence() {
        let var = Variable::parse("list[]");
        assert!(complex(&var).values.is_empty());
    }

    #[test]
    fn comma_inside_quoted_repr_does_not_split() {
        let var = Variable::parse("list[str('a,b'),int(1)]");
        let c = complex(&var);
        assert_eq!(c.values.len(), 2);
        assert_eq!(c.values[0].as_primitive().unwrap().value, "'a,b'");
        assert_eq!(c.values[1].as_primitive().unwrap().value, "1");
    }

    #[test]
    fn escaped_quote_inside_repr() {
        let var = Variable::parse(r"list[str('it\'s'),int(9)]");
        let c = complex(&var);
        assert_eq!(c.values.len(), 2);
        assert_eq!(c.values[0].as_primitive().unwrap().value, r"'it\'s'");
    }

    #[test]
    fn nested_sequence_keeps_depth() {
        let var = Variable::parse("list[list[int(1),int(2)],int(3)]");
        let c = complex(&var);
        assert_eq!(c.values.len(), 2);
        let inner = complex(&c.values[0]);
        assert_eq!(inner.values.len(), 2);
        assert_eq!(c.values[1].as_primitive().unwrap().value, "3");
    }

    #[test]
    fn parse_true_mapping() {
        let var = Variable::parse("tdict{str('a'):int(1),str('b'):int(2)}");
        let c = complex(&var);
        assert_eq!(c.ty, "dict");
        assert!(c.true_mapping);
        let keys = c.keys.as_ref().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].as_primitive().unwrap().value, "'a'");
        assert_eq!(c.values[1].as_primitive().unwrap().value, "2");
    }

    #[test]
    fn parse_object_as_fake_mapping() {
        let var = Variable::parse("fPoint<str('x'):int(3),str('y'):int(4)>");
        let c = complex(&var);
        assert_eq!(c.ty, "Point");
        assert!(!c.true_mapping);
        assert_eq!(c.keys.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn colon_inside_quoted_key_does_not_split_pair() {
        let var = Variable::parse("tdict{str('a:b'):int(1)}");
        let c = complex(&var);
        let keys = c.keys.as_ref().unwrap();
        assert_eq!(keys[0].as_primitive().unwrap().value, "'a:b'");
        assert_eq!(c.values[0].as_primitive().unwrap().value, "1");
    }

    #[test]
    fn garbage_becomes_error_leaf() {
        let var = Variable::parse("no brackets here");
        assert!(var.is_error());
        let prim = var.as_primitive().unwrap();
        assert_eq!(prim.ty, ERROR_TYPE);
        assert_eq!(prim.value, ERROR_VALUE);
    }

    #[test]
    fn unterminated_input_becomes_error_leaf() {
        assert!(Variable::parse("int(").is_error());
        assert!(Variable::parse("").is_error());
    }

    #[test]
    fn bad_sibling_does_not_poison_the_rest() {
        let var = Variable::parse("list[garbage,int(7)]");
        let c = complex(&var);
        assert_eq!(c.values.len(), 2);
        assert!(c.values[0].is_error());
        assert_eq!(c.values[1].as_primitive().unwrap().value, "7");
    }

    #[test]
    fn mapping_entry_without_separator_becomes_error_pair() {
        let var = Variable::parse("tdict{nonsense}");
        let c = complex(&var);
        assert!(c.keys.as_ref().unwrap()[0].is_error());
        assert!(c.values[0].is_error());
    }

    #[test]
    fn sequence_children_get_positional_identifiers() {
        let mut var = Variable::parse("list[int(1),int(2)]");
        var.as_complex_mut().unwrap().fill_child_identifiers();
        let c = complex(&var);
        assert_eq!(c.values[0].identifier(), Some("[0]"));
        assert_eq!(c.values[1].identifier(), Some("[1]"));
    }

    #[test]
    fn mapping_children_inherit_unquoted_keys() {
        let mut var = Variable::parse("tdict{str('a'):int(1),int(2):int(3)}");
        var.as_complex_mut().unwrap().fill_child_identifiers();
        let c = complex(&var);
        assert_eq!(c.values[0].identifier(), Some("a"));
        assert_eq!(c.values[1].identifier(), Some("2"));
    }

    #[test]
    fn object_children_use_attribute_names() {
        let mut var = Variable::parse("fPoint<str('x'):int(3),str('y'):int(4)>");
        var.as_complex_mut().unwrap().fill_child_identifiers();
        let c = complex(&var);
        assert_eq!(c.values[0].identifier(), Some("x"));
        assert_eq!(c.values[1].identifier(), Some("y"));
    }

    #[test]
    fn fill_is_idempotent() {
        let mut var = Variable::parse("list[int(1)]");
        {
            let c = var.as_complex_mut().unwrap();
            c.fill_child_identifiers();
            c.values[0].set_identifier("custom".into());
            c.fill_child_identifiers();
        }
        assert_eq!(complex(&var).values[0].identifier(), Some("custom"));
    }

    #[test]
    fn display_renders_one_level_deep() {
        assert_eq!(Variable::parse("int(5)").to_string(), "5");
        assert_eq!(
            Variable::parse("list[int(1),int(2)]").to_string(),
            "list[1, 2]"
        );
        assert_eq!(
            Variable::parse("tdict{str('a'):int(1)}").to_string(),
            "{'a': 1}"
        );
        assert_eq!(
            Variable::parse("fPoint<str('x'):int(3)>").to_string(),
            "Point{'x': 3}"
        );
    }
}
