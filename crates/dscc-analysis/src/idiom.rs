//! Recognised syntax idioms and the visitor that consumes them
//!
//! The analyzer never evaluates code: it matches a small set of tagged
//! patterns against syntax nodes and hands each match to a `SyntaxVisitor`.

use crate::literal::{literal_value, string_literal};
use crate::model::{DefaultValue, ParameterKind, ParameterSpec, SourceLocation};
use crate::syntax::{dotted_name, named_children};
use indexmap::IndexMap;
use tree_sitter::Node;

/// What a matched call means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallRole {
    /// Reads a table by name
    TableAccess,
    /// References a column by name
    ColumnReference,
    /// Invokes a detection function
    Invocation,
}

/// A tagged syntax pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Idiom {
    /// Top-level function carrying one of the decorator markers
    FunctionDefinition {
        /// Decorator names, matched on the last dotted segment
        markers: Vec<String>,
    },
    /// Call whose callee is one of `callees`
    LiteralCall {
        /// Meaning of the call
        role: CallRole,
        /// Dotted callee paths
        callees: Vec<String>,
    },
}

/// First positional argument of a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgument {
    /// No positional argument
    Missing,
    /// String literal
    Text(String),
    /// Anything else; holds the expression text
    Expression(String),
}

/// A matched decorated function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMatch {
    /// Function name
    pub name: String,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterSpec>,
    /// Non-literal defaults as (parameter, expression, location)
    pub non_literal_defaults: Vec<(String, String, SourceLocation)>,
    /// Definition position
    pub location: SourceLocation,
}

/// A matched call
#[derive(Debug, Clone, PartialEq)]
pub struct CallMatch {
    /// Meaning of the call
    pub role: CallRole,
    /// Dotted callee path
    pub callee: String,
    /// First positional argument
    pub first_argument: CallArgument,
    /// Keyword arguments with literal values
    pub literal_keywords: IndexMap<String, serde_json::Value>,
    /// Call position
    pub location: SourceLocation,
}

/// Result of matching one node
#[derive(Debug, Clone, PartialEq)]
pub enum IdiomMatch {
    /// Function definition
    Function(FunctionMatch),
    /// Call expression
    Call(CallMatch),
}

/// Consumer of idiom matches, driven in source order
pub trait SyntaxVisitor {
    /// A matched function starts; calls until `exit_function` belong to it
    fn enter_function(&mut self, function: &FunctionMatch);

    /// The matched function ends
    fn exit_function(&mut self);

    /// A matched call
    fn visit_call(&mut self, call: &CallMatch);
}

/// Maps syntax positions to document locations
#[derive(Debug, Clone, Copy)]
pub struct LocationMapper {
    cell: usize,
    first_line: usize,
}

impl LocationMapper {
    /// Mapper for a cell whose first line is `first_line` in the file
    #[must_use]
    pub fn new(cell: usize, first_line: usize) -> Self {
        Self { cell, first_line }
    }

    /// Location of a node
    #[must_use]
    pub fn locate(&self, node: Node<'_>) -> SourceLocation {
        let point = node.start_position();
        SourceLocation::new(self.cell, self.first_line + point.row, point.column + 1)
    }
}

impl Idiom {
    /// Match this idiom against a node
    #[must_use]
    pub fn match_node(&self, node: Node<'_>, src: &[u8], at: LocationMapper) -> Option<IdiomMatch> {
        match self {
            Self::FunctionDefinition { markers } => {
                match_function(node, src, markers, at).map(IdiomMatch::Function)
            }
            Self::LiteralCall { role, callees } => {
                match_call(node, src, *role, callees, at).map(IdiomMatch::Call)
            }
        }
    }
}

/// Walk a tree in source order, dispatching matches to the visitor.
///
/// Uses an explicit stack so deeply nested code cannot exhaust the call stack.
pub fn walk<V: SyntaxVisitor>(
    root: Node<'_>,
    src: &[u8],
    idioms: &[Idiom],
    at: LocationMapper,
    visitor: &mut V,
) {
    enum Step<'t> {
        Visit(Node<'t>),
        Leave,
    }

    let mut stack = vec![Step::Visit(root)];
    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Leave => {
                visitor.exit_function();
                continue;
            }
            Step::Visit(node) => node,
        };

        let mut entered = false;
        for idiom in idioms {
            match idiom.match_node(node, src, at) {
                Some(IdiomMatch::Function(f)) => {
                    visitor.enter_function(&f);
                    entered = true;
                }
                Some(IdiomMatch::Call(c)) => visitor.visit_call(&c),
                None => {}
            }
        }
        if entered {
            stack.push(Step::Leave);
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().map(Step::Visit));
    }
}

fn match_function(
    node: Node<'_>,
    src: &[u8],
    markers: &[String],
    at: LocationMapper,
) -> Option<FunctionMatch> {
    if node.kind() != "function_definition" {
        return None;
    }
    let decorated = node.parent().filter(|p| p.kind() == "decorated_definition")?;
    if decorated.parent().map(|p| p.kind()) != Some("module") {
        return None;
    }

    let marked = named_children(decorated)
        .into_iter()
        .filter(|c| c.kind() == "decorator")
        .filter_map(|d| named_children(d).into_iter().next())
        .filter_map(|expr| decorator_name(expr, src))
        .any(|name| {
            let last = name.rsplit('.').next().unwrap_or(&name);
            markers.iter().any(|m| m == last)
        });
    if !marked {
        return None;
    }

    let name = node.child_by_field_name("name")?.utf8_text(src).ok()?.to_string();
    let mut parameters = Vec::new();
    let mut non_literal_defaults = Vec::new();

    if let Some(params) = node.child_by_field_name("parameters") {
        for param in named_children(params) {
            let Some(spec) = parameter_spec(param, src) else {
                continue;
            };
            if let DefaultValue::NonLiteral(expr) = &spec.default {
                let location = param
                    .child_by_field_name("value")
                    .map_or_else(|| at.locate(param), |v| at.locate(v));
                non_literal_defaults.push((spec.name.clone(), expr.clone(), location));
            }
            parameters.push(spec);
        }
    }

    Some(FunctionMatch {
        name,
        parameters,
        non_literal_defaults,
        location: at.locate(node),
    })
}

fn decorator_name(expr: Node<'_>, src: &[u8]) -> Option<String> {
    match expr.kind() {
        "call" => dotted_name(expr.child_by_field_name("function")?, src),
        _ => dotted_name(expr, src),
    }
}

fn parameter_spec(param: Node<'_>, src: &[u8]) -> Option<ParameterSpec> {
    let text = |n: Node<'_>| n.utf8_text(src).ok().map(str::to_string);
    let default_of = |n: Node<'_>| {
        n.child_by_field_name("value").map_or(DefaultValue::Absent, |v| {
            literal_value(v, src).map_or_else(
                || DefaultValue::NonLiteral(text(v).unwrap_or_default()),
                DefaultValue::Literal,
            )
        })
    };

    let (name_node, kind) = match param.kind() {
        "identifier" => (param, ParameterKind::Regular),
        "list_splat_pattern" => (named_children(param).into_iter().next()?, ParameterKind::VarPositional),
        "dictionary_splat_pattern" => (named_children(param).into_iter().next()?, ParameterKind::VarKeyword),
        "default_parameter" | "typed_default_parameter" => {
            (param.child_by_field_name("name")?, ParameterKind::Regular)
        }
        "typed_parameter" => {
            let first = named_children(param).into_iter().next()?;
            match first.kind() {
                "list_splat_pattern" => (named_children(first).into_iter().next()?, ParameterKind::VarPositional),
                "dictionary_splat_pattern" => (named_children(first).into_iter().next()?, ParameterKind::VarKeyword),
                _ => (first, ParameterKind::Regular),
            }
        }
        // `*` and `/` separators carry no binding
        _ => return None,
    };

    Some(ParameterSpec {
        name: text(name_node)?,
        kind,
        annotation: param.child_by_field_name("type").and_then(text),
        default: default_of(param),
    })
}

fn match_call(
    node: Node<'_>,
    src: &[u8],
    role: CallRole,
    callees: &[String],
    at: LocationMapper,
) -> Option<CallMatch> {
    if node.kind() != "call" {
        return None;
    }
    let callee = dotted_name(node.child_by_field_name("function")?, src)?;
    if !callees.iter().any(|c| *c == callee) {
        return None;
    }

    let mut first_argument = CallArgument::Missing;
    let mut literal_keywords = IndexMap::new();
    if let Some(args) = node
        .child_by_field_name("arguments")
        .filter(|a| a.kind() == "argument_list")
    {
        for arg in named_children(args) {
            match arg.kind() {
                "keyword_argument" => {
                    let name = arg.child_by_field_name("name").and_then(|n| n.utf8_text(src).ok());
                    let value = arg.child_by_field_name("value").and_then(|v| literal_value(v, src));
                    if let (Some(name), Some(value)) = (name, value) {
                        literal_keywords.insert(name.to_string(), value);
                    }
                }
                "list_splat" | "dictionary_splat" => {}
                _ if first_argument == CallArgument::Missing => {
                    first_argument = string_literal(arg, src).map_or_else(
                        || CallArgument::Expression(arg.utf8_text(src).unwrap_or_default().to_string()),
                        CallArgument::Text,
                    );
                }
                _ => {}
            }
        }
    }

    Some(CallMatch {
        role,
        callee,
        first_argument,
        literal_keywords,
        location: at.locate(node),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_python;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SyntaxVisitor for Recorder {
        fn enter_function(&mut self, function: &FunctionMatch) {
            self.events.push(format!("enter {}", function.name));
        }

        fn exit_function(&mut self) {
            self.events.push("exit".to_string());
        }

        fn visit_call(&mut self, call: &CallMatch) {
            self.events.push(format!("{:?} {} {:?}", call.role, call.callee, call.first_argument));
        }
    }

    fn idioms() -> Vec<Idiom> {
        vec![
            Idiom::FunctionDefinition {
                markers: vec!["detect".to_string()],
            },
            Idiom::LiteralCall {
                role: CallRole::TableAccess,
                callees: vec!["spark.table".to_string()],
            },
        ]
    }

    fn record(text: &str) -> Vec<String> {
        let tree = parse_python(text, 0).unwrap();
        let mut recorder = Recorder::default();
        walk(
            tree.root_node(),
            text.as_bytes(),
            &idioms(),
            LocationMapper::new(0, 1),
            &mut recorder,
        );
        recorder.events
    }

    #[test]
    fn visits_in_source_order() {
        let events = record(
            "spark.table('outside')\n@detect\ndef f():\n    a = spark.table('a')\n    return spark.table(name)\n",
        );
        assert_eq!(
            events,
            vec![
                "TableAccess spark.table Text(\"outside\")",
                "enter f",
                "TableAccess spark.table Text(\"a\")",
                "TableAccess spark.table Expression(\"name\")",
                "exit",
            ]
        );
    }

    #[test]
    fn decorator_variants() {
        let events = record("@lib.detect(severity='high')\ndef g():\n    pass\n@other\ndef h():\n    pass\ndef plain():\n    pass\n");
        assert_eq!(events, vec!["enter g", "exit"]);
    }

    #[test]
    fn nested_functions_are_not_top_level() {
        let events = record("def outer():\n    @detect\n    def inner():\n        pass\n");
        assert!(events.is_empty());
    }

    #[test]
    fn parameters_and_defaults() {
        let text = "@detect\ndef f(a, b: int, c='x', d: str = \"y\", e=now(), *args, flag=False, **kw):\n    pass\n";
        let tree = parse_python(text, 0).unwrap();
        let decorated = tree.root_node().named_child(0).unwrap();
        let def = decorated.child_by_field_name("definition").unwrap();
        let Some(IdiomMatch::Function(f)) =
            idioms()[0].match_node(def, text.as_bytes(), LocationMapper::new(0, 1))
        else {
            panic!("function not matched");
        };

        let names: Vec<_> = f.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e", "args", "flag", "kw"]);
        assert_eq!(f.parameters[1].annotation.as_deref(), Some("int"));
        assert_eq!(f.parameters[2].default, DefaultValue::Literal(json!("x")));
        assert_eq!(f.parameters[3].default, DefaultValue::Literal(json!("y")));
        assert_eq!(f.parameters[4].default, DefaultValue::NonLiteral("now()".to_string()));
        assert_eq!(f.parameters[5].kind, ParameterKind::VarPositional);
        assert_eq!(f.parameters[6].default, DefaultValue::Literal(json!(false)));
        assert_eq!(f.parameters[7].kind, ParameterKind::VarKeyword);
        assert_eq!(f.non_literal_defaults.len(), 1);
        assert_eq!(f.location.line, 2);
    }
}
