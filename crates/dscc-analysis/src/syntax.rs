//! tree-sitter helpers shared by the analyzer and the patcher

use crate::error::AnalysisError;
use tree_sitter::{Node, Parser, Tree};

/// Parse python source into a syntax tree
pub fn parse_python(text: &str, cell: usize) -> Result<Tree, AnalysisError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| AnalysisError::ParserInit(e.to_string()))?;
    parser
        .parse(text, None)
        .ok_or(AnalysisError::ParseFailed { cell })
}

/// Replace magic lines (`%pip ...`) with blank lines, keeping line numbers
#[must_use]
pub fn blank_magics(source: &str) -> String {
    source
        .split_inclusive('\n')
        .map(|line| {
            if line.trim_start().starts_with('%') {
                if line.ends_with("\r\n") {
                    "\r\n"
                } else if line.ends_with('\n') {
                    "\n"
                } else {
                    ""
                }
            } else {
                line
            }
        })
        .collect()
}

/// Dotted path of an identifier/attribute chain (`spark.read.table`)
#[must_use]
pub fn dotted_name(node: Node<'_>, src: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => node.utf8_text(src).ok().map(str::to_string),
        "attribute" => {
            let object = dotted_name(node.child_by_field_name("object")?, src)?;
            let attribute = node.child_by_field_name("attribute")?.utf8_text(src).ok()?;
            Some(format!("{object}.{attribute}"))
        }
        _ => None,
    }
}

/// First error or missing node in pre-order
#[must_use]
pub fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().filter(Node::has_error));
    }
    None
}

/// Named children, skipping comments
pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}
