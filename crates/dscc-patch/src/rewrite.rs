//! Syntax-aware rewrites applied to patched code
//!
//! Edits are collected from one tree-sitter parse and applied back to front
//! so byte offsets stay valid.

use crate::error::PatchResult;
use dscc_analysis::syntax::parse_python;
use tree_sitter::Node;

/// Identifier bound to the harness session fixture
pub const FIXTURE_NAME: &str = "__dscc_session__";

/// Generated entry point the harness calls to bind the fixture
pub const BIND_FUNCTION: &str = "__dscc_bind_session__";

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

fn apply(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.start);
    let mut out = text.to_string();
    for edit in edits.into_iter().rev() {
        out.replace_range(edit.start..edit.end, &edit.replacement);
    }
    out
}

fn preorder(root: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    nodes
}

/// Whether an identifier node is a variable reference, not an attribute,
/// keyword name or import path
fn is_reference(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    match parent.kind() {
        "attribute" => parent
            .child_by_field_name("attribute")
            .map_or(true, |attr| attr.id() != node.id()),
        "keyword_argument" => parent
            .child_by_field_name("name")
            .map_or(true, |name| name.id() != node.id()),
        "dotted_name" | "aliased_import" | "import_statement" | "import_from_statement" => false,
        _ => true,
    }
}

/// Rename references to any of `session_names` into the fixture identifier
pub fn rewrite_session(code: &str, session_names: &[String]) -> PatchResult<String> {
    let tree = parse_python(code, 0)?;
    let src = code.as_bytes();
    let edits: Vec<Edit> = preorder(tree.root_node())
        .into_iter()
        .filter(|n| n.kind() == "identifier")
        .filter(|n| {
            n.utf8_text(src)
                .is_ok_and(|text| session_names.iter().any(|s| s == text))
        })
        .filter(|n| is_reference(*n))
        .map(|n| Edit {
            start: n.start_byte(),
            end: n.end_byte(),
            replacement: FIXTURE_NAME.to_string(),
        })
        .collect();
    Ok(apply(code, edits))
}

/// `display(x)` with exactly one positional argument
fn display_argument<'t>(node: Node<'t>, src: &[u8]) -> Option<Node<'t>> {
    if node.kind() != "call" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" || function.utf8_text(src).ok()? != "display" {
        return None;
    }
    let arguments = node.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let args: Vec<Node<'t>> = arguments
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    match args.as_slice() {
        [arg]
            if !matches!(
                arg.kind(),
                "keyword_argument" | "list_splat" | "dictionary_splat"
            ) =>
        {
            Some(*arg)
        }
        _ => None,
    }
}

/// Rewrite `display(x)` into `(x).show()`, outermost calls first
pub fn rewrite_display(code: &str) -> PatchResult<String> {
    let mut current = code.to_string();
    loop {
        let tree = parse_python(&current, 0)?;
        let src = current.as_bytes();
        let mut edits: Vec<Edit> = Vec::new();
        for node in preorder(tree.root_node()) {
            let Some(arg) = display_argument(node, src) else {
                continue;
            };
            if edits
                .iter()
                .any(|e| e.start <= node.start_byte() && node.end_byte() <= e.end)
            {
                continue;
            }
            edits.push(Edit {
                start: node.start_byte(),
                end: node.end_byte(),
                replacement: format!("({}).show()", &current[arg.start_byte()..arg.end_byte()]),
            });
        }
        if edits.is_empty() {
            return Ok(current);
        }
        current = apply(&current, edits);
    }
}
