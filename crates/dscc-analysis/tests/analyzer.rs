//! Analyzer tests over full notebook documents

use dscc_analysis::{AnalysisWarning, DefaultValue, StaticAnalyzer};
use dscc_notebook::NotebookDocument;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

const NOTEBOOK: &str = "# Databricks notebook source\n\
# MAGIC %pip install requests\n\
\n\
# COMMAND ----------\n\
\n\
from pyspark.sql import functions as F\n\
\n\
# COMMAND ----------\n\
\n\
@detect\n\
def f(x: str = \"a\", since=days_ago(1)):\n\
    events = spark.table(\"t\")\n\
    return events.filter(F.col(\"user\") == x).select(col(\"ts\"))\n\
\n\
def helper():\n\
    return spark.table(\"ignored\")\n\
\n\
# COMMAND ----------\n\
\n\
display(f(x=\"b\"))\n";

#[test]
fn discovers_decorated_function() {
    let doc = NotebookDocument::parse(NOTEBOOK).unwrap();
    let report = StaticAnalyzer::default().analyze(&doc).unwrap();

    assert_eq!(report.functions.len(), 1);
    let f = &report.functions[0];
    assert_eq!(f.name, "f");
    assert_eq!(f.location.cell, 2);
    assert_eq!(f.location.line, 11);

    assert_eq!(f.parameters[0].name, "x");
    assert_eq!(f.parameters[0].annotation.as_deref(), Some("str"));
    assert_eq!(f.parameters[0].default, DefaultValue::Literal(json!("a")));
    assert_eq!(
        f.parameters[1].default,
        DefaultValue::NonLiteral("days_ago(1)".to_string())
    );

    assert_eq!(f.tables.len(), 1);
    assert_eq!(f.tables[0].table, "t");
    assert_eq!(f.tables[0].columns, vec!["user", "ts"]);

    assert_eq!(f.call_sites.len(), 1);
    assert_eq!(f.call_sites[0].arguments["x"], json!("b"));
    assert_eq!(f.candidates("x"), vec![json!("a"), json!("b")]);
}

#[test]
fn non_literal_default_is_warned() {
    let doc = NotebookDocument::parse(NOTEBOOK).unwrap();
    let report = StaticAnalyzer::default().analyze(&doc).unwrap();
    assert!(matches!(
        &report.warnings[..],
        [AnalysisWarning::NonLiteralDefault { parameter, .. }] if parameter == "since"
    ));
}

#[test]
fn syntax_error_cell_does_not_block_others() {
    let src = "def broken(:\n    pass\n# COMMAND ----------\n@detect\ndef ok():\n    return spark.read.table('db.t')\n";
    let doc = NotebookDocument::parse(src).unwrap();
    let report = StaticAnalyzer::default().analyze(&doc).unwrap();

    assert!(matches!(report.warnings[0], AnalysisWarning::SyntaxError { .. }));
    assert_eq!(report.functions.len(), 1);
    assert_eq!(report.functions[0].tables[0].table, "db.t");
}

#[test]
fn magic_cells_are_skipped() {
    let src = "# MAGIC %sql\n# MAGIC select * from t\n# COMMAND ----------\n@detection\ndef g():\n    pass\n";
    let doc = NotebookDocument::parse(src).unwrap();
    let report = StaticAnalyzer::default().analyze(&doc).unwrap();
    assert!(report.warnings.is_empty());
    assert_eq!(report.functions[0].name, "g");
}

#[test]
fn function_after_line_magic_in_interchange_cell() {
    let notebook = json!({
        "cells": [{
            "cell_type": "code",
            "metadata": {},
            "source": [
                "%pip install requests\n",
                "@detect\n",
                "def f(x='a'):\n",
                "    return spark.table('t')\n"
            ]
        }],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    });
    let doc = NotebookDocument::parse(&notebook.to_string()).unwrap();
    let report = StaticAnalyzer::default().analyze(&doc).unwrap();

    assert!(report.warnings.is_empty());
    assert_eq!(report.functions.len(), 1);
    assert_eq!(report.functions[0].name, "f");
    assert_eq!(report.functions[0].location.line, 3);
    assert_eq!(report.functions[0].tables[0].table, "t");
}

fn function_source() -> impl Strategy<Value = String> {
    (
        "[a-z]{1,6}",
        prop::collection::vec(("[a-z]{1,5}", prop::option::of(0i64..100)), 0..4),
        prop::collection::vec("[a-z]{1,5}", 0..4),
    )
        .prop_map(|(name, params, tables)| {
            let params: Vec<String> = params
                .into_iter()
                .enumerate()
                .map(|(i, (p, default))| match default {
                    Some(d) => format!("{p}{i}={d}"),
                    None => format!("{p}{i}"),
                })
                .collect();
            let mut body = String::new();
            for t in &tables {
                body.push_str(&format!("    spark.table(\"{t}\")\n"));
            }
            body.push_str("    return None\n");
            format!("@detect\ndef fn_{name}({}):\n{body}", params.join(", "))
        })
}

proptest! {
    #[test]
    fn analysis_is_deterministic(funcs in prop::collection::vec(function_source(), 1..4)) {
        let text = funcs.join("\n# COMMAND ----------\n");
        let doc = NotebookDocument::parse(&text).unwrap();
        let analyzer = StaticAnalyzer::default();

        let first = analyzer.analyze(&doc).unwrap();
        let second = analyzer.analyze(&NotebookDocument::parse(&text).unwrap()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.functions.len(), funcs.len());
    }
}
