//! Patching notebooks with includes

use dscc_notebook::{NotebookDocument, NotebookStore};
use dscc_patch::{MemorySource, NotebookPatcher, PatchError};
use dscc_test_utils::{source_notebook, AppDir, DETECTION_NOTEBOOK};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn memory_patcher(source: MemorySource) -> NotebookPatcher {
    NotebookPatcher::new(Arc::new(source))
}

#[tokio::test]
async fn inlines_includes_once_in_order() {
    let source = MemorySource::new()
        .with_notebook(
            "app/main.py",
            &source_notebook(&[
                "# MAGIC %run ./lib/common",
                "# MAGIC %run ./lib/extra",
                "x = helper()",
            ]),
        )
        .unwrap()
        .with_notebook(
            "app/lib/common.py",
            &source_notebook(&["# MAGIC %md\n# MAGIC # Helpers", "def helper():\n    return 1"]),
        )
        .unwrap()
        .with_notebook(
            "app/lib/extra.py",
            &source_notebook(&["# MAGIC %run ./common", "EXTRA = helper()"]),
        )
        .unwrap();

    let module = memory_patcher(source).patch(Path::new("app/main.py")).await.unwrap();

    assert_eq!(module.name, "main");
    assert_eq!(
        module.includes,
        vec![PathBuf::from("app/lib/common.py"), PathBuf::from("app/lib/extra.py")]
    );
    let body = module.source.split_once("# dscc end of harness header\n").unwrap().1;
    assert_eq!(body, "\ndef helper():\n    return 1\n\n\nEXTRA = helper()\n\n\nx = helper()\n");
    assert!(!module.source.contains("# MAGIC"));
    assert!(!module.source.contains("# COMMAND"));
}

#[tokio::test]
async fn two_notebook_cycle_names_both() {
    let source = MemorySource::new()
        .with_notebook("a.py", &source_notebook(&["# MAGIC %run ./b", "A = 1"]))
        .unwrap()
        .with_notebook("b.py", &source_notebook(&["# MAGIC %run ./a", "B = 1"]))
        .unwrap();

    let err = memory_patcher(source).patch(Path::new("a.py")).await.unwrap_err();
    let PatchError::IncludeCycle { cycle } = &err else {
        panic!("expected cycle, got {err}");
    };
    assert_eq!(
        cycle,
        &vec![PathBuf::from("a.py"), PathBuf::from("b.py"), PathBuf::from("a.py")]
    );
    let message = err.to_string();
    assert!(message.contains("a.py") && message.contains("b.py"));
}

#[tokio::test]
async fn cycle_writes_no_artifact() {
    let app = AppDir::new();
    let a = app.write("a.py", &source_notebook(&["# MAGIC %run ./b"]));
    app.write("b.py", &source_notebook(&["# MAGIC %run ./a"]));
    let patcher = NotebookPatcher::new(Arc::new(NotebookStore::default()));

    let result = patcher.patch(&a).await;
    assert!(matches!(result, Err(PatchError::IncludeCycle { .. })));
    assert!(!app.exists("build"));
    assert!(!app.exists("a.py.tmp"));
}

#[tokio::test]
async fn unresolved_include_is_error() {
    let source = MemorySource::new()
        .with_notebook("a.py", &source_notebook(&["# MAGIC %run ./missing"]))
        .unwrap();
    let err = memory_patcher(source).patch(Path::new("a.py")).await.unwrap_err();
    assert!(matches!(
        err,
        PatchError::UnresolvedInclude { ref target, .. } if target == "./missing"
    ));
}

#[tokio::test]
async fn session_and_display_rewritten() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let patcher = NotebookPatcher::new(Arc::new(NotebookStore::default()));

    let module = patcher.patch(&path).await.unwrap();
    assert!(module.source.contains("events = __dscc_session__.table(\"t\")"));
    assert!(module.source.contains("(f(x=\"b\")).show()"));
    assert!(!module.source.contains("%pip"));
    assert!(!module.source.contains("= spark."));

    let written = module.write_to(&app.path().join("build")).await.unwrap();
    assert_eq!(written, app.path().join("build/detect.py"));
    assert_eq!(std::fs::read_to_string(written).unwrap(), module.source);
}

#[tokio::test]
async fn invalid_module_is_located_in_its_notebook() {
    let source = MemorySource::new()
        .with_notebook("app/main.py", &source_notebook(&["# MAGIC %run ./lib", "x = 1"]))
        .unwrap()
        .with_notebook(
            "app/lib.py",
            &source_notebook(&["y = 2", "@detect\ndef f(x='a':\n    return spark.table('t')"]),
        )
        .unwrap();

    let err = memory_patcher(source).patch(Path::new("app/main.py")).await.unwrap_err();
    let PatchError::InvalidSyntax { notebook, line, .. } = &err else {
        panic!("expected syntax error, got {err}");
    };
    assert_eq!(notebook, &PathBuf::from("app/lib.py"));
    assert!((6..=8).contains(line), "line {line}");
    assert!(err.to_string().contains("app/lib.py"));
}

#[tokio::test]
async fn code_after_line_magic_is_kept() {
    let notebook = r#"{
 "cells": [
  {
   "cell_type": "code",
   "metadata": {},
   "source": ["%pip install requests\n", "@detect\n", "def f(x='a'):\n", "    return spark.table('t')\n"]
  },
  {
   "cell_type": "code",
   "metadata": {},
   "source": ["%%sql\n", "select * from t\n"]
  }
 ],
 "metadata": {},
 "nbformat": 4,
 "nbformat_minor": 5
}"#;
    let source = MemorySource::new().with_notebook("detect.ipynb", notebook).unwrap();
    let module = memory_patcher(source).patch(Path::new("detect.ipynb")).await.unwrap();

    assert!(module.source.contains("def f(x='a'):"));
    assert!(module.source.contains("__dscc_session__.table('t')"));
    assert!(!module.source.contains("%pip"));
    assert!(!module.source.contains("select * from t"));
}

#[tokio::test]
async fn patch_all_isolates_failures() {
    let app = AppDir::new();
    let good = app.write("good.py", DETECTION_NOTEBOOK);
    let bad = app.write("bad.py", &source_notebook(&["# MAGIC %run ./nowhere"]));
    let patcher = NotebookPatcher::new(Arc::new(NotebookStore::default()));

    let results = patcher.patch_all(vec![good.clone(), bad.clone()], 2).await;
    assert_eq!(results[0].0, bad);
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, good);
    assert!(results[1].1.is_ok());
}

async fn repatch(module_source: &str) -> String {
    let doc = Arc::new(NotebookDocument::parse(module_source).unwrap());
    let patcher = memory_patcher(MemorySource::new());
    patcher
        .patch_document(Path::new("detect.py"), doc)
        .await
        .unwrap()
        .source
}

#[tokio::test]
async fn patching_is_idempotent() {
    let source = MemorySource::new()
        .with_notebook("detect.py", DETECTION_NOTEBOOK)
        .unwrap();
    let once = memory_patcher(source).patch(Path::new("detect.py")).await.unwrap();
    let twice = repatch(&once.source).await;
    assert_eq!(twice, once.source);
}

fn cell_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|v| format!("v_{v} = spark.table(\"{v}\")")),
        "[a-z]{1,6}".prop_map(|v| format!("display(v_{v})")),
        "[a-z]{1,6}".prop_map(|v| format!("def v_{v}(x=1):\n    return spark.sql(\"select 1\")")),
        Just("# MAGIC %md\n# MAGIC notes".to_string()),
        Just("# MAGIC %pip install pandas".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repatch_is_byte_identical(cells in prop::collection::vec(cell_strategy(), 1..6)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
        let text = source_notebook(&refs);
        runtime.block_on(async {
            let source = MemorySource::new().with_notebook("detect.py", &text).unwrap();
            let once = memory_patcher(source).patch(Path::new("detect.py")).await.unwrap();
            let twice = repatch(&once.source).await;
            prop_assert_eq!(twice, once.source);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
