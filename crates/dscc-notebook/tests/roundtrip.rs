//! Round-trip tests for notebook parsing and metadata write-back

use dscc_notebook::prelude::*;
use dscc_notebook::ParseError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const WITH_METADATA: &str = "# Databricks notebook source\n\
# MAGIC %md\n\
# MAGIC # Login detection\n\
# MAGIC\n\
# MAGIC ```yaml\n\
# MAGIC dscc:\n\
# MAGIC   uuid: 1b4e28ba-2fa1-11d2-883f-0016d3cca427\n\
# MAGIC   author: secops\n\
# MAGIC dscc-tests:\n\
# MAGIC   tests:\n\
# MAGIC   - function: detect_login\n\
# MAGIC     input:\n\
# MAGIC       window: 10\n\
# MAGIC     mocked_inputs:\n\
# MAGIC     - table: logs.auth\n\
# MAGIC       path: tests/logs_auth_sample.json\n\
# MAGIC     expect:\n\
# MAGIC       count: '> 0'\n\
# MAGIC       schema:\n\
# MAGIC       - user\n\
# MAGIC       - {ts: timestamp}\n\
# MAGIC owner: team-a\n\
# MAGIC ```\n\
# MAGIC\n\
# MAGIC trailing text\n\
\n\
# COMMAND ----------\n\
\n\
@detect\n\
def detect_login(window=5):\n\
    return spark.table(\"logs.auth\")\n";

#[test]
fn extracts_merged_metadata() {
    let doc = NotebookDocument::parse(WITH_METADATA).unwrap();
    let block = doc.metadata();

    assert_eq!(block.uuid(), Some("1b4e28ba-2fa1-11d2-883f-0016d3cca427"));
    assert_eq!(block.tests.len(), 1);

    let case = &block.tests[0];
    assert_eq!(case.name, "test_detect_login");
    assert_eq!(case.input["window"], serde_json::json!(10));
    assert_eq!(
        case.mocked_inputs,
        vec![MockedInput::new("logs.auth", "tests/logs_auth_sample.json")]
    );
    assert_eq!(case.expect.count.as_deref(), Some("> 0"));
    assert_eq!(
        case.expect.schema,
        Some(vec![
            SchemaEntry::untyped("user"),
            SchemaEntry::typed("ts", "timestamp")
        ])
    );
    assert!(block.extra.contains_key("owner"));

    let region = doc.metadata_region().unwrap();
    assert_eq!(region.cell, 0);
}

#[test]
fn rewrite_changes_only_yaml_region() {
    let doc = NotebookDocument::parse(WITH_METADATA).unwrap();
    let mut block = doc.metadata().clone();
    block.tests[0].expect.count = Some(">= 2".to_string());

    let edited = doc.with_metadata(&block).unwrap();
    let rendered = edited.render();

    let before: Vec<&str> = WITH_METADATA.lines().collect();
    let after: Vec<&str> = rendered.lines().collect();
    let open = before.iter().position(|l| *l == "# MAGIC ```yaml").unwrap();
    let close_before = before.iter().rposition(|l| *l == "# MAGIC ```").unwrap();
    let close_after = after.iter().rposition(|l| *l == "# MAGIC ```").unwrap();

    assert_eq!(before[..=open], after[..=open]);
    assert_eq!(before[close_before..], after[close_after..]);
    assert_eq!(edited.metadata(), &block);
}

#[test]
fn inject_then_reparse_is_structurally_identical() {
    let doc = NotebookDocument::parse("# Databricks notebook source\nx = 1\n").unwrap();
    assert!(doc.metadata().is_empty());

    let mut block = MetadataBlock::default();
    block.ensure_uuid();
    block.tests.push(
        TestCase::new("f")
            .with_input("x", serde_json::json!("a"))
            .with_mocked_input(MockedInput::new("t", "tests/t_sample.json"))
            .with_expect(Expectation::count("> 0")),
    );

    let edited = doc.with_metadata(&block).unwrap();
    let reparsed = NotebookDocument::parse(&edited.render()).unwrap();
    assert_eq!(reparsed.metadata(), &block);

    // Writing the same block again is a fixed point
    let again = reparsed.with_metadata(&block).unwrap();
    assert_eq!(again.render(), edited.render());
}

#[test]
fn ipynb_metadata_cell_inserted_after_setup_magics() {
    let nb = serde_json::json!({
        "cells": [
            {"cell_type": "code", "metadata": {}, "source": ["%pip install requests\n"]},
            {"cell_type": "code", "metadata": {}, "source": ["%run ./common\n"]},
            {"cell_type": "code", "metadata": {}, "source": ["x = 1\n"]}
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    });
    let text = serde_json::to_string_pretty(&nb).unwrap();
    let doc = NotebookDocument::parse_with_path(std::path::Path::new("nb.ipynb"), &text).unwrap();

    let mut block = MetadataBlock::default();
    block.tests.push(TestCase::new("f"));
    let edited = doc.with_metadata(&block).unwrap();

    assert_eq!(edited.cells().len(), 4);
    assert!(edited.cells()[2].is_markdown());
    assert_eq!(edited.metadata(), &block);
    assert_eq!(edited.cells()[3].source(), "x = 1\n");
}

const TWO_SPACE_NOTEBOOK: &str = r#"{
  "cells": [
    {
      "cell_type": "code",
      "metadata": {},
      "source": ["%pip install requests\n"]
    },
    {
      "cell_type": "code",
      "metadata": {},
      "source": ["x = 1\n"]
    }
  ],
  "metadata": {"kernelspec": {"name": "python3"}},
  "nbformat": 4,
  "nbformat_minor": 5
}
"#;

#[test]
fn ipynb_edit_keeps_bytes_outside_metadata_cell() {
    let split = TWO_SPACE_NOTEBOOK.find("{\n      \"cell_type\": \"code\",\n      \"metadata\": {},\n      \"source\": [\"x").unwrap();
    let (head, tail) = TWO_SPACE_NOTEBOOK.split_at(split);
    let doc = NotebookDocument::parse_with_path(std::path::Path::new("nb.ipynb"), TWO_SPACE_NOTEBOOK).unwrap();

    let mut block = MetadataBlock::default();
    block.tests.push(TestCase::new("f"));
    let edited = doc.with_metadata(&block).unwrap();
    let text = edited.render();

    assert!(text.starts_with(head));
    assert!(text.ends_with(tail));
    assert!(text.contains("\n      \"cell_type\": \"markdown\",\n"));
    assert!(text.contains("\n      \"source\": [\n        \"```yaml\\n\",\n"));
    assert_eq!(edited.metadata(), &block);

    // Rewriting only touches the metadata cell's source
    let mut changed = block.clone();
    changed.tests.push(TestCase::new("g"));
    let rewritten = edited.with_metadata(&changed).unwrap().render();
    assert!(rewritten.starts_with(head));
    assert!(rewritten.ends_with(tail));
    assert!(rewritten.contains("\n      \"cell_type\": \"markdown\",\n      \"metadata\": {},\n      \"source\": [\n        \"```yaml\\n\",\n"));

    let reparsed = NotebookDocument::parse(&rewritten).unwrap();
    assert_eq!(reparsed.metadata(), &changed);
    assert_eq!(reparsed.cells().len(), 3);
}

#[test]
fn invalid_yaml_reports_cell() {
    let src = "x = 1\n# COMMAND ----------\n# MAGIC %md\n# MAGIC ```yaml\n# MAGIC dscc: [\n# MAGIC ```\n";
    let err = NotebookDocument::parse(src).unwrap_err();
    assert!(matches!(err, ParseError::InvalidYaml { cell: 1, .. }));
}

#[test]
fn legacy_tests_key_is_read() {
    let src = "# MAGIC %md\n# MAGIC ```yaml\n# MAGIC tests:\n# MAGIC - function: f\n# MAGIC   expect:\n# MAGIC     count: 1\n# MAGIC ```\n";
    let doc = NotebookDocument::parse(src).unwrap();
    assert_eq!(doc.metadata().tests.len(), 1);
    assert_eq!(doc.metadata().tests[0].function, "f");
    assert!(doc.metadata().extra.is_empty());
}

#[test]
fn unrelated_yaml_is_not_metadata() {
    let src = "# MAGIC %md\n# MAGIC ```yaml\n# MAGIC other: 1\n# MAGIC ```\n";
    let doc = NotebookDocument::parse(src).unwrap();
    assert!(doc.metadata().is_empty());
    assert!(doc.metadata_region().is_none());
}

fn cell_body() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z_]{1,8} = [0-9]{1,3}",
            Just(String::new()),
            Just("# MAGIC %md".to_string()),
            Just("# MAGIC some text".to_string()),
            "# [a-z ]{0,12}",
        ],
        0..6,
    )
    .prop_map(|lines| lines.into_iter().map(|l| l + "\n").collect())
}

proptest! {
    #[test]
    fn source_render_is_byte_identical(
        header in any::<bool>(),
        cells in prop::collection::vec(cell_body(), 1..5),
    ) {
        let mut text = String::new();
        if header {
            text.push_str("# Databricks notebook source\n");
        }
        text.push_str(&cells.join("# COMMAND ----------\n"));

        let doc = NotebookDocument::parse(&text).unwrap();
        prop_assert_eq!(doc.cells().len(), cells.len());
        prop_assert_eq!(doc.render(), text);
    }
}
