//! End-to-end synthesis over notebooks on disk

use dscc_notebook::{NotebookDocument, NotebookStore};
use dscc_synth::{
    Answer, FetchError, PersistOutcome, Resolution, SampleFetcher, SampleFormat, SampleRequest,
    SampleStatus, ScriptedResponder, SynthesisOptions, TestSpecSynthesizer,
};
use dscc_test_utils::{AppDir, DETECTION_NOTEBOOK, TWO_TABLE_NOTEBOOK};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn noninteractive(app: &AppDir) -> SynthesisOptions {
    SynthesisOptions::default()
        .with_noninteractive(true)
        .with_sample_root(app.path())
}

struct RowsFetcher;

#[async_trait::async_trait]
impl SampleFetcher for RowsFetcher {
    async fn fetch(&self, request: &SampleRequest) -> Result<usize, FetchError> {
        std::fs::write(&request.destination, "{\"user\": \"u1\", \"ts\": 1}\n{\"user\": \"u2\", \"ts\": 2}\n")
            .map_err(|e| FetchError::Failed {
                table: request.table.clone(),
                message: e.to_string(),
            })?;
        Ok(2)
    }
}

#[tokio::test]
async fn noninteractive_policy_writes_case() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let store = NotebookStore::default();
    let synth = TestSpecSynthesizer::new(noninteractive(&app).with_no_sample(true));

    let outcome = synth
        .infer_notebook(&store, &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    assert_eq!(outcome.merge.added, vec!["test_f"]);
    let PersistOutcome::Written { uuid, .. } = &outcome.persisted else {
        panic!("expected a write");
    };

    let reread = NotebookDocument::read(&path).await.unwrap();
    let block = reread.metadata();
    assert_eq!(block.uuid(), Some(uuid.as_str()));

    let case = block.case("test_f").unwrap();
    assert_eq!(case.function, "f");
    assert_eq!(case.input["x"], json!("a"));
    assert_eq!(case.mocked_inputs.len(), 1);
    assert_eq!(case.mocked_inputs[0].table, "t");
    assert_eq!(case.mocked_inputs[0].path, "tests/t_sample.json");
    assert_eq!(case.expect.count.as_deref(), Some("> 0"));
    assert_eq!(case.required_columns, vec!["ts", "user"]);

    assert_eq!(outcome.synthesis.ambiguities.len(), 1);
    let ambiguity = &outcome.synthesis.ambiguities[0];
    assert_eq!(ambiguity.candidates, vec![json!("a"), json!("b")]);
    assert_eq!(ambiguity.resolution, Resolution::DeclaredDefault);
    assert_eq!(outcome.synthesis.samples[0].status, SampleStatus::Skipped);

    // the code cells are untouched
    assert!(std::fs::read_to_string(&path).unwrap().contains("display(f(x=\"b\"))"));
}

#[tokio::test]
async fn one_mocked_input_per_table() {
    let app = AppDir::new();
    let path = app.write("joined.py", TWO_TABLE_NOTEBOOK);
    let synth = TestSpecSynthesizer::new(noninteractive(&app).with_no_sample(true));

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    let case = &outcome.synthesis.cases[0];
    let tables: Vec<_> = case.mocked_inputs.iter().map(|m| m.table.as_str()).collect();
    assert_eq!(tables, vec!["db.logins", "db.users"]);
    assert_eq!(case.mocked_inputs[0].path, "tests/db_logins_sample.json");
    assert!(case.input.is_empty());
}

#[tokio::test]
async fn dry_run_leaves_notebook_alone() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let synth = TestSpecSynthesizer::new(noninteractive(&app).with_dry_run(true));

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    let PersistOutcome::DryRun { yaml } = outcome.persisted else {
        panic!("expected a dry run");
    };
    assert!(yaml.contains("test_f"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DETECTION_NOTEBOOK);
    assert!(!app.exists("tests/t_sample.json"));
}

#[tokio::test]
async fn fallback_writes_empty_stub() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let options = noninteractive(&app)
        .with_fallback_empty(true)
        .with_sample_format(SampleFormat::Csv);
    let synth = TestSpecSynthesizer::new(options);

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    assert_eq!(outcome.synthesis.samples[0].status, SampleStatus::Stubbed);
    assert_eq!(app.read("tests/t_sample.csv"), "ts,user\n");
}

#[tokio::test]
async fn unreachable_platform_without_fallback() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let synth = TestSpecSynthesizer::new(noninteractive(&app));

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    assert!(matches!(
        outcome.synthesis.samples[0].status,
        SampleStatus::Unavailable { .. }
    ));
    assert!(!app.exists("tests/t_sample.json"));
    // the case is still written
    assert_eq!(outcome.merge.added, vec!["test_f"]);
}

#[tokio::test]
async fn fetched_rows_are_reported() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let synth = TestSpecSynthesizer::new(noninteractive(&app)).with_fetcher(Arc::new(RowsFetcher));

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    assert_eq!(outcome.synthesis.samples[0].status, SampleStatus::Fetched { rows: 2 });
    assert!(app.read("tests/t_sample.json").contains("u2"));
}

#[tokio::test]
async fn existing_sample_kept_without_overwrite() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    app.write("tests/t_sample.json", "{\"user\": \"keep\"}\n");
    let synth = TestSpecSynthesizer::new(noninteractive(&app)).with_fetcher(Arc::new(RowsFetcher));

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut ScriptedResponder::default())
        .await
        .unwrap();

    assert_eq!(outcome.synthesis.samples[0].status, SampleStatus::Existing);
    assert!(app.read("tests/t_sample.json").contains("keep"));
}

#[tokio::test]
async fn operator_override_is_recorded() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let synth = TestSpecSynthesizer::new(
        SynthesisOptions::default()
            .with_no_sample(true)
            .with_sample_root(app.path()),
    );
    let mut responder = ScriptedResponder::new([
        Answer::Text("c".into()),
        Answer::Accept,
        Answer::Text("fixtures/events.json".into()),
        Answer::Text("== 1".into()),
    ]);

    let outcome = synth
        .infer_notebook(&NotebookStore::default(), &path, &mut responder)
        .await
        .unwrap();

    let kinds: Vec<_> = responder.asked().iter().map(|p| p.kind()).collect();
    assert_eq!(kinds, vec!["input_value", "sample_source", "sample_path", "expectation"]);

    let case = &outcome.synthesis.cases[0];
    assert_eq!(case.input["x"], json!("c"));
    assert_eq!(case.mocked_inputs[0].path, "fixtures/events.json");
    assert_eq!(case.expect.count.as_deref(), Some("== 1"));
    assert_eq!(outcome.synthesis.ambiguities[0].resolution, Resolution::Operator);
}

#[tokio::test]
async fn rerun_respects_overwrite() {
    let app = AppDir::new();
    let path = app.write("detect.py", DETECTION_NOTEBOOK);
    let store = NotebookStore::default();

    let first = TestSpecSynthesizer::new(noninteractive(&app).with_no_sample(true));
    first
        .infer_notebook(&store, &path, &mut ScriptedResponder::default())
        .await
        .unwrap();
    let after_first = std::fs::read_to_string(&path).unwrap();

    let again = first
        .infer_notebook(&store, &path, &mut ScriptedResponder::default())
        .await
        .unwrap();
    assert_eq!(again.merge.skipped, vec!["test_f"]);
    assert!(again.merge.added.is_empty());
    // identity is stable across runs
    assert_eq!(std::fs::read_to_string(&path).unwrap(), after_first);

    let overwrite = TestSpecSynthesizer::new(
        noninteractive(&app).with_no_sample(true).with_overwrite(true),
    );
    let replaced = overwrite
        .infer_notebook(&store, &path, &mut ScriptedResponder::default())
        .await
        .unwrap();
    assert_eq!(replaced.merge.replaced, vec!["test_f"]);
    assert_eq!(replaced.merge.block.tests.len(), 1);
}
