//! Test specification synthesizer
//!
//! Proposes one `TestCase` per detection function, asks the responder to
//! confirm or override each proposal, merges the result with the persisted
//! cases and writes the YAML region back.

use crate::error::{SynthError, SynthResult};
use crate::fetcher::{SampleFetcher, SampleFormat, SampleRequest, UnavailableFetcher};
use crate::options::SynthesisOptions;
use crate::prompt::{DefaultPolicy, Prompt, Responder};
use crate::PLACEHOLDER;
use dscc_analysis::{AnalysisReport, AnalysisWarning, DetectionFunction, ParameterKind, StaticAnalyzer, TableReference};
use dscc_notebook::{Expectation, MetadataBlock, MockedInput, NotebookDocument, NotebookStore, SerializeError, TestCase};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Replace every char outside `[A-Za-z0-9_-]` with `_`
#[must_use]
pub fn sanitize_table_name(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Default sample path `tests/<sanitized>_sample.<ext>`
#[must_use]
pub fn default_sample_path(table: &str, format: SampleFormat) -> String {
    format!("tests/{}_sample.{}", sanitize_table_name(table), format.extension())
}

/// How an ambiguous parameter value was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The declared literal default
    DeclaredDefault,
    /// The first literal call site in source order
    FirstCallSite,
    /// The operator supplied a value
    Operator,
}

/// Several distinct literal candidates for one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceAmbiguity {
    /// Function name
    pub function: String,
    /// Parameter name
    pub parameter: String,
    /// Candidates, declared default first
    pub candidates: Vec<Value>,
    /// Value written into the case
    pub chosen: Value,
    /// How it was chosen
    pub resolution: Resolution,
}

/// What happened to one sample file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleStatus {
    /// Rows were fetched
    Fetched {
        /// Rows written
        rows: usize,
    },
    /// An empty stub was written
    Stubbed,
    /// File already present
    Existing,
    /// Fetch disabled
    Skipped,
    /// Could not fetch and no stub written
    Unavailable {
        /// Why
        reason: String,
    },
}

/// Sample outcome for one mocked input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleOutcome {
    /// Function name
    pub function: String,
    /// Referenced table
    pub table: String,
    /// Sample path as recorded in the case
    pub path: String,
    /// Outcome
    pub status: SampleStatus,
}

/// Output of synthesis
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Synthesis {
    /// Candidate cases, one per function
    pub cases: Vec<TestCase>,
    /// Recorded ambiguity resolutions
    pub ambiguities: Vec<InferenceAmbiguity>,
    /// Sample outcomes
    pub samples: Vec<SampleOutcome>,
}

/// Result of merging candidates with persisted cases
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeOutcome {
    /// Merged block
    pub block: MetadataBlock,
    /// Names newly added
    pub added: Vec<String>,
    /// Names replaced (overwrite)
    pub replaced: Vec<String>,
    /// Names kept as persisted (collision without overwrite)
    pub skipped: Vec<String>,
}

/// Result of persisting a block
#[derive(Debug, Clone)]
pub enum PersistOutcome {
    /// Nothing written; the YAML that would be written
    DryRun {
        /// Rendered YAML region
        yaml: String,
    },
    /// Notebook rewritten
    Written {
        /// New document snapshot
        document: Arc<NotebookDocument>,
        /// Notebook identity
        uuid: String,
    },
}

/// Everything `infer_notebook` did
#[derive(Debug, Clone)]
pub struct InferOutcome {
    /// Analysis warnings
    pub warnings: Vec<AnalysisWarning>,
    /// Synthesis output
    pub synthesis: Synthesis,
    /// Merge result
    pub merge: MergeOutcome,
    /// Persist result
    pub persisted: PersistOutcome,
}

/// Turns analysis output into persisted test cases
#[derive(Clone)]
pub struct TestSpecSynthesizer {
    options: SynthesisOptions,
    analyzer: StaticAnalyzer,
    fetcher: Arc<dyn SampleFetcher>,
}

impl std::fmt::Debug for TestSpecSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSpecSynthesizer")
            .field("options", &self.options)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl TestSpecSynthesizer {
    /// Create synthesizer with the default analyzer and no sample source
    #[must_use]
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            analyzer: StaticAnalyzer::default(),
            fetcher: Arc::new(UnavailableFetcher),
        }
    }

    /// Use a custom sample fetcher
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SampleFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Use a custom analyzer
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: StaticAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Get options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// Analyse, synthesize, merge and persist one notebook
    #[tracing::instrument(skip(self, store, path, responder), fields(path = %path.display()))]
    pub async fn infer_notebook(
        &self,
        store: &NotebookStore,
        path: &Path,
        responder: &mut dyn Responder,
    ) -> SynthResult<InferOutcome> {
        let doc = store.load(path).await?;
        let report = self.analyzer.analyze(&doc)?;
        for warning in &report.warnings {
            tracing::warn!(%warning, "analysis warning");
        }

        let synthesis = self.synthesize(&report, responder).await?;
        let merge = self.merge(doc.metadata(), synthesis.cases.clone());
        tracing::info!(
            added = merge.added.len(),
            replaced = merge.replaced.len(),
            skipped = merge.skipped.len(),
            "cases merged"
        );
        let persisted = self.persist(store, path, &doc, merge.block.clone()).await?;

        Ok(InferOutcome {
            warnings: report.warnings,
            synthesis,
            merge,
            persisted,
        })
    }

    /// Propose one case per detection function
    pub async fn synthesize(
        &self,
        report: &AnalysisReport,
        responder: &mut dyn Responder,
    ) -> SynthResult<Synthesis> {
        if self.options.noninteractive {
            self.synthesize_with(report, &mut DefaultPolicy).await
        } else {
            self.synthesize_with(report, responder).await
        }
    }

    async fn synthesize_with(
        &self,
        report: &AnalysisReport,
        responder: &mut dyn Responder,
    ) -> SynthResult<Synthesis> {
        let mut synthesis = Synthesis::default();
        for function in &report.functions {
            let case = self.synthesize_case(function, responder, &mut synthesis).await?;
            tracing::debug!(case = %case.name, tables = case.mocked_inputs.len(), "case proposed");
            synthesis.cases.push(case);
        }
        Ok(synthesis)
    }

    async fn synthesize_case(
        &self,
        function: &DetectionFunction,
        responder: &mut dyn Responder,
        synthesis: &mut Synthesis,
    ) -> SynthResult<TestCase> {
        let mut case = TestCase::new(&function.name);

        for parameter in function
            .parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Regular)
        {
            let candidates = function.candidates(&parameter.name);
            let policy = if parameter.default.literal().is_some() {
                Resolution::DeclaredDefault
            } else {
                Resolution::FirstCallSite
            };
            let proposed = candidates
                .first()
                .cloned()
                .unwrap_or_else(|| Value::String(PLACEHOLDER.to_string()));

            let prompt = Prompt::InputValue {
                function: function.name.clone(),
                parameter: parameter.name.clone(),
                proposed: proposed.clone(),
                candidates: candidates.clone(),
            };
            let value = responder.respond(&prompt)?.into_value(&prompt, &proposed)?;

            if candidates.len() > 1 {
                let resolution = if value == proposed { policy } else { Resolution::Operator };
                tracing::info!(
                    function = %function.name,
                    parameter = %parameter.name,
                    ?resolution,
                    "ambiguous parameter resolved"
                );
                synthesis.ambiguities.push(InferenceAmbiguity {
                    function: function.name.clone(),
                    parameter: parameter.name.clone(),
                    candidates,
                    chosen: value.clone(),
                    resolution,
                });
            }
            case.input.insert(parameter.name.clone(), value);
        }

        let columns = function.required_columns();
        for table in &function.tables {
            let input = self
                .mock_table(function, table, &columns, responder, synthesis)
                .await?;
            case.mocked_inputs.push(input);
        }
        case.required_columns = columns;

        let proposed = Expectation::count(self.options.default_count.clone());
        let prompt = Prompt::Expectation {
            function: function.name.clone(),
            proposed: proposed.clone(),
        };
        case.expect = responder.respond(&prompt)?.into_expectation(&prompt, &proposed)?;

        Ok(case)
    }

    async fn mock_table(
        &self,
        function: &DetectionFunction,
        table: &TableReference,
        columns: &[String],
        responder: &mut dyn Responder,
        synthesis: &mut Synthesis,
    ) -> SynthResult<MockedInput> {
        let prompt = Prompt::SampleSource {
            function: function.name.clone(),
            table: table.table.clone(),
        };
        let source = responder
            .respond(&prompt)?
            .into_text(&prompt)?
            .unwrap_or_else(|| table.table.clone());

        let proposed = default_sample_path(&table.table, self.options.sample_format);
        let prompt = Prompt::SamplePath {
            function: function.name.clone(),
            table: table.table.clone(),
            proposed: proposed.clone(),
        };
        let path = responder
            .respond(&prompt)?
            .into_text(&prompt)?
            .unwrap_or(proposed);

        let status = if self.options.no_sample || self.options.dry_run {
            SampleStatus::Skipped
        } else {
            let prompt = Prompt::SampleFilter {
                function: function.name.clone(),
                table: source.clone(),
            };
            let filter = responder.respond(&prompt)?.into_text(&prompt)?;
            self.obtain_sample(&source, &path, filter, columns).await?
        };

        synthesis.samples.push(SampleOutcome {
            function: function.name.clone(),
            table: table.table.clone(),
            path: path.clone(),
            status,
        });
        Ok(MockedInput::new(table.table.clone(), path))
    }

    async fn obtain_sample(
        &self,
        source: &str,
        path: &str,
        filter: Option<String>,
        columns: &[String],
    ) -> SynthResult<SampleStatus> {
        let destination = self.options.sample_root.join(path);
        if !self.options.overwrite && tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            return Ok(SampleStatus::Existing);
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SynthError::io_error(parent, e))?;
        }

        let format = format_of(&destination).unwrap_or(self.options.sample_format);
        let request = SampleRequest {
            table: source.to_string(),
            filter,
            limit: self.options.sample_limit,
            destination: destination.clone(),
            format,
        };

        match self.fetcher.fetch(&request).await {
            Ok(rows) => {
                tracing::info!(table = source, rows, path = %destination.display(), "sample saved");
                Ok(SampleStatus::Fetched { rows })
            }
            Err(err) if self.options.fallback_empty => match format.empty_stub(columns) {
                Some(stub) => {
                    tracing::warn!(table = source, error = %err, "writing empty sample stub");
                    tokio::fs::write(&destination, stub)
                        .await
                        .map_err(|e| SynthError::io_error(&destination, e))?;
                    Ok(SampleStatus::Stubbed)
                }
                None => Ok(SampleStatus::Unavailable {
                    reason: format!("{err}; no stub for {} samples", format.extension()),
                }),
            },
            Err(err) => {
                tracing::warn!(table = source, error = %err, "could not fetch sample");
                Ok(SampleStatus::Unavailable {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Union candidates with persisted cases by name
    #[must_use]
    pub fn merge(&self, existing: &MetadataBlock, candidates: Vec<TestCase>) -> MergeOutcome {
        merge_cases(existing, candidates, self.options.overwrite)
    }

    /// Write the block into the notebook (or render it for a dry run)
    pub async fn persist(
        &self,
        store: &NotebookStore,
        path: &Path,
        doc: &NotebookDocument,
        mut block: MetadataBlock,
    ) -> SynthResult<PersistOutcome> {
        let uuid = block.ensure_uuid();
        if self.options.dry_run {
            let yaml = block.render_yaml().map_err(SerializeError::from)?;
            return Ok(PersistOutcome::DryRun { yaml });
        }

        let updated = doc.with_metadata(&block)?;
        let document = store.save(path, updated).await?;
        tracing::info!(%uuid, cases = block.tests.len(), "metadata persisted");
        Ok(PersistOutcome::Written { document, uuid })
    }
}

/// Union by name; `overwrite` replaces collisions, otherwise the persisted case wins
#[must_use]
pub fn merge_cases(existing: &MetadataBlock, candidates: Vec<TestCase>, overwrite: bool) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        block: existing.clone(),
        ..MergeOutcome::default()
    };
    for case in candidates {
        match outcome.block.tests.iter().position(|t| t.name == case.name) {
            Some(idx) if overwrite => {
                outcome.replaced.push(case.name.clone());
                outcome.block.tests[idx] = case;
            }
            Some(_) => outcome.skipped.push(case.name),
            None => {
                outcome.added.push(case.name.clone());
                outcome.block.tests.push(case);
            }
        }
    }
    outcome
}

fn format_of(path: &Path) -> Option<SampleFormat> {
    match path.extension()?.to_str()? {
        "json" | "jsonl" => Some(SampleFormat::Json),
        "csv" => Some(SampleFormat::Csv),
        "parquet" => Some(SampleFormat::Parquet),
        _ => None,
    }
}
