//! Static analyzer
//!
//! Two passes over the code cells of a document:
//! 1. decorated functions, their table accesses and column hints;
//! 2. literal keyword call sites of the functions found in pass 1.

use crate::error::{AnalysisError, AnalysisWarning};
use crate::idiom::{walk, CallArgument, CallMatch, CallRole, FunctionMatch, Idiom, LocationMapper, SyntaxVisitor};
use crate::model::{AnalysisReport, CallSite, DetectionFunction, TableReference};
use crate::syntax::{blank_magics, first_error, parse_python};
use dscc_notebook::NotebookDocument;
use serde::{Deserialize, Serialize};
use tree_sitter::Tree;

/// Analyzer configuration (`[analysis]` in `dscc.toml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Decorator names marking a function test-eligible
    pub markers: Vec<String>,
    /// Callees reading a table by name
    pub table_idioms: Vec<String>,
    /// Callees referencing a column by name
    pub column_idioms: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            markers: vec!["detect".to_string(), "detection".to_string()],
            table_idioms: vec!["spark.table".to_string(), "spark.read.table".to_string()],
            column_idioms: vec![
                "col".to_string(),
                "F.col".to_string(),
                "functions.col".to_string(),
                "pyspark.sql.functions.col".to_string(),
            ],
        }
    }
}

impl AnalyzerConfig {
    /// Replace decorator markers
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Add a table-access callee
    #[must_use]
    pub fn with_table_idiom(mut self, callee: impl Into<String>) -> Self {
        self.table_idioms.push(callee.into());
        self
    }

    /// Add a column-reference callee
    #[must_use]
    pub fn with_column_idiom(mut self, callee: impl Into<String>) -> Self {
        self.column_idioms.push(callee.into());
        self
    }

    fn definition_idioms(&self) -> Vec<Idiom> {
        vec![
            Idiom::FunctionDefinition {
                markers: self.markers.clone(),
            },
            Idiom::LiteralCall {
                role: CallRole::TableAccess,
                callees: self.table_idioms.clone(),
            },
            Idiom::LiteralCall {
                role: CallRole::ColumnReference,
                callees: self.column_idioms.clone(),
            },
        ]
    }
}

/// One parsed code cell
struct CodeUnit {
    at: LocationMapper,
    text: String,
    tree: Tree,
}

/// Discovers detection functions in a document
#[derive(Debug, Clone, Default)]
pub struct StaticAnalyzer {
    config: AnalyzerConfig,
}

impl StaticAnalyzer {
    /// Create analyzer with configuration
    #[inline]
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyse every python code cell of a document
    #[tracing::instrument(skip_all)]
    pub fn analyze(&self, doc: &NotebookDocument) -> Result<AnalysisReport, AnalysisError> {
        let units = doc
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_python())
            .map(|(idx, c)| {
                let text = blank_magics(c.source());
                let tree = parse_python(&text, idx)?;
                Ok(CodeUnit {
                    at: LocationMapper::new(idx, c.start_line()),
                    text,
                    tree,
                })
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(self.analyze_units(&units))
    }

    /// Analyse a standalone module as a single code cell
    pub fn analyze_module(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        let text = blank_magics(text);
        let tree = parse_python(&text, 0)?;
        Ok(self.analyze_units(&[CodeUnit {
            at: LocationMapper::new(0, 1),
            text,
            tree,
        }]))
    }

    fn analyze_units(&self, units: &[CodeUnit]) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        let idioms = self.config.definition_idioms();

        for unit in units {
            let root = unit.tree.root_node();
            if let Some(error) = first_error(root) {
                report.warnings.push(AnalysisWarning::SyntaxError {
                    location: unit.at.locate(error),
                });
            }
            let mut collector = DefinitionCollector::new(&mut report);
            walk(root, unit.text.as_bytes(), &idioms, unit.at, &mut collector);
        }

        if !report.functions.is_empty() {
            let invocation = [Idiom::LiteralCall {
                role: CallRole::Invocation,
                callees: report.functions.iter().map(|f| f.name.clone()).collect(),
            }];
            let mut collector = CallSiteCollector {
                functions: &mut report.functions,
            };
            for unit in units {
                walk(
                    unit.tree.root_node(),
                    unit.text.as_bytes(),
                    &invocation,
                    unit.at,
                    &mut collector,
                );
            }
        }

        tracing::debug!(
            functions = report.functions.len(),
            warnings = report.warnings.len(),
            "analysis complete"
        );
        report
    }
}

struct DefinitionCollector<'a> {
    report: &'a mut AnalysisReport,
    current: Option<usize>,
    last_table: Option<usize>,
}

impl<'a> DefinitionCollector<'a> {
    fn new(report: &'a mut AnalysisReport) -> Self {
        Self {
            report,
            current: None,
            last_table: None,
        }
    }

    fn current_name(&self) -> String {
        self.current
            .and_then(|i| self.report.functions.get(i))
            .map(|f| f.name.clone())
            .unwrap_or_default()
    }
}

impl SyntaxVisitor for DefinitionCollector<'_> {
    fn enter_function(&mut self, function: &FunctionMatch) {
        for (parameter, expression, location) in &function.non_literal_defaults {
            self.report.warnings.push(AnalysisWarning::NonLiteralDefault {
                function: function.name.clone(),
                parameter: parameter.clone(),
                expression: expression.clone(),
                location: *location,
            });
        }
        self.report.functions.push(DetectionFunction {
            name: function.name.clone(),
            parameters: function.parameters.clone(),
            tables: Vec::new(),
            call_sites: Vec::new(),
            location: function.location,
        });
        self.current = Some(self.report.functions.len() - 1);
        self.last_table = None;
    }

    fn exit_function(&mut self) {
        self.current = None;
        self.last_table = None;
    }

    fn visit_call(&mut self, call: &CallMatch) {
        let Some(fi) = self.current else {
            return;
        };
        match (call.role, &call.first_argument) {
            (CallRole::TableAccess, CallArgument::Text(table)) => {
                let tables = &mut self.report.functions[fi].tables;
                let idx = tables.iter().position(|t| t.table == *table).unwrap_or_else(|| {
                    tables.push(TableReference::new(table.clone(), call.location));
                    tables.len() - 1
                });
                self.last_table = Some(idx);
            }
            (CallRole::TableAccess, other) => {
                let expression = match other {
                    CallArgument::Expression(e) => e.clone(),
                    _ => String::new(),
                };
                let function = self.current_name();
                self.report.warnings.push(AnalysisWarning::UnresolvedTable {
                    function,
                    expression,
                    location: call.location,
                });
            }
            (CallRole::ColumnReference, CallArgument::Text(column)) => match self.last_table {
                Some(ti) => self.report.functions[fi].tables[ti].add_column(column.clone()),
                None => {
                    let function = self.current_name();
                    self.report.warnings.push(AnalysisWarning::UnattachedColumn {
                        function,
                        column: column.clone(),
                        location: call.location,
                    });
                }
            },
            _ => {}
        }
    }
}

struct CallSiteCollector<'a> {
    functions: &'a mut Vec<DetectionFunction>,
}

impl SyntaxVisitor for CallSiteCollector<'_> {
    fn enter_function(&mut self, _function: &FunctionMatch) {}

    fn exit_function(&mut self) {}

    fn visit_call(&mut self, call: &CallMatch) {
        if call.literal_keywords.is_empty() {
            return;
        }
        for function in self.functions.iter_mut().filter(|f| f.name == call.callee) {
            function.call_sites.push(CallSite {
                arguments: call.literal_keywords.clone(),
                location: call.location,
            });
        }
    }
}
