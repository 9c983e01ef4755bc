//! Prompt/answer protocol
//!
//! Synthesis asks a `Responder` a sequence of typed prompts. A human at a
//! terminal, a scripted queue and the noninteractive default policy all
//! satisfy the same interface.

use crate::error::SynthError;
use dscc_notebook::Expectation;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// A question asked during synthesis
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// Value for one function parameter
    InputValue {
        /// Function name
        function: String,
        /// Parameter name
        parameter: String,
        /// Proposed value
        proposed: Value,
        /// Distinct literal candidates found by analysis
        candidates: Vec<Value>,
    },
    /// Table to sample data from
    SampleSource {
        /// Function name
        function: String,
        /// Referenced table
        table: String,
    },
    /// Where the sample file lives
    SamplePath {
        /// Function name
        function: String,
        /// Referenced table
        table: String,
        /// Proposed path
        proposed: String,
    },
    /// Optional filter applied when fetching the sample
    SampleFilter {
        /// Function name
        function: String,
        /// Table being sampled
        table: String,
    },
    /// Expectations of the case
    Expectation {
        /// Function name
        function: String,
        /// Proposed expectation
        proposed: Expectation,
    },
}

impl Prompt {
    /// Short kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputValue { .. } => "input_value",
            Self::SampleSource { .. } => "sample_source",
            Self::SamplePath { .. } => "sample_path",
            Self::SampleFilter { .. } => "sample_filter",
            Self::Expectation { .. } => "expectation",
        }
    }
}

/// A response to a prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Keep the proposed value
    Accept,
    /// Typed value
    Value(Value),
    /// Free text (coerced against the proposed value)
    Text(String),
    /// Full expectation
    Expectation(Expectation),
}

impl Answer {
    /// Short kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Value(_) => "value",
            Self::Text(_) => "text",
            Self::Expectation(_) => "expectation",
        }
    }

    fn mismatch(&self, prompt: &Prompt) -> SynthError {
        SynthError::UnexpectedAnswer {
            prompt: prompt.kind().to_string(),
            answer: self.kind().to_string(),
        }
    }

    /// Resolve an input-value answer against the proposed value
    pub fn into_value(self, prompt: &Prompt, proposed: &Value) -> Result<Value, SynthError> {
        match self {
            Self::Accept => Ok(proposed.clone()),
            Self::Value(v) => Ok(v),
            Self::Text(text) => Ok(coerce(&text, proposed)),
            Self::Expectation(_) => Err(self.mismatch(prompt)),
        }
    }

    /// Resolve a text answer; `None` when accepted
    pub fn into_text(self, prompt: &Prompt) -> Result<Option<String>, SynthError> {
        match self {
            Self::Accept => Ok(None),
            Self::Text(t) if t.trim().is_empty() => Ok(None),
            Self::Text(t) => Ok(Some(t.trim().to_string())),
            Self::Value(Value::String(s)) => Ok(Some(s)),
            other => Err(other.mismatch(prompt)),
        }
    }

    /// Resolve an expectation answer
    pub fn into_expectation(
        self,
        prompt: &Prompt,
        proposed: &Expectation,
    ) -> Result<Expectation, SynthError> {
        match self {
            Self::Accept => Ok(proposed.clone()),
            Self::Expectation(e) => Ok(e),
            Self::Text(count) if !count.trim().is_empty() => Ok(Expectation {
                count: Some(count.trim().to_string()),
                ..proposed.clone()
            }),
            Self::Text(_) => Ok(proposed.clone()),
            Self::Value(_) => Err(self.mismatch(prompt)),
        }
    }
}

/// Interpret operator text using the type of the proposed value
fn coerce(text: &str, proposed: &Value) -> Value {
    let text = text.trim();
    match proposed {
        Value::Number(_) => text
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Value::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        Value::String(s) if s == crate::PLACEHOLDER => serde_json::from_str::<Value>(text)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

/// Anything that can answer prompts
pub trait Responder: Send {
    /// Answer one prompt
    fn respond(&mut self, prompt: &Prompt) -> Result<Answer, SynthError>;
}

/// Noninteractive policy: accept every proposal
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl Responder for DefaultPolicy {
    fn respond(&mut self, _prompt: &Prompt) -> Result<Answer, SynthError> {
        Ok(Answer::Accept)
    }
}

/// Replays queued answers, accepting once the queue is empty
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponder {
    answers: VecDeque<Answer>,
    asked: Vec<Prompt>,
}

impl ScriptedResponder {
    /// Create responder with queued answers
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Prompts received so far
    #[must_use]
    pub fn asked(&self) -> &[Prompt] {
        &self.asked
    }
}

impl Responder for ScriptedResponder {
    fn respond(&mut self, prompt: &Prompt) -> Result<Answer, SynthError> {
        self.asked.push(prompt.clone());
        Ok(self.answers.pop_front().unwrap_or(Answer::Accept))
    }
}

/// Synchronous exchange with a human operator
#[derive(Debug)]
pub struct TerminalResponder<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalResponder<R, W> {
    /// Create responder over a reader and writer
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<String, SynthError> {
        write!(self.output, "{question}").map_err(SynthError::Prompt)?;
        self.output.flush().map_err(SynthError::Prompt)?;
        let mut line = String::new();
        self.input.read_line(&mut line).map_err(SynthError::Prompt)?;
        Ok(line.trim().to_string())
    }

    fn say(&mut self, text: &str) -> Result<(), SynthError> {
        writeln!(self.output, "{text}").map_err(SynthError::Prompt)
    }
}

impl<R: BufRead + Send, W: Write + Send> Responder for TerminalResponder<R, W> {
    fn respond(&mut self, prompt: &Prompt) -> Result<Answer, SynthError> {
        let text_or_accept = |line: String| {
            if line.is_empty() {
                Answer::Accept
            } else {
                Answer::Text(line)
            }
        };

        match prompt {
            Prompt::InputValue {
                function,
                parameter,
                proposed,
                candidates,
            } => {
                if candidates.len() > 1 {
                    let listed: Vec<String> = candidates.iter().map(Value::to_string).collect();
                    self.say(&format!("{function}.{parameter} candidates: {}", listed.join(", ")))?;
                }
                let line = self.ask(&format!("{function}.{parameter} [{proposed}]: "))?;
                Ok(text_or_accept(line))
            }
            Prompt::SampleSource { function, table } => {
                self.say(&format!("'{function}' reads table '{table}'"))?;
                let line = self.ask(&format!("Table to sample from [{table}]: "))?;
                Ok(text_or_accept(line))
            }
            Prompt::SamplePath { proposed, .. } => {
                let line = self.ask(&format!("Sample file [{proposed}]: "))?;
                Ok(text_or_accept(line))
            }
            Prompt::SampleFilter { table, .. } => {
                let line = self.ask(&format!("Filter for '{table}' (optional): "))?;
                Ok(text_or_accept(line))
            }
            Prompt::Expectation { function, proposed } => {
                self.say(&format!("Expectations for '{function}'"))?;
                let default_count = proposed.count.clone().unwrap_or_default();
                let count = self.ask(&format!("Expected row count [{default_count}]: "))?;
                let data = self.ask("Path to expected rows (optional): ")?;
                Ok(Answer::Expectation(Expectation {
                    count: if count.is_empty() { proposed.count.clone() } else { Some(count) },
                    schema: proposed.schema.clone(),
                    data: if data.is_empty() { proposed.data.clone() } else { Some(data) },
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input_prompt(proposed: Value) -> Prompt {
        Prompt::InputValue {
            function: "f".into(),
            parameter: "x".into(),
            proposed,
            candidates: vec![],
        }
    }

    #[test]
    fn text_coerced_to_proposed_type() {
        let p = input_prompt(json!(5));
        assert_eq!(Answer::Text("7".into()).into_value(&p, &json!(5)).unwrap(), json!(7));
        assert_eq!(
            Answer::Text("true".into()).into_value(&p, &json!(false)).unwrap(),
            json!(true)
        );
        assert_eq!(
            Answer::Text("12".into()).into_value(&p, &json!(crate::PLACEHOLDER)).unwrap(),
            json!(12)
        );
        assert_eq!(
            Answer::Text("12".into()).into_value(&p, &json!("a")).unwrap(),
            json!("12")
        );
    }

    #[test]
    fn mismatched_answer_is_error() {
        let p = input_prompt(json!("a"));
        let err = Answer::Expectation(Expectation::default())
            .into_value(&p, &json!("a"))
            .unwrap_err();
        assert!(matches!(err, SynthError::UnexpectedAnswer { .. }));
    }

    #[test]
    fn scripted_records_prompts() {
        let mut responder = ScriptedResponder::new([Answer::Text("b".into())]);
        let p = input_prompt(json!("a"));
        assert_eq!(responder.respond(&p).unwrap(), Answer::Text("b".into()));
        assert_eq!(responder.respond(&p).unwrap(), Answer::Accept);
        assert_eq!(responder.asked().len(), 2);
    }

    #[test]
    fn terminal_exchange() {
        let input = b"\n>= 3\ntests/expected.json\n".to_vec();
        let mut output = Vec::new();
        let mut responder = TerminalResponder::new(&input[..], &mut output);

        let first = responder.respond(&input_prompt(json!("a"))).unwrap();
        assert_eq!(first, Answer::Accept);

        let second = responder
            .respond(&Prompt::Expectation {
                function: "f".into(),
                proposed: Expectation::count("> 0"),
            })
            .unwrap();
        assert_eq!(
            second,
            Answer::Expectation(Expectation {
                count: Some(">= 3".into()),
                schema: None,
                data: Some("tests/expected.json".into()),
            })
        );

        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("f.x [\"a\"]: "));
        assert!(transcript.contains("Expected row count [> 0]: "));
    }
}
