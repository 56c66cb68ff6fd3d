//! Tool-using coding agent.
//!
//! The agent runs a Thought / Action / Observation loop against the oracle.
//! Its single tool, `dataset_eval`, inspects private copies of the template
//! and input datasets and evaluates expressions over sampled input rows. Only
//! the last few exchanges are replayed to the oracle on each turn.

use std::{collections::VecDeque, sync::OnceLock};

use anyhow::{Result, anyhow};
use evalexpr::HashMapContext;
use itertools::Itertools;
use log::{debug, info};
use regex::Regex;

use crate::{
    data::evalexpr_to_cell,
    dataset::Dataset,
    derive::{DerivedColumn, rewrite_references},
    describe,
    error::{RemapError, RemapResult},
    expr,
    oracle::Oracle,
    runner::typed_rows,
};

pub const TOOL_NAME: &str = "dataset_eval";
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

const STOP_SEQUENCES: &[&str] = &["\nObservation:", "\n\tObservation:"];

const AGENT_PREFIX: &str = "Answer the following task as best you can. You have access to the following tools:";

const AGENT_FORMAT: &str = "Use the following format:

Thought: you should always think about what to do
Action: the action to take, should be one of [dataset_eval]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original task

Begin!";

const TOOL_DESCRIPTION: &str = "Inspect or evaluate against the datasets `template_df` and `input_df`. \
Accepts `input_df.head()`, `template_df.head()`, `input_df.dtypes`, `template_df.dtypes`, \
`input_df.columns`, `template_df.columns`, an assignment such as `input_df['col'] = <expression>` \
which adds the column to input_df, or a bare expression evaluated on the first rows of input_df.";

/// Read and execute access to copies of the two datasets.
pub struct DatasetTool {
    template: Dataset,
    input: Dataset,
    sample_rows: usize,
    base: HashMapContext,
}

impl DatasetTool {
    /// Clones both datasets; nothing the agent runs reaches the caller's copies.
    pub fn new(template: &Dataset, input: &Dataset, sample_rows: usize) -> RemapResult<Self> {
        let base = expr::base_context().map_err(|err| RemapError::Execution(format!("{err:#}")))?;
        Ok(DatasetTool {
            template: template.clone(),
            input: input.clone(),
            sample_rows: sample_rows.max(1),
            base,
        })
    }

    pub fn input(&self) -> &Dataset {
        &self.input
    }

    /// Runs a query; failures are returned as observation text.
    pub fn invoke(&mut self, query: &str) -> String {
        let lines = query
            .lines()
            .map(clean_query)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return "Empty action input.".to_string();
        }
        lines
            .into_iter()
            .map(|line| match self.run_query(&line) {
                Ok(output) => output,
                Err(err) => format!("{err:#}"),
            })
            .join("\n")
    }

    fn run_query(&mut self, query: &str) -> Result<String> {
        let compact = query.replace(char::is_whitespace, "");
        match compact.as_str() {
            "input_df.head()" | "print(input_df.head())" => {
                return Ok(describe::describe_rows(&self.input, self.sample_rows));
            }
            "template_df.head()" | "print(template_df.head())" => {
                return Ok(describe::describe_rows(&self.template, self.sample_rows));
            }
            "input_df.dtypes" | "print(input_df.dtypes)" => {
                return Ok(describe::describe_types(&self.input));
            }
            "template_df.dtypes" | "print(template_df.dtypes)" => {
                return Ok(describe::describe_types(&self.template));
            }
            "input_df.columns" | "print(input_df.columns)" => {
                return Ok(format!("{:?}", self.input.headers));
            }
            "template_df.columns" | "print(template_df.columns)" => {
                return Ok(format!("{:?}", self.template.headers));
            }
            _ => {}
        }
        if assignment_pattern().is_match(query) {
            let column = DerivedColumn::parse(query)?;
            return self.assign(&column);
        }
        self.evaluate_sample(&rewrite_references(query))
    }

    fn assign(&mut self, column: &DerivedColumn) -> Result<String> {
        let typed = typed_rows(&self.input);
        let values = self
            .input
            .rows
            .iter()
            .zip(&typed)
            .enumerate()
            .map(|(idx, (raw, typed))| {
                column.evaluate(&self.base, &self.input.headers, raw, typed, idx + 1)
            })
            .collect::<Result<Vec<_>>>()?;
        let preview = values.iter().take(self.sample_rows).join(", ");
        self.input.with_column(&column.name, values)?;
        Ok(format!("input_df['{}'] = [{}]", column.name, preview))
    }

    fn evaluate_sample(&self, expression: &str) -> Result<String> {
        let sample = Dataset::new(
            self.input.name.clone(),
            self.input.headers.clone(),
            self.input.head(self.sample_rows).to_vec(),
        );
        if sample.row_count() == 0 {
            return Err(anyhow!("input_df has no rows to evaluate against"));
        }
        let typed = typed_rows(&sample);
        let mut lines = Vec::with_capacity(sample.row_count());
        for (idx, (raw, typed)) in sample.rows.iter().zip(&typed).enumerate() {
            let context = expr::row_context(&self.base, &sample.headers, raw, typed, idx + 1)?;
            let value = expr::evaluate(expression, &context)?;
            lines.push(format!("{idx}: {}", evalexpr_to_cell(value)));
        }
        Ok(lines.join("\n"))
    }
}

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(?:input_df\[\s*['"][^'"]+['"]\s*\]|[A-Za-z_][A-Za-z0-9_]*)\s*=[^=]"#)
            .expect("static tool assignment pattern")
    })
}

fn clean_query(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.starts_with("```") {
        return String::new();
    }
    trimmed.trim_matches('`').trim().to_string()
}

/// What one oracle reply asks the agent to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action { tool: String, input: String },
    Finish(String),
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:(.*?)\n\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
            .expect("static action pattern")
    })
}

pub fn parse_reply(reply: &str) -> Result<AgentStep, String> {
    if let Some(pos) = reply.find(FINAL_ANSWER_MARKER) {
        let answer = reply[pos + FINAL_ANSWER_MARKER.len()..].trim();
        if answer.is_empty() {
            return Err("Invalid Format: 'Final Answer:' is empty".to_string());
        }
        return Ok(AgentStep::Finish(answer.to_string()));
    }
    let caps = action_pattern().captures(reply).ok_or_else(|| {
        if reply.contains("Action") {
            "Invalid Format: Missing 'Action Input:' after 'Action:'".to_string()
        } else {
            "Invalid Format: Missing 'Action:' after 'Thought:'".to_string()
        }
    })?;
    let tool = caps
        .get(1)
        .map(|m| m.as_str().trim().trim_matches('`'))
        .unwrap_or_default();
    let input = caps
        .get(2)
        .map(|m| m.as_str().trim().trim_matches('"'))
        .unwrap_or_default();
    Ok(AgentStep::Action {
        tool: tool.to_string(),
        input: input.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub reply: String,
    pub observation: String,
}

/// Bounded memory: only the newest `capacity` exchanges are kept.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationWindow {
    pub fn new(capacity: usize) -> Self {
        ConversationWindow {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, reply: impl Into<String>, observation: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.exchanges.len() == self.capacity {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            reply: reply.into(),
            observation: observation.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for exchange in &self.exchanges {
            out.push_str("Thought: ");
            out.push_str(exchange.reply.trim());
            out.push_str("\nObservation: ");
            out.push_str(exchange.observation.trim_end());
            out.push('\n');
        }
        out
    }
}

pub struct CodingAgent<'o> {
    oracle: &'o dyn Oracle,
    memory_window: usize,
    max_iterations: usize,
}

impl<'o> CodingAgent<'o> {
    pub fn new(oracle: &'o dyn Oracle, memory_window: usize, max_iterations: usize) -> Self {
        CodingAgent {
            oracle,
            memory_window,
            max_iterations: max_iterations.max(1),
        }
    }

    fn prompt(&self, task: &str, window: &ConversationWindow) -> String {
        format!(
            "{AGENT_PREFIX}\n\n{TOOL_NAME}: {TOOL_DESCRIPTION}\n\n{AGENT_FORMAT}\n\nTask: {task}\n{}Thought:",
            window.render()
        )
    }

    /// Loops until the oracle gives a final answer, which is returned
    /// verbatim with a trailing newline.
    pub fn run(&self, tool: &mut DatasetTool, task: &str) -> RemapResult<String> {
        let mut window = ConversationWindow::new(self.memory_window);
        for iteration in 1..=self.max_iterations {
            let prompt = self.prompt(task, &window);
            let reply = self.oracle.complete_until(&prompt, STOP_SEQUENCES)?;
            debug!("Agent step {iteration} reply:\n{reply}");
            let observation = match parse_reply(&reply) {
                Ok(AgentStep::Finish(answer)) => {
                    info!("Coding agent finished after {iteration} step(s)");
                    return Ok(format!("{answer}\n"));
                }
                Ok(AgentStep::Action { tool: name, input }) if name == TOOL_NAME => {
                    tool.invoke(&input)
                }
                Ok(AgentStep::Action { tool: name, .. }) => {
                    format!("{name} is not a valid tool, try one of [{TOOL_NAME}].")
                }
                Err(reason) => reason,
            };
            debug!("Agent step {iteration} observation:\n{observation}");
            window.push(reply, observation);
        }
        Err(RemapError::Agent {
            iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasets() -> (Dataset, Dataset) {
        let template = Dataset::from_csv_str("template.csv", "id,amount\n1,2.5\n").unwrap();
        let input = Dataset::from_csv_str("input.csv", "uid,amt,ts\n7,1.5,2024-01-01\n8,3,2024-01-02\n")
            .unwrap();
        (template, input)
    }

    #[test]
    fn parses_actions_and_final_answers() {
        let step = parse_reply(" inspect\nAction: dataset_eval\nAction Input: input_df.head()").unwrap();
        assert_eq!(
            step,
            AgentStep::Action {
                tool: "dataset_eval".to_string(),
                input: "input_df.head()".to_string()
            }
        );
        let done = parse_reply(" done\nFinal Answer: ```\ninput_df['id'] = input_df['uid']\n```").unwrap();
        assert_eq!(
            done,
            AgentStep::Finish("```\ninput_df['id'] = input_df['uid']\n```".to_string())
        );
        assert!(parse_reply("I am not sure").is_err());
    }

    #[test]
    fn window_drops_oldest_exchange() {
        let mut window = ConversationWindow::new(2);
        window.push("a", "1");
        window.push("b", "2");
        window.push("c", "3");
        assert_eq!(window.len(), 2);
        let replies = window.exchanges().map(|e| e.reply.as_str()).collect::<Vec<_>>();
        assert_eq!(replies, vec!["b", "c"]);
        assert!(!window.render().contains("Thought: a"));
    }

    #[test]
    fn tool_works_on_private_copies() {
        let (template, input) = datasets();
        let mut tool = DatasetTool::new(&template, &input, 5).unwrap();
        let observation = tool.invoke("input_df['double'] = input_df['amt'] * 2");
        assert!(observation.contains("double"), "{observation}");
        assert!(tool.input().has_column("double"));
        assert!(!input.has_column("double"));
    }

    #[test]
    fn tool_reports_columns_and_expression_values() {
        let (template, input) = datasets();
        let mut tool = DatasetTool::new(&template, &input, 5).unwrap();
        assert_eq!(tool.invoke("template_df.columns"), r#"["id", "amount"]"#);
        let values = tool.invoke("`uppercase(to_string(input_df['uid']))`");
        assert_eq!(values, "0: 7\n1: 8");
        assert!(tool.invoke("unknown_function(uid)").contains("unknown_function"));
    }
}
