//! Per-column code synthesis through the coding agent.

use log::info;

use crate::{
    agent::{CodingAgent, DatasetTool},
    config::RemapConfig,
    dataset::Dataset,
    describe,
    error::RemapResult,
    oracle::Oracle,
};

pub const MAP_FUNCTION_GENERATOR_PROMPT: &str = "
Check the column types and format of template_df.
Generate the mapping code to generate a new column in input_df by mapping the column {input_col} in input_df. The result column name and data type needs to match the name and data type of column template_df[`{template_col}`].

This is the result of `print(template_df.head())`:
{template_df}

This is the result of `print(template_df.dtypes)`:
{template_df_type}

This is the result of `print(input_df.head())`:
{input_df}

Mapping code is one assignment per line, `input_df['new column'] = <expression>`.
Inside an expression `input_df['col']` reads the current row's value of `col`.
Numeric columns read as numbers; every other value reads as its original text.
Operators: + - * / % ^ == != < > <= >= && || !, string literals in double quotes.
Functions: to_string, to_int, to_float, coalesce, trim, lowercase, uppercase, snake_case,
camel_case, pascal_case, substring, regex_replace, parse_date, date_add, date_diff_days,
date_format, datetime_format, datetime_to_date.

Give the solution as the final answer, like this:
```
input_df['{template_col}'] = <expression>
```

";

pub fn build_prompt(
    template: &Dataset,
    input: &Dataset,
    template_column: &str,
    input_column: &str,
    sample_rows: usize,
) -> String {
    MAP_FUNCTION_GENERATOR_PROMPT
        .replace("{template_df}", &describe::describe_rows(template, sample_rows))
        .replace("{template_df_type}", &describe::describe_types(template))
        .replace("{input_df}", &describe::describe_rows(input, sample_rows))
        .replace("{input_col}", input_column)
        .replace("{template_col}", template_column)
}

pub struct Synthesizer<'o> {
    agent: CodingAgent<'o>,
    sample_rows: usize,
}

impl<'o> Synthesizer<'o> {
    pub fn new(oracle: &'o dyn Oracle, config: &RemapConfig) -> Self {
        Synthesizer {
            agent: CodingAgent::new(oracle, config.memory_window, config.max_agent_iterations),
            sample_rows: config.sample_rows,
        }
    }

    /// Returns the agent's fragment for one column pair, unvalidated.
    pub fn synthesize(
        &self,
        template: &Dataset,
        input: &Dataset,
        template_column: &str,
        input_column: &str,
    ) -> RemapResult<String> {
        info!("Generating map code for '{template_column}' from '{input_column}'");
        let prompt = build_prompt(template, input, template_column, input_column, self.sample_rows);
        let mut tool = DatasetTool::new(template, input, self.sample_rows)?;
        self.agent.run(&mut tool, &prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_both_columns_and_embeds_samples() {
        let template = Dataset::from_csv_str("t.csv", "id,amount\n1,2.5\n").unwrap();
        let input = Dataset::from_csv_str("i.csv", "uid,amt\n7,1.5\n").unwrap();
        let prompt = build_prompt(&template, &input, "amount", "amt", 5);
        assert!(prompt.contains("mapping the column amt in input_df"));
        assert!(prompt.contains("template_df[`amount`]"));
        assert!(prompt.contains("input_df['amount'] = <expression>"));
        assert!(prompt.contains("| 0   | 7   | 1.5 |"));
        assert!(prompt.contains("| amount | float   |"));
    }
}
