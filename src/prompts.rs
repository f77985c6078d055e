//! Prompt templates for the SQL agent
//!
//! Two fixed templates: an instruction preamble describing what the agent may
//! and may not do, and the Thought/Action/Action Input/Observation response
//! format. Both are parameterized at render time by the SQL dialect, the row
//! cap and the available tool names. No control flow lives here.

/// Instruction preamble. Placeholders: `{dialect}`, `{top_k}`.
pub const AGENT_PREFIX: &str = r#"You are an agent designed to interact with a SQL database.
## Instructions:
- Given an input question, create a syntactically correct {dialect} query
to run, then look at the results of the query and return the answer.
- Unless the user specifies a specific number of examples they wish to
obtain, **ALWAYS** limit your query to at most {top_k} results.
- You can order the results by a relevant column to return the most
interesting examples in the database.
- Never query for all the columns from a specific table, only ask for
the relevant columns given the question.
- You have access to tools for interacting with the database.
- You MUST double check your query before executing it. If you get an error
while executing a query, rewrite the query and try again.
- DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.)
to the database.
- DO NOT MAKE UP AN ANSWER OR USE PRIOR KNOWLEDGE, ONLY USE THE RESULTS
OF THE CALCULATIONS YOU HAVE DONE.
- Your response should be in Markdown. However, **when running a SQL Query
in "Action Input", do not include the markdown backticks**.
Those are only for formatting the response, not for executing the command.
- ALWAYS, as part of your final answer, explain how you got to the answer
on a section that starts with: "Explanation:". Include the SQL query as
part of the explanation section.
- If the question does not seem related to the database, just return
"I don't know" as the answer.
- Only use the below tools. Only use the information returned by the
below tools to construct your query and final answer.
- Do not make up table names, only use the tables returned by any of the
tools below.

## Tools:

"#;

/// Response format. Placeholder: `{tool_names}`.
pub const AGENT_FORMAT_INSTRUCTIONS: &str = r#"## Use the following format:

Question: the input question you must answer.
Thought: you should always think about what to do.
Action: the action to take, should be one of [{tool_names}].
Action Input: the input to the action.
Observation: the result of the action.
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer.
Final Answer: the final answer to the original input question.

Example of Final Answer:
<=== Beginning of example

Action: run_query
Action Input:
SELECT death
FROM covidtracking
WHERE state = 'TX' AND date LIKE '2020%'

Observation:
(27437,) (27088,) (26762,) (26521,) (26472,) (26421,) (26408,)
Thought: I now know the final answer
Final Answer: There were 27437 people who died of covid in Texas in 2020.

Explanation:
I queried the `covidtracking` table for the `death` column where the state
is 'TX' and the date starts with '2020'. The query returned a list of tuples
with the number of deaths for each day in 2020. To answer the question,
I took the sum of all the deaths in the list, which is 27437.
I used the following query

```sql
SELECT death FROM covidtracking WHERE state = 'TX' AND date LIKE '2020%'
```
===> End of Example
"#;

/// One tool as advertised to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// The fixed tool set the agent may invoke.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "list_tables",
            description: "List the names of all tables in the database. Input is ignored.",
        },
        ToolSpec {
            name: "describe_table",
            description: "Show the columns and a few sample rows of a table. Input: the table name.",
        },
        ToolSpec {
            name: "run_query",
            description: "Execute a read-only SQL query and return the rows. Input: a single SELECT statement.",
        },
    ]
}

/// Render the full system prompt: preamble, tool list, format instructions.
pub fn build_system_prompt(dialect: &str, top_k: usize, tools: &[ToolSpec]) -> String {
    let prefix = AGENT_PREFIX
        .replace("{dialect}", dialect)
        .replace("{top_k}", &top_k.to_string());

    let tool_list = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let tool_names = tools
        .iter()
        .map(|t| t.name)
        .collect::<Vec<_>>()
        .join(", ");
    let format = AGENT_FORMAT_INSTRUCTIONS.replace("{tool_names}", &tool_names);

    format!("{}{}\n\n{}", prefix, tool_list, format)
}
