//! Prompt construction for SQL generation.
//!
//! Only the schema description and the question are sent; row data never
//! leaves the process.

use crate::db::SchemaDescriptor;
use crate::llm::types::Message;

/// System prompt template for the SQL generator.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are an expert at writing SQLite SQL for a small personal metrics database.

DATABASE SCHEMA:
{schema}

RULES:
- Return exactly one SQLite SELECT statement (a WITH clause is allowed).
- Query only these tables: {tables}. Do not use any other table.
- Never modify data or the schema.
- If the question asks for a single number, return exactly one row with the column alias answer.
- Filter dates on the date column using ISO strings ('YYYY-MM-DD') or SQLite date functions.

OUTPUT FORMAT:
Return ONLY the SQL query. No explanations, no markdown."#;

/// Builds the system prompt with the schema injected.
pub fn build_system_prompt(schema: &SchemaDescriptor) -> String {
    let tables = schema.allowed_tables().collect::<Vec<_>>().join(", ");
    SYSTEM_PROMPT_TEMPLATE
        .replace("{schema}", schema.format_for_llm().trim_end())
        .replace("{tables}", &tables)
}

/// Builds the message list for one question.
pub fn build_messages(schema: &SchemaDescriptor, question: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(schema)),
        Message::user(question.trim()),
    ]
}
