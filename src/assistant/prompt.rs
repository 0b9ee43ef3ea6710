//! Prompt construction for the data-analyst assistant.

use crate::records::{FileRecord, MessageRecord, Role};

const NO_FILES: &str = "No files loaded yet.";

/// Context block for one file, with its content cut to `budget` characters.
pub fn file_context(file: &FileRecord, budget: usize) -> String {
  let or_na = |v: &Option<String>| v.as_deref().unwrap_or("N/A").to_string();
  let excerpt: String = file.content.chars().take(budget).collect();

  format!(
    "\n--- START OF FILE: {name} ---\n\
     METADATA:\n\
     - Category: {category}\n\
     - Description: {description}\n\
     - Source: {source}\n\
     - Period: {period}\n\
     - Indicator: {indicator}\n\
     \n\
     CONTENT (excerpt):\n\
     {excerpt}\n\
     --- END OF FILE: {name} ---\n",
    name = file.name,
    category = file.category,
    description = or_na(&file.description),
    source = or_na(&file.source),
    period = or_na(&file.period),
    indicator = or_na(&file.indicator),
    excerpt = excerpt,
  )
}

/// Full system instruction: persona, every file's context and the answer rules.
pub fn system_instruction(persona: &str, files: &[FileRecord], budget: usize) -> String {
  let context = files
    .iter()
    .map(|f| file_context(f, budget))
    .collect::<Vec<_>>()
    .join("\n");
  let context = if context.is_empty() { NO_FILES.to_string() } else { context };

  format!(
    "You are {persona}.\n\
     \n\
     RELEVANT DATA FOUND IN THE USER'S FILES:\n\
     {context}\n\
     \n\
     {ANALYSIS_RULES}"
  )
}

/// History turns sent to the model: replies still being generated are left out.
pub fn history_turns(history: &[MessageRecord]) -> impl Iterator<Item = &MessageRecord> {
  history
    .iter()
    .filter(|m| m.role != Role::Model || !m.is_pending())
}

const ANALYSIS_RULES: &str = r#"ANALYSIS RULES:
1. The data above is the REAL information. Read every line carefully and cross-reference files when needed (e.g. population from one file, cases from another).
2. DATA LAYOUT: usually each row is a municipality or entity and the columns are months or years.
3. ENCODING ISSUES: names may have lost accented characters ("So Gonalo" is "São Gonçalo", "MUNICÖPIO" is "MUNICÍPIO"). Correct them mentally.
4. For questions about a SPECIFIC YEAR: find that year's columns, SUM all of them when asked for totals, and show the reasoning briefly ("jan: X + feb: Y ... = Total").
5. For rates such as incidence: (total cases / population) * 1000.
6. If the exact municipality is missing, look for similar names.
7. Numeric values may be formatted in different ways.
8. NEVER invent numbers. Use only the data provided above.

ANSWER FORMAT - BE CONCISE:
- Do NOT list every month or intermediate value unless explicitly asked.
- Go straight to the point and answer the question objectively.
- Good example: "The month with the most occurrences was December 2022, with 3 cases."

CHARTS - IMPORTANT:
When the user asks for a chart, graph or visualization, reply with ONLY a valid JSON object. No introductions such as "Here is the chart".

EXACT FORMAT (JSON):
{
  "message": "Text explaining the chart...",
  "chart": {
    "type": "bar",
    "title": "Chart title",
    "description": "Short description (optional)",
    "data": [
      {"label": "Jan/25", "Series A": 2, "Series B": 5}
    ]
  }
}

CHART RULES:
- "type" is one of "bar", "line", "pie", "area".
- Use "label" for the X axis (categories).
- For values use descriptive keys (e.g. "São Gonçalo", "Bahia") when comparing, or "value" for a single series.
- NEVER wrap the JSON in markdown or code blocks. Return plain JSON starting with { and ending with }.

NORMAL ANSWERS (no chart):
If no chart was requested, answer in plain markdown explaining the data and calculations CONCISELY. Do not return JSON unless it is a chart."#;
