// ============================================================================
// PROMPT TEMPLATES
// Concept extraction (ingest) and hybrid answer synthesis (chat)
// ============================================================================

/// Vector-side placeholder when search finds nothing.
pub const NO_TEXT_MATCHES: &str = "No direct text matches found.";

/// Graph-side placeholder when no topic is mentioned.
pub const NO_GRAPH_MATCHES: &str = "No relevant topics found in the graph.";

/// Returned to the user when the model cannot be reached.
pub const FALLBACK_ANSWER: &str = "I'm having trouble connecting to my brain right now.";

const EXTRACTION_INSTRUCTIONS: &str = "\
Extract the knowledge graph from this course.
Return JSON with this EXACT schema:
{ \"concepts\": [ { \"name\": \"Concept Name\", \"prerequisites\": [\"Prereq 1\"] } ] }
Every concept needs a non-empty name. Prerequisites are names of other concepts \
that must be learned first; use an empty list when there are none.";

/// System instruction sent ahead of every answer prompt.
pub const TUTOR_INSTRUCTION: &str = "\
You are 'Ace', an AI Tutor. Answer the user's question using the context in their message.";

const ANSWER_INSTRUCTIONS: &str = "\
Instructions:
1. If the user asks about order, prerequisites, or structure, rely on the Knowledge Graph.
2. If the user asks about grading, dates, policies, or definitions, rely on the Syllabus Text.
3. If the question is ambiguous, combine both sources.";

/// Prompt asking for the concept list of `text`.
pub fn extraction_prompt(text: &str) -> String {
    format!("{}\nText: {}", EXTRACTION_INSTRUCTIONS, text)
}

/// Prompt combining both retrieval sources with the user's question.
pub fn answer_prompt(graph_text: &str, vector_text: &str, question: &str) -> String {
    format!(
        "--- KNOWLEDGE GRAPH (Structure & Dependencies) ---
{graph_text}

--- SYLLABUS TEXT (Details & Policies) ---
{vector_text}

--- USER QUESTION ---
{question}

{ANSWER_INSTRUCTIONS}"
    )
}
