//! Prompts sent to the analysis providers.
//!
//! Every prompt lives here so the adapter code in [`crate::providers`] only
//! deals with request shaping, and tests can inspect the text directly.

use crate::model::{Analysis, Language};

/// Appended to the system prompt for providers that cannot enforce a schema.
pub const STRICT_JSON_SUFFIX: &str = "\n\nRespond STRICTLY with a valid JSON object.";

/// Marker appended to text cut at the provider's character ceiling.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::Zh => "Use CHINESE (Simplified) for the analysis content (except for specific technical terms, formulas, or proper nouns). However, keep tags in English if they are standard technical terms.",
        Language::En => "Use ENGLISH for the analysis content.",
    }
}

/// System prompt for turning paper text into the analysis record.
pub fn analysis_system_prompt(language: Language) -> String {
    format!(
        r#"You are a top-tier AI researcher, full-stack developer, and information designer specializing in academic interpretation.

Your task is to analyze the provided academic paper text and return a structured JSON object.

{lang}

The analysis must be extremely detailed, aiming to provide 90% of the paper's core information to allow for reproducibility.

Fill the JSON fields based on these specific requirements:

1. **background**: What field is this? What is the background? Explain simply so a non-expert understands.
2. **motivation**: What problem was found? Why solve it? What is the significance and purpose?
3. **research_conclusion**: What was concluded? What method was designed? How does it relate to the motivation and solve the problem?
4. **methodology_math**: From symbols/representation to formulas (LaTeX) and algorithm flow. How does it differ from prior algorithms?
   **CRITICAL LATEX INSTRUCTIONS:**
   - Use '$' for inline math and '$$' for block math.
   - DO NOT use '\(' or '\['.
   - You are outputting a JSON string. You MUST double-escape all LaTeX backslashes.
   - Example: To output "\alpha", you must write "\\alpha" in the JSON.
5. **implementation_details**: Systematically organize details (models, data, hyperparameters, prompts, etc.). Reference the appendix if needed. Aim for reproducibility.
6. **evaluation_results**: Compare baselines. What effect was achieved? What insights were revealed?
7. **reviewer_critique**: Act as a sharp reviewer. Critique the work. Strengths, weaknesses, and improvement directions.
8. **one_more_thing**: Free form. Something important/interesting you want to share.
9. **suggested_tags**: Generate 3-5 precise tags for categorization.

Also fill **title** with the official title and **authors** with the author list.

IMPORTANT:
- Return ONLY valid JSON matching the schema.
- Ensure correct JSON escaping for all control characters and backslashes."#,
        lang = language_instruction(language)
    )
}

/// Search context for a paper URL; arXiv links become an id search.
pub fn search_context(url: &str, arxiv_id: Option<&str>) -> String {
    match arxiv_id {
        Some(id) => format!(
            "Arxiv Paper ID: {id}. Please Search for \"arxiv {id}\" to find the title, abstract, and authors from the arxiv.org abstract page."
        ),
        None => format!("URL: {url}"),
    }
}

/// First step of URL analysis: grounded, free-form summary.
pub fn url_search_prompt(search_context: &str, language: Language) -> String {
    let lang = match language {
        Language::Zh => "The comprehensive summary should be in CHINESE (Simplified).",
        Language::En => "The comprehensive summary should be in ENGLISH.",
    };
    format!(
        r#"I need to analyze an academic paper.
{search_context}

Please perform a Google Search to find the full details of this paper.
1. Find the Abstract, Title, and Authors.
2. If possible, find the full text content or a detailed summary from the abstract page, code repositories, or academic discussions.

Provide a **comprehensive, detailed summary** of the paper covering the following aspects strictly:
1. Official Title
2. Authors
3. Background of the field
4. Motivation and Problem Statement
5. Research Conclusion
6. Methodology (Math, Formulas, Algorithms) - Be detailed here.
7. Implementation Details (Datasets, setup)
8. Evaluation Results
9. Reviewer Critique (Pros/Cons)
10. "One More Thing" (Unique insight)
11. Suggested Tags (3-5 tags)

{lang}"#
    )
}

/// Second step of URL analysis: coerce the summary into the schema.
pub fn url_formatting_prompt(summary: &str) -> String {
    format!(
        r#"You are a structured data converter.

Take the following research paper summary and convert it into a valid JSON object matching the schema provided.

Summary:
{summary}

Requirements:
- Ensure 'methodology_math' uses LaTeX format with double-escaped backslashes (e.g. \\alpha).
- Ensure all fields from the schema are populated based on the summary."#
    )
}

/// System prompt for follow-up questions about one paper.
pub fn chat_system_prompt(
    title: &str,
    analysis: Option<&Analysis>,
    excerpt: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are a research assistant helping a reader understand the paper \"{title}\".\n\
         Answer precisely, cite sections of the paper when possible, and use LaTeX ($...$) for math.\n"
    );
    if let Some(a) = analysis {
        prompt.push_str("\n## Structured analysis\n");
        for (label, body) in a.sections() {
            prompt.push_str(&format!("\n### {label}\n{body}\n"));
        }
    }
    if let Some(text) = excerpt {
        prompt.push_str("\n## Paper text\n");
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_switches_language() {
        assert!(analysis_system_prompt(Language::En).contains("Use ENGLISH"));
        assert!(analysis_system_prompt(Language::Zh).contains("CHINESE (Simplified)"));
    }

    #[test]
    fn system_prompt_names_every_field() {
        let p = analysis_system_prompt(Language::En);
        for field in [
            "background",
            "motivation",
            "research_conclusion",
            "methodology_math",
            "implementation_details",
            "evaluation_results",
            "reviewer_critique",
            "one_more_thing",
            "suggested_tags",
        ] {
            assert!(p.contains(field), "missing {field}");
        }
    }

    #[test]
    fn arxiv_context_searches_by_id() {
        let ctx = search_context("https://arxiv.org/abs/1706.03762", Some("1706.03762"));
        assert!(ctx.contains("arxiv 1706.03762"));
        assert_eq!(search_context("https://x.org/p", None), "URL: https://x.org/p");
    }

    #[test]
    fn chat_prompt_embeds_analysis_and_excerpt() {
        let a = crate::model::tests::sample_analysis();
        let p = chat_system_prompt("T", Some(&a), Some("body text"));
        assert!(p.contains("### Critique\nQuadratic memory."));
        assert!(p.contains("body text"));
    }
}
