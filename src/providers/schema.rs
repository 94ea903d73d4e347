//! Response schema the schema-enforced provider is held to.

use serde_json::{json, Value};

/// Field names every analysis must carry, in schema order.
pub const REQUIRED_FIELDS: [&str; 11] = [
    "title",
    "authors",
    "background",
    "motivation",
    "research_conclusion",
    "methodology_math",
    "implementation_details",
    "evaluation_results",
    "reviewer_critique",
    "one_more_thing",
    "suggested_tags",
];

/// OpenAPI-subset schema in the form `generateContent` expects.
pub fn gemini_response_schema() -> Value {
    let string = || json!({ "type": "STRING" });
    let string_list = || json!({ "type": "ARRAY", "items": { "type": "STRING" } });

    json!({
        "type": "OBJECT",
        "properties": {
            "title": string(),
            "authors": string_list(),
            "background": string(),
            "motivation": string(),
            "research_conclusion": string(),
            "methodology_math": string(),
            "implementation_details": string(),
            "evaluation_results": string(),
            "reviewer_critique": string(),
            "one_more_thing": string(),
            "suggested_tags": string_list(),
        },
        "required": REQUIRED_FIELDS,
    })
}
