//! Prompts for semantic (language-model) catalog extraction.
//!
//! Every prompt lives here so prompt changes never touch the chunking,
//! reply-parsing or error-handling code. Callers can override the system
//! prompt via [`crate::config::PipelineConfig::system_prompt`]; the constant
//! below is used only when no override is provided.

/// Default system prompt for extracting product records from catalog text.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You extract product data from tile and ceramics catalogs.

You receive a field schema, a price list and a fragment of catalog text.
Follow these rules precisely:

1. OUTPUT
   - Reply with a JSON array of objects and nothing else
   - No commentary, no explanations, no markdown fences
   - Reply with [] when the fragment contains no products

2. RECORDS
   - One object per distinct product code
   - Use exactly the field names of the schema
   - item_id is required; skip products without a visible code
   - Put every attribute that is not a schema field into "params"
     as a string, preferring the known param keys listed in the schema

3. VALUES
   - Copy values from the text; never invent or translate them
   - Numbers use a dot as the decimal separator, no units or currency
   - Leave a field out when the text does not state it

4. PRICES
   - Take price from the catalog text when it is printed there
   - Otherwise leave price out; it is matched against the price list later"#;

/// Build the user message for one chunk.
///
/// The schema and price map are embedded verbatim as JSON so the model sees
/// the same keys the normalizer and reconciler will use.
pub fn build_user_message(schema_json: &str, price_map_json: &str, chunk: &str) -> String {
    format!(
        "Field schema:\n{}\n\nPrice list (product key → price):\n{}\n\nCatalog text:\n\"\"\"\n{}\n\"\"\"",
        schema_json, price_map_json, chunk
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_demands_bare_json_array() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("JSON array"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("no markdown fences"));
    }

    #[test]
    fn user_message_embeds_all_parts() {
        let msg = build_user_message(r#"{"item_id":{}}"#, r#"{"A1":"10.00"}"#, "A1  Tile X");
        assert!(msg.contains(r#"{"item_id":{}}"#));
        assert!(msg.contains(r#"{"A1":"10.00"}"#));
        assert!(msg.ends_with("A1  Tile X\n\"\"\""));
    }
}
