//! Prompt template formatting.
//!
//! Templates reference the chain's original input with `{input}` and the
//! previous step's output with `{previous}`. No other tokens are recognized;
//! anything else passes through unchanged.

/// Placeholder replaced with the chain's original input text.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder replaced with the previous step's output.
pub const PREVIOUS_PLACEHOLDER: &str = "{previous}";

/// Render a step's prompt from its template.
///
/// Every occurrence of [`INPUT_PLACEHOLDER`] becomes `input_text`. Every
/// occurrence of [`PREVIOUS_PLACEHOLDER`] becomes `previous_output` when that
/// is non-empty; on the first step there is no prior output, so `{previous}`
/// degrades to the original input.
///
/// Pure and deterministic: a malformed template simply fails to substitute.
///
/// # Example
///
/// ```rust
/// use prompt_chain::format_prompt;
///
/// let prompt = format_prompt("Refine: {previous}", "raw text", None);
/// assert_eq!(prompt, "Refine: raw text");
///
/// let prompt = format_prompt("Refine: {previous}", "raw text", Some("draft"));
/// assert_eq!(prompt, "Refine: draft");
/// ```
pub fn format_prompt(template: &str, input_text: &str, previous_output: Option<&str>) -> String {
    let prompt = template.replace(INPUT_PLACEHOLDER, input_text);
    match previous_output {
        Some(previous) if !previous.is_empty() => prompt.replace(PREVIOUS_PLACEHOLDER, previous),
        _ => prompt.replace(PREVIOUS_PLACEHOLDER, input_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_placeholders() {
        let prompt = format_prompt("in={input} prev={previous}", "a", Some("b"));
        assert_eq!(prompt, "in=a prev=b");
    }

    #[test]
    fn first_step_degrades_previous_to_input() {
        let prompt = format_prompt("in={input} prev={previous}", "a", None);
        assert_eq!(prompt, "in=a prev=a");
    }

    #[test]
    fn empty_previous_output_degrades_to_input() {
        let prompt = format_prompt("prev={previous}", "a", Some(""));
        assert_eq!(prompt, "prev=a");
    }

    #[test]
    fn replaces_every_occurrence() {
        let prompt = format_prompt("{input}+{input}", "x", None);
        assert_eq!(prompt, "x+x");
    }

    #[test]
    fn unrecognized_tokens_pass_through() {
        let prompt = format_prompt("{input} {unknown} {}", "x", Some("y"));
        assert_eq!(prompt, "x {unknown} {}");
    }

    #[test]
    fn formatting_is_idempotent_across_calls() {
        let a = format_prompt("Summarize {input}", "text", Some("prior"));
        let b = format_prompt("Summarize {input}", "text", Some("prior"));
        assert_eq!(a, b);
    }
}
