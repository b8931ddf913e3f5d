//! Prompt templates for the dream analyst.

use crate::emotions::EMOTION_VOCABULARY;

/// System prompt for analysis, emotion commentary and symbol explanations.
pub const DREAM_ANALYST_SYSTEM_PROMPT: &str = concat!(
    "You are DreamDiary AI, a thoughtful and empathetic dream analyst grounded in verified ",
    "psychological and philosophical models (e.g., Jungian archetypes, Freudian unconscious, ",
    "existential philosophy, cognitive behavioral theories). ",
    "\n\n",
    "Be moderately strict in interpretations. Base all insights on scientific evidence and ",
    "established theories, avoiding speculation. Use chain-of-thought reasoning: first analyze ",
    "elements, then connect to theories, then provide interpretation. ",
    "\n\n",
    "Adapt your tone to the user's style: if they are casual or open, respond warmly and ",
    "conversationally; if formal or reserved, be more structured and precise. If no user info ",
    "is provided, default to a balanced, professional tone with clarity and accuracy. ",
    "\n\n",
    "Always verify facts against psychological literature, explain concepts simply yet ",
    "rigorously, and ensure formulations are precise. Cite key theorists briefly where relevant ",
    "(e.g., 'As Jung noted...'). ",
    "\n\n",
    "When analyzing dreams: ",
    "1. Break down key elements: symbols, emotions, narrative structure. ",
    "2. Identify primary emotions and their intensity (e.g., joy: high, fear: moderate). ",
    "3. Reference relevant psychological theories (Jung, Freud, CBT, etc.) with evidence. ",
    "4. Provide a balanced interpretation: personal meaning, universal insights. ",
    "5. Suggest a brief guided meditation (2-3 minutes) tailored to the emotions and symbols. ",
    "6. Offer actionable advice for reflection or journaling. ",
    "\n\n",
    "Structure responses clearly: Use sections like 'Key Elements', 'Emotional Analysis', ",
    "'Psychological Interpretation', 'Guided Meditation', 'Reflection Tips'. ",
    "\n\n",
    "Keep responses supportive, evidence-based, and comprehensive but concise ",
    "(aim for 300-500 words).",
);

/// System message for the emotion-extraction call.
pub const EMOTION_EXTRACTOR_SYSTEM_PROMPT: &str =
    "You are an emotion extractor. Analyze deeply and accurately.";

/// Example list shown to the model; it is also valid parser input.
pub const EMOTION_FORMAT_EXAMPLE: &str = "[joy:1 (high), fear:0 (none), anger:0 (none), \
sadness:0 (none), calm:1 (moderate), anxiety:1 (low)]";

/// User prompt for the narrative analysis of a dream.
pub fn dream_analysis_prompt(dream_text: &str) -> String {
    format!(
        "Analyze this dream in detail following the structured guidelines: {}. \
         Ensure the response includes all sections: Key Elements, Emotional Analysis, \
         Psychological Interpretation, Guided Meditation, and Reflection Tips. \
         Use chain-of-thought: first list elements, then analyze emotions, then interpret, etc.",
        dream_text
    )
}

/// User prompt asking for the bracketed emotion list.
pub fn emotion_extraction_prompt(dream_text: &str) -> String {
    format!(
        "Extract emotions from this dream as multi-label binary with intensity: {}. \
         Emotions: {}. \
         Format: {}. \
         Only output the list in brackets, with intensity notes.",
        dream_text,
        EMOTION_VOCABULARY.join(", "),
        EMOTION_FORMAT_EXAMPLE
    )
}

/// User prompt for free-form emotion commentary.
pub fn emotion_commentary_prompt(dream_text: &str) -> String {
    format!(
        "Analyze the emotions in this dream: {}. \
         List primary emotions with intensity and context from the dream narrative.",
        dream_text
    )
}

/// User prompt for explaining a single dream symbol.
pub fn symbol_explanation_prompt(symbol: &str) -> String {
    format!(
        "Explain the dream symbol '{}' using only accurate information \
         from verified psychological literature (e.g., Jung, Freud). \
         Communicate in simple, understandable language.",
        symbol
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotions::extract_emotions_report;

    #[test]
    fn test_format_example_parses_cleanly() {
        let report = extract_emotions_report(Some(EMOTION_FORMAT_EXAMPLE));
        assert!(report.is_clean());
        assert_eq!(report.parsed.len(), 6);
    }

    #[test]
    fn test_emotion_prompt_lists_vocabulary() {
        let prompt = emotion_extraction_prompt("I was flying");
        assert!(prompt.contains("I was flying"));
        assert!(prompt.contains("joy, fear, anger, sadness, calm, anxiety, excitement, confusion, love, disgust"));
        assert!(prompt.contains(EMOTION_FORMAT_EXAMPLE));
    }

    #[test]
    fn test_prompts_embed_input() {
        assert!(dream_analysis_prompt("ocean").contains("guidelines: ocean."));
        assert!(emotion_commentary_prompt("ocean").contains("this dream: ocean."));
        assert!(symbol_explanation_prompt("snake").contains("'snake'"));
        assert!(DREAM_ANALYST_SYSTEM_PROMPT.starts_with("You are DreamDiary AI"));
    }
}
