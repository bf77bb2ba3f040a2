use extract::ChatMessage;

/// Marker left in place of a reference that cannot be resolved.
pub const UNRESOLVED_MARKER: &str = "[unresolved reference]";

pub fn build_unify_messages(unified_text: &str, chunk_text: &str) -> Vec<ChatMessage> {
    let system = r#"You merge overlapping transcription fragments into one transcript.

Every request gives you:
- the transcript unified so far
- the next fragment, which may repeat the end of the transcript

You must:
1. Remove ONLY exact repetitions
2. Keep everything that is not already in the unified transcript, even if it is very similar
3. Keep the original order of appearance
4. Restore punctuation and capitalization
5. Break sentences and paragraphs where the topic changes
6. Never drop a sentence or an idea from the fragment

Return ONLY the updated unified transcript, with no explanations or comments."#;

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "Transcript unified so far:\n{}\n\nNext fragment:\n{}\n\nReturn the updated unified transcript.",
            unified_text, chunk_text
        )),
    ]
}

pub fn build_correction_messages(domain_context: &str, text: &str) -> Vec<ChatMessage> {
    let system = format!(
        r#"You are an expert proofreader of transcripts of {}, with solid historical and cultural knowledge of the subject.

Your task:
1. Fix literal transcription errors: words garbled by background noise or pauses, and words misspelled through pronunciation or dialect confusion.
2. Check factual coherence: anachronisms, impossibilities, and proper names or technical terms used incorrectly.
3. Correct only what is strictly necessary. Do not change the style, the order of ideas, valid information or correctly used terminology.
4. Return ONLY the corrected text, with no comments, notes or lists of changes."#,
        domain_context
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "Text to correct:\n{}\n\nReturn only the corrected text.",
            text
        )),
    ]
}

pub fn build_coreference_messages(title: &str, description: &str, text: &str) -> Vec<ChatMessage> {
    let system = format!(
        r#"You resolve coreferences in video transcripts of biographical interviews.

Replace EVERY pronoun, demonstrative or vague reference with the full entity or concept it stands for (proper name, object, event...). Use the video title and description as context.

For each replacement:
- Always use full names ("Silvia García") instead of pronouns or descriptions ("the interviewee").
- If the antecedent is a role or a concept ("financial director", "cooperative"), write it out in full.
- Keep the paragraphs and line breaks of the original.
- If you cannot resolve a reference, keep the expression and mark it with {}.

Example:
Original: "When she finished her degree, she married Rogelio. He suggested the idea to her."
Expected: "When Silvia García finished her degree, Silvia García married Rogelio. Rogelio suggested the idea to Silvia García."

Return ONLY the transcript with the coreferences resolved."#,
        UNRESOLVED_MARKER
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "TITLE: {}\n\nDESCRIPTION: {}\n\nTRANSCRIPT:\n{}\n\nReturn only the resolved transcript.",
            title, description, text
        )),
    ]
}

pub fn build_language_detection_messages(labels: &[&str], text: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You are a language classifier. Answer with exactly one word naming the dominant language of the text: {}.",
        labels.join(", ")
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!("Text:\n{}", text)),
    ]
}

pub fn build_translation_messages(source: &str, target: &str, text: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You are an expert translator from {} into {}. Keep the style, tone and length of the text. Return only the translation.",
        source, target
    );

    vec![ChatMessage::system(system), ChatMessage::user(text.to_string())]
}
