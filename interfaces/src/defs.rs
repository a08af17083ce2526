use anyhow::Result;

/// One item handed to downstream enrichment/summarization.
#[derive(Clone, Debug, PartialEq)]
pub struct InputItem {
    pub uri: String,
    pub live_source_uri: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputItemReference {
    pub text_start_index: usize,
    pub text_end_index: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DigestPreferences {
    pub uri: String,
    pub description: String,
}

#[derive(Debug)]
pub struct DigestSelectedItem {
    pub input_item_uri: String,
    pub references: Vec<InputItemReference>,
}

#[derive(Debug)]
pub struct DigestOutput {
    pub selected_items: Vec<DigestSelectedItem>,
    pub text: String,
}

// Object style note:
// Implementations are expected to run inside short lived single-run processes.
// They don't manage internal state; declare an empty type, e.g.
// `struct SampleDigestModel;`, and derive everything from the arguments.

/// Contract implemented by summarization/presentation consumers.
///
/// Input items arrive in the order the producer ranked them and must be
/// treated as read-only.
pub trait DigestModel {
    fn digest(preferences: &DigestPreferences, input_items: &[InputItem]) -> Result<DigestOutput>;
}
