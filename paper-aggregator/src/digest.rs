use crate::types::{DigestModel, DigestOutput, DigestPreferences, DigestSelectedItem, InputItem};
use interfaces::defs::InputItemReference;
use tracing::debug;

const ABSTRACT_MARKER: &str = "Abstract: ";

/// Plain-text digest of a pipeline result, one numbered paragraph per paper.
///
/// Items are expected in result order (ranked papers first), which the
/// digest keeps. Each selected item references its title and the first
/// sentence of its abstract.
pub struct PaperDigestModel;

fn title_range(text: &str) -> (usize, usize) {
    (0, text.find('\n').unwrap_or(text.len()))
}

fn first_sentence_range(text: &str) -> Option<(usize, usize)> {
    let start = text.find(ABSTRACT_MARKER)? + ABSTRACT_MARKER.len();
    let rest = &text[start..];
    if rest.trim().is_empty() {
        return None;
    }
    let end = rest
        .find(". ")
        .map(|dot| start + dot + 1)
        .unwrap_or(text.len());
    Some((start, end))
}

impl DigestModel for PaperDigestModel {
    fn digest(preferences: &DigestPreferences, input_items: &[InputItem]) -> anyhow::Result<DigestOutput> {
        if input_items.is_empty() {
            return Ok(DigestOutput {
                selected_items: Vec::new(),
                text: "No papers matched this run.".to_string(),
            });
        }

        let mut text = String::new();
        if !preferences.description.is_empty() {
            text.push_str(&format!("Papers for: {}\n\n", preferences.description));
        }

        let mut selected_items = Vec::with_capacity(input_items.len());
        for (i, item) in input_items.iter().enumerate() {
            let (title_start, title_end) = title_range(&item.text);
            let mut references = vec![InputItemReference {
                text_start_index: title_start,
                text_end_index: title_end,
            }];

            text.push_str(&format!("{}. {}\n", i + 1, &item.text[title_start..title_end]));
            if let Some((start, end)) = first_sentence_range(&item.text) {
                text.push_str(&format!("   {}\n", item.text[start..end].trim()));
                references.push(InputItemReference {
                    text_start_index: start,
                    text_end_index: end,
                });
            }
            text.push_str(&format!("   {}\n\n", item.uri));

            selected_items.push(DigestSelectedItem {
                input_item_uri: item.uri.clone(),
                references,
            });
        }

        debug!("Composed digest over {} papers", selected_items.len());
        Ok(DigestOutput {
            selected_items,
            text: text.trim_end().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(uri: &str, title: &str, abstract_text: &str) -> InputItem {
        InputItem {
            uri: uri.to_string(),
            live_source_uri: "arxiv".to_string(),
            text: format!(
                "{}\n\nAuthors: A. Author\n\nCategories: cs.AI\n\n{}{}",
                title, ABSTRACT_MARKER, abstract_text
            ),
        }
    }

    #[test]
    fn numbers_papers_in_order() {
        let items = vec![
            item("https://arxiv.org/abs/1", "First", "We do one thing. Then more."),
            item("https://arxiv.org/abs/2", "Second", "Short"),
        ];
        let preferences = DigestPreferences {
            uri: String::new(),
            description: "vision".to_string(),
        };

        let output = PaperDigestModel::digest(&preferences, &items).unwrap();

        assert!(output.text.starts_with("Papers for: vision\n\n1. First\n   We do one thing.\n"));
        assert!(output.text.contains("2. Second\n   Short\n   https://arxiv.org/abs/2"));
        assert_eq!(output.selected_items.len(), 2);

        let first = &output.selected_items[0];
        assert_eq!(first.input_item_uri, "https://arxiv.org/abs/1");
        let sentence = &first.references[1];
        assert_eq!(
            &items[0].text[sentence.text_start_index..sentence.text_end_index],
            "We do one thing."
        );
    }

    #[test]
    fn empty_result_has_placeholder_text() {
        let output = PaperDigestModel::digest(&DigestPreferences::default(), &[]).unwrap();
        assert!(output.selected_items.is_empty());
        assert_eq!(output.text, "No papers matched this run.");
    }
}
