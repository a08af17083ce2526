use anyhow::Result;

use crate::defs::DigestModel;
use crate::defs::DigestOutput;
use crate::defs::DigestPreferences;
use crate::defs::DigestSelectedItem;
use crate::defs::InputItem;
use crate::defs::InputItemReference;

/// Selects every item and joins the first line of each into the digest text.
pub struct BaselineDigestModel;

fn headline(input_item: &InputItem) -> &str {
    input_item.text.lines().next().unwrap_or("").trim()
}

impl DigestModel for BaselineDigestModel {
    fn digest(preferences: &DigestPreferences, input_items: &[InputItem]) -> Result<DigestOutput> {
        _ = preferences;
        let selected_items = input_items
            .iter()
            .map(|input_item| DigestSelectedItem {
                input_item_uri: input_item.uri.clone(),
                references: vec![InputItemReference {
                    text_start_index: 0,
                    text_end_index: headline(input_item).len(),
                }],
            })
            .collect::<Vec<DigestSelectedItem>>();
        let text = input_items.iter().map(headline).collect::<Vec<&str>>().join("\n");
        Ok(DigestOutput { selected_items, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(uri: &str, text: &str) -> InputItem {
        InputItem {
            uri: uri.to_owned(),
            live_source_uri: "arxiv".to_owned(),
            text: text.to_owned(),
        }
    }

    #[test]
    fn keeps_every_item_in_order() {
        let items = vec![
            item("arxiv:2501.00001", "First paper\n\nabstract"),
            item("arxiv:2501.00002", "Second paper\n\nabstract"),
        ];
        let output = BaselineDigestModel::digest(&DigestPreferences::default(), &items).unwrap();

        assert_eq!(output.selected_items.len(), 2);
        assert_eq!(output.selected_items[0].input_item_uri, "arxiv:2501.00001");
        assert_eq!(output.text, "First paper\nSecond paper");
        assert_eq!(output.selected_items[1].references[0].text_end_index, "Second paper".len());
    }

    #[test]
    fn empty_input_gives_empty_digest() {
        let output = BaselineDigestModel::digest(&DigestPreferences::default(), &[]).unwrap();
        assert!(output.selected_items.is_empty());
        assert!(output.text.is_empty());
    }
}
