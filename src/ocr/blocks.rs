//! Key/value reconstruction from an OCR block graph.
//!
//! A form field is a KEY block whose CHILD words spell the label and whose
//! VALUE relationship points at one or more VALUE blocks; each VALUE block's
//! CHILD words spell the answer. Lookups go through id-keyed tables that
//! borrow from the response, so nothing is copied until the final strings
//! are assembled.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::ocr::types::{AnalysisResponse, Block, BlockType, EntityType, FieldMap, RelationshipType};

/// Field the period line fallback is stored under.
pub const PERIOD_OF_INSURANCE: &str = "Period of Insurance";

static PERIOD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[0-9]+ to [0-9]+").expect("period line pattern is valid"));

/// Id-indexed view over one response.
struct BlockGraph<'a> {
    words: HashMap<&'a str, &'a str>,
    values: HashMap<&'a str, Vec<&'a str>>,
    keys: Vec<&'a Block>,
    lines: Vec<&'a str>,
}

impl<'a> BlockGraph<'a> {
    fn index(response: &'a AnalysisResponse) -> Self {
        let mut graph = BlockGraph {
            words: HashMap::new(),
            values: HashMap::new(),
            keys: Vec::new(),
            lines: Vec::new(),
        };

        for block in &response.blocks {
            match (block.block_type, block.entity_type()) {
                (BlockType::Word, _) => {
                    if let Some(text) = block.text.as_deref() {
                        graph.words.insert(&block.id, text);
                    }
                }
                (BlockType::Line, _) => {
                    if let Some(text) = block.text.as_deref() {
                        graph.lines.push(text);
                    }
                }
                (BlockType::KeyValueSet, Some(EntityType::Value)) => {
                    graph
                        .values
                        .insert(&block.id, block.related(RelationshipType::Child).collect());
                }
                (BlockType::KeyValueSet, Some(EntityType::Key)) => graph.keys.push(block),
                _ => {}
            }
        }
        graph
    }

    /// Space-joined text of the words `ids` point at; unknown ids are skipped.
    fn words_text<'i>(&self, ids: impl IntoIterator<Item = &'i str>) -> String {
        ids.into_iter()
            .filter_map(|id| self.words.get(id).copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn key_text(&self, key: &Block) -> String {
        self.words_text(key.related(RelationshipType::Child))
    }

    fn value_text(&self, key: &Block) -> String {
        key.related(RelationshipType::Value)
            .filter_map(|id| self.values.get(id))
            .map(|children| self.words_text(children.iter().copied()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the field map for one analysis response.
///
/// Later keys overwrite earlier ones with the same label. The first LINE
/// that looks like `<digits> to <digits>` is stored under
/// [`PERIOD_OF_INSURANCE`], replacing any key/value reading of it.
pub fn extract_key_values(response: &AnalysisResponse) -> FieldMap {
    let graph = BlockGraph::index(response);

    let mut fields: FieldMap = graph
        .keys
        .iter()
        .map(|key| (graph.key_text(key), graph.value_text(key)))
        .collect();

    if let Some(line) = find_period_line(&graph.lines) {
        fields.insert(PERIOD_OF_INSURANCE.to_string(), line.to_string());
    }
    fields
}

fn find_period_line<'a>(lines: &[&'a str]) -> Option<&'a str> {
    lines.iter().copied().find(|line| PERIOD_LINE.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::types::Relationship;

    fn word(id: &str, text: &str) -> Block {
        Block {
            id: id.into(),
            block_type: BlockType::Word,
            text: Some(text.into()),
            entity_types: vec![],
            relationships: vec![],
        }
    }

    fn line(id: &str, text: &str) -> Block {
        Block {
            block_type: BlockType::Line,
            ..word(id, text)
        }
    }

    fn rel(kind: RelationshipType, ids: &[&str]) -> Relationship {
        Relationship {
            kind,
            ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn key(id: &str, children: &[&str], values: &[&str]) -> Block {
        Block {
            id: id.into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            entity_types: vec![EntityType::Key],
            relationships: vec![
                rel(RelationshipType::Value, values),
                rel(RelationshipType::Child, children),
            ],
        }
    }

    fn value(id: &str, children: &[&str]) -> Block {
        Block {
            id: id.into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            entity_types: vec![EntityType::Value],
            relationships: vec![rel(RelationshipType::Child, children)],
        }
    }

    fn response(blocks: Vec<Block>) -> AnalysisResponse {
        AnalysisResponse { blocks }
    }

    #[test]
    fn single_key_value_pair() {
        let resp = response(vec![
            key("k1", &["w1", "w2"], &["v1"]),
            word("w1", "Policy"),
            word("w2", "No."),
            value("v1", &["w3"]),
            word("w3", "ABC123"),
        ]);
        let fields = extract_key_values(&resp);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Policy No."], "ABC123");
    }

    #[test]
    fn block_order_does_not_matter() {
        let resp = response(vec![
            word("w3", "ABC123"),
            value("v1", &["w3"]),
            word("w2", "No."),
            word("w1", "Policy"),
            key("k1", &["w1", "w2"], &["v1"]),
        ]);
        assert_eq!(extract_key_values(&resp)["Policy No."], "ABC123");
    }

    #[test]
    fn multiple_values_join_with_space() {
        let resp = response(vec![
            key("k1", &["w1"], &["v1", "v2"]),
            word("w1", "Make"),
            value("v1", &["w2", "w3"]),
            value("v2", &["w4"]),
            word("w2", "Mercedes"),
            word("w3", "Benz"),
            word("w4", "AMG"),
        ]);
        assert_eq!(extract_key_values(&resp)["Make"], "Mercedes Benz AMG");
    }

    #[test]
    fn missing_ids_contribute_nothing() {
        let resp = response(vec![
            key("k1", &["w1", "ghost"], &["v1", "no-such-value"]),
            word("w1", "Model"),
            value("v1", &["w2", "ghost", "w3"]),
            word("w2", "C200"),
            word("w3", "Saloon"),
        ]);
        let fields = extract_key_values(&resp);
        assert_eq!(fields["Model"], "C200 Saloon");
    }

    #[test]
    fn key_without_value_maps_to_empty() {
        let resp = response(vec![key("k1", &["w1"], &[]), word("w1", "NCB")]);
        assert_eq!(extract_key_values(&resp)["NCB"], "");
    }

    #[test]
    fn duplicate_labels_last_wins() {
        let resp = response(vec![
            key("k1", &["w1"], &["v1"]),
            key("k2", &["w1"], &["v2"]),
            word("w1", "Body"),
            value("v1", &["w2"]),
            value("v2", &["w3"]),
            word("w2", "Saloon"),
            word("w3", "Coupe"),
        ]);
        assert_eq!(extract_key_values(&resp)["Body"], "Coupe");
    }

    #[test]
    fn period_line_fallback() {
        let resp = response(vec![
            line("l1", "Schedule of Motor Insurance"),
            line("l2", "24 September 2018 16:26 to 23 October 2018"),
            line("l3", "25 September 2018 16:26 TO 24 October 2018"),
        ]);
        let fields = extract_key_values(&resp);
        assert_eq!(
            fields[PERIOD_OF_INSURANCE],
            "24 September 2018 16:26 to 23 October 2018"
        );
    }

    #[test]
    fn period_line_is_case_insensitive() {
        let resp = response(vec![line("l1", "01 May 2020 10:00 TO 30 April 2021")]);
        assert!(extract_key_values(&resp).contains_key(PERIOD_OF_INSURANCE));
    }

    #[test]
    fn no_period_line_omits_field() {
        let resp = response(vec![line("l1", "Nothing to see here")]);
        assert!(extract_key_values(&resp).is_empty());
    }

    #[test]
    fn period_line_overrides_key_value_reading() {
        let resp = response(vec![
            key("k1", &["w1", "w2", "w3"], &["v1"]),
            word("w1", "Period"),
            word("w2", "of"),
            word("w3", "Insurance"),
            value("v1", &["w4"]),
            word("w4", "garbled"),
            line("l1", "01 May 2020 10:00 to 30 April 2021"),
        ]);
        assert_eq!(
            extract_key_values(&resp)[PERIOD_OF_INSURANCE],
            "01 May 2020 10:00 to 30 April 2021"
        );
    }
}
