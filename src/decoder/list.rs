use super::flat::FlatRecordDecoder;
use crate::schema::RecordSequence;

/// Decodes a bracketed list of flat records (`[{...},{...}]`).
///
/// The list may be embedded in surrounding text, e.g. an envelope like
/// `{"data": {"pair": "BTC/USD", "ohlc": [{...}, {...}]}}`. Everything
/// between the first `[{` and the last `}]` is taken as the list body.
///
/// Fails soft: without a `[{ ... }]` pattern the result is empty.
pub struct RecordListDecoder;

impl RecordListDecoder {
    pub fn decode(input: &str) -> RecordSequence {
        let Some(open) = input.find("[{") else {
            return RecordSequence::new();
        };
        let Some(close) = input.rfind("}]") else {
            return RecordSequence::new();
        };

        // body spans from the first '{' up to and including the last '}'
        let start = open + 1;
        let end = close + 1;
        if end <= start {
            return RecordSequence::new();
        }

        input[start..end]
            .split('}')
            .map(|chunk| chunk.trim_start_matches(|c: char| c == ',' || c.is_whitespace()))
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| FlatRecordDecoder::decode(&format!("{chunk}}}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_object_in_order() {
        let input = r#"[{"t":"1","v":"a"}, {"t":"2","v":"b"},{"t":"3","v":"c"}]"#;
        let records = RecordListDecoder::decode(input);

        assert_eq!(records.len(), 3);
        let ts: Vec<&str> = records.iter().filter_map(|r| r.get("t")).collect();
        assert_eq!(ts, vec!["1", "2", "3"]);
        assert_eq!(records[2].get("v"), Some("c"));
    }

    #[test]
    fn finds_list_embedded_in_envelope() {
        let input = r#"{"data": {"pair": "BTC/USD", "step": 60, "ohlc": [{"close": "10", "timestamp": "1720000000"}, {"close": "11", "timestamp": "1720000060"}]}}"#;
        let records = RecordListDecoder::decode(input);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("close"), Some("10"));
        assert_eq!(records[1].get("timestamp"), Some("1720000060"));
        assert!(!records[0].contains_key("pair"));
    }

    #[test]
    fn list_values_inside_objects_survive() {
        let input = r#"[{"ids":"[1,2]","x":"1"},{"ids":"[3]","x":"2"}]"#;
        let records = RecordListDecoder::decode(input);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("ids"), Some("[1,2]"));
        assert_eq!(records[1].get("ids"), Some("[3]"));
    }

    #[test]
    fn empty_objects_still_count() {
        let records = RecordListDecoder::decode("[{}, {\"a\":\"1\"}]");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_empty());
    }

    #[test]
    fn malformed_input_yields_empty_sequence() {
        assert!(RecordListDecoder::decode("").is_empty());
        assert!(RecordListDecoder::decode(r#"{"a":"1"}"#).is_empty());
        assert!(RecordListDecoder::decode("[1,2,3]").is_empty());
        assert!(RecordListDecoder::decode(r#"[{"a":"1""#).is_empty());
        assert!(RecordListDecoder::decode("}] before [{").is_empty());
    }
}
