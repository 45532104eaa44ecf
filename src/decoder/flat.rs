use crate::schema::FlatRecord;

/// Scanner state while walking a flat record.
///
/// - `Skip`:      between pairs, nothing accumulated yet
/// - `Key`:       accumulating a field name
/// - `Value`:     accumulating a field value
/// - `ListValue`: inside `[...]` of a value, commas are literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Skip,
    Key,
    Value,
    ListValue,
}

/// Structural classes of input characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Quote,
    Space,
    Colon,
    Comma,
    OpenList,
    CloseList,
    OpenObject,
    CloseObject,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        match c {
            '"' => CharClass::Quote,
            ':' => CharClass::Colon,
            ',' => CharClass::Comma,
            '[' => CharClass::OpenList,
            ']' => CharClass::CloseList,
            '{' => CharClass::OpenObject,
            '}' => CharClass::CloseObject,
            c if c.is_whitespace() => CharClass::Space,
            _ => CharClass::Other,
        }
    }
}

/// What the scanner does with the current character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ignore,
    PushKey,
    PushValue,
    Commit,
}

/// The transition table.
///
/// Quotes are noise in every state. Whitespace is noise between pairs and
/// is trimmed from the ends of keys and values at commit time, so padding
/// around `:` and `,` never reaches the record.
fn transition(state: ScanState, class: CharClass) -> (ScanState, Action) {
    use Action::*;
    use CharClass::*;
    use ScanState::*;

    match (state, class) {
        (_, Quote) => (state, Ignore),

        (Skip, Space | Comma | OpenObject | CloseObject) => (Skip, Ignore),
        (Skip, Colon) => (Value, Ignore),
        (Skip, _) => (Key, PushKey),

        (Key, Colon) => (Value, Ignore),
        (Key, Comma | CloseObject) => (Skip, Commit),
        (Key, _) => (Key, PushKey),

        (Value, OpenList) => (ListValue, PushValue),
        (Value, Comma | CloseObject) => (Skip, Commit),
        (Value, _) => (Value, PushValue),

        (ListValue, CloseList) => (Value, PushValue),
        (ListValue, _) => (ListValue, PushValue),
    }
}

/// Decodes one flat textual record (`{"k":"v",...}`) into a `FlatRecord`.
///
/// The decoder is tolerant by contract:
/// - It never fails and never panics
/// - Nested objects, escapes and typed values are not interpreted
/// - A pair is committed only by `,` or `}` outside list mode; a trailing
///   unterminated pair is dropped
pub struct FlatRecordDecoder;

impl FlatRecordDecoder {
    /// Decodes `input` into a fresh record.
    pub fn decode(input: &str) -> FlatRecord {
        let mut record = FlatRecord::new();
        let mut state = ScanState::Skip;
        let mut key = String::new();
        let mut value = String::new();

        for c in input.chars() {
            let (next, action) = transition(state, CharClass::of(c));
            match action {
                Action::Ignore => {}
                Action::PushKey => key.push(c),
                Action::PushValue => value.push(c),
                Action::Commit => {
                    let k = key.trim();
                    if !k.is_empty() {
                        record.insert(k, value.trim());
                    }
                    key.clear();
                    value.clear();
                }
            }
            state = next;
        }

        record
    }

    /// Decodes `input` into `record`, replacing its content.
    ///
    /// Empty or unparseable input leaves `record` untouched. Returns whether
    /// the record was replaced.
    pub fn decode_into(record: &mut FlatRecord, input: &str) -> bool {
        let decoded = Self::decode(input);
        if decoded.is_empty() {
            return false;
        }
        *record = decoded;
        true
    }
}
