use std::collections::HashMap;

/// Header fields of a message or message part, keyed case-insensitively.
///
/// When a field name repeats, the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: HashMap<String, String>,
}

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Lower-cased names with their values, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn insert(&mut self, name: &str, raw_value: &str) {
        let value = raw_value.split_whitespace().collect::<Vec<_>>().join(" ");
        self.fields.insert(name.to_ascii_lowercase(), value);
    }
}

/// Splits raw text at its first empty line into the header block and the body.
///
/// Both CRLF and bare LF line endings are accepted. Without an empty line, everything is
/// treated as header block.
pub(crate) fn split_header_block(data: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in data.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            return (&data[..offset], &data[offset + line.len()..]);
        }
        offset += line.len();
    }
    (data, "")
}

/// Parses the header block of `data`. Never fails; unrecognised lines are skipped.
///
/// A field starts at a line of the form `name:value` where `name` is non-empty and holds no
/// whitespace. Lines starting with a space or tab continue the previous field. Whitespace runs
/// in the value collapse to a single space.
pub(crate) fn parse(data: &str) -> Headers {
    let (block, _) = split_header_block(data);
    let mut headers = Headers::default();
    let mut current: Option<(&str, String)> = None;

    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line);
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            headers.insert(name, &value);
        }

        current = line
            .split_once(':')
            .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
            .map(|(name, value)| (name, value.to_string()));
    }

    if let Some((name, value)) = current {
        headers.insert(name, &value);
    }
    headers
}
