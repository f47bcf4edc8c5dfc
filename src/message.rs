use crate::address::EmailAddress;
use crate::headers::{self, Headers};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// One SMTP payload, in progress or complete.
///
/// Raw DATA text only ever grows through [`append`](Message::append); the parsed header view is
/// memoised and dropped on every append, so it always reflects the current text.
#[derive(Debug, Clone)]
pub struct Message {
    data: String,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    received_at: DateTime<Utc>,
    headers: OnceLock<Headers>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    pub fn new() -> Self {
        Self {
            data: String::new(),
            from: None,
            to: Vec::new(),
            received_at: Utc::now(),
            headers: OnceLock::new(),
        }
    }

    pub fn append(&mut self, text: &str) {
        self.data.push_str(text);
        self.headers.take();
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// When this message was started.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn from_address(&self) -> Option<&EmailAddress> {
        self.from.as_ref()
    }

    pub fn set_from_address(&mut self, address: EmailAddress) {
        self.from = Some(address);
    }

    pub fn to_addresses(&self) -> &[EmailAddress] {
        &self.to
    }

    pub fn add_to_address(&mut self, address: EmailAddress) {
        self.to.push(address);
    }

    pub fn headers(&self) -> &Headers {
        self.headers.get_or_init(|| headers::parse(&self.data))
    }

    pub fn subject(&self) -> &str {
        self.header_or_empty("subject")
    }

    pub fn priority(&self) -> &str {
        self.header_or_empty("priority")
    }

    pub fn importance(&self) -> &str {
        self.header_or_empty("importance")
    }

    pub fn x_priority(&self) -> &str {
        self.header_or_empty("x-priority")
    }

    fn header_or_empty(&self, name: &str) -> &str {
        self.headers().get(name).unwrap_or("")
    }

    /// Splits the payload into MIME parts.
    ///
    /// Anything other than `multipart/mixed` comes back as a single part holding the whole
    /// payload. A `multipart/mixed` message without a boundary parameter has no parts.
    pub fn body_parts(&self) -> Vec<MessagePart> {
        let Some(content_type) = self.headers().get("content-type") else {
            return vec![MessagePart::new(&self.data)];
        };
        if !content_type.to_ascii_lowercase().contains("multipart/mixed") {
            return vec![MessagePart::new(&self.data)];
        }
        match boundary_param(content_type) {
            Some(boundary) => split_parts(&self.data, boundary),
            None => Vec::new(),
        }
    }
}

/// A slice of a multipart payload between two boundary lines.
#[derive(Debug, Clone)]
pub struct MessagePart {
    data: String,
    headers: OnceLock<Headers>,
}

impl MessagePart {
    fn new(data: &str) -> Self {
        Self {
            data: data.to_string(),
            headers: OnceLock::new(),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn headers(&self) -> &Headers {
        self.headers.get_or_init(|| headers::parse(&self.data))
    }

    /// Text before the part's first empty line.
    pub fn header_data(&self) -> &str {
        headers::split_header_block(&self.data).0
    }

    /// Text after the part's first empty line.
    pub fn body_data(&self) -> &str {
        headers::split_header_block(&self.data).1
    }
}

// Value of the boundary parameter, quoted or bare. Only whole parameter names match.
fn boundary_param(content_type: &str) -> Option<&str> {
    let mut rest = content_type;
    while let Some(semi) = rest.find(';') {
        rest = rest[semi + 1..].trim_start();
        let Some((name, value)) = rest.split_once('=') else {
            break;
        };
        if !name.trim_end().eq_ignore_ascii_case("boundary") {
            continue;
        }

        let value = value.trim_start();
        let value = match value.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next()?,
            None => value
                .split(|c: char| c == ';' || c.is_whitespace())
                .next()?,
        };
        return (!value.is_empty()).then_some(value);
    }
    None
}

// Parts are the text strictly between consecutive lines starting with "--<boundary>";
// the preamble and the epilogue are dropped.
fn split_parts(data: &str, boundary: &str) -> Vec<MessagePart> {
    let marker = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start = None;
    let mut offset = 0;

    for line in data.split_inclusive('\n') {
        if line.starts_with(&marker) {
            if let Some(start) = part_start {
                parts.push(MessagePart::new(&data[start..offset]));
            }
            part_start = Some(offset + line.len());
        }
        offset += line.len();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: a@b.c\r\n\
        Content-Type: multipart/mixed; boundary=XYZ\r\n\
        \r\n\
        This is the preamble.\r\n\
        --XYZ\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        first part\r\n\
        --XYZ\r\n\
        Content-Type: text/html\r\n\
        Content-Disposition: inline\r\n\
        \r\n\
        <b>second</b>\r\n\
        --XYZ--\r\n\
        epilogue\r\n";

    fn message(raw: &str) -> Message {
        let mut message = Message::new();
        message.append(raw);
        message
    }

    #[test]
    fn test_headers_and_priority_lookups() {
        let message = message("Subject: Test\nX-Priority: 1\n\nbody text\n");
        assert_eq!(message.headers().len(), 2);
        assert_eq!(message.headers().get("subject"), Some("Test"));
        assert_eq!(message.headers().get("x-priority"), Some("1"));
        assert_eq!(message.subject(), "Test");
        assert_eq!(message.priority(), "");
        assert_eq!(message.importance(), "");
        assert_eq!(message.x_priority(), "1");
    }

    #[test]
    fn test_headers_are_stable_without_append() {
        let message = message("Importance: high\r\n\r\nbody\r\n");
        let first = message.headers().clone();
        assert_eq!(&first, message.headers());
        assert_eq!(message.data(), "Importance: high\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_append_invalidates_parsed_headers() {
        let mut message = Message::new();
        message.append("Subject: partial\r\n");
        assert_eq!(message.headers().len(), 1);
        assert_eq!(message.priority(), "");

        message.append("Priority: urgent\r\n\r\nbody\r\n");
        assert_eq!(message.headers().len(), 2);
        assert_eq!(message.priority(), "urgent");
    }

    #[test]
    fn test_single_part_without_content_type() {
        let message = message("Subject: plain\r\n\r\nhello\r\n");
        let parts = message.body_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data(), message.data());
        assert_eq!(parts[0].body_data(), "hello\r\n");
    }

    #[test]
    fn test_single_part_for_other_multipart_types() {
        let message =
            message("Content-Type: multipart/alternative; boundary=b\r\n\r\n--b\r\nx\r\n--b--\r\n");
        assert_eq!(message.body_parts().len(), 1);
    }

    #[test]
    fn test_multipart_mixed_parts_in_order() {
        let message = message(MULTIPART);
        let parts = message.body_parts();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].data(), "Content-Type: text/plain\r\n\r\nfirst part\r\n");
        assert_eq!(parts[0].headers().get("content-type"), Some("text/plain"));
        assert_eq!(parts[0].header_data(), "Content-Type: text/plain\r\n");
        assert_eq!(parts[0].body_data(), "first part\r\n");

        assert_eq!(parts[1].headers().get("content-type"), Some("text/html"));
        assert_eq!(parts[1].headers().get("content-disposition"), Some("inline"));
        assert_eq!(parts[1].body_data(), "<b>second</b>\r\n");
    }

    #[test]
    fn test_quoted_boundary_with_metacharacters() {
        let raw = "Content-Type: Multipart/Mixed;\r\n boundary=\"a.b+c(1)\"\r\n\r\n\
            --a.b+c(1)\r\none\r\n--a.b+c(1)\r\ntwo\r\n--a.b+c(1)--\r\n";
        let parts = message(raw).body_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].data(), "one\r\n");
        assert_eq!(parts[1].data(), "two\r\n");
    }

    #[test]
    fn test_multipart_without_boundary_has_no_parts() {
        let message = message("Content-Type: multipart/mixed\r\n\r\nbody\r\n");
        assert!(message.body_parts().is_empty());
    }

    #[test]
    fn test_unterminated_multipart_keeps_closed_parts_only() {
        let raw = "Content-Type: multipart/mixed; boundary=Z\r\n\r\n--Z\r\none\r\n--Z\r\ntwo never closed\r\n";
        let parts = message(raw).body_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data(), "one\r\n");
    }

    #[test]
    fn test_boundary_param() {
        assert_eq!(boundary_param("multipart/mixed; boundary=XYZ"), Some("XYZ"));
        assert_eq!(boundary_param("multipart/mixed; BOUNDARY=\"q r\"; x=1"), Some("q r"));
        assert_eq!(boundary_param("multipart/mixed; boundary=abc; charset=x"), Some("abc"));
        assert_eq!(boundary_param("multipart/mixed; boundary="), None);
        assert_eq!(boundary_param("multipart/mixed"), None);
        assert_eq!(boundary_param("multipart/mixed; xboundary=NO; boundary=YES"), Some("YES"));
        assert_eq!(boundary_param("multipart/mixed; xboundary=NO"), None);
    }

    #[test]
    fn test_boundary_is_not_taken_from_similar_parameter() {
        let raw = "Content-Type: multipart/mixed; xboundary=NO; boundary=YES\r\n\r\n\
            --YES\r\none\r\n--YES\r\ntwo\r\n--YES--\r\n";
        let parts = message(raw).body_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].data(), "one\r\n");
        assert_eq!(parts[1].data(), "two\r\n");
    }

    #[test]
    fn test_envelope_addresses() {
        let mut message = Message::new();
        assert!(message.from_address().is_none());
        message.set_from_address("<from@Example.com>".parse().unwrap());
        message.add_to_address("a@example.com".parse().unwrap());
        message.add_to_address("b@example.com".parse().unwrap());

        assert_eq!(message.from_address().unwrap().as_str(), "from@example.com");
        assert_eq!(message.to_addresses().len(), 2);
        assert_eq!(message.to_addresses()[1].as_str(), "b@example.com");
        assert!(message.received_at() <= Utc::now());
    }
}
