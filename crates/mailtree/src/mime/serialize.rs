//! RFC 822 serialization of a rebuilt message

use std::io::{self, Write};

use super::MessagePart;

enum Step<'a> {
    Part(&'a MessagePart, usize),
    /// Delimiter line; written on a fresh line
    Delimiter(String),
}

/// Writer that remembers whether output currently ends a line
struct LineTracker<W> {
    inner: W,
    at_line_start: bool,
}

impl<W: Write> LineTracker<W> {
    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(&last) = bytes.last() {
            self.inner.write_all(bytes)?;
            self.at_line_start = last == b'\n';
        }
        Ok(())
    }

    fn start_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            self.put(b"\r\n")?;
        }
        Ok(())
    }
}

impl MessagePart {
    /// Serialize headers and body, framing children with the part's
    /// Content-Type boundary (generated if the header lacks one)
    pub fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut out = LineTracker {
            inner: writer,
            at_line_start: true,
        };
        let mut stack = vec![Step::Part(self, 0)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Delimiter(line) => {
                    out.start_line()?;
                    out.put(line.as_bytes())?;
                }
                Step::Part(part, depth) => {
                    let boundary = if part.children.is_empty() {
                        None
                    } else {
                        Some(part.boundary(depth))
                    };
                    // A generated boundary has to be declared, or readers
                    // see one opaque body instead of the child parts
                    let mut undeclared = match &boundary {
                        Some(Boundary::Generated(b)) => Some(b.as_str()),
                        _ => None,
                    };

                    for header in &part.headers {
                        out.put(header.name.as_bytes())?;
                        out.put(b": ")?;
                        out.put(header.value.as_bytes())?;
                        if header.name.eq_ignore_ascii_case("Content-Type") {
                            if let Some(b) = undeclared.take() {
                                out.put(format!("; boundary=\"{}\"", b).as_bytes())?;
                            }
                        }
                        out.put(b"\r\n")?;
                    }
                    if let Some(b) = undeclared {
                        let line = format!("Content-Type: multipart/mixed; boundary=\"{}\"\r\n", b);
                        out.put(line.as_bytes())?;
                    }
                    out.put(b"\r\n")?;
                    out.put(&part.payload)?;

                    let Some(boundary) = boundary else {
                        continue;
                    };
                    let boundary = boundary.as_str();
                    stack.push(Step::Delimiter(format!("--{}--\r\n", boundary)));
                    for child in part.children.iter().rev() {
                        stack.push(Step::Part(child, depth + 1));
                        stack.push(Step::Delimiter(format!("--{}\r\n", boundary)));
                    }
                }
            }
        }
        out.inner.flush()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut buf);
        buf
    }

    fn boundary(&self, depth: usize) -> Boundary {
        self.header("Content-Type")
            .map(mailparse::parse_content_type)
            .and_then(|ctype| ctype.params.get("boundary").cloned())
            .filter(|b| !b.is_empty())
            .map(Boundary::Declared)
            .unwrap_or_else(|| Boundary::Generated(format!("=_mailtree_{}", depth)))
    }
}

enum Boundary {
    /// Taken from the part's Content-Type header
    Declared(String),
    Generated(String),
}

impl Boundary {
    fn as_str(&self) -> &str {
        match self {
            Boundary::Declared(b) | Boundary::Generated(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Header, MimePart};
    use super::*;

    fn sample() -> MessagePart {
        MessagePart::multipart(
            vec![
                Header::new("Subject", "greetings"),
                Header::new("Content-Type", "multipart/alternative; boundary=\"sep\""),
            ],
            vec![
                MessagePart::leaf(vec![Header::new("Content-Type", "text/plain")], "hello\r\n"),
                MessagePart::leaf(vec![Header::new("Content-Type", "text/html")], "<p>hello</p>"),
            ],
        )
    }

    #[test]
    fn test_multipart_layout() {
        let bytes = sample().to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Subject: greetings\r\n\
             Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
             \r\n\
             --sep\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             hello\r\n\
             --sep\r\n\
             Content-Type: text/html\r\n\
             \r\n\
             <p>hello</p>\r\n\
             --sep--\r\n"
        );
    }

    #[test]
    fn test_serialized_message_parses_back() {
        let original = sample();
        let bytes = original.to_bytes();
        let parsed = mailparse::parse_mail(&bytes).unwrap();

        assert_eq!(parsed.header_pairs(), original.header_pairs());
        let children = MimePart::subparts(&parsed);
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].header_pairs(), original.children[1].header_pairs());
    }

    #[test]
    fn test_generated_boundary_is_declared() {
        let part = MessagePart::multipart(
            vec![Header::new("Content-Type", "multipart/mixed")],
            vec![MessagePart::leaf(Vec::new(), "a"), MessagePart::leaf(Vec::new(), "b")],
        );
        let bytes = part.to_bytes();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("Content-Type: multipart/mixed; boundary=\"=_mailtree_0\"\r\n"));

        let parsed = mailparse::parse_mail(&bytes).unwrap();
        let children = MimePart::subparts(&parsed);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].get_body_raw().unwrap(), b"a");
        assert_eq!(children[1].get_body_raw().unwrap(), b"b");
    }

    #[test]
    fn test_headerless_multipart_gets_content_type() {
        let inner = MessagePart::multipart(
            Vec::new(),
            vec![MessagePart::leaf(Vec::new(), "x"), MessagePart::leaf(Vec::new(), "y")],
        );
        let part = MessagePart::multipart(
            vec![Header::new("Subject", "bare")],
            vec![inner, MessagePart::leaf(Vec::new(), "z")],
        );
        let bytes = part.to_bytes();

        let parsed = mailparse::parse_mail(&bytes).unwrap();
        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        let children = MimePart::subparts(&parsed);
        assert_eq!(children.len(), 2);
        assert_eq!(MimePart::subparts(&children[0]).len(), 2);
        assert_eq!(children[1].get_body_raw().unwrap(), b"z");
    }

    #[test]
    fn test_leaf_message() {
        let part = MessagePart::leaf(vec![Header::new("Subject", "hi")], "hello");
        assert_eq!(part.to_bytes(), b"Subject: hi\r\n\r\nhello");
    }
}
