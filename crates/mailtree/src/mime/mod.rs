//! MIME part abstraction shared by ingest and export
//!
//! Ingest walks anything implementing [`MimePart`]; export produces an
//! owned [`MessagePart`] tree that can be serialized back to RFC 822 bytes.

mod serialize;

use serde::{Deserialize, Serialize};

/// One part of a parsed message, as seen by the ingest walk
pub trait MimePart: Sized {
    /// Header (name, value) pairs in original order
    fn header_pairs(&self) -> Vec<(String, String)>;

    /// Bytes stored for this part. Container parts store an empty payload.
    fn payload(&self) -> Vec<u8>;

    /// Child parts in original order
    fn subparts(&self) -> &[Self];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An owned message part tree, as rebuilt from storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub headers: Vec<Header>,
    pub payload: Vec<u8>,
    pub children: Vec<MessagePart>,
}

impl MessagePart {
    /// A leaf part with the given payload
    pub fn leaf(headers: Vec<Header>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            payload: payload.into(),
            children: Vec::new(),
        }
    }

    /// A container part holding `children`
    pub fn multipart(headers: Vec<Header>, children: Vec<MessagePart>) -> Self {
        Self {
            headers,
            payload: Vec::new(),
            children,
        }
    }

    /// First header with `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Number of parts in this tree, including this one
    pub fn part_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(part) = stack.pop() {
            count += 1;
            stack.extend(part.children.iter());
        }
        count
    }
}

impl MimePart for MessagePart {
    fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect()
    }

    fn payload(&self) -> Vec<u8> {
        self.payload.clone()
    }

    fn subparts(&self) -> &[Self] {
        &self.children
    }
}

impl Drop for MessagePart {
    // Unlink children iteratively so dropping a deeply nested tree cannot
    // overflow the stack.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut part) = pending.pop() {
            pending.append(&mut part.children);
        }
    }
}

impl<'a> MimePart for mailparse::ParsedMail<'a> {
    fn header_pairs(&self) -> Vec<(String, String)> {
        // Raw values keep folding and encoded-words as received
        self.headers
            .iter()
            .map(|h| {
                (
                    h.get_key(),
                    String::from_utf8_lossy(h.get_value_raw()).into_owned(),
                )
            })
            .collect()
    }

    fn payload(&self) -> Vec<u8> {
        if !self.subparts.is_empty() {
            return Vec::new();
        }
        // Keep the transfer encoding so export writes back what arrived
        match self.get_body_encoded() {
            mailparse::body::Body::Base64(body) | mailparse::body::Body::QuotedPrintable(body) => {
                body.get_raw().to_vec()
            }
            mailparse::body::Body::SevenBit(body) | mailparse::body::Body::EightBit(body) => {
                body.get_raw().to_vec()
            }
            mailparse::body::Body::Binary(body) => body.get_raw().to_vec(),
        }
    }

    fn subparts(&self) -> &[Self] {
        &self.subparts
    }
}
