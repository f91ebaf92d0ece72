pub(crate) mod access;
pub(crate) mod normalize;

use log::debug;
use thiserror::Error;

pub(crate) const HEADER_SEGMENT: &str = "MSH";
pub(crate) const REPETITION_SEPARATOR: char = '~';
pub(crate) const COMPONENT_SEPARATOR: char = '^';

#[derive(Error, Debug, PartialEq)]
pub(crate) enum ParseError {
    #[error("HL7 parse error: empty message")]
    Empty,
    #[error("HL7 parse error: missing MSH segment")]
    MissingHeader,
    #[error("HL7 parse error: invalid MSH segment")]
    InvalidHeader,
}

/// A tokenized HL7v2 message. Never mutated after [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Message {
    pub(crate) raw: String,
    pub(crate) field_separator: char,
    pub(crate) segments: Vec<Segment>,
}

/// One segment line. `fields` is 1-based: index 0 is always empty.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    pub(crate) name: String,
    pub(crate) raw: String,
    pub(crate) fields: Vec<String>,
}

impl Segment {
    fn tokenize(line: &str, separator: char) -> Self {
        let mut parts = line.split(separator);
        let name = parts.next().unwrap_or_default().to_owned();

        let mut fields = vec![String::new()];
        // MSH-1 is the separator itself and is consumed by the split
        if name == HEADER_SEGMENT {
            fields.push(separator.to_string());
        }
        fields.extend(parts.map(str::to_owned));

        Segment {
            name,
            raw: line.to_owned(),
            fields,
        }
    }
}

pub(crate) fn parse(text: &str) -> Result<Message, ParseError> {
    let normalized = text.replace('\n', "\r");
    let lines: Vec<&str> = normalized
        .split('\r')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(ParseError::Empty);
    }

    let field_separator = detect_field_separator(&lines)?;
    let segments: Vec<Segment> = lines
        .iter()
        .map(|l| Segment::tokenize(l, field_separator))
        .collect();

    let msg = Message {
        raw: text.to_owned(),
        field_separator,
        segments,
    };
    debug!(
        "Tokenized {} segments from {} bytes (field separator '{}')",
        msg.segments.len(),
        msg.raw.len(),
        msg.field_separator
    );

    Ok(msg)
}

fn detect_field_separator(lines: &[&str]) -> Result<char, ParseError> {
    let header = lines
        .iter()
        .find(|l| l.starts_with(HEADER_SEGMENT))
        .ok_or(ParseError::MissingHeader)?;

    header.chars().nth(3).ok_or(ParseError::InvalidHeader)
}
