//! Content negotiation: turns a response body into a [`Payload`] based on its declared type.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::warn;

use super::Payload;
use crate::error::DecodeError;

/// The closed set of body decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
  Json,
  Xml,
  FormUrlEncoded,
  Yaml,
  Text,
  Csv,
  /// Unrecognised type: body is returned as-is.
  Passthrough,
}

/// Media type prefix → decoder. Matched in order, case-sensitive.
const DECODERS: &[(&str, Decoder)] = &[
  ("application/json", Decoder::Json),
  ("application/xml", Decoder::Xml),
  ("application/x-www-form-urlencoded", Decoder::FormUrlEncoded),
  ("application/yaml", Decoder::Yaml),
  ("text/plain", Decoder::Text),
  ("text/html", Decoder::Text),
  ("text/csv", Decoder::Csv),
];

impl Decoder {
  /// Pick the decoder for a `Content-Type` header value, ignoring parameters such as charset.
  pub fn for_content_type(content_type: &str) -> Self {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    DECODERS
      .iter()
      .find(|(prefix, _)| essence.starts_with(prefix))
      .map(|(_, decoder)| *decoder)
      .unwrap_or(Decoder::Passthrough)
  }

  pub fn decode(self, body: &str) -> Result<Payload, DecodeError> {
    match self {
      Decoder::Json => Ok(serde_json::from_str(body)?),
      Decoder::Xml => decode_xml(body),
      Decoder::FormUrlEncoded => Ok(decode_form(body)),
      Decoder::Yaml => Ok(serde_yaml::from_str(body)?),
      Decoder::Text | Decoder::Passthrough => Ok(Value::String(body.to_string())),
      Decoder::Csv => decode_csv(body),
    }
  }
}

/// Decode a body according to its declared content type.
///
/// Unknown or missing types never fail; they are logged and passed through as text.
pub fn decode_body(content_type: Option<&str>, body: &str) -> Result<Payload, DecodeError> {
  let content_type = content_type.unwrap_or_default();
  let decoder = Decoder::for_content_type(content_type);
  if decoder == Decoder::Passthrough {
    warn!(content_type, "Unknown content type, returning raw body");
  }
  decoder.decode(body)
}

fn decode_form(body: &str) -> Payload {
  let mut map = Map::new();
  for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
    if value.is_empty() {
      continue;
    }
    let values = map
      .entry(key.into_owned())
      .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(values) = values {
      values.push(Value::String(value.into_owned()));
    }
  }
  Value::Object(map)
}

fn decode_csv(body: &str) -> Result<Payload, DecodeError> {
  let mut reader = csv::ReaderBuilder::new()
    .flexible(true)
    .from_reader(body.as_bytes());
  let headers = reader.headers()?.clone();

  let mut rows = Vec::new();
  for record in reader.records() {
    let record = record?;
    let row: Map<String, Value> = headers
      .iter()
      .enumerate()
      .map(|(i, header)| {
        let value = record
          .get(i)
          .map(|v| Value::String(v.to_string()))
          .unwrap_or(Value::Null);
        (header.to_string(), value)
      })
      .collect();
    rows.push(Value::Object(row));
  }

  Ok(Value::Array(rows))
}

/// An element being assembled while its children are still being read.
struct XmlNode {
  name: String,
  children: Map<String, Value>,
  text: String,
}

impl XmlNode {
  fn open(start: &BytesStart<'_>) -> Result<Self, DecodeError> {
    let mut children = Map::new();
    for attr in start.attributes() {
      let attr = attr.map_err(quick_xml::Error::from)?;
      let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
      let value = attr.unescape_value()?.into_owned();
      children.insert(key, Value::String(value));
    }

    Ok(Self {
      name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
      children,
      text: String::new(),
    })
  }

  fn root() -> Self {
    Self {
      name: String::new(),
      children: Map::new(),
      text: String::new(),
    }
  }

  fn into_value(self) -> Value {
    match (self.children.is_empty(), self.text.is_empty()) {
      (true, true) => Value::Null,
      (true, false) => Value::String(self.text),
      (false, true) => Value::Object(self.children),
      (false, false) => {
        let mut children = self.children;
        children.insert("#text".to_string(), Value::String(self.text));
        Value::Object(children)
      }
    }
  }

  /// Repeated child names collapse into a sequence.
  fn adopt(&mut self, name: String, value: Value) {
    match self.children.get_mut(&name) {
      Some(Value::Array(items)) => items.push(value),
      Some(existing) => {
        let first = existing.take();
        *existing = Value::Array(vec![first, value]);
      }
      None => {
        self.children.insert(name, value);
      }
    }
  }
}

fn decode_xml(body: &str) -> Result<Payload, DecodeError> {
  let mut reader = Reader::from_str(body);
  reader.config_mut().trim_text(true);

  let mut stack = vec![XmlNode::root()];
  loop {
    match reader.read_event()? {
      Event::Start(start) => stack.push(XmlNode::open(&start)?),
      Event::Empty(start) => {
        let node = XmlNode::open(&start)?;
        let parent = stack
          .last_mut()
          .ok_or(DecodeError::XmlStructure("element outside document"))?;
        let name = node.name.clone();
        parent.adopt(name, node.into_value());
      }
      Event::End(_) => {
        if stack.len() < 2 {
          return Err(DecodeError::XmlStructure("unbalanced closing tag"));
        }
        let node = stack
          .pop()
          .ok_or(DecodeError::XmlStructure("unbalanced closing tag"))?;
        let name = node.name.clone();
        if let Some(parent) = stack.last_mut() {
          parent.adopt(name, node.into_value());
        }
      }
      Event::Text(text) => {
        if let Some(node) = stack.last_mut() {
          node.text.push_str(&text.unescape()?);
        }
      }
      Event::CData(data) => {
        if let Some(node) = stack.last_mut() {
          node.text.push_str(&String::from_utf8_lossy(&data));
        }
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if stack.len() != 1 {
    return Err(DecodeError::XmlStructure("unexpected end of document"));
  }
  let root = stack.pop().ok_or(DecodeError::XmlStructure("empty document"))?;
  Ok(Value::Object(root.children))
}
