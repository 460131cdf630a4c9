//! Response decoder.
//!
//! Decoding runs in three steps: the body is transcoded to UTF-8 according
//! to its BOM or XML declaration, parsed into a small element tree with
//! `quick-xml`, and the tree is then read as a `<methodResponse>`.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::error::RpcError;
use super::message::MethodResponse;
use super::value::{Member, Value};

/// Decodes response bytes into a [`MethodResponse`].
///
/// Fails with [`RpcError::Malformed`] when the charset is unknown or the
/// bytes do not fit it, when the XML is not well formed, or when the
/// document is neither a fault nor a result.
pub fn decode_response(bytes: &[u8]) -> Result<MethodResponse, RpcError> {
    let xml = transcode(bytes)?;
    let root = parse_tree(&xml)?;

    if root.name != "methodResponse" {
        return Err(RpcError::malformed(format!(
            "unexpected root element <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault
            .child("value")
            .ok_or_else(|| RpcError::malformed("<fault> without <value>"))?;
        return Ok(MethodResponse::Fault(decode_value(value)?));
    }

    if let Some(params) = root.child("params") {
        let value = params
            .child("param")
            .and_then(|p| p.child("value"))
            .ok_or_else(|| RpcError::malformed("<params> without <param><value>"))?;
        return Ok(MethodResponse::Success(decode_value(value)?));
    }

    Err(RpcError::malformed(
        "response holds neither <fault> nor <params>",
    ))
}

// ---------------------------------------------------------------------------
// Charset handling
// ---------------------------------------------------------------------------

fn transcode(bytes: &[u8]) -> Result<String, RpcError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => {
            let encoding = match declared_encoding(bytes) {
                Some(label) => Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                    RpcError::malformed(format!("unsupported charset {label:?}"))
                })?,
                None => UTF_8,
            };
            (encoding, bytes)
        }
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(Cow::into_owned)
        .ok_or_else(|| {
            RpcError::malformed(format!("body is not valid {}", encoding.name()))
        })
}

/// Reads the `encoding` pseudo-attribute of a leading `<?xml ...?>`.
fn declared_encoding(bytes: &[u8]) -> Option<&str> {
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let end = bytes.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&bytes[..end]).ok()?;

    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, RpcError> {
        let name = std::str::from_utf8(start.local_name().as_ref())
            .map_err(|e| RpcError::malformed(format!("invalid element name: {e}")))?
            .to_string();
        Ok(Self {
            name,
            ..Default::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Element, RpcError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| RpcError::malformed(format!("xml syntax error: {e}")))?;

        match event {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => attach(&mut stack, &mut root, Element::open(&start)?)?,
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| RpcError::malformed("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(open) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| RpcError::malformed(format!("bad text content: {e}")))?;
                    open.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(open) = stack.last_mut() {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| RpcError::malformed(format!("bad CDATA content: {e}")))?;
                    open.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(RpcError::malformed(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| RpcError::malformed("empty document"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), RpcError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(RpcError::malformed("more than one root element")),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

fn decode_value(element: &Element) -> Result<Value, RpcError> {
    let typed = match element.children.as_slice() {
        [] => {
            let text = element.text.trim();
            return Ok(if text.is_empty() {
                Value::Void
            } else {
                Value::RawText(text.to_string())
            });
        }
        [typed] => typed,
        _ => {
            return Err(RpcError::malformed(
                "<value> holds more than one typed element",
            ));
        }
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" => text
            .parse()
            .map(Value::Int)
            .map_err(|e| RpcError::malformed(format!("bad <{}> {text:?}: {e}", typed.name))),
        "double" => match text.parse::<f64>() {
            Ok(d) if d.is_finite() => Ok(Value::Double(d)),
            Ok(_) => Err(RpcError::malformed(format!("non-finite <double> {text:?}"))),
            Err(e) => Err(RpcError::malformed(format!("bad <double> {text:?}: {e}"))),
        },
        "boolean" => match text {
            "0" => Ok(Value::Boolean(false)),
            "1" => Ok(Value::Boolean(true)),
            other => Err(RpcError::malformed(format!("bad <boolean> {other:?}"))),
        },
        // String content is kept as is, whitespace included.
        "string" => Ok(Value::String(typed.text.clone())),
        "dateTime.iso8601" => Ok(Value::DateTime(text.to_string())),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(|e| RpcError::malformed(format!("bad <base64>: {e}")))
        }
        "struct" => typed
            .children
            .iter()
            .map(decode_member)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Struct),
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| RpcError::malformed("<array> without <data>"))?;
            data.children
                .iter()
                .map(|item| {
                    if item.name != "value" {
                        return Err(RpcError::malformed(format!(
                            "unexpected <{}> in <data>",
                            item.name
                        )));
                    }
                    decode_value(item)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Err(RpcError::malformed(format!("unknown value type <{other}>"))),
    }
}

fn decode_member(member: &Element) -> Result<Member, RpcError> {
    if member.name != "member" {
        return Err(RpcError::malformed(format!(
            "unexpected <{}> in <struct>",
            member.name
        )));
    }
    let name = member
        .child("name")
        .ok_or_else(|| RpcError::malformed("<member> without <name>"))?;
    let value = member
        .child("value")
        .ok_or_else(|| RpcError::malformed(format!("member {:?} without <value>", name.text)))?;
    Ok(Member::new(name.text.trim(), decode_value(value)?))
}
