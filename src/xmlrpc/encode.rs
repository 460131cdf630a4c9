//! Request encoder.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::escape;

use super::error::RpcError;
use super::message::MethodCall;
use super::value::Value;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Serializes a method call to request bytes.
///
/// `<params>` is written even when there are no parameters: the pGuide
/// server rejects calls that leave it out. NaN and infinite doubles have no
/// XML-RPC form and fail with [`RpcError::Encode`].
pub fn encode_call(call: &MethodCall) -> Result<Vec<u8>, RpcError> {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECLARATION);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(call.method_name.as_str()));
    out.push_str("</methodName><params>");
    for param in &call.params {
        out.push_str("<param>");
        write_value(&mut out, param)?;
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    Ok(out.into_bytes())
}

fn write_value(out: &mut String, value: &Value) -> Result<(), RpcError> {
    out.push_str("<value>");
    match value {
        Value::Int(i) => write_scalar(out, "int", &i.to_string()),
        Value::Double(d) if !d.is_finite() => {
            return Err(RpcError::Encode(format!("non-finite double {d}")));
        }
        Value::Double(d) => write_scalar(out, "double", &d.to_string()),
        Value::Boolean(b) => write_scalar(out, "boolean", if *b { "1" } else { "0" }),
        Value::String(s) => write_scalar(out, "string", &escape(s.as_str())),
        Value::DateTime(s) => write_scalar(out, "dateTime.iso8601", &escape(s.as_str())),
        Value::Base64(bytes) => write_scalar(out, "base64", &STANDARD.encode(bytes)),
        Value::Struct(members) => {
            out.push_str("<struct>");
            for m in members {
                out.push_str("<member><name>");
                out.push_str(&escape(m.name.as_str()));
                out.push_str("</name>");
                write_value(out, &m.value)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item)?;
            }
            out.push_str("</data></array>");
        }
        Value::RawText(s) => out.push_str(&escape(s.as_str())),
        Value::Void => {}
    }
    out.push_str("</value>");
    Ok(())
}

fn write_scalar(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}
