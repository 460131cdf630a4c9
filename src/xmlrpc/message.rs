use super::error::RpcError;
use super::value::Value;

/// An outgoing `<methodCall>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, value: Value) -> Self {
        self.params.push(value);
        self
    }
}

/// A decoded `<methodResponse>`: either a result or a fault, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Value),
}

impl MethodResponse {
    /// Returns the result value, turning a fault envelope into [`RpcError::Fault`].
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(value) => {
                let fault = Fault::from_value(&value)?;
                Err(RpcError::Fault {
                    code: fault.code,
                    message: fault.message,
                })
            }
        }
    }
}

/// The `faultCode` / `faultString` pair of a fault envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    /// Reads a fault struct. `faultCode` is required, `faultString` may be missing.
    pub fn from_value(value: &Value) -> Result<Self, RpcError> {
        if value.as_struct().is_none() {
            return Err(RpcError::malformed(format!(
                "fault holds a {} instead of a struct",
                value.kind()
            )));
        }
        let code = value
            .member("faultCode")
            .and_then(Value::as_int)
            .ok_or_else(|| RpcError::malformed("fault struct without integer faultCode"))?;
        let message = value
            .member("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self { code, message })
    }
}
