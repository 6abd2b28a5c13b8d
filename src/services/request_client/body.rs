//! Request body normalization.
//!
//! - String, url-encoded form and multipart bodies pass through unmodified.
//! - Anything else is serialized to JSON.
use serde::Serialize;
use serde_json::Value;

pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Form(Vec<(String, String)>),
    Multipart(MultipartForm),
}

impl RequestBody {
    /// JSON body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(RequestBody::Json)
    }

    /// Wire body plus the content type it implies (if any).
    ///
    /// Multipart returns `None`: the boundary is only known to the transport.
    pub(crate) fn normalize(self) -> Result<(TransportBody, Option<&'static str>), serde_json::Error> {
        match self {
            RequestBody::Json(value) => Ok((
                TransportBody::Text(serde_json::to_string(&value)?),
                Some(APPLICATION_JSON),
            )),
            RequestBody::Text(text) => Ok((TransportBody::Text(text), Some(APPLICATION_JSON))),
            RequestBody::Form(pairs) => Ok((
                TransportBody::Text(encode_form(&pairs)),
                Some(FORM_URLENCODED),
            )),
            RequestBody::Multipart(form) => Ok((TransportBody::Multipart(form), None)),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<MultipartForm> for RequestBody {
    fn from(form: MultipartForm) -> Self {
        RequestBody::Multipart(form)
    }
}

/// Transport-agnostic multipart form (file uploads, payment receipts, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime,
            bytes,
        });
        self
    }
}

/// Normalized body handed to a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBody {
    Text(String),
    Multipart(MultipartForm),
}

fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}
