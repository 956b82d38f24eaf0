//! Request Bodies
//!
//! `RequestBody` is what callers hand to the interceptor. `StoredBody` is the
//! serializable form kept in the durable queue: multipart files are carried as
//! base64 strings together with their name, MIME type and original size.
//! Conversion between the two is total over the closed set of variants.

use crate::shared::error::SharedError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A caller-supplied request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Form(FormBody),
}

/// A multipart form: plain fields plus binary file parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormBody {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<FilePart>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        });
        self
    }
}

/// One binary file inside a multipart form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    pub field: String,
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The durable form of a request body, tagged by `bodyType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bodyType", content = "body")]
pub enum StoredBody {
    #[serde(rename = "json")]
    Json(serde_json::Value),
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "formdata-encoded")]
    FormDataEncoded {
        fields: BTreeMap<String, String>,
        files: Vec<EncodedFile>,
    },
}

/// A multipart file with its bytes base64-encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFile {
    pub field: String,
    pub name: String,
    pub mime_type: String,
    pub encoded_bytes: String,
    pub size: u64,
}

impl StoredBody {
    /// The `bodyType` tag as written to storage
    pub fn body_type(&self) -> &'static str {
        match self {
            StoredBody::Json(_) => "json",
            StoredBody::Text(_) => "text",
            StoredBody::FormDataEncoded { .. } => "formdata-encoded",
        }
    }

    /// Rebuild the caller-facing body, decoding every file back to raw bytes
    pub fn decode(&self) -> Result<RequestBody, SharedError> {
        match self {
            StoredBody::Json(value) => Ok(RequestBody::Json(value.clone())),
            StoredBody::Text(text) => Ok(RequestBody::Text(text.clone())),
            StoredBody::FormDataEncoded { fields, files } => {
                let files = files
                    .iter()
                    .map(|file| {
                        let bytes = STANDARD.decode(&file.encoded_bytes)?;
                        if bytes.len() as u64 != file.size {
                            return Err(SharedError::validation(
                                "size",
                                format!(
                                    "file '{}' decoded to {} bytes, expected {}",
                                    file.name,
                                    bytes.len(),
                                    file.size
                                ),
                            ));
                        }
                        Ok(FilePart {
                            field: file.field.clone(),
                            name: file.name.clone(),
                            mime_type: file.mime_type.clone(),
                            bytes,
                        })
                    })
                    .collect::<Result<Vec<_>, SharedError>>()?;
                Ok(RequestBody::Form(FormBody {
                    fields: fields.clone(),
                    files,
                }))
            }
        }
    }
}

impl From<&RequestBody> for StoredBody {
    fn from(body: &RequestBody) -> Self {
        match body {
            RequestBody::Json(value) => StoredBody::Json(value.clone()),
            RequestBody::Text(text) => StoredBody::Text(text.clone()),
            RequestBody::Form(form) => StoredBody::FormDataEncoded {
                fields: form.fields.clone(),
                files: form
                    .files
                    .iter()
                    .map(|file| EncodedFile {
                        field: file.field.clone(),
                        name: file.name.clone(),
                        mime_type: file.mime_type.clone(),
                        encoded_bytes: STANDARD.encode(&file.bytes),
                        size: file.size(),
                    })
                    .collect(),
            },
        }
    }
}
