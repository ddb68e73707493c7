//! Turning caller-supplied bytes into scene data.
//!
//! Nothing in here performs I/O. Model containers, textures and environment
//! maps arrive as buffers; external references inside a model are resolved
//! through a [`ResourceTable`] the caller fills in beforehand.
//!
//! - `mesh` reads primitive geometry out of glTF accessors
//! - `texture` decodes base color images on worker threads
//! - `animation` reads and samples node animation channels
//! - `environment` parses KTX1 image-based-lighting and skybox cubemaps

use std::{borrow::Cow, collections::HashMap};

use base64::Engine as _;

use crate::error::{Result, SessionError};

pub mod animation;
pub mod environment;
pub mod mesh;
pub mod texture;

/// Logical resource name to raw bytes, supplied with a load request.
///
/// The table is moved into the load call and dropped before it returns, so
/// large buffers never outlive instantiation.
#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    entries: HashMap<String, Vec<u8>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for ResourceTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, bytes) in iter {
            table.insert(name, bytes);
        }
        table
    }
}

impl From<HashMap<String, Vec<u8>>> for ResourceTable {
    fn from(entries: HashMap<String, Vec<u8>>) -> Self {
        Self { entries }
    }
}

/// Resolves the URIs a model references to bytes.
///
/// `data:` URIs are decoded in place. Everything else is looked up in the
/// table by exact name, then with a leading `./` stripped.
pub struct ResourceResolver<'a> {
    table: &'a ResourceTable,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(table: &'a ResourceTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self, uri: &str) -> Result<Cow<'a, [u8]>> {
        if let Some(data) = uri.strip_prefix("data:") {
            return decode_data_uri(data).map(Cow::Owned);
        }
        self.table
            .get(uri)
            .or_else(|| uri.strip_prefix("./").and_then(|name| self.table.get(name)))
            .map(Cow::Borrowed)
            .ok_or_else(|| {
                log::error!("Missing resource: {}", uri);
                SessionError::ResourceNotFound {
                    name: uri.to_string(),
                }
            })
    }
}

fn decode_data_uri(data: &str) -> Result<Vec<u8>> {
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| SessionError::parse("data uri", "missing ',' separator"))?;
    if !header.ends_with(";base64") {
        return Err(SessionError::parse(
            "data uri",
            format!("unsupported encoding in '{header}'"),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| SessionError::parse("data uri", e))
}

/// The two container forms a model buffer may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    /// Self-contained binary container (`.glb`).
    Binary,
    /// JSON container whose buffers and images may live in the resource table (`.gltf`).
    Text,
}

impl ModelFormat {
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(b"glTF") {
            return Ok(Self::Binary);
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Ok(Self::Text),
            _ => Err(SessionError::parse(
                "model",
                "buffer is neither a binary glTF container nor glTF JSON",
            )),
        }
    }

    /// Format implied by a file name, if its extension is known.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".glb") {
            Some(Self::Binary)
        } else if lower.ends_with(".gltf") {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// Resolve every buffer of the document to bytes.
///
/// The binary chunk is borrowed from the container; external buffers come
/// from the resolver. A resolved buffer shorter than its declared length is
/// rejected.
pub fn load_buffers<'a>(
    gltf: &'a gltf::Gltf,
    resolver: &ResourceResolver<'a>,
) -> Result<Vec<Cow<'a, [u8]>>> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        let data: Cow<'a, [u8]> = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .as_deref()
                .map(Cow::Borrowed)
                .ok_or_else(|| SessionError::parse("model", "binary chunk is missing"))?,
            gltf::buffer::Source::Uri(uri) => resolver.resolve(uri)?,
        };
        if data.len() < buffer.length() {
            return Err(SessionError::parse(
                "model",
                format!(
                    "buffer {} holds {} bytes but declares {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ),
            ));
        }
        buffer_data.push(data);
    }
    Ok(buffer_data)
}

/// Bytes of a buffer view.
pub fn view_bytes<'b>(
    view: &gltf::buffer::View<'_>,
    buffers: &'b [Cow<'_, [u8]>],
) -> Result<&'b [u8]> {
    let buffer = buffers
        .get(view.buffer().index())
        .ok_or_else(|| SessionError::parse("model", "buffer view points past the buffer list"))?;
    let start = view.offset();
    let end = start + view.length();
    buffer.get(start..end).ok_or_else(|| {
        SessionError::parse(
            "model",
            format!("buffer view {} is out of bounds", view.index()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_both_container_forms() {
        assert_eq!(ModelFormat::detect(b"glTF\x02\0\0\0").unwrap(), ModelFormat::Binary);
        assert_eq!(ModelFormat::detect(b"  \n{\"asset\":{}}").unwrap(), ModelFormat::Text);
        assert!(matches!(
            ModelFormat::detect(b"\x89PNG"),
            Err(SessionError::Parse { .. })
        ));
        assert!(ModelFormat::detect(b"").is_err());
    }

    #[test]
    fn resolver_falls_back_to_stripped_relative_names() {
        let table = ResourceTable::new().with("scene.bin", vec![1, 2, 3]);
        let resolver = ResourceResolver::new(&table);
        assert_eq!(resolver.resolve("scene.bin").unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(resolver.resolve("./scene.bin").unwrap().as_ref(), &[1, 2, 3]);
        assert!(matches!(
            resolver.resolve("textures/missing.png"),
            Err(SessionError::ResourceNotFound { name }) if name == "textures/missing.png"
        ));
    }

    #[test]
    fn resolver_decodes_base64_data_uris() {
        let table = ResourceTable::new();
        let resolver = ResourceResolver::new(&table);
        let bytes = resolver
            .resolve("data:application/octet-stream;base64,AAEC")
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0, 1, 2]);
        assert!(resolver.resolve("data:text/plain,hello").is_err());
    }
}
