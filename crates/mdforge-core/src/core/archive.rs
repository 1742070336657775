//! Hierarchical, self-contained archive model.
//!
//! An archive is a tree of [`Group`]s, each holding named scalar/array attributes and
//! named n-dimensional datasets. All maps are ordered, so encoding the same tree twice
//! yields identical bytes. On disk an archive is zstd-compressed JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

pub const FORMAT_VERSION: u32 = 1;
pub const LAYOUT_ATTR: &str = "layout";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to encode or decode archive: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Dataset shape {shape:?} describes {expected} elements, but {found} were provided")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("{name} holds {count} non-finite value(s)")]
    NonFinite { name: String, count: usize },
    #[error("Unsupported archive format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    TextArray(Vec<String>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn non_finite(&self) -> usize {
        match self {
            AttrValue::Float(v) => usize::from(!v.is_finite()),
            AttrValue::FloatArray(v) => v.iter().filter(|x| !x.is_finite()).count(),
            _ => 0,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "kebab-case")]
pub enum DatasetData {
    Float32(Vec<f32>),
    Int64(Vec<i64>),
    Text(Vec<String>),
}

impl DatasetData {
    pub fn len(&self) -> usize {
        match self {
            DatasetData::Float32(v) => v.len(),
            DatasetData::Int64(v) => v.len(),
            DatasetData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON has no encoding for NaN or infinities.
    fn non_finite(&self) -> usize {
        match self {
            DatasetData::Float32(v) => v.iter().filter(|x| !x.is_finite()).count(),
            _ => 0,
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            DatasetData::Float32(_) => "float32",
            DatasetData::Int64(_) => "int64",
            DatasetData::Text(_) => "text",
        }
    }
}

/// An n-dimensional, row-major array with a validated shape and finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    shape: Vec<usize>,
    data: DatasetData,
}

#[derive(Deserialize)]
struct RawDataset {
    shape: Vec<usize>,
    data: DatasetData,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = ArchiveError;

    fn try_from(raw: RawDataset) -> Result<Self, Self::Error> {
        Dataset::new(raw.shape, raw.data)
    }
}

impl Dataset {
    pub fn new(shape: Vec<usize>, data: DatasetData) -> Result<Self, ArchiveError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ArchiveError::ShapeMismatch {
                shape,
                expected,
                found: data.len(),
            });
        }
        let count = data.non_finite();
        if count > 0 {
            return Err(ArchiveError::NonFinite {
                name: format!("{} dataset", data.dtype()),
                count,
            });
        }
        Ok(Self { shape, data })
    }

    pub fn float32(shape: Vec<usize>, values: Vec<f32>) -> Result<Self, ArchiveError> {
        Self::new(shape, DatasetData::Float32(values))
    }

    pub fn int64(shape: Vec<usize>, values: Vec<i64>) -> Result<Self, ArchiveError> {
        Self::new(shape, DatasetData::Int64(values))
    }

    pub fn text(values: Vec<String>) -> Self {
        Self {
            shape: vec![values.len()],
            data: DatasetData::Text(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &DatasetData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    attrs: BTreeMap<String, AttrValue>,
    #[serde(default)]
    datasets: BTreeMap<String, Dataset>,
    #[serde(default)]
    groups: BTreeMap<String, Group>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named child group, creating it if it does not exist yet.
    pub fn group_mut(&mut self, name: &str) -> &mut Group {
        self.groups.entry(name.to_string()).or_default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Resolves a `/`-separated path of nested group names. An empty path is `self`.
    pub fn path(&self, path: &str) -> Option<&Group> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |group, segment| group.group(segment))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn set_dataset(&mut self, name: &str, dataset: Dataset) {
        self.datasets.insert(name.to_string(), dataset);
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.datasets.is_empty() && self.groups.is_empty()
    }

    /// Fails on the first attribute in this subtree holding NaN or an infinity.
    fn check_finite(&self, path: &str) -> Result<(), ArchiveError> {
        if let Some((name, count)) = self
            .attrs
            .iter()
            .map(|(name, value)| (name, value.non_finite()))
            .find(|&(_, count)| count > 0)
        {
            return Err(ArchiveError::NonFinite {
                name: format!("attribute {}/@{}", path, name),
                count,
            });
        }
        self.groups
            .iter()
            .try_for_each(|(name, child)| child.check_finite(&format!("{}/{}", path, name)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveFile {
    format_version: u32,
    pub root: Group,
}

impl ArchiveFile {
    pub fn new(layout: &str) -> Self {
        let mut root = Group::new();
        root.set_attr(LAYOUT_ATTR, layout);
        Self {
            format_version: FORMAT_VERSION,
            root,
        }
    }

    pub fn layout(&self) -> Option<&str> {
        self.root.attr(LAYOUT_ATTR).and_then(AttrValue::as_text)
    }

    /// Encodes the archive. Trees that could not be decoded again are refused before
    /// anything is written.
    pub fn write_to(&self, writer: impl Write) -> Result<(), ArchiveError> {
        self.root.check_finite("")?;
        let mut encoder = zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)?;
        serde_json::to_writer(&mut encoder, self)?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    pub fn read_from(reader: impl Read) -> Result<Self, ArchiveError> {
        let decoder = zstd::stream::read::Decoder::new(reader)?;
        let archive: ArchiveFile = serde_json::from_reader(decoder)?;
        if archive.format_version != FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion(archive.format_version));
        }
        Ok(archive)
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }
}
