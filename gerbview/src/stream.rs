//! Parsed Gerber data as the engine consumes it.
//!
//! The parser is somebody else's job. What arrives here is an ordered list
//! of filled shapes per file, each tagged with polarity, attributes and
//! the raw stroke centerline when the shape came from a draw.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{Path, Rect};
use crate::region::PlanarRegion;

pub const MM_PER_INCH: f64 = 25.4;

/// Whether an object adds to (Dark) or erases from (Clear) the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

/// Linear unit a file's coordinates are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    /// Convert a length in these units to millimeters.
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            Units::Millimeters => value,
            Units::Inches => value * MM_PER_INCH,
        }
    }

    pub fn is_metric(self) -> bool {
        self == Units::Millimeters
    }
}

/// A named attribute with ordered string values, e.g.
/// `.FileFunction,Copper,L1,Top`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self { name: name.into(), values: values.iter().map(|v| v.to_string()).collect() }
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for v in &self.values {
            write!(f, ",{}", v)?;
        }
        Ok(())
    }
}

/// Insertion-ordered `name -> Attribute` map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDictionary(IndexMap<String, Attribute>);

impl AttributeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any attribute of the same name in place.
    pub fn insert(&mut self, attribute: Attribute) {
        self.0.insert(attribute.name.clone(), attribute);
    }

    pub fn with(mut self, attribute: Attribute) -> Self {
        self.insert(attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-object bookkeeping carried through from the parser.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub repeat_id: String,
    #[serde(default)]
    pub block_id: String,
    /// Open centerline of the draw that produced the shape, if any.
    #[serde(default)]
    pub stroke_path: Option<Path>,
}

/// One filled shape in paint order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicalObject {
    pub shape: PlanarRegion,
    #[serde(default)]
    pub polarity: Polarity,
    #[serde(default)]
    pub attributes: AttributeDictionary,
    #[serde(default)]
    pub metadata: MetaData,
}

impl GraphicalObject {
    pub fn new(shape: PlanarRegion, polarity: Polarity) -> Self {
        Self { shape, polarity, attributes: AttributeDictionary::new(), metadata: MetaData::default() }
    }

    pub fn with_stroke(mut self, stroke: Path) -> Self {
        self.metadata.stroke_path = Some(stroke);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.shape.bounds()
    }
}

/// Ordered objects of one file plus their overall bounding box.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<GraphicalObject>", into = "Vec<GraphicalObject>")]
pub struct GraphicsStream {
    objects: Vec<GraphicalObject>,
    bounds: Option<Rect>,
}

impl GraphicsStream {
    pub fn new(objects: Vec<GraphicalObject>) -> Self {
        let bounds = objects
            .iter()
            .filter_map(GraphicalObject::bounds)
            .reduce(|acc, r| acc.union(&r));
        Self { objects, bounds }
    }

    pub fn objects(&self) -> &[GraphicalObject] {
        &self.objects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GraphicalObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Union of every object's bounding box, `None` for an empty stream.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }
}

impl From<Vec<GraphicalObject>> for GraphicsStream {
    fn from(objects: Vec<GraphicalObject>) -> Self {
        GraphicsStream::new(objects)
    }
}

impl From<GraphicsStream> for Vec<GraphicalObject> {
    fn from(stream: GraphicsStream) -> Self {
        stream.objects
    }
}

pub const FILE_FUNCTION: &str = ".FileFunction";
pub const SAME_COORDINATES: &str = ".SameCoordinates";
pub const CREATION_DATE: &str = ".CreationDate";

/// One parsed Gerber file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GerberFile {
    pub name: String,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub attributes: AttributeDictionary,
    #[serde(default)]
    pub stream: GraphicsStream,
}

impl GerberFile {
    pub fn new(name: impl Into<String>, units: Units, stream: GraphicsStream) -> Self {
        Self { name: name.into(), units, attributes: AttributeDictionary::new(), stream }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    pub fn file_function(&self) -> Option<FileFunction<'_>> {
        self.attributes.get(FILE_FUNCTION).map(FileFunction)
    }

    /// Grouping key shared by every file of one board.
    pub fn same_coordinates(&self) -> Option<String> {
        self.attributes.get(SAME_COORDINATES).map(|a| a.values.join(","))
    }

    pub fn creation_date(&self) -> Option<&str> {
        self.attributes.get(CREATION_DATE).and_then(|a| a.value(0))
    }
}

/// Typed view over a `.FileFunction` attribute.
///
/// Value 0 is the layer kind. Copper puts its side in value 2
/// (`Copper,L1,Top`); soldermask and legend put it in value 1
/// (`Soldermask,Bot`).
#[derive(Debug, Clone, Copy)]
pub struct FileFunction<'a>(&'a Attribute);

impl<'a> FileFunction<'a> {
    pub fn kind(&self) -> Option<&'a str> {
        self.0.value(0)
    }

    pub fn value(&self, index: usize) -> Option<&'a str> {
        self.0.value(index)
    }

    pub fn attribute(&self) -> &'a Attribute {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn stream_bounds_cover_all_objects() {
        let stream = GraphicsStream::new(vec![
            GraphicalObject::new(PlanarRegion::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0)), Polarity::Dark),
            GraphicalObject::new(PlanarRegion::from_rect(Rect::new(5.0, -2.0, 1.0, 1.0)), Polarity::Clear),
        ]);
        assert_eq!(stream.bounds(), Some(Rect::new(0.0, -2.0, 6.0, 3.0)));
        assert_eq!(GraphicsStream::default().bounds(), None);
    }

    #[test]
    fn file_function_views() {
        let file = GerberFile::new("top.gtl", Units::Millimeters, GraphicsStream::default())
            .with_attribute(Attribute::new(FILE_FUNCTION, &["Copper", "L1", "Top"]))
            .with_attribute(Attribute::new(SAME_COORDINATES, &["Original"]));

        let function = file.file_function().unwrap();
        assert_eq!(function.kind(), Some("Copper"));
        assert_eq!(function.value(2), Some("Top"));
        assert_eq!(function.attribute().to_string(), ".FileFunction,Copper,L1,Top");
        assert_eq!(file.same_coordinates().as_deref(), Some("Original"));
    }

    #[test]
    fn attribute_order_is_insertion_order() {
        let dict = AttributeDictionary::new()
            .with(Attribute::new(".N", &["GND"]))
            .with(Attribute::new(".C", &["R1"]))
            .with(Attribute::new(".N", &["VCC"]));
        let names: Vec<&str> = dict.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec![".N", ".C"]);
        assert_eq!(dict.get(".N").and_then(|a| a.value(0)), Some("VCC"));
    }

    #[test]
    fn inches_convert_to_mm() {
        assert_eq!(Units::Inches.to_mm(2.0), 50.8);
        assert_eq!(Units::Millimeters.to_mm(2.0), 2.0);
    }
}
