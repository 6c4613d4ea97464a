//! GDAL_METADATA parsing.
//!
//! ```xml
//! <GDALMetadata>
//!   <Item name="TYPE">HORIZONTAL_OFFSET</Item>
//!   <Item name="grid_name">QUEBEC</Item>
//!   <Item name="DESCRIPTION" sample="0" role="description">latitude_offset</Item>
//!   <Item name="UNITTYPE" sample="0" role="unittype">arc-second</Item>
//!   <Item name="SCALE" sample="1" role="scale">0.001</Item>
//!   <Item name="positive_value" sample="1">west</Item>
//! </GDALMetadata>
//! ```

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TiffError;

/// Parsed dataset- and sample-level metadata of one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdalMetadata {
    items: HashMap<(Option<u32>, String), String>,
    scales: HashMap<u32, f64>,
    offsets: HashMap<u32, f64>,
}

impl GdalMetadata {
    pub fn parse(xml: &str) -> Result<Self, TiffError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut metadata = GdalMetadata::default();
        let mut current: Option<ItemHeader> = None;
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"Item" => {
                    current = Some(ItemHeader::from_element(&e)?);
                    text.clear();
                }
                Ok(Event::Empty(e)) if e.name().as_ref() == b"Item" => {
                    metadata.insert(ItemHeader::from_element(&e)?, "")?;
                }
                Ok(Event::Text(t)) if current.is_some() => {
                    let value = t.unescape().map_err(xml_error)?;
                    text.push_str(&value);
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"Item" => {
                    if let Some(header) = current.take() {
                        metadata.insert(header, text.trim())?;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(TiffError::InvalidMetadata(format!(
                        "XML error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        Ok(metadata)
    }

    /// Look up an item; `sample = None` addresses the dataset level.
    pub fn item(&self, key: &str, sample: Option<u32>) -> Option<&str> {
        self.items
            .get(&(sample, key.to_string()))
            .map(String::as_str)
    }

    /// Linear transform applied to stored values of `sample`.
    pub fn scale_offset(&self, sample: u32) -> (f64, f64) {
        (
            self.scales.get(&sample).copied().unwrap_or(1.0),
            self.offsets.get(&sample).copied().unwrap_or(0.0),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.scales.is_empty() && self.offsets.is_empty()
    }

    fn insert(&mut self, header: ItemHeader, value: &str) -> Result<(), TiffError> {
        let role = header.role.as_deref().unwrap_or("");
        match (role, header.sample) {
            ("scale", Some(sample)) => {
                self.scales.insert(sample, parse_number(&header.name, value)?);
            }
            ("offset", Some(sample)) => {
                self.offsets.insert(sample, parse_number(&header.name, value)?);
            }
            _ => {
                let key = match role {
                    "description" => "DESCRIPTION",
                    "unittype" | "unit" => "UNIT",
                    _ if header.name == "UNITTYPE" => "UNIT",
                    _ => header.name.as_str(),
                };
                self.items
                    .insert((header.sample, key.to_string()), value.to_string());
            }
        }
        Ok(())
    }
}

struct ItemHeader {
    name: String,
    sample: Option<u32>,
    role: Option<String>,
}

impl ItemHeader {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, TiffError> {
        let mut name = None;
        let mut sample = None;
        let mut role = None;
        for attr in element.attributes() {
            let attr = attr.map_err(|e| TiffError::InvalidMetadata(e.to_string()))?;
            let value = attr.unescape_value().map_err(xml_error)?;
            match attr.key.as_ref() {
                b"name" => name = Some(value.into_owned()),
                b"sample" => {
                    sample = Some(value.trim().parse::<u32>().map_err(|_| {
                        TiffError::InvalidMetadata(format!("invalid sample index {:?}", value))
                    })?)
                }
                b"role" => role = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(Self {
            name: name.ok_or_else(|| TiffError::InvalidMetadata("Item without name".into()))?,
            sample,
            role,
        })
    }
}

fn parse_number(name: &str, value: &str) -> Result<f64, TiffError> {
    value
        .trim()
        .parse()
        .map_err(|_| TiffError::InvalidMetadata(format!("{} is not a number: {:?}", name, value)))
}

fn xml_error(e: quick_xml::Error) -> TiffError {
    TiffError::InvalidMetadata(e.to_string())
}
