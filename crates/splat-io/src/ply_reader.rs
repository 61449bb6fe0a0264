//! Low-level PLY parsing: header grammar, element/property tables and the
//! raw payload.
//!
//! The reader materializes every declared property into a flat, packed,
//! little-endian value array, regardless of the input being ASCII or binary
//! in either endianness. List properties additionally record an
//! `(offset, count)` pair per element entry indexing into the flattened
//! item array. Unknown elements and properties are parsed past; consumers
//! simply never look them up.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use splat_core::component_conversion::ComponentValue;
use splat_core::data_types::DataType;
use splat_core::status::{invalid_parameter, SplatError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy)]
struct ListEntry {
    offset: usize,
    num_values: usize,
}

/// One declared vertex/face property with its materialized values.
#[derive(Debug, Clone)]
pub struct PlyProperty {
    name: String,
    data_type: DataType,
    list_size_type: DataType,
    data: Vec<u8>,
    list_index: Vec<ListEntry>,
}

impl PlyProperty {
    fn new(name: &str, data_type: DataType, list_size_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            list_size_type,
            data: Vec::new(),
            list_index: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_list(&self) -> bool {
        self.list_size_type != DataType::Invalid
    }

    /// Number of flattened values stored for this property.
    pub fn num_values(&self) -> usize {
        self.data.len() / self.data_type.size()
    }

    /// Index of the first list item of `entry` in the flattened value array.
    pub fn get_list_entry_offset(&self, entry: usize) -> usize {
        self.list_index[entry].offset
    }

    pub fn get_list_entry_num_values(&self, entry: usize) -> usize {
        self.list_index[entry].num_values
    }

    fn value_bytes(&self, value_id: usize) -> &[u8] {
        let elem = self.data_type.size();
        &self.data[value_id * elem..(value_id + 1) * elem]
    }
}

/// Reads property values plain-cast to `T`, whatever the declared type.
pub struct PlyPropertyReader<'a, T: ComponentValue> {
    property: &'a PlyProperty,
    _marker: PhantomData<T>,
}

impl<'a, T: ComponentValue> PlyPropertyReader<'a, T> {
    pub fn new(property: &'a PlyProperty) -> Self {
        Self {
            property,
            _marker: PhantomData,
        }
    }

    pub fn read_value(&self, value_id: usize) -> T {
        let bytes = self.property.value_bytes(value_id);
        match self.property.data_type() {
            DataType::Int8 => cast_value::<i8, T>(bytes),
            DataType::UInt8 => cast_value::<u8, T>(bytes),
            DataType::Int16 => cast_value::<i16, T>(bytes),
            DataType::UInt16 => cast_value::<u16, T>(bytes),
            DataType::Int32 => cast_value::<i32, T>(bytes),
            DataType::UInt32 => cast_value::<u32, T>(bytes),
            DataType::Float32 => cast_value::<f32, T>(bytes),
            DataType::Float64 => cast_value::<f64, T>(bytes),
            _ => T::from_i128(0),
        }
    }
}

fn cast_value<S: ComponentValue, T: ComponentValue>(bytes: &[u8]) -> T {
    let value = S::read_le(bytes);
    if S::DATA_TYPE.is_floating_point() {
        T::from_f64(value.to_f64())
    } else {
        T::from_i128(value.to_i128())
    }
}

#[derive(Debug, Clone)]
pub struct PlyElement {
    name: String,
    num_entries: usize,
    properties: Vec<PlyProperty>,
    property_index: HashMap<String, usize>,
}

impl PlyElement {
    fn new(name: &str, num_entries: usize) -> Self {
        Self {
            name: name.to_string(),
            num_entries,
            properties: Vec::new(),
            property_index: HashMap::new(),
        }
    }

    fn add_property(&mut self, property: PlyProperty) {
        self.property_index
            .insert(property.name().to_string(), self.properties.len());
        self.properties.push(property);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn num_properties(&self) -> usize {
        self.properties.len()
    }

    pub fn property_by_name(&self, name: &str) -> Option<&PlyProperty> {
        self.property_index
            .get(name)
            .map(|&index| &self.properties[index])
    }
}

/// Parsed PLY file: header table plus materialized property values.
#[derive(Debug)]
pub struct PlyReader {
    format: PlyFormat,
    elements: Vec<PlyElement>,
    element_index: HashMap<String, usize>,
}

impl PlyReader {
    pub fn read(data: &[u8]) -> Result<PlyReader, SplatError> {
        let mut parser = Parser { data, pos: 0 };
        let (format, mut elements) = parser.parse_header()?;
        match format {
            PlyFormat::Ascii => parser.parse_ascii_payload(&mut elements)?,
            PlyFormat::BinaryLittleEndian => {
                parser.parse_binary_payload::<LittleEndian>(&mut elements)?
            }
            PlyFormat::BinaryBigEndian => {
                parser.parse_binary_payload::<BigEndian>(&mut elements)?
            }
        }
        let element_index = elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name().to_string(), i))
            .collect();
        Ok(PlyReader {
            format,
            elements,
            element_index,
        })
    }

    pub fn format(&self) -> PlyFormat {
        self.format
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn element_by_name(&self, name: &str) -> Option<&PlyElement> {
        self.element_index
            .get(name)
            .map(|&index| &self.elements[index])
    }
}

fn parse_data_type(name: &str) -> DataType {
    match name {
        "char" | "int8" => DataType::Int8,
        "uchar" | "uint8" => DataType::UInt8,
        "short" | "int16" => DataType::Int16,
        "ushort" | "uint16" => DataType::UInt16,
        "int" | "int32" => DataType::Int32,
        "uint" | "uint32" => DataType::UInt32,
        "float" | "float32" => DataType::Float32,
        "double" | "float64" => DataType::Float64,
        _ => DataType::Invalid,
    }
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Next header line without the trailing newline (and carriage return).
    fn next_line(&mut self) -> Result<&'a str, SplatError> {
        if self.pos >= self.data.len() {
            return Err(invalid_parameter("unexpected end of PLY header"));
        }
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += end;
        if self.pos < self.data.len() {
            self.pos += 1; // Consume the newline.
        }
        let mut line = &rest[..end];
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        str::from_utf8(line).map_err(|_| invalid_parameter("PLY header is not valid text"))
    }

    fn parse_header(&mut self) -> Result<(PlyFormat, Vec<PlyElement>), SplatError> {
        if self.next_line()? != "ply" {
            return Err(invalid_parameter("not a PLY file"));
        }
        let mut format = None;
        let mut elements: Vec<PlyElement> = Vec::new();
        loop {
            let line = self.next_line()?;
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.first().copied() {
                Some("end_header") => break,
                Some("comment") | Some("obj_info") | None => continue,
                Some("format") => {
                    if words.len() < 3 || words[2] != "1.0" {
                        return Err(invalid_parameter("unsupported PLY version"));
                    }
                    format = Some(match words[1] {
                        "ascii" => PlyFormat::Ascii,
                        "binary_little_endian" => PlyFormat::BinaryLittleEndian,
                        "binary_big_endian" => PlyFormat::BinaryBigEndian,
                        other => {
                            return Err(invalid_parameter(format!(
                                "unknown PLY format: {}",
                                other
                            )))
                        }
                    });
                }
                Some("element") => {
                    if words.len() < 3 {
                        return Err(invalid_parameter("malformed element declaration"));
                    }
                    let num_entries = words[2]
                        .parse::<usize>()
                        .map_err(|_| invalid_parameter("invalid element entry count"))?;
                    elements.push(PlyElement::new(words[1], num_entries));
                }
                Some("property") => {
                    let element = elements
                        .last_mut()
                        .ok_or_else(|| invalid_parameter("property outside of an element"))?;
                    if words.get(1).copied() == Some("list") {
                        if words.len() < 5 {
                            return Err(invalid_parameter("malformed list property"));
                        }
                        let size_type = parse_data_type(words[2]);
                        let item_type = parse_data_type(words[3]);
                        if size_type == DataType::Invalid || item_type == DataType::Invalid {
                            return Err(invalid_parameter("unsupported list property type"));
                        }
                        element.add_property(PlyProperty::new(words[4], item_type, size_type));
                    } else {
                        if words.len() < 3 {
                            return Err(invalid_parameter("malformed property declaration"));
                        }
                        let data_type = parse_data_type(words[1]);
                        if data_type == DataType::Invalid {
                            return Err(invalid_parameter("unsupported property type"));
                        }
                        element.add_property(PlyProperty::new(
                            words[2],
                            data_type,
                            DataType::Invalid,
                        ));
                    }
                }
                // Anything else in the header is ignored.
                Some(_) => continue,
            }
        }
        let format = format.ok_or_else(|| invalid_parameter("missing PLY format line"))?;
        Ok((format, elements))
    }

    fn parse_binary_payload<E: ByteOrder>(
        &mut self,
        elements: &mut [PlyElement],
    ) -> Result<(), SplatError> {
        for element in elements.iter_mut() {
            for _ in 0..element.num_entries {
                for property in element.properties.iter_mut() {
                    if property.is_list() {
                        let count = self.read_binary_uint::<E>(property.list_size_type)? as usize;
                        let offset = property.num_values();
                        property.list_index.push(ListEntry {
                            offset,
                            num_values: count,
                        });
                        for _ in 0..count {
                            self.read_binary_value::<E>(property.data_type, &mut property.data)?;
                        }
                    } else {
                        self.read_binary_value::<E>(property.data_type, &mut property.data)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SplatError> {
        if self.pos + n > self.data.len() {
            return Err(SplatError::OutOfRange(
                "PLY payload ends before the declared data".to_string(),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads one scalar in the input endianness and appends it to `out` in
    /// little-endian order. The bit pattern is preserved, so this covers
    /// floats as well as integers.
    fn read_binary_value<E: ByteOrder>(
        &mut self,
        data_type: DataType,
        out: &mut Vec<u8>,
    ) -> Result<(), SplatError> {
        let bytes = self.take(data_type.size())?;
        match data_type.size() {
            1 => out.push(bytes[0]),
            2 => out.extend_from_slice(&E::read_u16(bytes).to_le_bytes()),
            4 => out.extend_from_slice(&E::read_u32(bytes).to_le_bytes()),
            8 => out.extend_from_slice(&E::read_u64(bytes).to_le_bytes()),
            _ => return Err(invalid_parameter("unsupported property type")),
        }
        Ok(())
    }

    fn read_binary_uint<E: ByteOrder>(&mut self, data_type: DataType) -> Result<u64, SplatError> {
        let bytes = self.take(data_type.size())?;
        Ok(match data_type.size() {
            1 => bytes[0] as u64,
            2 => E::read_u16(bytes) as u64,
            4 => E::read_u32(bytes) as u64,
            8 => E::read_u64(bytes),
            _ => return Err(invalid_parameter("unsupported list size type")),
        })
    }

    fn parse_ascii_payload(&mut self, elements: &mut [PlyElement]) -> Result<(), SplatError> {
        let body = str::from_utf8(&self.data[self.pos..])
            .map_err(|_| invalid_parameter("ASCII PLY payload is not valid text"))?;
        let mut tokens = body.split_ascii_whitespace();
        let mut next_token = |what: &str| {
            tokens
                .next()
                .ok_or_else(|| invalid_parameter(format!("missing {} in ASCII payload", what)))
        };
        for element in elements.iter_mut() {
            for _ in 0..element.num_entries {
                for property in element.properties.iter_mut() {
                    if property.is_list() {
                        let count = next_token("list size")?
                            .parse::<usize>()
                            .map_err(|_| invalid_parameter("invalid list size"))?;
                        let offset = property.num_values();
                        property.list_index.push(ListEntry {
                            offset,
                            num_values: count,
                        });
                        for _ in 0..count {
                            let token = next_token("list value")?;
                            parse_ascii_value(token, property.data_type, &mut property.data)?;
                        }
                    } else {
                        let token = next_token("property value")?;
                        parse_ascii_value(token, property.data_type, &mut property.data)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_ascii_value(
    token: &str,
    data_type: DataType,
    out: &mut Vec<u8>,
) -> Result<(), SplatError> {
    if data_type.is_floating_point() {
        let value = token
            .parse::<f64>()
            .map_err(|_| invalid_parameter(format!("invalid number: {}", token)))?;
        match data_type {
            DataType::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            _ => out.extend_from_slice(&value.to_le_bytes()),
        }
    } else {
        let value = token
            .parse::<i64>()
            .map_err(|_| invalid_parameter(format!("invalid integer: {}", token)))?;
        match data_type.size() {
            1 => out.push(value as u8),
            2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            4 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            _ => return Err(invalid_parameter("unsupported property type")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_cube_header(body: &str) -> Vec<u8> {
        let mut ply = String::from(
            "ply\nformat ascii 1.0\ncomment made by hand\nelement vertex 3\n\
             property float x\nproperty float y\nproperty float z\n\
             element face 1\nproperty list uchar int vertex_indices\nend_header\n",
        );
        ply.push_str(body);
        ply.into_bytes()
    }

    #[test]
    fn test_parse_ascii() {
        let data = ascii_cube_header("0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n");
        let reader = PlyReader::read(&data).unwrap();
        assert_eq!(reader.format(), PlyFormat::Ascii);

        let vertex = reader.element_by_name("vertex").unwrap();
        assert_eq!(vertex.num_entries(), 3);
        let x = vertex.property_by_name("x").unwrap();
        assert!(!x.is_list());
        let x_reader = PlyPropertyReader::<f32>::new(x);
        assert_eq!(x_reader.read_value(1), 1.0);

        let face = reader.element_by_name("face").unwrap();
        let indices = face.property_by_name("vertex_indices").unwrap();
        assert!(indices.is_list());
        assert_eq!(indices.get_list_entry_offset(0), 0);
        assert_eq!(indices.get_list_entry_num_values(0), 3);
        let index_reader = PlyPropertyReader::<u32>::new(indices);
        assert_eq!(index_reader.read_value(2), 2);
    }

    #[test]
    fn test_parse_binary_little_endian() {
        let mut data = b"ply\nformat binary_little_endian 1.0\n\
                         element vertex 2\nproperty float x\nproperty uchar red\nend_header\n"
            .to_vec();
        data.extend_from_slice(&1.5f32.to_le_bytes());
        data.push(200);
        data.extend_from_slice(&(-2.0f32).to_le_bytes());
        data.push(10);
        let reader = PlyReader::read(&data).unwrap();
        let vertex = reader.element_by_name("vertex").unwrap();
        let x = PlyPropertyReader::<f32>::new(vertex.property_by_name("x").unwrap());
        let red = PlyPropertyReader::<u8>::new(vertex.property_by_name("red").unwrap());
        assert_eq!(x.read_value(0), 1.5);
        assert_eq!(x.read_value(1), -2.0);
        assert_eq!(red.read_value(0), 200);
        assert_eq!(red.read_value(1), 10);
    }

    #[test]
    fn test_parse_binary_big_endian() {
        let mut data = b"ply\nformat binary_big_endian 1.0\n\
                         element vertex 1\nproperty int x\nproperty ushort y\nend_header\n"
            .to_vec();
        data.extend_from_slice(&(-77i32).to_be_bytes());
        data.extend_from_slice(&512u16.to_be_bytes());
        let reader = PlyReader::read(&data).unwrap();
        let vertex = reader.element_by_name("vertex").unwrap();
        let x = PlyPropertyReader::<i32>::new(vertex.property_by_name("x").unwrap());
        let y = PlyPropertyReader::<u16>::new(vertex.property_by_name("y").unwrap());
        assert_eq!(x.read_value(0), -77);
        assert_eq!(y.read_value(0), 512);
    }

    #[test]
    fn test_list_offsets_accumulate() {
        let data = ascii_cube_header("0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n");
        let mut data = String::from_utf8(data).unwrap();
        data = data.replace("element face 1", "element face 2");
        data.push_str("4 0 1 2 0\n");
        let reader = PlyReader::read(data.as_bytes()).unwrap();
        let indices = reader
            .element_by_name("face")
            .unwrap()
            .property_by_name("vertex_indices")
            .unwrap();
        assert_eq!(indices.get_list_entry_offset(1), 3);
        assert_eq!(indices.get_list_entry_num_values(1), 4);
        assert_eq!(indices.num_values(), 7);
    }

    #[test]
    fn test_reject_bad_magic_and_version() {
        assert!(PlyReader::read(b"plx\nformat ascii 1.0\nend_header\n").is_err());
        assert!(PlyReader::read(b"ply\nformat ascii 2.0\nend_header\n").is_err());
        assert!(PlyReader::read(b"ply\nelement vertex 0\nend_header\n").is_err());
    }

    #[test]
    fn test_truncated_binary_payload() {
        let mut data = b"ply\nformat binary_little_endian 1.0\n\
                         element vertex 2\nproperty float x\nend_header\n"
            .to_vec();
        data.extend_from_slice(&1.0f32.to_le_bytes());
        let result = PlyReader::read(&data);
        assert!(matches!(result, Err(SplatError::OutOfRange(_))));
    }

    #[test]
    fn test_crlf_header() {
        let data = b"ply\r\nformat ascii 1.0\r\nelement vertex 1\r\n\
                     property float x\r\nend_header\r\n0.5\n"
            .to_vec();
        let reader = PlyReader::read(&data).unwrap();
        let vertex = reader.element_by_name("vertex").unwrap();
        let x = PlyPropertyReader::<f32>::new(vertex.property_by_name("x").unwrap());
        assert_eq!(x.read_value(0), 0.5);
    }
}
