//! Typed, strided attribute views and their per-point storage.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::component_conversion::{convert_component_value, ComponentValue};
use crate::data_buffer::{DataBuffer, DataBufferDescriptor};
use crate::data_types::DataType;
use crate::geometry_indices::{AttributeValueIndex, PointIndex, INVALID_ATTRIBUTE_VALUE_INDEX};
use crate::status::{invalid_parameter, ok_status, SplatError, Status};

/// Semantic role of an attribute.
///
/// The variant order is stable and shared with the container format; new
/// roles may only be appended in front of `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryAttributeType {
    Invalid = -1,
    /// Named attributes start here. For named attributes the codec knows
    /// their purpose and can apply role-specific handling.
    Position = 0,
    Normal,
    Color,
    TexCoord,
    /// Direct current (zeroth order) spherical harmonics coefficients.
    ShDc,
    /// Higher order spherical harmonics coefficients.
    ShRest,
    Opacity,
    Scale,
    /// Rotation quaternion.
    Rotation,
    /// Auxiliary per-point data (segment id, 1d).
    Aux,
    /// Vector-quantization codebook indices for the matching roles.
    ShDcIdx,
    ShRestIdx,
    ScaleIdx,
    RotationIdx,
    /// Frame visibility sets.
    Ins,
    Outs,
    #[cfg(feature = "transcoder")]
    Tangent,
    #[cfg(feature = "transcoder")]
    Material,
    #[cfg(feature = "transcoder")]
    Joints,
    #[cfg(feature = "transcoder")]
    Weights,
    /// Attributes without a predefined use case, e.g. shader-specific data.
    Generic,
}

impl GeometryAttributeType {
    pub const fn name(self) -> &'static str {
        match self {
            GeometryAttributeType::Invalid => "INVALID",
            GeometryAttributeType::Position => "POSITION",
            GeometryAttributeType::Normal => "NORMAL",
            GeometryAttributeType::Color => "COLOR",
            GeometryAttributeType::TexCoord => "TEX_COORD",
            GeometryAttributeType::ShDc => "SH_DC",
            GeometryAttributeType::ShRest => "SH_REST",
            GeometryAttributeType::Opacity => "OPACITY",
            GeometryAttributeType::Scale => "SCALE",
            GeometryAttributeType::Rotation => "ROTATION",
            GeometryAttributeType::Aux => "AUX",
            GeometryAttributeType::ShDcIdx => "SH_DC_IDX",
            GeometryAttributeType::ShRestIdx => "SH_REST_IDX",
            GeometryAttributeType::ScaleIdx => "SCALE_IDX",
            GeometryAttributeType::RotationIdx => "ROTATION_IDX",
            GeometryAttributeType::Ins => "INS",
            GeometryAttributeType::Outs => "OUTS",
            #[cfg(feature = "transcoder")]
            GeometryAttributeType::Tangent => "TANGENT",
            #[cfg(feature = "transcoder")]
            GeometryAttributeType::Material => "MATERIAL",
            #[cfg(feature = "transcoder")]
            GeometryAttributeType::Joints => "JOINTS",
            #[cfg(feature = "transcoder")]
            GeometryAttributeType::Weights => "WEIGHTS",
            GeometryAttributeType::Generic => "GENERIC",
        }
    }
}

/// Metadata describing a strided attribute view: role, element type,
/// component count, normalization, stride and offset, plus the descriptor of
/// the buffer the view was attached to.
///
/// Equality and hashing key on the view description, never on payload
/// bytes; two equal views address the same storage revision.
#[derive(Debug, Clone)]
pub struct GeometryAttribute {
    attribute_type: GeometryAttributeType,
    data_type: DataType,
    num_components: u8,
    normalized: bool,
    byte_stride: i64,
    byte_offset: i64,
    unique_id: u32,
    buffer_descriptor: DataBufferDescriptor,
}

impl Default for GeometryAttribute {
    fn default() -> Self {
        Self {
            attribute_type: GeometryAttributeType::Invalid,
            data_type: DataType::Invalid,
            num_components: 1,
            normalized: false,
            byte_stride: 0,
            byte_offset: 0,
            unique_id: 0,
            buffer_descriptor: DataBufferDescriptor::default(),
        }
    }
}

impl GeometryAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describes a view with the given layout. Fails when the stride cannot
    /// cover one entry of `num_components` components.
    pub fn init(
        &mut self,
        attribute_type: GeometryAttributeType,
        num_components: u8,
        data_type: DataType,
        normalized: bool,
        byte_stride: i64,
        byte_offset: i64,
    ) -> Status {
        if byte_stride < (num_components as usize * data_type.size()) as i64 {
            return Err(invalid_parameter(format!(
                "byte stride {} cannot hold {} components of type {}",
                byte_stride, num_components, data_type
            )));
        }
        self.attribute_type = attribute_type;
        self.num_components = num_components;
        self.data_type = data_type;
        self.normalized = normalized;
        self.byte_stride = byte_stride;
        self.byte_offset = byte_offset;
        ok_status()
    }

    /// Byte position of the entry in the backing buffer.
    pub fn byte_pos(&self, att_index: AttributeValueIndex) -> i64 {
        self.byte_offset + self.byte_stride * att_index.0 as i64
    }

    pub fn attribute_type(&self) -> GeometryAttributeType {
        self.attribute_type
    }

    pub fn set_attribute_type(&mut self, attribute_type: GeometryAttributeType) {
        self.attribute_type = attribute_type;
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_components(&self) -> u8 {
        self.num_components
    }

    pub fn normalized(&self) -> bool {
        self.normalized
    }

    pub fn set_normalized(&mut self, normalized: bool) {
        self.normalized = normalized;
    }

    pub fn byte_stride(&self) -> i64 {
        self.byte_stride
    }

    pub fn byte_offset(&self) -> i64 {
        self.byte_offset
    }

    pub fn set_byte_offset(&mut self, byte_offset: i64) {
        self.byte_offset = byte_offset;
    }

    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    pub fn set_unique_id(&mut self, id: u32) {
        self.unique_id = id;
    }

    pub fn buffer_descriptor(&self) -> DataBufferDescriptor {
        self.buffer_descriptor
    }

    pub(crate) fn attach_buffer(&mut self, buffer: &DataBuffer) {
        self.buffer_descriptor = buffer.descriptor();
    }
}

impl PartialEq for GeometryAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_type == other.attribute_type
            && self.buffer_descriptor == other.buffer_descriptor
            && self.num_components == other.num_components
            && self.data_type == other.data_type
            && self.byte_stride == other.byte_stride
            && self.byte_offset == other.byte_offset
    }
}

impl Eq for GeometryAttribute {}

impl Hash for GeometryAttribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.buffer_descriptor.hash(state);
        self.num_components.hash(state);
        self.data_type.hash(state);
        self.attribute_type.hash(state);
        self.byte_stride.hash(state);
        self.byte_offset.hash(state);
    }
}

/// An attribute plus its owned storage and the point-to-value indirection.
///
/// The indirection starts out as the identity; deduplication or explicit
/// mapping replaces it with a table so several points can share one stored
/// value row.
#[derive(Debug, Clone)]
pub struct PointAttribute {
    base: GeometryAttribute,
    buffer: DataBuffer,
    indices_map: Vec<AttributeValueIndex>,
    identity_mapping: bool,
    num_unique_entries: usize,
}

impl Default for PointAttribute {
    fn default() -> Self {
        Self {
            base: GeometryAttribute::default(),
            buffer: DataBuffer::new(),
            indices_map: Vec::new(),
            identity_mapping: true,
            num_unique_entries: 0,
        }
    }
}

impl PointAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the attribute with a fresh packed buffer holding
    /// `num_attribute_values` entries, identity mapped.
    pub fn init(
        &mut self,
        attribute_type: GeometryAttributeType,
        num_components: u8,
        data_type: DataType,
        normalized: bool,
        num_attribute_values: usize,
    ) {
        let byte_stride = (num_components as usize * data_type.size()) as i64;
        self.base
            .init(
                attribute_type,
                num_components,
                data_type,
                normalized,
                byte_stride,
                0,
            )
            .expect("packed stride always covers one entry");
        self.buffer.resize(num_attribute_values * byte_stride as usize);
        self.base.attach_buffer(&self.buffer);
        self.num_unique_entries = num_attribute_values;
        self.identity_mapping = true;
        self.indices_map.clear();
    }

    /// Initializes from a template view: layout is copied, the payload gets
    /// a fresh owned buffer sized for `num_attribute_values` entries.
    pub fn init_from(
        &mut self,
        template_attribute: &GeometryAttribute,
        identity_mapped: bool,
        num_attribute_values: usize,
    ) -> Status {
        self.base = template_attribute.clone();
        self.base.set_byte_offset(0);
        if self.base.byte_stride() < 1 {
            return Err(invalid_parameter("attribute byte stride must be positive"));
        }
        self.buffer
            .resize(num_attribute_values * self.base.byte_stride() as usize);
        self.base.attach_buffer(&self.buffer);
        self.num_unique_entries = num_attribute_values;
        if identity_mapped {
            self.set_identity_mapping();
        } else {
            self.set_explicit_mapping(0);
        }
        ok_status()
    }

    /// Value index holding the data of `point_index`.
    pub fn mapped_index(&self, point_index: PointIndex) -> AttributeValueIndex {
        if self.identity_mapping {
            AttributeValueIndex(point_index.0)
        } else if (point_index.0 as usize) < self.indices_map.len() {
            self.indices_map[point_index.0 as usize]
        } else {
            INVALID_ATTRIBUTE_VALUE_INDEX
        }
    }

    pub fn is_mapping_identity(&self) -> bool {
        self.identity_mapping
    }

    pub fn set_identity_mapping(&mut self) {
        self.identity_mapping = true;
        self.indices_map.clear();
    }

    pub fn set_explicit_mapping(&mut self, num_points: usize) {
        self.identity_mapping = false;
        self.indices_map.clear();
        self.indices_map
            .resize(num_points, INVALID_ATTRIBUTE_VALUE_INDEX);
    }

    pub fn set_point_map_entry(
        &mut self,
        point_index: PointIndex,
        entry_index: AttributeValueIndex,
    ) {
        debug_assert!(!self.identity_mapping);
        if !self.identity_mapping {
            self.indices_map[point_index.0 as usize] = entry_index;
        }
    }

    /// Number of stored value rows (distinct from the number of points).
    pub fn size(&self) -> usize {
        self.num_unique_entries
    }

    pub fn resize(&mut self, num_attribute_values: usize) {
        self.buffer
            .resize(num_attribute_values * self.base.byte_stride() as usize);
        self.num_unique_entries = num_attribute_values;
    }

    pub fn buffer(&self) -> &DataBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut DataBuffer {
        &mut self.buffer
    }

    pub fn base(&self) -> &GeometryAttribute {
        &self.base
    }

    pub fn attribute_type(&self) -> GeometryAttributeType {
        self.base.attribute_type()
    }

    pub fn set_attribute_type(&mut self, attribute_type: GeometryAttributeType) {
        self.base.set_attribute_type(attribute_type);
    }

    pub fn data_type(&self) -> DataType {
        self.base.data_type()
    }

    pub fn num_components(&self) -> u8 {
        self.base.num_components()
    }

    pub fn normalized(&self) -> bool {
        self.base.normalized()
    }

    pub fn byte_stride(&self) -> i64 {
        self.base.byte_stride()
    }

    pub fn unique_id(&self) -> u32 {
        self.base.unique_id()
    }

    pub fn set_unique_id(&mut self, id: u32) {
        self.base.set_unique_id(id);
    }

    /// Raw bytes of one value row, or None when the row is out of range.
    pub fn value_bytes(&self, att_index: AttributeValueIndex) -> Option<&[u8]> {
        let stride = self.base.byte_stride() as usize;
        let start = self.base.byte_pos(att_index);
        if start < 0 {
            return None;
        }
        let start = start as usize;
        let end = start.checked_add(stride)?;
        if end > self.buffer.data_size() {
            return None;
        }
        Some(&self.buffer.data()[start..end])
    }

    /// Copies the raw row into `out_data` (`byte_stride` bytes). Returns
    /// false when the row does not fit the buffer or `out_data` is short.
    pub fn get_value(&self, att_index: AttributeValueIndex, out_data: &mut [u8]) -> bool {
        let stride = self.base.byte_stride() as usize;
        if out_data.len() < stride {
            return false;
        }
        self.buffer
            .read(self.base.byte_pos(att_index) as usize, &mut out_data[..stride])
    }

    /// Overwrites one value row with `byte_stride` raw bytes.
    pub fn set_attribute_value(&mut self, entry_index: AttributeValueIndex, value: &[u8]) -> bool {
        let stride = self.base.byte_stride() as usize;
        if value.len() < stride {
            return false;
        }
        self.buffer
            .write(self.base.byte_pos(entry_index) as usize, &value[..stride])
    }

    /// Typed read of all `N` components of one row. Fails on out-of-range
    /// rows or when the row cannot hold `N` components of `T`.
    pub fn typed_value<T: ComponentValue, const N: usize>(
        &self,
        att_index: AttributeValueIndex,
    ) -> Option<[T; N]> {
        let elem = T::DATA_TYPE.size();
        let start = self.base.byte_pos(att_index);
        if start < 0 {
            return None;
        }
        let start = start as usize;
        let end = start.checked_add(elem * N)?;
        if end > self.buffer.data_size() {
            return None;
        }
        let bytes = &self.buffer.data()[start..end];
        let mut out = [T::read_le(bytes); N];
        for (i, value) in out.iter_mut().enumerate() {
            *value = T::read_le(&bytes[i * elem..]);
        }
        Some(out)
    }

    /// Writes a row of typed components in storage order.
    pub fn set_typed_value<T: ComponentValue>(
        &mut self,
        entry_index: AttributeValueIndex,
        values: &[T],
    ) -> bool {
        let elem = T::DATA_TYPE.size();
        let mut scratch = vec![0u8; values.len() * elem];
        for (i, value) in values.iter().enumerate() {
            value.write_le(&mut scratch[i * elem..]);
        }
        self.buffer
            .write(self.base.byte_pos(entry_index) as usize, &scratch)
    }

    /// Reads one row converted to `Out`. Components missing from the stored
    /// row are zero-filled in `out_value`; excess stored components are
    /// dropped. Returns false when the conversion is not representable.
    pub fn convert_value<Out: ComponentValue>(
        &self,
        att_index: AttributeValueIndex,
        out_value: &mut [Out],
    ) -> bool {
        match self.data_type() {
            DataType::Int8 => self.convert_typed_value::<i8, Out>(att_index, out_value),
            DataType::UInt8 => self.convert_typed_value::<u8, Out>(att_index, out_value),
            DataType::Int16 => self.convert_typed_value::<i16, Out>(att_index, out_value),
            DataType::UInt16 => self.convert_typed_value::<u16, Out>(att_index, out_value),
            DataType::Int32 => self.convert_typed_value::<i32, Out>(att_index, out_value),
            DataType::UInt32 => self.convert_typed_value::<u32, Out>(att_index, out_value),
            DataType::Int64 => self.convert_typed_value::<i64, Out>(att_index, out_value),
            DataType::UInt64 => self.convert_typed_value::<u64, Out>(att_index, out_value),
            DataType::Float32 => self.convert_typed_value::<f32, Out>(att_index, out_value),
            DataType::Float64 => self.convert_typed_value::<f64, Out>(att_index, out_value),
            DataType::Bool => self.convert_typed_value::<bool, Out>(att_index, out_value),
            DataType::Invalid => false,
        }
    }

    fn convert_typed_value<T: ComponentValue, Out: ComponentValue>(
        &self,
        att_index: AttributeValueIndex,
        out_value: &mut [Out],
    ) -> bool {
        let entry = match self.value_bytes(att_index) {
            Some(entry) => entry,
            None => return false,
        };
        let elem = T::DATA_TYPE.size();
        let num_components = self.num_components() as usize;
        let shared = num_components.min(out_value.len());
        if shared * elem > entry.len() {
            return false;
        }
        for i in 0..shared {
            let in_value = T::read_le(&entry[i * elem..]);
            match convert_component_value::<T, Out>(in_value, self.normalized()) {
                Some(converted) => out_value[i] = converted,
                None => return false,
            }
        }
        for slot in out_value.iter_mut().skip(num_components) {
            *slot = Out::from_i128(0);
        }
        true
    }

    /// Writes one row from `In` components, converting to the stored type.
    /// Components missing from the input are stored as zero; excess input
    /// components are dropped.
    pub fn convert_and_set<In: ComponentValue>(
        &mut self,
        entry_index: AttributeValueIndex,
        value: &[In],
    ) -> Status {
        match self.data_type() {
            DataType::Int8 => self.convert_and_set_typed::<In, i8>(entry_index, value),
            DataType::UInt8 => self.convert_and_set_typed::<In, u8>(entry_index, value),
            DataType::Int16 => self.convert_and_set_typed::<In, i16>(entry_index, value),
            DataType::UInt16 => self.convert_and_set_typed::<In, u16>(entry_index, value),
            DataType::Int32 => self.convert_and_set_typed::<In, i32>(entry_index, value),
            DataType::UInt32 => self.convert_and_set_typed::<In, u32>(entry_index, value),
            DataType::Int64 => self.convert_and_set_typed::<In, i64>(entry_index, value),
            DataType::UInt64 => self.convert_and_set_typed::<In, u64>(entry_index, value),
            DataType::Float32 => self.convert_and_set_typed::<In, f32>(entry_index, value),
            DataType::Float64 => self.convert_and_set_typed::<In, f64>(entry_index, value),
            DataType::Bool => self.convert_and_set_typed::<In, bool>(entry_index, value),
            DataType::Invalid => Err(invalid_parameter("attribute data type is not set")),
        }
    }

    fn convert_and_set_typed<In: ComponentValue, T: ComponentValue>(
        &mut self,
        entry_index: AttributeValueIndex,
        value: &[In],
    ) -> Status {
        let elem = T::DATA_TYPE.size();
        let num_components = self.num_components() as usize;
        let normalized = self.normalized();
        let mut scratch = vec![0u8; num_components * elem];
        for i in 0..num_components {
            let converted: T = if i < value.len() {
                convert_component_value::<In, T>(value[i], normalized).ok_or_else(|| {
                    invalid_parameter("failed to convert component value")
                })?
            } else {
                T::from_i128(0)
            };
            converted.write_le(&mut scratch[i * elem..]);
        }
        if !self
            .buffer
            .write(self.base.byte_pos(entry_index) as usize, &scratch)
        {
            return Err(SplatError::OutOfRange(
                "attribute entry is outside the buffer".to_string(),
            ));
        }
        ok_status()
    }

    /// Collapses byte-equal value rows and rewrites the point mapping.
    /// Returns the number of rows kept.
    pub fn deduplicate_values(&mut self) -> Result<usize, SplatError> {
        let stride = self.base.byte_stride();
        if stride < 1 {
            return Err(invalid_parameter(
                "cannot deduplicate an uninitialized attribute",
            ));
        }
        let stride = stride as usize;
        let offset = self.base.byte_offset() as usize;

        let mut unique_rows: HashMap<Vec<u8>, AttributeValueIndex> = HashMap::new();
        let mut value_map = vec![INVALID_ATTRIBUTE_VALUE_INDEX; self.num_unique_entries];
        let mut num_unique = 0usize;
        for i in 0..self.num_unique_entries {
            let start = offset + i * stride;
            let row = self.buffer.data()[start..start + stride].to_vec();
            if let Some(&existing) = unique_rows.get(&row) {
                value_map[i] = existing;
            } else {
                let new_index = AttributeValueIndex(num_unique as u32);
                if num_unique != i {
                    self.buffer.write(offset + num_unique * stride, &row);
                }
                unique_rows.insert(row, new_index);
                value_map[i] = new_index;
                num_unique += 1;
            }
        }
        if num_unique == self.num_unique_entries {
            return Ok(num_unique);
        }

        if self.identity_mapping {
            // Every point used to address its own row; give each point an
            // explicit entry pointing at the surviving row.
            let num_points = self.num_unique_entries;
            self.set_explicit_mapping(num_points);
            for point in 0..num_points {
                self.indices_map[point] = value_map[point];
            }
        } else {
            for entry in self.indices_map.iter_mut() {
                *entry = value_map[entry.0 as usize];
            }
        }
        self.num_unique_entries = num_unique;
        self.buffer.resize(offset + num_unique * stride);
        Ok(num_unique)
    }
}
