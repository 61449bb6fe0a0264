//! Builds point clouds and meshes from PLY input.
//!
//! The vertex element is matched against a fixed menu of semantic property
//! groups (positions, normals, colors, and the Gaussian-Splatting
//! vocabulary: spherical harmonics, opacity, scales, rotation quaternion,
//! segment id, vector-quantization indices and frame visibility sets).
//! Each recognized group becomes one typed point attribute. Polygonal faces
//! are fan-triangulated. Groups are installed in menu order, so attribute
//! ids are deterministic for a given header.

use std::fs;
use std::path::Path;

use log::warn;

use splat_core::component_conversion::ComponentValue;
use splat_core::data_types::DataType;
use splat_core::geometry_attribute::{GeometryAttribute, GeometryAttributeType};
use splat_core::geometry_indices::{AttributeValueIndex, FaceIndex, PointIndex};
use splat_core::mesh::Mesh;
use splat_core::point_cloud::PointCloud;
use splat_core::status::{error_status, invalid_parameter, ok_status, SplatError, Status};

use crate::ply_reader::{PlyElement, PlyProperty, PlyPropertyReader, PlyReader};

/// Longest `f_rest_*` run the decoder will look at. Valid coefficient
/// counts are far below this; the cap only bounds the header scan.
const MAX_SH_REST_PROPERTIES: usize = 135;

/// Largest number of scale components (2d or 3d splats).
const MAX_SCALE_COMPONENTS: usize = 3;

#[derive(Debug, Default)]
pub struct PlyDecoder;

impl PlyDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode_from_file<P: AsRef<Path>>(&mut self, path: P, out_mesh: &mut Mesh) -> Status {
        let data = fs::read(path)?;
        self.decode_from_buffer(&data, out_mesh)
    }

    pub fn decode_file_to_point_cloud<P: AsRef<Path>>(
        &mut self,
        path: P,
        out_point_cloud: &mut PointCloud,
    ) -> Status {
        let data = fs::read(path)?;
        self.decode_buffer_to_point_cloud(&data, out_point_cloud)
    }

    pub fn decode_from_buffer(&mut self, data: &[u8], out_mesh: &mut Mesh) -> Status {
        let reader = PlyReader::read(data)?;
        self.decode_face_data(&reader, out_mesh)?;
        decode_vertex_data(reader.element_by_name("vertex"), &mut **out_mesh)?;
        // Point clouds without connectivity skip deduplication entirely.
        if out_mesh.num_faces() != 0 {
            out_mesh.deduplicate_attribute_values()?;
            out_mesh.deduplicate_point_ids();
        }
        ok_status()
    }

    pub fn decode_buffer_to_point_cloud(
        &mut self,
        data: &[u8],
        out_point_cloud: &mut PointCloud,
    ) -> Status {
        let reader = PlyReader::read(data)?;
        decode_vertex_data(reader.element_by_name("vertex"), out_point_cloud)
    }

    fn decode_face_data(&mut self, reader: &PlyReader, out_mesh: &mut Mesh) -> Status {
        // A missing face element is fine; the result is a point cloud.
        let face_element = match reader.element_by_name("face") {
            Some(element) => element,
            None => return ok_status(),
        };
        // The indices may be named either "vertex_indices" or "vertex_index".
        let vertex_indices = face_element
            .property_by_name("vertex_indices")
            .or_else(|| face_element.property_by_name("vertex_index"));
        let vertex_indices = match vertex_indices {
            Some(property) if property.is_list() => property,
            _ => return Err(error_status("no faces defined")),
        };

        out_mesh.set_num_faces(count_triangles(face_element, vertex_indices));

        let index_reader = PlyPropertyReader::<u32>::new(vertex_indices);
        let mut face = [PointIndex(0); 3];
        let mut face_index = 0u32;
        for i in 0..face_element.num_entries() {
            let list_offset = vertex_indices.get_list_entry_offset(i);
            let list_size = vertex_indices.get_list_entry_num_values(i);
            if list_size < 3 {
                continue; // All invalid polygons are skipped.
            }
            // Triangulate assuming the polygon is convex: a fan anchored at
            // the first corner.
            let num_triangles = list_size - 2;
            face[0] = PointIndex(index_reader.read_value(list_offset));
            for ti in 0..num_triangles {
                for c in 1..3 {
                    face[c] = PointIndex(index_reader.read_value(list_offset + ti + c));
                }
                out_mesh.set_face(FaceIndex(face_index), face);
                face_index += 1;
            }
        }
        // Skipped polygons tighten the face count.
        out_mesh.set_num_faces(face_index as usize);
        ok_status()
    }
}

fn count_triangles(face_element: &PlyElement, vertex_indices: &PlyProperty) -> usize {
    let mut num_triangles = 0usize;
    for i in 0..face_element.num_entries() {
        let list_size = vertex_indices.get_list_entry_num_values(i);
        if list_size < 3 {
            // Correctly encoded ply files don't have less than three vertices.
            continue;
        }
        num_triangles += list_size - 2;
    }
    num_triangles
}

/// Float32 or an integer of at most 4 bytes; the only element types the
/// Gaussian-Splatting groups accept.
fn is_gs_supported_type(data_type: DataType) -> bool {
    data_type == DataType::Float32 || data_type.is_gs_integral()
}

fn add_gs_attribute(
    pc: &mut PointCloud,
    attribute_type: GeometryAttributeType,
    num_components: u8,
    data_type: DataType,
    normalized: bool,
    num_vertices: usize,
) -> Result<i32, SplatError> {
    let mut template = GeometryAttribute::new();
    template.init(
        attribute_type,
        num_components,
        data_type,
        normalized,
        (num_components as usize * data_type.size()) as i64,
        0,
    )?;
    pc.add_attribute_from(&template, true, num_vertices)
}

fn read_properties_to_attribute<T: ComponentValue>(
    properties: &[&PlyProperty],
    pc: &mut PointCloud,
    att_id: i32,
    num_vertices: usize,
) {
    let readers: Vec<PlyPropertyReader<T>> = properties
        .iter()
        .map(|property| PlyPropertyReader::new(property))
        .collect();
    let attribute = pc.attribute_mut(att_id);
    let mut row: Vec<T> = vec![T::from_i128(0); properties.len()];
    for i in 0..num_vertices {
        for (slot, reader) in row.iter_mut().zip(readers.iter()) {
            *slot = reader.read_value(i);
        }
        attribute.set_typed_value(AttributeValueIndex(i as u32), &row);
    }
}

/// Streams `properties` into the attribute using the reader matching the
/// stored element type. Returns false when the type has no reader.
fn read_properties_by_type(
    properties: &[&PlyProperty],
    data_type: DataType,
    pc: &mut PointCloud,
    att_id: i32,
    num_vertices: usize,
) -> bool {
    match data_type {
        DataType::Float32 => {
            read_properties_to_attribute::<f32>(properties, pc, att_id, num_vertices)
        }
        DataType::UInt8 => read_properties_to_attribute::<u8>(properties, pc, att_id, num_vertices),
        DataType::Int8 => read_properties_to_attribute::<i8>(properties, pc, att_id, num_vertices),
        DataType::UInt16 => {
            read_properties_to_attribute::<u16>(properties, pc, att_id, num_vertices)
        }
        DataType::Int16 => {
            read_properties_to_attribute::<i16>(properties, pc, att_id, num_vertices)
        }
        DataType::UInt32 => {
            read_properties_to_attribute::<u32>(properties, pc, att_id, num_vertices)
        }
        DataType::Int32 => {
            read_properties_to_attribute::<i32>(properties, pc, att_id, num_vertices)
        }
        _ => return false,
    }
    true
}

fn decode_vertex_data(vertex_element: Option<&PlyElement>, pc: &mut PointCloud) -> Status {
    let vertex_element = match vertex_element {
        Some(element) => element,
        None => return Err(invalid_parameter("vertex element is missing")),
    };
    let num_vertices = vertex_element.num_entries();
    pc.set_num_points(num_vertices);

    decode_positions(vertex_element, pc, num_vertices)?;
    decode_normals(vertex_element, pc, num_vertices);
    decode_colors(vertex_element, pc, num_vertices)?;
    decode_spherical_harmonics(vertex_element, pc, num_vertices)?;
    decode_opacity(vertex_element, pc, num_vertices)?;
    decode_scales(vertex_element, pc, num_vertices)?;
    decode_rotation(vertex_element, pc, num_vertices)?;
    decode_segment(vertex_element, pc, num_vertices)?;
    decode_vq_index(vertex_element, pc, num_vertices, "dc_idx", GeometryAttributeType::ShDcIdx)?;
    decode_vq_index(vertex_element, pc, num_vertices, "rest_idx", GeometryAttributeType::ShRestIdx)?;
    decode_vq_index(vertex_element, pc, num_vertices, "scale_idx", GeometryAttributeType::ScaleIdx)?;
    decode_vq_index(
        vertex_element,
        pc,
        num_vertices,
        "rotation_idx",
        GeometryAttributeType::RotationIdx,
    )?;
    decode_visibility(vertex_element, pc, num_vertices, "ins", GeometryAttributeType::Ins)?;
    decode_visibility(vertex_element, pc, num_vertices, "outs", GeometryAttributeType::Outs)?;
    ok_status()
}

fn decode_positions(
    vertex_element: &PlyElement,
    pc: &mut PointCloud,
    num_vertices: usize,
) -> Status {
    let x_prop = vertex_element.property_by_name("x");
    let y_prop = vertex_element.property_by_name("y");
    let z_prop = vertex_element.property_by_name("z");
    let (x_prop, y_prop, z_prop) = match (x_prop, y_prop, z_prop) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        // Three vertex coordinates are required.
        _ => return Err(invalid_parameter("x, y, or z property is missing")),
    };
    if x_prop.data_type() != y_prop.data_type() || y_prop.data_type() != z_prop.data_type() {
        return Err(invalid_parameter(
            "x, y, and z properties must have the same type",
        ));
    }
    let data_type = x_prop.data_type();
    if data_type != DataType::Float32 && data_type != DataType::Int32 {
        return Err(invalid_parameter(
            "x, y, and z properties must be of type float32 or int32",
        ));
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Position,
        3,
        data_type,
        false,
        num_vertices,
    )?;
    read_properties_by_type(&[x_prop, y_prop, z_prop], data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_normals(vertex_element: &PlyElement, pc: &mut PointCloud, num_vertices: usize) {
    let nx_prop = vertex_element.property_by_name("nx");
    let ny_prop = vertex_element.property_by_name("ny");
    let nz_prop = vertex_element.property_by_name("nz");
    // Normals are optional and quietly skipped unless all three components
    // are present as float32.
    if let (Some(nx), Some(ny), Some(nz)) = (nx_prop, ny_prop, nz_prop) {
        if nx.data_type() == DataType::Float32
            && ny.data_type() == DataType::Float32
            && nz.data_type() == DataType::Float32
        {
            if let Ok(att_id) = add_gs_attribute(
                pc,
                GeometryAttributeType::Normal,
                3,
                DataType::Float32,
                false,
                num_vertices,
            ) {
                read_properties_to_attribute::<f32>(&[nx, ny, nz], pc, att_id, num_vertices);
            }
        }
    }
}

fn decode_colors(vertex_element: &PlyElement, pc: &mut PointCloud, num_vertices: usize) -> Status {
    let mut color_props: Vec<&PlyProperty> = Vec::new();
    for channel in ["red", "green", "blue", "alpha"] {
        if let Some(property) = vertex_element.property_by_name(channel) {
            if property.data_type() != DataType::UInt8 {
                return Err(invalid_parameter(format!(
                    "type of '{}' property must be uint8",
                    channel
                )));
            }
            color_props.push(property);
        }
    }
    if color_props.is_empty() {
        return ok_status();
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Color,
        color_props.len() as u8,
        DataType::UInt8,
        true,
        num_vertices,
    )?;
    read_properties_to_attribute::<u8>(&color_props, pc, att_id, num_vertices);
    ok_status()
}

fn decode_spherical_harmonics(
    vertex_element: &PlyElement,
    pc: &mut PointCloud,
    num_vertices: usize,
) -> Status {
    let dc0_prop = vertex_element.property_by_name("f_dc_0");
    let dc1_prop = vertex_element.property_by_name("f_dc_1");
    let dc2_prop = vertex_element.property_by_name("f_dc_2");

    let mut high_order_props: Vec<&PlyProperty> = Vec::new();
    for i in 0..MAX_SH_REST_PROPERTIES {
        match vertex_element.property_by_name(&format!("f_rest_{}", i)) {
            Some(property) => high_order_props.push(property),
            None => break,
        }
    }
    if high_order_props.len() == MAX_SH_REST_PROPERTIES {
        warn!(
            "supporting {} higher order spherical harmonics coefficients at most",
            MAX_SH_REST_PROPERTIES
        );
    }
    let num_high_orders = high_order_props.len();
    if num_high_orders != 0 {
        if !(dc0_prop.is_some() && dc1_prop.is_some() && dc2_prop.is_some()) {
            return Err(invalid_parameter("missing direct current coefficients"));
        }
        if !matches!(num_high_orders, 9 | 24 | 45 | 72 | 105) {
            return Err(invalid_parameter(
                "incorrect number of spherical harmonics coefficients",
            ));
        }
    }

    if let (Some(dc0), Some(dc1), Some(dc2)) = (dc0_prop, dc1_prop, dc2_prop) {
        let data_type = dc0.data_type();
        if dc1.data_type() != data_type || dc2.data_type() != data_type {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be of same type",
            ));
        }
        if !is_gs_supported_type(data_type) {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be float32 or integral",
            ));
        }
        let att_id = add_gs_attribute(
            pc,
            GeometryAttributeType::ShDc,
            3,
            data_type,
            false,
            num_vertices,
        )?;
        if !read_properties_by_type(&[dc0, dc1, dc2], data_type, pc, att_id, num_vertices) {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be float32 or integral",
            ));
        }
    }

    if num_high_orders > 0 {
        let data_type = high_order_props[0].data_type();
        if high_order_props
            .iter()
            .any(|property| property.data_type() != data_type)
        {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be of same type",
            ));
        }
        if !is_gs_supported_type(data_type) {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be float32 or integral",
            ));
        }
        let att_id = add_gs_attribute(
            pc,
            GeometryAttributeType::ShRest,
            num_high_orders as u8,
            data_type,
            false,
            num_vertices,
        )?;
        if !read_properties_by_type(&high_order_props, data_type, pc, att_id, num_vertices) {
            return Err(invalid_parameter(
                "spherical harmonics coefficients must be float32 or integral",
            ));
        }
    }
    ok_status()
}

fn decode_opacity(vertex_element: &PlyElement, pc: &mut PointCloud, num_vertices: usize) -> Status {
    let opacity_prop = match vertex_element.property_by_name("opacity") {
        Some(property) => property,
        None => return ok_status(),
    };
    let data_type = opacity_prop.data_type();
    if !is_gs_supported_type(data_type) {
        return Err(invalid_parameter(
            "type of opacity property must be float32 or integral",
        ));
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Opacity,
        1,
        data_type,
        false,
        num_vertices,
    )?;
    read_properties_by_type(&[opacity_prop], data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_scales(vertex_element: &PlyElement, pc: &mut PointCloud, num_vertices: usize) -> Status {
    let mut scale_props: Vec<&PlyProperty> = Vec::new();
    for i in 0..MAX_SCALE_COMPONENTS {
        match vertex_element.property_by_name(&format!("scale_{}", i)) {
            Some(property) => scale_props.push(property),
            None => break,
        }
    }
    if scale_props.is_empty() {
        return ok_status();
    }
    let data_type = scale_props[0].data_type();
    if scale_props
        .iter()
        .any(|property| property.data_type() != data_type)
    {
        return Err(invalid_parameter("scale properties must be of same type"));
    }
    if !is_gs_supported_type(data_type) {
        return Err(invalid_parameter(
            "scale properties must be float32 or integral",
        ));
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Scale,
        scale_props.len() as u8,
        data_type,
        false,
        num_vertices,
    )?;
    read_properties_by_type(&scale_props, data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_rotation(
    vertex_element: &PlyElement,
    pc: &mut PointCloud,
    num_vertices: usize,
) -> Status {
    let rot_props: Vec<Option<&PlyProperty>> = (0..4)
        .map(|i| vertex_element.property_by_name(&format!("rot_{}", i)))
        .collect();
    // The rotation quaternion is only installed when all four components
    // are declared.
    if rot_props.iter().any(Option::is_none) {
        return ok_status();
    }
    let rot_props: Vec<&PlyProperty> = rot_props.into_iter().flatten().collect();
    let data_type = rot_props[0].data_type();
    if rot_props
        .iter()
        .any(|property| property.data_type() != data_type)
    {
        return Err(invalid_parameter(
            "rotation properties must be of same type",
        ));
    }
    if !is_gs_supported_type(data_type) {
        return Err(invalid_parameter(
            "rotation properties must be float32 or integral",
        ));
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Rotation,
        4,
        data_type,
        false,
        num_vertices,
    )?;
    read_properties_by_type(&rot_props, data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_segment(vertex_element: &PlyElement, pc: &mut PointCloud, num_vertices: usize) -> Status {
    let aux_prop = match vertex_element.property_by_name("segment") {
        Some(property) => property,
        None => return ok_status(),
    };
    let data_type = aux_prop.data_type();
    if data_type != DataType::UInt8 && data_type != DataType::Int8 {
        return Err(invalid_parameter(
            "type of auxiliary data must be uint8 or int8",
        ));
    }
    let att_id = add_gs_attribute(
        pc,
        GeometryAttributeType::Aux,
        1,
        data_type,
        false,
        num_vertices,
    )?;
    read_properties_by_type(&[aux_prop], data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_vq_index(
    vertex_element: &PlyElement,
    pc: &mut PointCloud,
    num_vertices: usize,
    property_name: &str,
    attribute_type: GeometryAttributeType,
) -> Status {
    let index_prop = match vertex_element.property_by_name(property_name) {
        Some(property) => property,
        None => return ok_status(),
    };
    let data_type = index_prop.data_type();
    if !matches!(
        data_type,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32
    ) {
        return Err(invalid_parameter(format!(
            "type of {} data must be uint",
            property_name
        )));
    }
    let att_id = add_gs_attribute(pc, attribute_type, 1, data_type, false, num_vertices)?;
    read_properties_by_type(&[index_prop], data_type, pc, att_id, num_vertices);
    ok_status()
}

fn decode_visibility(
    vertex_element: &PlyElement,
    pc: &mut PointCloud,
    num_vertices: usize,
    property_name: &str,
    attribute_type: GeometryAttributeType,
) -> Status {
    let property = match vertex_element.property_by_name(property_name) {
        Some(property) => property,
        None => return ok_status(),
    };
    let data_type = property.data_type();
    if !data_type.is_gs_integral() {
        return Err(invalid_parameter(format!(
            "type of {} property must be integral",
            property_name
        )));
    }
    let att_id = add_gs_attribute(pc, attribute_type, 1, data_type, false, num_vertices)?;
    read_properties_by_type(&[property], data_type, pc, att_id, num_vertices);
    ok_status()
}
