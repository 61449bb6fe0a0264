//! Serializes point clouds and meshes back into binary little-endian PLY.
//!
//! Properties are emitted in the same fixed order the decoder recognizes,
//! so a decode/encode pair reproduces the property layout. The body is the
//! raw attribute storage streamed per point through `mapped_index`, which
//! keeps logical point order intact after deduplication.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use splat_core::data_types::DataType;
use splat_core::geometry_attribute::GeometryAttributeType;
use splat_core::geometry_indices::PointIndex;
use splat_core::mesh::Mesh;
use splat_core::point_cloud::PointCloud;
use splat_core::status::{error_status, invalid_parameter, ok_status, SplatError, Status};

#[derive(Debug, Default)]
pub struct PlyEncoder;

impl PlyEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_to_file<P: AsRef<Path>>(&mut self, pc: &PointCloud, path: P) -> Status {
        let mut buffer = Vec::new();
        self.encode_to_buffer(pc, &mut buffer)?;
        fs::write(path, buffer)?;
        ok_status()
    }

    pub fn encode_mesh_to_file<P: AsRef<Path>>(&mut self, mesh: &Mesh, path: P) -> Status {
        let mut buffer = Vec::new();
        self.encode_mesh_to_buffer(mesh, &mut buffer)?;
        fs::write(path, buffer)?;
        ok_status()
    }

    pub fn encode_to_buffer(&mut self, pc: &PointCloud, out_buffer: &mut Vec<u8>) -> Status {
        encode_internal(pc, None, out_buffer)
    }

    pub fn encode_mesh_to_buffer(&mut self, mesh: &Mesh, out_buffer: &mut Vec<u8>) -> Status {
        encode_internal(mesh, Some(mesh), out_buffer)
    }
}

/// PLY property type name for the attribute's element type. Only the types
/// the decoder menu can produce are writable.
fn property_type_name(pc: &PointCloud, att_id: i32) -> Result<&'static str, SplatError> {
    match pc.attribute(att_id).data_type() {
        DataType::Float32 => Ok("float"),
        DataType::UInt8 => Ok("uchar"),
        DataType::Int32 => Ok("int"),
        other => Err(invalid_parameter(format!(
            "attribute type {} is not writable as a PLY property",
            other
        ))),
    }
}

fn encode_internal(pc: &PointCloud, mesh: Option<&Mesh>, out_buffer: &mut Vec<u8>) -> Status {
    let pos_att_id = pc.named_attribute_id(GeometryAttributeType::Position);
    let mut normal_att_id = pc.named_attribute_id(GeometryAttributeType::Normal);
    let mut tex_coord_att_id = pc.named_attribute_id(GeometryAttributeType::TexCoord);
    let color_att_id = pc.named_attribute_id(GeometryAttributeType::Color);
    let sh_dc_att_id = pc.named_attribute_id(GeometryAttributeType::ShDc);
    let sh_rest_att_id = pc.named_attribute_id(GeometryAttributeType::ShRest);
    let opacity_att_id = pc.named_attribute_id(GeometryAttributeType::Opacity);
    let scale_att_id = pc.named_attribute_id(GeometryAttributeType::Scale);
    let rotation_att_id = pc.named_attribute_id(GeometryAttributeType::Rotation);
    let aux_att_id = pc.named_attribute_id(GeometryAttributeType::Aux);

    if pos_att_id < 0 {
        return Err(error_status("point cloud has no position attribute"));
    }
    // Only 3-component normals are written.
    if normal_att_id >= 0 && pc.attribute(normal_att_id).num_components() != 3 {
        normal_att_id = -1;
    }
    // Texture coordinates are written per corner and must have 2 components.
    if tex_coord_att_id >= 0 && pc.attribute(tex_coord_att_id).num_components() != 2 {
        tex_coord_att_id = -1;
    }

    let mut header = String::new();
    let out = &mut header;
    writeln!(out, "ply").unwrap();
    writeln!(out, "format binary_little_endian 1.0").unwrap();
    writeln!(out, "element vertex {}", pc.num_points()).unwrap();
    for axis in ["x", "y", "z"] {
        writeln!(out, "property {} {}", property_type_name(pc, pos_att_id)?, axis).unwrap();
    }
    if normal_att_id >= 0 {
        for axis in ["nx", "ny", "nz"] {
            writeln!(
                out,
                "property {} {}",
                property_type_name(pc, normal_att_id)?,
                axis
            )
            .unwrap();
        }
    }
    if color_att_id >= 0 {
        let num_components = pc.attribute(color_att_id).num_components() as usize;
        let type_name = property_type_name(pc, color_att_id)?;
        for channel in ["red", "green", "blue", "alpha"].iter().take(num_components) {
            writeln!(out, "property {} {}", type_name, channel).unwrap();
        }
    }
    if sh_dc_att_id >= 0 {
        let type_name = property_type_name(pc, sh_dc_att_id)?;
        for i in 0..3 {
            writeln!(out, "property {} f_dc_{}", type_name, i).unwrap();
        }
    }
    if sh_rest_att_id >= 0 {
        let type_name = property_type_name(pc, sh_rest_att_id)?;
        for i in 0..pc.attribute(sh_rest_att_id).num_components() {
            writeln!(out, "property {} f_rest_{}", type_name, i).unwrap();
        }
    }
    if opacity_att_id >= 0 {
        writeln!(
            out,
            "property {} opacity",
            property_type_name(pc, opacity_att_id)?
        )
        .unwrap();
    }
    if scale_att_id >= 0 {
        let type_name = property_type_name(pc, scale_att_id)?;
        writeln!(out, "property {} scale_0", type_name).unwrap();
        writeln!(out, "property {} scale_1", type_name).unwrap();
        // The third scale component is optional (2d vs 3d splats).
        if pc.attribute(scale_att_id).num_components() > 2 {
            writeln!(out, "property {} scale_2", type_name).unwrap();
        }
    }
    if rotation_att_id >= 0 {
        let type_name = property_type_name(pc, rotation_att_id)?;
        for i in 0..4 {
            writeln!(out, "property {} rot_{}", type_name, i).unwrap();
        }
    }
    if aux_att_id >= 0 {
        let type_name = property_type_name(pc, aux_att_id)?;
        for i in 0..pc.attribute(aux_att_id).num_components() {
            writeln!(out, "property {} f_aux_{}", type_name, i).unwrap();
        }
    }
    if let Some(mesh) = mesh {
        writeln!(out, "element face {}", mesh.num_faces()).unwrap();
        writeln!(out, "property list uchar int vertex_indices").unwrap();
        if tex_coord_att_id >= 0 {
            // Texture coordinates are encoded per corner in a second list.
            writeln!(
                out,
                "property list uchar {} texcoord",
                property_type_name(pc, tex_coord_att_id)?
            )
            .unwrap();
        }
    }
    writeln!(out, "end_header").unwrap();
    out_buffer.extend_from_slice(header.as_bytes());

    let vertex_attribute_ids = [
        pos_att_id,
        normal_att_id,
        color_att_id,
        sh_dc_att_id,
        sh_rest_att_id,
        opacity_att_id,
        scale_att_id,
        rotation_att_id,
        aux_att_id,
    ];
    let num_points = pc.num_points();
    for v in 0..num_points {
        let point = PointIndex(v as u32);
        for &att_id in vertex_attribute_ids.iter() {
            if att_id < 0 {
                continue;
            }
            let attribute = pc.attribute(att_id);
            let entry = attribute
                .value_bytes(attribute.mapped_index(point))
                .ok_or_else(|| {
                    SplatError::OutOfRange("attribute entry is outside its buffer".to_string())
                })?;
            out_buffer.extend_from_slice(entry);
        }
    }

    if let Some(mesh) = mesh {
        for i in 0..mesh.num_faces() {
            let face = mesh.faces()[i];
            if !mesh.is_face_valid(&face) {
                return Err(error_status("face references an invalid point"));
            }
            // Number of face indices, always 3 after triangulation.
            out_buffer.push(3u8);
            for corner in face.iter() {
                out_buffer.extend_from_slice(&corner.0.to_le_bytes());
            }
            if tex_coord_att_id >= 0 {
                // Two coordinates for every corner.
                out_buffer.push(6u8);
                let attribute = pc.attribute(tex_coord_att_id);
                for corner in face.iter() {
                    let entry = attribute
                        .value_bytes(attribute.mapped_index(*corner))
                        .ok_or_else(|| {
                            SplatError::OutOfRange(
                                "texcoord entry is outside its buffer".to_string(),
                            )
                        })?;
                    out_buffer.extend_from_slice(entry);
                }
            }
        }
    }
    ok_status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use splat_core::geometry_attribute::PointAttribute;
    use splat_core::geometry_indices::AttributeValueIndex;

    #[test]
    fn test_missing_positions_is_an_error() {
        let pc = PointCloud::new();
        let mut encoder = PlyEncoder::new();
        let mut buffer = Vec::new();
        assert!(encoder.encode_to_buffer(&pc, &mut buffer).is_err());
    }

    #[test]
    fn test_unwritable_type_aborts() {
        let mut pc = PointCloud::new();
        let mut att = PointAttribute::new();
        att.init(GeometryAttributeType::Position, 3, DataType::Float64, false, 1);
        att.set_typed_value(AttributeValueIndex(0), &[0.0f64, 0.0, 0.0]);
        pc.add_attribute(att);
        let mut encoder = PlyEncoder::new();
        let mut buffer = Vec::new();
        let result = encoder.encode_to_buffer(&pc, &mut buffer);
        assert!(matches!(result, Err(SplatError::InvalidParameter(_))));
    }

    #[test]
    fn test_face_with_invalid_corner_aborts() {
        let mut mesh = Mesh::new();
        let mut pos = PointAttribute::new();
        pos.init(GeometryAttributeType::Position, 3, DataType::Float32, false, 2);
        pos.set_typed_value(AttributeValueIndex(0), &[0.0f32, 0.0, 0.0]);
        pos.set_typed_value(AttributeValueIndex(1), &[1.0f32, 0.0, 0.0]);
        mesh.add_attribute(pos);
        mesh.add_face([PointIndex(0), PointIndex(1), PointIndex(5)]);

        let mut encoder = PlyEncoder::new();
        let mut buffer = Vec::new();
        let result = encoder.encode_mesh_to_buffer(&mesh, &mut buffer);
        assert!(matches!(result, Err(SplatError::CodecError(_))));
    }

    #[test]
    fn test_header_property_order() {
        let mut pc = PointCloud::new();
        let mut pos = PointAttribute::new();
        pos.init(GeometryAttributeType::Position, 3, DataType::Float32, false, 1);
        pos.set_typed_value(AttributeValueIndex(0), &[1.0f32, 2.0, 3.0]);
        pc.add_attribute(pos);
        let mut opacity = PointAttribute::new();
        opacity.init(GeometryAttributeType::Opacity, 1, DataType::Float32, false, 1);
        opacity.set_typed_value(AttributeValueIndex(0), &[0.5f32]);
        pc.add_attribute(opacity);

        let mut encoder = PlyEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode_to_buffer(&pc, &mut buffer).unwrap();
        let text = String::from_utf8_lossy(&buffer);
        let header_end = text.find("end_header\n").unwrap();
        let header = &text[..header_end];
        assert!(header.contains("element vertex 1"));
        let x_at = header.find("property float x").unwrap();
        let opacity_at = header.find("property float opacity").unwrap();
        assert!(x_at < opacity_at);
        // Body: 3 floats position + 1 float opacity.
        let body = &buffer[header_end + "end_header\n".len()..];
        assert_eq!(body.len(), 16);
        assert_eq!(&body[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&body[12..16], &0.5f32.to_le_bytes());
    }
}
