//! Decode → encode → decode round trips.

use splat_core::data_types::DataType;
use splat_core::geometry_attribute::{GeometryAttributeType, PointAttribute};
use splat_core::geometry_indices::{AttributeValueIndex, PointIndex};
use splat_core::mesh::Mesh;
use splat_core::point_cloud::PointCloud;
use splat_io::{PlyDecoder, PlyEncoder};

/// Builds a binary little-endian GS point cloud with two splats.
fn gaussian_ply() -> Vec<u8> {
    let mut header = String::from("ply\nformat binary_little_endian 1.0\nelement vertex 2\n");
    for p in ["x", "y", "z"] {
        header.push_str(&format!("property float {}\n", p));
    }
    for i in 0..3 {
        header.push_str(&format!("property float f_dc_{}\n", i));
    }
    for i in 0..9 {
        header.push_str(&format!("property float f_rest_{}\n", i));
    }
    header.push_str("property float opacity\n");
    for i in 0..3 {
        header.push_str(&format!("property float scale_{}\n", i));
    }
    for i in 0..4 {
        header.push_str(&format!("property float rot_{}\n", i));
    }
    header.push_str("end_header\n");

    let mut data = header.into_bytes();
    for point in 0..2u32 {
        // 3 + 3 + 9 + 1 + 3 + 4 floats per point.
        for c in 0..23u32 {
            let value = point as f32 * 100.0 + c as f32 * 0.125;
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    data
}

fn assert_point_clouds_equal(a: &PointCloud, b: &PointCloud) {
    assert_eq!(a.num_points(), b.num_points());
    assert_eq!(a.num_attributes(), b.num_attributes());
    for att_id in 0..a.num_attributes() {
        let att_a = a.attribute(att_id);
        let att_b = b.attribute(att_id);
        assert_eq!(att_a.attribute_type(), att_b.attribute_type());
        assert_eq!(att_a.data_type(), att_b.data_type());
        assert_eq!(att_a.num_components(), att_b.num_components());
        assert_eq!(att_a.normalized(), att_b.normalized());
        for p in 0..a.num_points() {
            let point = PointIndex(p as u32);
            let bytes_a = att_a.value_bytes(att_a.mapped_index(point)).unwrap();
            let bytes_b = att_b.value_bytes(att_b.mapped_index(point)).unwrap();
            assert_eq!(bytes_a, bytes_b, "attribute {} point {}", att_id, p);
        }
    }
}

#[test]
fn test_gaussian_point_cloud_round_trip() {
    let original = gaussian_ply();

    let mut first = PointCloud::new();
    PlyDecoder::new()
        .decode_buffer_to_point_cloud(&original, &mut first)
        .unwrap();

    let mut encoded = Vec::new();
    PlyEncoder::new().encode_to_buffer(&first, &mut encoded).unwrap();

    let mut second = PointCloud::new();
    PlyDecoder::new()
        .decode_buffer_to_point_cloud(&encoded, &mut second)
        .unwrap();

    assert_point_clouds_equal(&first, &second);
}

#[test]
fn test_encoded_bytes_are_stable() {
    // Encoding the same decoded cloud twice is byte identical.
    let original = gaussian_ply();
    let mut pc = PointCloud::new();
    PlyDecoder::new()
        .decode_buffer_to_point_cloud(&original, &mut pc)
        .unwrap();

    let mut once = Vec::new();
    let mut twice = Vec::new();
    PlyEncoder::new().encode_to_buffer(&pc, &mut once).unwrap();
    PlyEncoder::new().encode_to_buffer(&pc, &mut twice).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_mesh_round_trip_preserves_faces_and_mapping() {
    let ply = "ply\nformat ascii 1.0\n\
               element vertex 4\n\
               property float x\nproperty float y\nproperty float z\n\
               property uchar red\nproperty uchar green\nproperty uchar blue\n\
               element face 2\n\
               property list uchar int vertex_indices\n\
               end_header\n\
               0 0 0 255 0 0\n\
               1 0 0 0 255 0\n\
               1 1 0 0 0 255\n\
               0 1 0 255 255 255\n\
               3 0 1 2\n3 0 2 3\n";
    let mut first = Mesh::new();
    PlyDecoder::new()
        .decode_from_buffer(ply.as_bytes(), &mut first)
        .unwrap();

    let mut encoded = Vec::new();
    PlyEncoder::new()
        .encode_mesh_to_buffer(&first, &mut encoded)
        .unwrap();

    let mut second = Mesh::new();
    PlyDecoder::new()
        .decode_from_buffer(&encoded, &mut second)
        .unwrap();

    assert_eq!(second.num_faces(), 2);
    assert_eq!(first.num_faces(), second.num_faces());
    for i in 0..first.num_faces() {
        assert_eq!(first.faces()[i], second.faces()[i]);
    }
    assert_point_clouds_equal(&first, &second);
}

#[test]
fn test_file_round_trip() {
    let file = tempfile::NamedTempFile::new().unwrap();

    let mut mesh = Mesh::new();
    PlyDecoder::new()
        .decode_from_buffer(&gaussian_ply(), &mut mesh)
        .unwrap();
    PlyEncoder::new()
        .encode_mesh_to_file(&mesh, file.path())
        .unwrap();

    let mut reloaded = Mesh::new();
    PlyDecoder::new()
        .decode_from_file(file.path(), &mut reloaded)
        .unwrap();
    assert_point_clouds_equal(&mesh, &reloaded);
}

#[test]
fn test_texcoords_are_written_per_corner() {
    // Texture coordinates come from other import paths; make sure the PLY
    // writer emits them as a per-corner list.
    let mut mesh = Mesh::new();
    let mut pos = PointAttribute::new();
    pos.init(GeometryAttributeType::Position, 3, DataType::Float32, false, 3);
    let mut tex = PointAttribute::new();
    tex.init(GeometryAttributeType::TexCoord, 2, DataType::Float32, false, 3);
    for i in 0..3u32 {
        pos.set_typed_value(AttributeValueIndex(i), &[i as f32, 0.0, 0.0]);
        tex.set_typed_value(AttributeValueIndex(i), &[i as f32 * 0.5, 1.0]);
    }
    mesh.add_attribute(pos);
    mesh.add_attribute(tex);
    mesh.add_face([PointIndex(0), PointIndex(1), PointIndex(2)]);

    let mut encoded = Vec::new();
    PlyEncoder::new()
        .encode_mesh_to_buffer(&mesh, &mut encoded)
        .unwrap();
    let text = String::from_utf8_lossy(&encoded);
    assert!(text.contains("property list uchar float texcoord"));

    let header_len = text.find("end_header\n").unwrap() + "end_header\n".len();
    // Per point: 12 bytes position (texcoords live in the face list).
    // Face: 1 + 12 index bytes, then 1 + 24 texcoord bytes.
    assert_eq!(encoded.len() - header_len, 3 * 12 + 13 + 25);
}
