//! Cross-module behavior of the attribute store.

use splat_core::data_types::DataType;
use splat_core::geometry_attribute::{GeometryAttribute, GeometryAttributeType, PointAttribute};
use splat_core::geometry_indices::{AttributeValueIndex, PointIndex};
use splat_core::mesh::Mesh;
use splat_core::point_cloud::PointCloud;

fn position_attribute(values: &[[f32; 3]]) -> PointAttribute {
    let mut att = PointAttribute::new();
    att.init(
        GeometryAttributeType::Position,
        3,
        DataType::Float32,
        false,
        values.len(),
    );
    for (i, v) in values.iter().enumerate() {
        att.set_typed_value(AttributeValueIndex(i as u32), v);
    }
    att
}

#[test]
fn test_add_attribute_from_template() {
    let mut template = GeometryAttribute::new();
    template
        .init(
            GeometryAttributeType::ShDc,
            3,
            DataType::Float32,
            false,
            12,
            0,
        )
        .unwrap();
    let mut pc = PointCloud::new();
    pc.set_num_points(4);
    let att_id = pc.add_attribute_from(&template, true, 4).unwrap();
    assert_eq!(att_id, 0);
    let att = pc.attribute(att_id);
    assert_eq!(att.attribute_type(), GeometryAttributeType::ShDc);
    assert_eq!(att.size(), 4);
    assert_eq!(att.byte_stride(), 12);
    assert!(att.is_mapping_identity());
}

#[test]
fn test_writes_bump_buffer_revision() {
    let mut att = position_attribute(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
    let before = att.buffer().update_count();
    att.set_typed_value(AttributeValueIndex(0), &[2.0f32, 2.0, 2.0]);
    assert_eq!(att.buffer().update_count(), before + 1);
    // The view snapshot was taken at init time and now lags the buffer.
    assert!(att.base().buffer_descriptor().buffer_update_count < att.buffer().update_count());
}

#[test]
fn test_dedup_runs_are_idempotent() {
    let values = [
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [2.0, 0.0, 0.0],
    ];
    let mut mesh = Mesh::new();
    mesh.add_attribute(position_attribute(&values));
    mesh.set_num_points(values.len());
    mesh.add_face([PointIndex(0), PointIndex(1), PointIndex(4)]);
    mesh.add_face([PointIndex(2), PointIndex(3), PointIndex(4)]);

    mesh.deduplicate_attribute_values().unwrap();
    mesh.deduplicate_point_ids();
    let faces_once: Vec<_> = mesh.faces().to_vec();
    let num_points_once = mesh.num_points();
    let num_values_once = mesh.attribute(0).size();

    // Re-running the pipeline must not change anything.
    mesh.deduplicate_attribute_values().unwrap();
    assert!(mesh.deduplicate_point_ids().is_none());
    assert_eq!(mesh.faces(), faces_once.as_slice());
    assert_eq!(mesh.num_points(), num_points_once);
    assert_eq!(mesh.attribute(0).size(), num_values_once);

    assert_eq!(num_points_once, 3);
    assert_eq!(num_values_once, 3);
    assert_eq!(faces_once[0], [PointIndex(0), PointIndex(1), PointIndex(2)]);
    assert_eq!(faces_once[1], [PointIndex(0), PointIndex(1), PointIndex(2)]);
}

#[test]
fn test_attribute_ids_shift_after_delete() {
    let mut pc = PointCloud::new();
    for att_type in [
        GeometryAttributeType::Position,
        GeometryAttributeType::ShDc,
        GeometryAttributeType::Opacity,
        GeometryAttributeType::Rotation,
    ] {
        let mut att = PointAttribute::new();
        att.init(att_type, 1, DataType::Float32, false, 2);
        pc.add_attribute(att);
    }
    let opacity_uid = pc.attribute(2).unique_id();
    pc.delete_attribute(1);
    assert_eq!(pc.num_attributes(), 3);
    assert_eq!(pc.named_attribute_id(GeometryAttributeType::Opacity), 1);
    assert_eq!(pc.named_attribute_id(GeometryAttributeType::Rotation), 2);
    // Unique ids survive the shift.
    assert_eq!(pc.attribute_id_by_unique_id(opacity_uid), 1);
}

#[test]
fn test_convert_value_round_trip_through_f32() {
    let mut att = PointAttribute::new();
    att.init(GeometryAttributeType::Opacity, 1, DataType::UInt8, true, 1);
    att.convert_and_set(AttributeValueIndex(0), &[0.25f32]).unwrap();
    let mut out = [0.0f32];
    assert!(att.convert_value(AttributeValueIndex(0), &mut out));
    // 0.25 quantized to u8 and back stays within one quantization step.
    assert!((out[0] - 0.25).abs() <= 1.0 / 255.0);
}
