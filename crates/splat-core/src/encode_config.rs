//! Typed configuration for handing a point cloud to the compressed-container
//! encoder.
//!
//! The container encoder itself is an external collaborator; this module
//! carries the recognized per-role quantization settings, validates them,
//! prepares the point cloud (attribute skipping) and fans the settings out
//! into the string-keyed [`EncoderOptions`] the encoder consumes.

use crate::encoder_options::EncoderOptions;
use crate::geometry_attribute::GeometryAttributeType;
use crate::point_cloud::PointCloud;
use crate::status::{invalid_parameter, ok_status, Status};

pub const MAX_QUANTIZATION_BITS: i32 = 30;

/// Attributes carrying the per-splat Gaussian payload; they all share the
/// `gaussian_quantization_bits` setting.
const GAUSSIAN_TYPES: [GeometryAttributeType; 6] = [
    GeometryAttributeType::ShDc,
    GeometryAttributeType::ShRest,
    GeometryAttributeType::Opacity,
    GeometryAttributeType::Scale,
    GeometryAttributeType::Rotation,
    GeometryAttributeType::Aux,
];

const VQ_INDEX_TYPES: [GeometryAttributeType; 4] = [
    GeometryAttributeType::ShDcIdx,
    GeometryAttributeType::ShRestIdx,
    GeometryAttributeType::ScaleIdx,
    GeometryAttributeType::RotationIdx,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudEncodingMethod {
    Sequential = 0,
    KdTree = 1,
}

/// Recognized encoder settings with the stock defaults.
///
/// Quantization bits: `0` disables quantization for the role, a negative
/// value deletes the role's attributes before encoding, anything above
/// [`MAX_QUANTIZATION_BITS`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeConfig {
    pub pos_quantization_bits: i32,
    pub tex_coords_quantization_bits: i32,
    pub normals_quantization_bits: i32,
    pub generic_quantization_bits: i32,
    pub gaussian_quantization_bits: i32,
    pub gaussian_dc_idx_bits: i32,
    pub gaussian_sh_idx_bits: i32,
    pub gaussian_scale_idx_bits: i32,
    pub gaussian_rot_idx_bits: i32,
    pub compression_level: i32,
    pub preserve_polygons: bool,
    pub use_metadata: bool,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            pos_quantization_bits: 12,
            tex_coords_quantization_bits: 10,
            normals_quantization_bits: 8,
            generic_quantization_bits: 8,
            gaussian_quantization_bits: 10,
            gaussian_dc_idx_bits: 12,
            gaussian_sh_idx_bits: 9,
            gaussian_scale_idx_bits: 12,
            gaussian_rot_idx_bits: 12,
            compression_level: 7,
            preserve_polygons: false,
            use_metadata: false,
        }
    }
}

impl EncodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Status {
        for (bits, what) in [
            (self.pos_quantization_bits, "position"),
            (self.tex_coords_quantization_bits, "texture coordinate"),
            (self.normals_quantization_bits, "normal"),
            (self.generic_quantization_bits, "generic"),
            (self.gaussian_quantization_bits, "gaussian"),
            (self.gaussian_dc_idx_bits, "dc idx"),
            (self.gaussian_sh_idx_bits, "sh idx"),
            (self.gaussian_scale_idx_bits, "scale idx"),
            (self.gaussian_rot_idx_bits, "rotation idx"),
        ] {
            if bits > MAX_QUANTIZATION_BITS {
                return Err(invalid_parameter(format!(
                    "the maximum number of quantization bits for the {} attribute is {}",
                    what, MAX_QUANTIZATION_BITS
                )));
            }
        }
        if !(0..=10).contains(&self.compression_level) {
            return Err(invalid_parameter(
                "compression level must be between 0 and 10",
            ));
        }
        ok_status()
    }

    /// Encoder speed derived from the compression level (0 = slowest,
    /// 10 = fastest).
    pub fn speed(&self) -> i32 {
        10 - self.compression_level
    }

    /// Speed 10 falls back to plain sequential point encoding.
    pub fn point_cloud_encoding_method(&self) -> PointCloudEncodingMethod {
        if self.speed() == 10 {
            PointCloudEncodingMethod::Sequential
        } else {
            PointCloudEncodingMethod::KdTree
        }
    }

    /// Deletes the attributes of every role whose bits are negative.
    /// Positions cannot be skipped. When anything was deleted, point-id
    /// deduplication runs again as some points may have become identical.
    pub fn prepare_point_cloud(&self, pc: &mut PointCloud) -> Status {
        if self.pos_quantization_bits < 0 {
            return Err(invalid_parameter("position attribute cannot be skipped"));
        }
        let mut deleted = false;
        if self.tex_coords_quantization_bits < 0 {
            deleted |= delete_named_attributes(pc, GeometryAttributeType::TexCoord);
        }
        if self.normals_quantization_bits < 0 {
            deleted |= delete_named_attributes(pc, GeometryAttributeType::Normal);
        }
        if self.generic_quantization_bits < 0 {
            deleted |= delete_named_attributes(pc, GeometryAttributeType::Generic);
        }
        if self.gaussian_quantization_bits < 0 {
            for att_type in GAUSSIAN_TYPES {
                deleted |= delete_named_attributes(pc, att_type);
            }
            for att_type in VQ_INDEX_TYPES {
                deleted |= delete_named_attributes(pc, att_type);
            }
        }
        if deleted {
            pc.deduplicate_point_ids();
        }
        ok_status()
    }

    /// Writes per-attribute quantization settings for every present role.
    /// Roles with bits <= 0 are left unquantized.
    pub fn apply_to(&self, options: &mut EncoderOptions, pc: &PointCloud) {
        options.set_speed(self.speed(), self.speed());
        let mut set_bits = |att_type: GeometryAttributeType, bits: i32| {
            if bits <= 0 {
                return;
            }
            for k in 0..pc.num_named_attributes(att_type) {
                let att_id = pc.named_attribute_id_at(att_type, k);
                options.set_attribute_int(att_id, "quantization_bits", bits);
            }
        };
        set_bits(GeometryAttributeType::Position, self.pos_quantization_bits);
        set_bits(
            GeometryAttributeType::TexCoord,
            self.tex_coords_quantization_bits,
        );
        set_bits(GeometryAttributeType::Normal, self.normals_quantization_bits);
        set_bits(GeometryAttributeType::Generic, self.generic_quantization_bits);
        for att_type in GAUSSIAN_TYPES {
            set_bits(att_type, self.gaussian_quantization_bits);
        }
        set_bits(GeometryAttributeType::ShDcIdx, self.gaussian_dc_idx_bits);
        set_bits(GeometryAttributeType::ShRestIdx, self.gaussian_sh_idx_bits);
        set_bits(GeometryAttributeType::ScaleIdx, self.gaussian_scale_idx_bits);
        set_bits(
            GeometryAttributeType::RotationIdx,
            self.gaussian_rot_idx_bits,
        );
    }
}

fn delete_named_attributes(pc: &mut PointCloud, att_type: GeometryAttributeType) -> bool {
    let mut deleted = false;
    while pc.num_named_attributes(att_type) > 0 {
        pc.delete_attribute(pc.named_attribute_id_at(att_type, 0));
        deleted = true;
    }
    deleted
}
