//! Core data model for the Gaussian-Splatting codec pipeline.
//!
//! Point clouds and triangle meshes are stored as columns of typed,
//! strided attributes over raw byte buffers. The I/O crate builds these
//! structures from PLY input and serializes them back; the compressed
//! container codec consumes them through [`EncoderOptions`].

pub mod component_conversion;
pub mod data_buffer;
pub mod data_types;
pub mod encode_config;
pub mod encoder_options;
pub mod geometry_attribute;
pub mod geometry_indices;
pub mod mesh;
pub mod point_cloud;
pub mod status;

pub use component_conversion::{convert_component_value, ComponentValue};
pub use data_buffer::{DataBuffer, DataBufferDescriptor};
pub use data_types::DataType;
pub use encode_config::{EncodeConfig, PointCloudEncodingMethod, MAX_QUANTIZATION_BITS};
pub use encoder_options::EncoderOptions;
pub use geometry_attribute::{GeometryAttribute, GeometryAttributeType, PointAttribute};
pub use geometry_indices::{AttributeValueIndex, FaceIndex, PointIndex};
pub use mesh::{Face, Mesh};
pub use point_cloud::PointCloud;
pub use status::{SplatError, Status};
