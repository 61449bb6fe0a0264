//! PLY input/output for Gaussian-Splatting point clouds and meshes.
//!
//! The decode path parses a PLY header and payload ([`PlyReader`]), matches
//! the vertex properties against the recognized semantic groups and builds a
//! [`splat_core::PointCloud`] or [`splat_core::Mesh`] ([`PlyDecoder`]).
//! The encode path serializes such a structure back into binary
//! little-endian PLY ([`PlyEncoder`]).
//!
//! ```ignore
//! use splat_core::Mesh;
//! use splat_io::{PlyDecoder, PlyEncoder};
//!
//! let mut mesh = Mesh::new();
//! PlyDecoder::new().decode_from_file("splats.ply", &mut mesh)?;
//! PlyEncoder::new().encode_mesh_to_file(&mesh, "roundtrip.ply")?;
//! ```

pub mod ply_decoder;
pub mod ply_encoder;
pub mod ply_reader;

pub use ply_decoder::PlyDecoder;
pub use ply_encoder::PlyEncoder;
pub use ply_reader::{PlyElement, PlyFormat, PlyProperty, PlyPropertyReader, PlyReader};
