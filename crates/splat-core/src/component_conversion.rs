//! Element-level conversion between attribute component types.
//!
//! Attribute payloads are stored as one of eleven scalar types; readers and
//! writers may ask for any other one. `convert_component_value` performs the
//! per-component conversion, honouring the attribute's `normalized` flag:
//! a normalized integer maps the full type range onto `[0, 1]` when read as
//! floating point, and back when written from floating point.
//!
//! The dispatch over stored types happens once per entry (see
//! `PointAttribute::convert_value`); the kernels here are monomorphized per
//! `(In, Out)` pair.

use crate::data_types::DataType;

/// A scalar that can live in an attribute buffer.
///
/// Integer bounds are carried as `i128` so that range checks stay exact for
/// the 64-bit types. `INT_MIN`/`INT_MAX` are meaningless for the float
/// impls and never consulted for them.
pub trait ComponentValue: Copy {
    const DATA_TYPE: DataType;
    const INT_MIN: i128;
    const INT_MAX: i128;

    fn to_f64(self) -> f64;
    fn to_i128(self) -> i128;
    /// Plain-cast construction, `as`-semantics (saturating from floats).
    fn from_f64(v: f64) -> Self;
    /// Plain-cast construction, two's-complement wrap like `as`.
    fn from_i128(v: i128) -> Self;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_int_component {
    ($ty:ty, $dt:expr) => {
        impl ComponentValue for $ty {
            const DATA_TYPE: DataType = $dt;
            const INT_MIN: i128 = <$ty>::MIN as i128;
            const INT_MAX: i128 = <$ty>::MAX as i128;

            fn to_f64(self) -> f64 {
                self as f64
            }
            fn to_i128(self) -> i128 {
                self as i128
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
            fn from_i128(v: i128) -> Self {
                v as $ty
            }
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }
            fn write_le(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

macro_rules! impl_float_component {
    ($ty:ty, $dt:expr) => {
        impl ComponentValue for $ty {
            const DATA_TYPE: DataType = $dt;
            const INT_MIN: i128 = 0;
            const INT_MAX: i128 = 0;

            fn to_f64(self) -> f64 {
                self as f64
            }
            fn to_i128(self) -> i128 {
                self as i128
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
            fn from_i128(v: i128) -> Self {
                v as $ty
            }
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }
            fn write_le(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_int_component!(i8, DataType::Int8);
impl_int_component!(u8, DataType::UInt8);
impl_int_component!(i16, DataType::Int16);
impl_int_component!(u16, DataType::UInt16);
impl_int_component!(i32, DataType::Int32);
impl_int_component!(u32, DataType::UInt32);
impl_int_component!(i64, DataType::Int64);
impl_int_component!(u64, DataType::UInt64);
impl_float_component!(f32, DataType::Float32);
impl_float_component!(f64, DataType::Float64);

impl ComponentValue for bool {
    const DATA_TYPE: DataType = DataType::Bool;
    const INT_MIN: i128 = 0;
    const INT_MAX: i128 = 1;

    fn to_f64(self) -> f64 {
        self as u8 as f64
    }
    fn to_i128(self) -> i128 {
        self as i128
    }
    fn from_f64(v: f64) -> Self {
        v != 0.0
    }
    fn from_i128(v: i128) -> Self {
        v != 0
    }
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
    fn write_le(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

/// Converts one component from `In` to `Out`, returning `None` when the
/// value cannot be represented.
///
/// Precedence of the rules:
/// 1. integral target, non-bool integral source: the value must fit the
///    target range (lower bound 0 for unsigned sources);
/// 2. integral target, floating source: NaN and infinities are rejected, as
///    is anything outside `[min(Out), max(Out))`;
/// 3. normalized int -> float: divide by `max(In)`;
/// 4. normalized float -> int: the value must lie in `[0, 1]`, 64-bit
///    targets are unsupported, result is `floor(v * max(Out) + 0.5)`;
/// 5. otherwise a plain numeric cast.
///
/// The normalized flag has no effect on int -> int conversions; remapping
/// between normalized integer ranges is a known gap (TODO upstream) and a
/// silent rescale here would corrupt round trips.
pub fn convert_component_value<In: ComponentValue, Out: ComponentValue>(
    in_value: In,
    normalized: bool,
) -> Option<Out> {
    let in_type = In::DATA_TYPE;
    let out_type = Out::DATA_TYPE;

    if out_type.is_integral() {
        if in_type.is_integral() && in_type != DataType::Bool {
            let v = in_value.to_i128();
            let out_min = if in_type.is_signed_integer() {
                Out::INT_MIN
            } else {
                0
            };
            if v < out_min || v > Out::INT_MAX {
                return None;
            }
        }
        if in_type.is_floating_point() {
            let v = in_value.to_f64();
            if v.is_nan() || v.is_infinite() {
                return None;
            }
            if v < Out::INT_MIN as f64 || v >= Out::INT_MAX as f64 {
                return None;
            }
        }
    }

    if in_type.is_integral() && out_type.is_floating_point() && normalized {
        return Some(Out::from_f64(in_value.to_f64() / In::INT_MAX as f64));
    }

    if in_type.is_floating_point() && out_type.is_integral() && normalized {
        let v = in_value.to_f64();
        if !(0.0..=1.0).contains(&v) {
            return None;
        }
        if out_type.size() > 4 {
            return None;
        }
        return Some(Out::from_f64((v * Out::INT_MAX as f64 + 0.5).floor()));
    }

    if in_type.is_floating_point() {
        Some(Out::from_f64(in_value.to_f64()))
    } else {
        Some(Out::from_i128(in_value.to_i128()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_to_int_exact() {
        assert_eq!(convert_component_value::<i32, i16>(1234, false), Some(1234));
        assert_eq!(convert_component_value::<u8, i64>(200, false), Some(200));
        assert_eq!(
            convert_component_value::<i64, u64>(i64::MAX, false),
            Some(i64::MAX as u64)
        );
    }

    #[test]
    fn test_int_range_check() {
        assert_eq!(convert_component_value::<i32, u8>(-1, false), None::<u8>);
        assert_eq!(convert_component_value::<i32, u8>(256, false), None::<u8>);
        assert_eq!(convert_component_value::<u16, i8>(128, false), None::<i8>);
        assert_eq!(convert_component_value::<u64, i64>(u64::MAX, false), None::<i64>);
    }

    #[test]
    fn test_float_to_int_sanitation() {
        assert_eq!(convert_component_value::<f32, i32>(f32::NAN, false), None::<i32>);
        assert_eq!(
            convert_component_value::<f32, i32>(f32::INFINITY, false),
            None::<i32>
        );
        assert_eq!(convert_component_value::<f64, u8>(256.0, false), None::<u8>);
        assert_eq!(convert_component_value::<f64, u8>(-0.5, false), None::<u8>);
        // Non-normalized float to int truncates.
        assert_eq!(convert_component_value::<f32, i32>(3.9, false), Some(3));
    }

    #[test]
    fn test_normalized_int_to_float() {
        assert_eq!(convert_component_value::<u8, f32>(255, true), Some(1.0));
        assert_eq!(convert_component_value::<u8, f32>(0, true), Some(0.0));
        let half: f32 = convert_component_value::<u16, f32>(u16::MAX / 2, true).unwrap();
        assert!((half - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_normalized_float_to_int() {
        assert_eq!(convert_component_value::<f32, u8>(1.0, true), Some(255));
        assert_eq!(convert_component_value::<f32, u8>(0.0, true), Some(0));
        assert_eq!(convert_component_value::<f32, u8>(0.5, true), Some(128));
        assert_eq!(convert_component_value::<f32, u8>(1.000_000_1, true), None::<u8>);
        assert_eq!(convert_component_value::<f32, u8>(-0.1, true), None::<u8>);
        assert_eq!(convert_component_value::<f32, u8>(f32::NAN, true), None::<u8>);
    }

    #[test]
    fn test_normalized_float_to_wide_int_unsupported() {
        assert_eq!(convert_component_value::<f32, u64>(0.5, true), None::<u64>);
        assert_eq!(convert_component_value::<f64, i64>(0.5, true), None::<i64>);
    }

    #[test]
    fn test_normalized_int_to_int_is_plain_cast() {
        // No rescaling across integer widths even when normalized.
        assert_eq!(convert_component_value::<u16, u8>(200, true), Some(200));
        assert_eq!(convert_component_value::<u16, u8>(300, true), None::<u8>);
    }

    #[test]
    fn test_bool_conversions() {
        assert_eq!(convert_component_value::<bool, u8>(true, false), Some(1));
        assert_eq!(convert_component_value::<bool, f32>(true, false), Some(1.0));
        assert_eq!(convert_component_value::<u8, bool>(1, false), Some(true));
        // Values beyond the bool range are rejected, not truncated.
        assert_eq!(convert_component_value::<u8, bool>(5, false), None::<bool>);
    }

    #[test]
    fn test_le_round_trip() {
        let mut buf = [0u8; 8];
        (-12345i32).write_le(&mut buf);
        assert_eq!(i32::read_le(&buf), -12345);
        1.5f64.write_le(&mut buf);
        assert_eq!(f64::read_le(&buf), 1.5);
    }
}
