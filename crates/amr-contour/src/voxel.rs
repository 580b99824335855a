//! Voxel scalar types and typed cell arrays.
//!
//! Cell arrays arrive with a runtime type tag ([`VoxelArray`]). The hot loop of
//! the dual grid walker is generic over [`Voxel`] and the type is matched once
//! per block with [`with_voxel_slice!`](crate::with_voxel_slice).

use std::fmt::Debug;

use num_traits::AsPrimitive;

/// A numeric voxel type that can be contoured.
pub trait Voxel: Copy + Send + Sync + Debug + AsPrimitive<f64> + 'static {
    /// Name reported in logs and warnings.
    const TYPE_NAME: &'static str;

    /// Convert a value received from another rank back into the voxel type.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_voxel {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl Voxel for $t {
                const TYPE_NAME: &'static str = $name;

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_voxel!(
    u8 => "u8",
    i8 => "i8",
    u16 => "u16",
    i16 => "i16",
    u32 => "u32",
    i32 => "i32",
    u64 => "u64",
    i64 => "i64",
    f32 => "f32",
    f64 => "f64",
);

/// A cell array with its element type resolved at runtime.
///
/// Values are stored x-fastest over the full extent of the block, ghost
/// layers included.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelArray {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// An array whose element type cannot be contoured (strings, bit arrays,
    /// multi-component tuples). Only its length is known.
    Unsupported { type_name: String, len: usize },
}

/// Run an expression against the typed slice inside a [`VoxelArray`].
///
/// Evaluates `$unsupported` when the array type cannot be contoured.
#[macro_export]
macro_rules! with_voxel_slice {
    ($array:expr, |$slice:ident| $body:expr, $unsupported:expr) => {
        match $array {
            $crate::VoxelArray::U8(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::I8(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::U16(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::I16(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::U32(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::I32(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::U64(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::I64(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::F32(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::F64(values) => {
                let $slice = values.as_slice();
                $body
            }
            $crate::VoxelArray::Unsupported { .. } => $unsupported,
        }
    };
}

impl VoxelArray {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            VoxelArray::Unsupported { len, .. } => *len,
            other => with_voxel_slice!(other, |values| values.len(), 0),
        }
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the element type.
    pub fn type_name(&self) -> &str {
        fn name_of<T: Voxel>(_: &[T]) -> &'static str {
            T::TYPE_NAME
        }
        match self {
            VoxelArray::Unsupported { type_name, .. } => type_name.as_str(),
            other => with_voxel_slice!(other, |values| name_of(values), ""),
        }
    }

    /// True when the element type can be contoured.
    pub fn is_supported(&self) -> bool {
        !matches!(self, VoxelArray::Unsupported { .. })
    }

    /// Value at `index` widened to `f64`.
    ///
    /// Returns `None` out of range or for unsupported arrays.
    #[inline]
    pub fn get(&self, index: usize) -> Option<f64> {
        fn read<T: Voxel>(values: &[T], index: usize) -> Option<f64> {
            values.get(index).map(|v| v.as_())
        }
        with_voxel_slice!(self, |values| read(values, index), None)
    }

    /// Overwrite the value at `index`. Out-of-range writes are ignored.
    #[inline]
    pub fn set(&mut self, index: usize, value: f64) {
        fn store<T: Voxel>(values: &mut [T], index: usize, value: f64) {
            if let Some(slot) = values.get_mut(index) {
                *slot = T::from_f64(value);
            }
        }
        match self {
            VoxelArray::U8(v) => store(v, index, value),
            VoxelArray::I8(v) => store(v, index, value),
            VoxelArray::U16(v) => store(v, index, value),
            VoxelArray::I16(v) => store(v, index, value),
            VoxelArray::U32(v) => store(v, index, value),
            VoxelArray::I32(v) => store(v, index, value),
            VoxelArray::U64(v) => store(v, index, value),
            VoxelArray::I64(v) => store(v, index, value),
            VoxelArray::F32(v) => store(v, index, value),
            VoxelArray::F64(v) => store(v, index, value),
            VoxelArray::Unsupported { .. } => {}
        }
    }

    /// A zero-filled array of the same element type.
    pub fn zeroed_like(&self, len: usize) -> VoxelArray {
        fn zeros<T: Voxel>(_: &[T], len: usize) -> Vec<T> {
            vec![T::from_f64(0.0); len]
        }
        match self {
            VoxelArray::U8(v) => VoxelArray::U8(zeros(v, len)),
            VoxelArray::I8(v) => VoxelArray::I8(zeros(v, len)),
            VoxelArray::U16(v) => VoxelArray::U16(zeros(v, len)),
            VoxelArray::I16(v) => VoxelArray::I16(zeros(v, len)),
            VoxelArray::U32(v) => VoxelArray::U32(zeros(v, len)),
            VoxelArray::I32(v) => VoxelArray::I32(zeros(v, len)),
            VoxelArray::U64(v) => VoxelArray::U64(zeros(v, len)),
            VoxelArray::I64(v) => VoxelArray::I64(zeros(v, len)),
            VoxelArray::F32(v) => VoxelArray::F32(zeros(v, len)),
            VoxelArray::F64(v) => VoxelArray::F64(zeros(v, len)),
            VoxelArray::Unsupported { type_name, .. } => VoxelArray::Unsupported {
                type_name: type_name.clone(),
                len,
            },
        }
    }
}

macro_rules! impl_from_vec {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$t>> for VoxelArray {
                fn from(values: Vec<$t>) -> Self {
                    VoxelArray::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);
