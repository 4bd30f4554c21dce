//! Material uniform values.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::assets::TextureHandle;

/// A single uniform element as written to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformData {
    /// GLSL spelling of the value's type.
    #[must_use]
    pub const fn glsl_name(&self) -> &'static str {
        match self {
            UniformData::Float(_) => "float",
            UniformData::Int(_) => "int",
            UniformData::Vec2(_) => "vec2",
            UniformData::Vec3(_) => "vec3",
            UniformData::Vec4(_) => "vec4",
            UniformData::Mat3(_) => "mat3",
            UniformData::Mat4(_) => "mat4",
        }
    }
}

/// Value a material supplies for a custom uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    /// Bound to the next free texture unit; the sampler receives the unit.
    Texture(TextureHandle),
    FloatArray(Vec<f32>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
}

impl UniformValue {
    /// Element `index` of the value. Scalars answer index 0 only.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<UniformData> {
        match self {
            UniformValue::Float(v) if index == 0 => Some(UniformData::Float(*v)),
            UniformValue::Int(v) if index == 0 => Some(UniformData::Int(*v)),
            UniformValue::Vec2(v) if index == 0 => Some(UniformData::Vec2(*v)),
            UniformValue::Vec3(v) if index == 0 => Some(UniformData::Vec3(*v)),
            UniformValue::Vec4(v) if index == 0 => Some(UniformData::Vec4(*v)),
            UniformValue::Mat3(v) if index == 0 => Some(UniformData::Mat3(*v)),
            UniformValue::Mat4(v) if index == 0 => Some(UniformData::Mat4(*v)),
            UniformValue::FloatArray(a) => a.get(index).copied().map(UniformData::Float),
            UniformValue::Vec2Array(a) => a.get(index).copied().map(UniformData::Vec2),
            UniformValue::Vec3Array(a) => a.get(index).copied().map(UniformData::Vec3),
            UniformValue::Vec4Array(a) => a.get(index).copied().map(UniformData::Vec4),
            UniformValue::Mat4Array(a) => a.get(index).copied().map(UniformData::Mat4),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            UniformValue::Texture(handle) => Some(*handle),
            _ => None,
        }
    }
}

macro_rules! impl_uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )*
    };
}

impl_uniform_from!(
    f32 => Float,
    i32 => Int,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    TextureHandle => Texture,
    Vec<f32> => FloatArray,
    Vec<Vec3> => Vec3Array,
    Vec<Mat4> => Mat4Array,
);
