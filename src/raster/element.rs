//! Pixel element types

use std::fmt::{self, Debug};

use gdal::raster::{GdalDataType, GdalType};
use num_traits::{NumCast, ToPrimitive};

/// The fixed set of pixel types a [`RasterDataset`](super::RasterDataset) can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn from_gdal(data_type: GdalDataType) -> Option<Self> {
        match data_type {
            GdalDataType::UInt8 => Some(DataType::UInt8),
            GdalDataType::UInt16 => Some(DataType::UInt16),
            GdalDataType::Int16 => Some(DataType::Int16),
            GdalDataType::UInt32 => Some(DataType::UInt32),
            GdalDataType::Int32 => Some(DataType::Int32),
            GdalDataType::Float32 => Some(DataType::Float32),
            GdalDataType::Float64 => Some(DataType::Float64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Types that can be stored in a raster cell.
pub trait RasterElement:
    sealed::Sealed
    + GdalType
    + NumCast
    + Copy
    + Default
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
{
    const DATA_TYPE: DataType;

    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }

    /// Converts a resampled value back into the element type, rounding and
    /// saturating for integer types.
    fn from_f64(value: f64) -> Self {
        let value = if Self::DATA_TYPE.is_float() {
            value
        } else {
            value.round()
        };
        <Self as NumCast>::from(value)
            .or_else(|| {
                if value.is_nan() {
                    None
                } else if value > 0.0 {
                    Self::max_value()
                } else {
                    Self::min_value()
                }
            })
            .unwrap_or_default()
    }

    fn min_value() -> Option<Self>;
    fn max_value() -> Option<Self>;

    /// True when the value equals `nodata`; NaN matches a NaN nodata.
    fn is_nodata(self, nodata: Option<f64>) -> bool {
        match nodata {
            Some(nd) if nd.is_nan() => self.as_f64().is_nan(),
            Some(nd) => self.as_f64() == nd,
            None => false,
        }
    }
}

macro_rules! impl_raster_element {
    ($t:ty, $dt:expr) => {
        impl sealed::Sealed for $t {}

        impl RasterElement for $t {
            const DATA_TYPE: DataType = $dt;

            fn min_value() -> Option<Self> {
                Some(<$t>::MIN)
            }

            fn max_value() -> Option<Self> {
                Some(<$t>::MAX)
            }
        }
    };
}

impl_raster_element!(u8, DataType::UInt8);
impl_raster_element!(u16, DataType::UInt16);
impl_raster_element!(i16, DataType::Int16);
impl_raster_element!(u32, DataType::UInt32);
impl_raster_element!(i32, DataType::Int32);
impl_raster_element!(f32, DataType::Float32);
impl_raster_element!(f64, DataType::Float64);

/// Casts a nodata value into `T`, or `T::default()` when unset or out of range.
pub fn fill_value<T: RasterElement>(nodata: Option<f64>) -> T {
    nodata
        .and_then(|nd| <T as NumCast>::from(nd))
        .unwrap_or_default()
}
