//! Image formats

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    R,
    A,
    Rg,
    Ra,
    Rgb,
    Rgba,
    Bgra,
    Argb,
    Intensity,
    Luminance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    SnormInt8,
    SnormInt16,
    UnormInt8,
    UnormInt16,
    UnormShort565,
    UnormShort555,
    UnormInt101010,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    HalfFloat,
    Float,
}

impl ChannelType {
    fn element_size(self) -> usize {
        match self {
            Self::SnormInt8 | Self::UnormInt8 | Self::SignedInt8 | Self::UnsignedInt8 => 1,
            Self::SnormInt16
            | Self::UnormInt16
            | Self::SignedInt16
            | Self::UnsignedInt16
            | Self::HalfFloat
            | Self::UnormShort565
            | Self::UnormShort555 => 2,
            Self::SignedInt32 | Self::UnsignedInt32 | Self::Float | Self::UnormInt101010 => 4,
        }
    }

    /// Packed types hold every channel of a pixel in one element.
    fn is_packed(self) -> bool {
        matches!(self, Self::UnormShort565 | Self::UnormShort555 | Self::UnormInt101010)
    }
}

impl ChannelOrder {
    fn channels(self) -> usize {
        match self {
            Self::R | Self::A | Self::Intensity | Self::Luminance => 1,
            Self::Rg | Self::Ra => 2,
            Self::Rgb => 3,
            Self::Rgba | Self::Bgra | Self::Argb => 4,
        }
    }
}

/// Channel order plus channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub data_type: ChannelType,
}

impl ImageFormat {
    pub const fn new(order: ChannelOrder, data_type: ChannelType) -> Self {
        Self { order, data_type }
    }

    /// Bytes per pixel.
    pub fn pixel_size(&self) -> usize {
        if self.data_type.is_packed() {
            self.data_type.element_size()
        } else {
            self.order.channels() * self.data_type.element_size()
        }
    }

    /// Reject order/type pairs that have no pixel layout.
    pub fn validate(&self) -> Result<()> {
        use ChannelType::*;
        let ok = match self.order {
            ChannelOrder::Rgb => self.data_type.is_packed(),
            ChannelOrder::Intensity | ChannelOrder::Luminance => {
                matches!(self.data_type, UnormInt8 | UnormInt16 | SnormInt8 | SnormInt16 | HalfFloat | Float)
            }
            ChannelOrder::Argb | ChannelOrder::Bgra => {
                matches!(self.data_type, UnormInt8 | SnormInt8 | SignedInt8 | UnsignedInt8)
            }
            _ => !self.data_type.is_packed(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidImageFormat(format!("{:?}/{:?}", self.order, self.data_type)))
        }
    }
}
