// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    util::unpack_signed,
};

#[derive(Debug, Clone, Copy)]
pub enum U32 {
    Bits(usize),
    BitsOffset { n: usize, off: u32 },
    Val(u32),
}

impl U32 {
    pub fn read(&self, br: &mut BitReader) -> Result<u32> {
        match *self {
            U32::Bits(n) => Ok(br.read(n)? as u32),
            U32::BitsOffset { n, off } => (br.read(n)? as u32)
                .checked_add(off)
                .ok_or(Error::ArithmeticOverflow),
            U32::Val(val) => Ok(val),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum U32Coder {
    Direct(U32),
    Select(U32, U32, U32, U32),
}

impl U32Coder {
    pub fn read(&self, br: &mut BitReader) -> Result<u32> {
        match self {
            U32Coder::Direct(u) => u.read(br),
            U32Coder::Select(u0, u1, u2, u3) => match br.read(2)? {
                0 => u0.read(br),
                1 => u1.read(br),
                2 => u2.read(br),
                _ => u3.read(br),
            },
        }
    }
}

/// Default coder for enum values.
pub const ENUM_CODER: U32Coder = U32Coder::Select(
    U32::Val(0),
    U32::Val(1),
    U32::BitsOffset { n: 4, off: 2 },
    U32::BitsOffset { n: 6, off: 18 },
);

#[derive(Debug, Default, Clone, Copy)]
pub struct Empty {}

pub trait UnconditionalCoder<Config>
where
    Self: Sized,
{
    type Nonserialized;
    fn read_unconditional(
        config: &Config,
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<Self>;
}

impl UnconditionalCoder<()> for bool {
    type Nonserialized = Empty;
    fn read_unconditional(_: &(), br: &mut BitReader, _: &Self::Nonserialized) -> Result<bool> {
        Ok(br.read(1)? != 0)
    }
}

impl UnconditionalCoder<()> for f32 {
    type Nonserialized = Empty;
    fn read_unconditional(_: &(), br: &mut BitReader, _: &Self::Nonserialized) -> Result<f32> {
        use half::f16;
        let ret = f16::from_bits(br.read(16)? as u16);
        if !ret.is_finite() {
            Err(Error::FloatNaNOrInf)
        } else {
            Ok(ret.to_f32())
        }
    }
}

impl UnconditionalCoder<U32Coder> for u32 {
    type Nonserialized = Empty;
    fn read_unconditional(
        config: &U32Coder,
        br: &mut BitReader,
        _: &Self::Nonserialized,
    ) -> Result<u32> {
        config.read(br)
    }
}

impl UnconditionalCoder<U32Coder> for i32 {
    type Nonserialized = Empty;
    fn read_unconditional(
        config: &U32Coder,
        br: &mut BitReader,
        _: &Self::Nonserialized,
    ) -> Result<i32> {
        Ok(unpack_signed(config.read(br)?))
    }
}

impl UnconditionalCoder<()> for u64 {
    type Nonserialized = Empty;
    fn read_unconditional(_: &(), br: &mut BitReader, _: &Self::Nonserialized) -> Result<u64> {
        match br.read(2)? {
            0 => Ok(0),
            1 => Ok(1 + br.read(4)?),
            2 => Ok(17 + br.read(8)?),
            _ => {
                let mut result: u64 = br.read(12)?;
                let mut shift = 12;
                while br.read(1)? == 1 {
                    if shift == 60 {
                        result |= br.read(4)? << shift;
                        break;
                    }
                    result |= br.read(8)? << shift;
                    shift += 8;
                }
                Ok(result)
            }
        }
    }
}

impl UnconditionalCoder<()> for String {
    type Nonserialized = Empty;
    fn read_unconditional(
        _: &(),
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<String> {
        let len = u32::read_unconditional(
            &U32Coder::Select(
                U32::Val(0),
                U32::Bits(4),
                U32::BitsOffset { n: 5, off: 16 },
                U32::BitsOffset { n: 10, off: 48 },
            ),
            br,
            nonserialized,
        )?;
        let mut bytes = Vec::new();
        bytes.try_reserve(len as usize)?;
        for _ in 0..len {
            bytes.push(br.read(8)? as u8);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<T: UnconditionalCoder<Config>, Config, const N: usize> UnconditionalCoder<Config> for [T; N] {
    type Nonserialized = T::Nonserialized;
    fn read_unconditional(
        config: &Config,
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<[T; N]> {
        use array_init::try_array_init;
        try_array_init(|_| T::read_unconditional(config, br, nonserialized))
    }
}

pub struct VectorCoder<T: Sized> {
    pub size_coder: U32Coder,
    pub value_coder: T,
}

impl<Config, T: UnconditionalCoder<Config>> UnconditionalCoder<VectorCoder<Config>> for Vec<T> {
    type Nonserialized = T::Nonserialized;
    fn read_unconditional(
        config: &VectorCoder<Config>,
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<Vec<T>> {
        let len = config.size_coder.read(br)?;
        let mut ret: Vec<T> = Vec::new();
        // Every element takes at least one bit, unless it is fully implicit.
        ret.try_reserve(len.min(1 << 16) as usize)?;
        for _ in 0..len {
            ret.push(T::read_unconditional(
                &config.value_coder,
                br,
                nonserialized,
            )?);
        }
        Ok(ret)
    }
}

pub struct SelectCoder<T: Sized> {
    pub use_true: bool,
    pub coder_true: T,
    pub coder_false: T,
}

// Marker trait to avoid conflicting declarations for [T; N].
pub trait Selectable {}
impl Selectable for u32 {}

impl<Config, T: UnconditionalCoder<Config> + Selectable> UnconditionalCoder<SelectCoder<Config>>
    for T
{
    type Nonserialized = <T as UnconditionalCoder<Config>>::Nonserialized;
    fn read_unconditional(
        config: &SelectCoder<Config>,
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<T> {
        if config.use_true {
            T::read_unconditional(&config.coder_true, br, nonserialized)
        } else {
            T::read_unconditional(&config.coder_false, br, nonserialized)
        }
    }
}

/// Extension bundle. Contents of known extensions are skipped, as none of them affect decoding.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Extensions {
    pub extensions: u64,
    pub extension_bits: Vec<u64>,
}

impl UnconditionalCoder<()> for Extensions {
    type Nonserialized = Empty;
    fn read_unconditional(
        _: &(),
        br: &mut BitReader,
        nonserialized: &Self::Nonserialized,
    ) -> Result<Extensions> {
        let extensions = u64::read_unconditional(&(), br, nonserialized)?;
        let mut extension_bits = vec![];
        for _ in 0..extensions.count_ones() {
            extension_bits.push(u64::read_unconditional(&(), br, nonserialized)?);
        }
        for bits in extension_bits.iter() {
            br.skip_bits(usize::try_from(*bits).map_err(|_| Error::OutOfBounds)?)?;
        }
        Ok(Extensions {
            extensions,
            extension_bits,
        })
    }
}
