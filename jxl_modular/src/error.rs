// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::entropy_coding::huffman::HUFFMAN_MAX_BITS;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // Bitstream access.
    #[error("Read out of bounds")]
    OutOfBounds,
    #[error("Tried to peek {0} bits, the maximum is 56")]
    PeekTooLarge(usize),
    #[error("Non-zero padding bits")]
    NonZeroPadding,
    #[error("Section {0} is {1} bytes, but only {2} bytes are left in the codestream")]
    SectionTooShort(usize, usize, usize),
    // Header format errors.
    #[error("Invalid signature {0:02x}{1:02x}, expected ff0a")]
    InvalidSignature(u8, u8),
    #[error("Invalid exponent_bits_per_sample: {0}")]
    InvalidExponent(u32),
    #[error("Invalid mantissa_bits: {0}")]
    InvalidMantissa(i32),
    #[error("Invalid bits_per_sample: {0}")]
    InvalidBitsPerSample(u32),
    #[error("Invalid enum value {0} for {1}")]
    InvalidEnum(u32, String),
    #[error("Value of dim_shift {0} is too large")]
    DimShiftTooLarge(u32),
    #[error("Float is NaN or Inf")]
    FloatNaNOrInf,
    #[error("Invalid gamma value: {0}")]
    InvalidGamma(f32),
    #[error("Invalid color encoding: no ICC and unknown TF / ColorSpace")]
    InvalidColorEncoding,
    #[error("Invalid intensity_target: {0}")]
    InvalidIntensityTarget(f32),
    #[error("Invalid min_nits: {0}")]
    InvalidMinNits(f32),
    #[error("Invalid linear_below {1}, relative_to_max_display is {0}")]
    InvalidLinearBelow(bool, f32),
    #[error("Invalid extra channel upsampling: upsampling: {0} dim_shift: {1} ec_upsampling: {2}")]
    InvalidEcUpsampling(u32, u32, u32),
    #[error("Num_ds: {0} should be smaller than num_passes: {1}")]
    NumPassesTooLarge(u32, u32),
    #[error("LF channel dequantization factor too small: {0}")]
    LfQuantFactorTooSmall(f32),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    // Entropy coding errors.
    #[error("Invalid HybridUintConfig: {0} {1} {2:?}")]
    InvalidUintConfig(u32, u32, Option<u32>),
    #[error("LZ77 enabled when explicitly disallowed")]
    Lz77Disallowed,
    #[error("LZ77 repeat symbol encountered without a preceding symbol")]
    UnexpectedLz77Repeat,
    #[error("Huffman alphabet too large: {0}, max is {max}", max = 1 << HUFFMAN_MAX_BITS)]
    AlphabetTooLargeHuff(usize),
    #[error("Invalid Huffman code")]
    InvalidHuffman,
    #[error("ANS alphabet too large: {0}, max is {1}")]
    AlphabetTooLargeAns(usize, usize),
    #[error("Invalid ANS histogram")]
    InvalidAnsHistogram,
    #[error("Integer too large: nbits {0} > 29")]
    IntegerTooLarge(u32),
    #[error("Invalid context map: context id {0} > 255")]
    InvalidContextMap(u32),
    #[error("Invalid context map: number of histogram {0}, number of distinct histograms {1}")]
    InvalidContextMapHole(u32, u32),
    #[error("Invalid final state of the entropy decoder")]
    InvalidEntropyFinalState,
    // Permutation / TOC errors.
    #[error("Permutation of {0} entries cannot code {1} of them")]
    InvalidPermutationSize(u32, u32),
    #[error("Lehmer code {lehmer} at index {idx} is out of bounds in a permutation of size {size}")]
    InvalidPermutationLehmerCode { size: u32, idx: u32, lehmer: u32 },
    // MA tree errors.
    #[error("Invalid property {0}")]
    InvalidProperty(u32),
    #[error("Invalid predictor {0}")]
    InvalidPredictor(u32),
    #[error("Tree multiplier log too large: {0}, must be below 31")]
    TreeMultiplierTooLarge(u32),
    #[error("Tree multiplier bits too large: {0} with multiplier log {1}")]
    TreeMultiplierBitsTooLarge(u32, u32),
    #[error("Tree too large: {0}, limit is {1}")]
    TreeTooLarge(usize, usize),
    #[error("Tree too tall: {0}, limit is {1}")]
    TreeTooTall(usize, usize),
    #[error("Tree splits on property {0} at value {1}, outside of its range [{2}, {3}]")]
    TreeSplitOnEmptyRange(u8, i32, i32, i32),
    #[error("Modular stream requires a global tree but none was found")]
    NoGlobalTree,
    // Transform errors.
    #[error("Invalid transform id {0}")]
    InvalidTransformId(u32),
    #[error("Invalid RCT type {0}")]
    InvalidRCT(u32),
    #[error("Invalid channel range: {0}..{1}, {2} total channels")]
    InvalidChannelRange(usize, usize, usize),
    #[error("Transform applied to channels of different sizes or shifts")]
    MixingDifferentChannels,
    #[error("Squeeze of meta channels must be in place")]
    MetaSqueezeRequiresInPlace,
    #[error("Too many squeezes: shift {0} exceeds the limit")]
    TooManySqueezes(i32),
    #[error("Squeeze of an empty channel")]
    SqueezeOfEmptyChannel,
    #[error("Squeeze residual of size {0}x{1} does not fit average of size {2}x{3}")]
    InvalidSqueezeResidual(usize, usize, usize, usize),
    #[error("Palette transform without a palette channel")]
    MissingPalette,
    #[error("Channel with shift {0} does not fit in groups of size {1}")]
    ChannelShiftTooLarge(usize, usize),
    // Image buffer errors.
    #[error("Rect of size {0}x{1} at {2}x{3} is out of bounds for an image of size {4}x{5}")]
    RectOutOfBounds(usize, usize, usize, usize, usize, usize),
    // Frame orchestration errors.
    #[error("Unsupported feature: {0}")]
    Unsupported(&'static str),
    #[error("Group channel {0} does not exist in the frame")]
    GroupOutOfBounds(usize),
    #[error("Decoded {0} channels, expected {1}")]
    ChannelCountMismatch(usize, usize),
    #[error("Section {0} is missing from the frame")]
    MissingSection(usize),
    #[error("LF global section must be decoded before the groups")]
    LfGlobalNotDecoded,
    #[error("Codestream contains no frames to display")]
    NoFrames,
    #[error("ICC is too large")]
    ICCTooLarge,
    #[error("Encoded ICC stream ended unexpectedly")]
    IccEndOfStream,
    #[error("Invalid encoded ICC stream")]
    InvalidIccStream,
    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),
    // Resource errors.
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    // Generic arithmetic overflow. Prefer using other errors if possible.
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
