//! State key codec
//!
//! Packs the client state structs into 128-bit [`PackedStateKey`]s and back.
//! Each enumerated field takes `ceil(log2(COUNT))` bits, fields are laid out
//! contiguously from bit 0 of word `a`, and a field that would straddle the word
//! boundary starts at bit 0 of word `b` instead. Floats are stored as their raw
//! IEEE-754 bit pattern.

use bakery_shared::{
    Blend, BlendFunction, BlendState, ColorWriteChannels, CompareFunction, CullMode, DepthFormat,
    DepthStencilState, FillMode, RasterizerState, SamplerState, StencilOperation,
    TextureAddressMode, TextureFilter,
};
use serde::{Deserialize, Serialize};

/// Fixed-width comparable encoding of an immutable state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedStateKey {
    pub a: u64,
    pub b: u64,
}

impl PackedStateKey {
    pub const fn new(a: u64, b: u64) -> Self {
        Self { a, b }
    }
}

/// How float fields enter a key.
///
/// `BitExact` keys on the raw bit pattern, so `-0.0` and `+0.0` (or two NaN payloads)
/// produce different keys and therefore different native objects. `Canonical`
/// folds both zeros to `+0.0` and every NaN to one quiet NaN first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloatKeyMode {
    #[default]
    BitExact,
    Canonical,
}

impl FloatKeyMode {
    #[inline]
    fn bits(self, value: f32) -> u64 {
        let value = match self {
            FloatKeyMode::BitExact => value,
            FloatKeyMode::Canonical if value.is_nan() => f32::NAN,
            FloatKeyMode::Canonical if value == 0.0 => 0.0,
            FloatKeyMode::Canonical => value,
        };
        u64::from(value.to_bits())
    }
}

/// Bits needed to store `count` distinct values
const fn field_bits(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

const BOOL_BITS: u32 = 1;
const MASK_BITS: u32 = 4;
const BLEND_BITS: u32 = field_bits(Blend::COUNT);
const BLEND_FUNCTION_BITS: u32 = field_bits(BlendFunction::COUNT);
const COMPARE_BITS: u32 = field_bits(CompareFunction::COUNT);
const STENCIL_OP_BITS: u32 = field_bits(StencilOperation::COUNT);
const CULL_BITS: u32 = field_bits(CullMode::COUNT);
const FILL_BITS: u32 = field_bits(FillMode::COUNT);
const FILTER_BITS: u32 = field_bits(TextureFilter::COUNT);
const ADDRESS_BITS: u32 = field_bits(TextureAddressMode::COUNT);

/// Sequential field writer over the two key words
struct KeyWriter {
    words: [u64; 2],
    word: usize,
    shift: u32,
}

impl KeyWriter {
    fn new() -> Self {
        Self {
            words: [0; 2],
            word: 0,
            shift: 0,
        }
    }

    fn put(&mut self, value: u64, bits: u32) {
        debug_assert!(bits <= 32);
        debug_assert!(value < (1u64 << bits), "value {value} overflows {bits} bits");
        if self.shift + bits > u64::BITS {
            self.word += 1;
            self.shift = 0;
        }
        self.words[self.word] |= value << self.shift;
        self.shift += bits;
    }

    fn flag(&mut self, value: bool) {
        self.put(u64::from(value), BOOL_BITS);
    }

    fn next_word(&mut self) {
        self.word += 1;
        self.shift = 0;
    }

    fn finish(self) -> PackedStateKey {
        PackedStateKey::new(self.words[0], self.words[1])
    }
}

/// Reads fields back in the order a [`KeyWriter`] wrote them
struct KeyReader {
    words: [u64; 2],
    word: usize,
    shift: u32,
}

impl KeyReader {
    fn new(key: PackedStateKey) -> Self {
        Self {
            words: [key.a, key.b],
            word: 0,
            shift: 0,
        }
    }

    fn take(&mut self, bits: u32) -> u64 {
        if self.shift + bits > u64::BITS {
            self.word += 1;
            self.shift = 0;
        }
        let value = (self.words[self.word] >> self.shift) & ((1u64 << bits) - 1);
        self.shift += bits;
        value
    }

    fn flag(&mut self) -> bool {
        self.take(BOOL_BITS) != 0
    }

    fn next_word(&mut self) {
        self.word += 1;
        self.shift = 0;
    }

    fn float(&mut self) -> f32 {
        f32::from_bits(self.take(32) as u32)
    }
}

// Unpacking only ever sees keys this module produced, so an out-of-range index
// can only come from a hand-built key; fall back to the default value.
macro_rules! take_enum {
    ($reader:expr, $ty:ty, $bits:expr) => {
        <$ty>::from_index($reader.take($bits) as u8).unwrap_or_default()
    };
}

pub fn pack_blend(state: &BlendState) -> PackedStateKey {
    let mut w = KeyWriter::new();
    w.put(state.color_source_blend.index().into(), BLEND_BITS);
    w.put(state.color_destination_blend.index().into(), BLEND_BITS);
    w.put(state.color_blend_function.index().into(), BLEND_FUNCTION_BITS);
    w.put(state.alpha_source_blend.index().into(), BLEND_BITS);
    w.put(state.alpha_destination_blend.index().into(), BLEND_BITS);
    w.put(state.alpha_blend_function.index().into(), BLEND_FUNCTION_BITS);
    for mask in state.color_write_channels {
        w.put(mask.bits().into(), MASK_BITS);
    }
    w.finish()
}

/// Recovers the baked blend fields. `blend_factor` and `multi_sample_mask`
/// are not part of the key and come back as their defaults.
pub fn unpack_blend(key: PackedStateKey) -> BlendState {
    let mut r = KeyReader::new(key);
    let color_source_blend = take_enum!(r, Blend, BLEND_BITS);
    let color_destination_blend = take_enum!(r, Blend, BLEND_BITS);
    let color_blend_function = take_enum!(r, BlendFunction, BLEND_FUNCTION_BITS);
    let alpha_source_blend = take_enum!(r, Blend, BLEND_BITS);
    let alpha_destination_blend = take_enum!(r, Blend, BLEND_BITS);
    let alpha_blend_function = take_enum!(r, BlendFunction, BLEND_FUNCTION_BITS);
    let mut color_write_channels = [ColorWriteChannels::empty(); 4];
    for mask in &mut color_write_channels {
        *mask = ColorWriteChannels::from_bits_truncate(r.take(MASK_BITS) as u8);
    }
    BlendState {
        color_source_blend,
        color_destination_blend,
        color_blend_function,
        alpha_source_blend,
        alpha_destination_blend,
        alpha_blend_function,
        color_write_channels,
        ..BlendState::default()
    }
}

pub fn pack_depth_stencil(state: &DepthStencilState) -> PackedStateKey {
    let mut w = KeyWriter::new();
    w.flag(state.depth_buffer_enable);
    w.flag(state.depth_buffer_write_enable);
    w.put(state.depth_buffer_function.index().into(), COMPARE_BITS);
    w.flag(state.stencil_enable);
    w.flag(state.two_sided_stencil_mode);
    w.put(state.stencil_mask.into(), 8);
    w.put(state.stencil_write_mask.into(), 8);
    w.put(state.stencil_function.index().into(), COMPARE_BITS);
    w.put(state.stencil_pass.index().into(), STENCIL_OP_BITS);
    w.put(state.stencil_fail.index().into(), STENCIL_OP_BITS);
    w.put(state.stencil_depth_buffer_fail.index().into(), STENCIL_OP_BITS);
    w.put(state.ccw_stencil_function.index().into(), COMPARE_BITS);
    w.put(state.ccw_stencil_pass.index().into(), STENCIL_OP_BITS);
    w.put(state.ccw_stencil_fail.index().into(), STENCIL_OP_BITS);
    w.put(state.ccw_stencil_depth_buffer_fail.index().into(), STENCIL_OP_BITS);
    w.finish()
}

/// `reference_stencil` is dynamic state and comes back as 0.
pub fn unpack_depth_stencil(key: PackedStateKey) -> DepthStencilState {
    let mut r = KeyReader::new(key);
    DepthStencilState {
        depth_buffer_enable: r.flag(),
        depth_buffer_write_enable: r.flag(),
        depth_buffer_function: take_enum!(r, CompareFunction, COMPARE_BITS),
        stencil_enable: r.flag(),
        two_sided_stencil_mode: r.flag(),
        stencil_mask: r.take(8) as u8,
        stencil_write_mask: r.take(8) as u8,
        stencil_function: take_enum!(r, CompareFunction, COMPARE_BITS),
        stencil_pass: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        stencil_fail: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        stencil_depth_buffer_fail: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        ccw_stencil_function: take_enum!(r, CompareFunction, COMPARE_BITS),
        ccw_stencil_pass: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        ccw_stencil_fail: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        ccw_stencil_depth_buffer_fail: take_enum!(r, StencilOperation, STENCIL_OP_BITS),
        reference_stencil: 0,
    }
}

/// Packs the rasterizer state exactly as the client specified it
pub fn pack_rasterizer(state: &RasterizerState, mode: FloatKeyMode) -> PackedStateKey {
    pack_rasterizer_with_bias(state, state.depth_bias, mode)
}

/// Packs the rasterizer state with its depth bias scaled for `depth_format`.
///
/// This is the form native rasterizer objects and pipeline keys are built from.
pub fn pack_rasterizer_resolved(
    state: &RasterizerState,
    depth_format: DepthFormat,
    mode: FloatKeyMode,
) -> PackedStateKey {
    pack_rasterizer_with_bias(state, state.depth_bias * depth_format.bias_scale(), mode)
}

fn pack_rasterizer_with_bias(
    state: &RasterizerState,
    depth_bias: f32,
    mode: FloatKeyMode,
) -> PackedStateKey {
    let mut w = KeyWriter::new();
    w.put(state.cull_mode.index().into(), CULL_BITS);
    w.put(state.fill_mode.index().into(), FILL_BITS);
    w.flag(state.scissor_test_enable);
    w.flag(state.multi_sample_anti_alias);
    // The two floats share word `b`
    w.next_word();
    w.put(mode.bits(depth_bias), 32);
    w.put(mode.bits(state.slope_scale_depth_bias), 32);
    w.finish()
}

pub fn unpack_rasterizer(key: PackedStateKey) -> RasterizerState {
    let mut r = KeyReader::new(key);
    let cull_mode = take_enum!(r, CullMode, CULL_BITS);
    let fill_mode = take_enum!(r, FillMode, FILL_BITS);
    let scissor_test_enable = r.flag();
    let multi_sample_anti_alias = r.flag();
    r.next_word();
    RasterizerState {
        cull_mode,
        fill_mode,
        scissor_test_enable,
        multi_sample_anti_alias,
        depth_bias: r.float(),
        slope_scale_depth_bias: r.float(),
    }
}

pub fn pack_sampler(state: &SamplerState, mode: FloatKeyMode) -> PackedStateKey {
    let mut w = KeyWriter::new();
    w.put(state.filter.index().into(), FILTER_BITS);
    w.put(state.address_u.index().into(), ADDRESS_BITS);
    w.put(state.address_v.index().into(), ADDRESS_BITS);
    w.put(state.address_w.index().into(), ADDRESS_BITS);
    w.put(state.max_anisotropy.into(), 32);
    w.put(state.max_mip_level.into(), 32);
    w.put(mode.bits(state.mip_map_level_of_detail_bias), 32);
    w.finish()
}

pub fn unpack_sampler(key: PackedStateKey) -> SamplerState {
    let mut r = KeyReader::new(key);
    SamplerState {
        filter: take_enum!(r, TextureFilter, FILTER_BITS),
        address_u: take_enum!(r, TextureAddressMode, ADDRESS_BITS),
        address_v: take_enum!(r, TextureAddressMode, ADDRESS_BITS),
        address_w: take_enum!(r, TextureAddressMode, ADDRESS_BITS),
        max_anisotropy: r.take(32) as u32,
        max_mip_level: r.take(32) as u32,
        mip_map_level_of_detail_bias: r.float(),
    }
}
