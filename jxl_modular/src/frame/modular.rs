// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::{error::Result, image::Image};

mod decode;
mod predict;
mod transforms;
mod tree;

pub use decode::{ModularStream, ModularStreamId, decode_modular_subbitstream};
pub use predict::{Predictor, WeightedPredictorState};
pub use transforms::TransformStep;
pub use tree::{Tree, TreeNode};

/// One plane of a modular image. Besides its samples, a channel records its subsampling
/// relative to the frame and whether its samples have been read from the bitstream.
pub struct ModularChannel {
    pub data: Image<i32>,
    /// Horizontal and vertical shift; `None` for meta-channels such as palettes.
    pub shift: Option<(usize, usize)>,
    decoded: bool,
}

impl Debug for ModularChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.data.size();
        write!(f, "{w}x{h}")?;
        if let Some(shift) = self.shift {
            write!(f, "(shift {},{})", shift.0, shift.1)?;
        } else {
            write!(f, "(meta)")?;
        }
        if self.decoded {
            write!(f, "[decoded]")?;
        }
        Ok(())
    }
}

impl ModularChannel {
    pub fn new(size: (usize, usize), shift: Option<(usize, usize)>) -> Result<Self> {
        Ok(ModularChannel {
            data: Image::new(size)?,
            shift,
            decoded: false,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        self.data.size()
    }

    pub fn is_empty(&self) -> bool {
        let (w, h) = self.size();
        w == 0 || h == 0
    }

    pub fn is_meta(&self) -> bool {
        self.shift.is_none()
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    pub fn mark_decoded(&mut self) {
        self.decoded = true;
    }

    /// Same size and shift; transforms only combine channels with the same shape.
    pub fn same_shape(&self, other: &ModularChannel) -> bool {
        self.size() == other.size() && self.shift == other.shift
    }

    /// A new, not yet decoded channel with the same size and shift as this one.
    pub fn empty_like(&self) -> Result<Self> {
        ModularChannel::new(self.size(), self.shift)
    }
}
