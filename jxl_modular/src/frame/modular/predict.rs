// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::{Error, Result},
    headers::modular::WeightedHeader,
    image::Image,
    util::FloorLog2,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[repr(u8)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    Zero = 0,
    West = 1,
    North = 2,
    AverageWestAndNorth = 3,
    Select = 4,
    Gradient = 5,
    Weighted = 6,
    NorthEast = 7,
    NorthWest = 8,
    WestWest = 9,
    AverageWestAndNorthWest = 10,
    AverageNorthAndNorthWest = 11,
    AverageNorthAndNorthEast = 12,
    AverageAll = 13,
}

impl TryFrom<u32> for Predictor {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::from_u32(value).ok_or(Error::InvalidPredictor(value))
    }
}

/// Neighbours of the pixel being predicted. Out-of-image neighbours are replaced by the nearest
/// available one, falling back to 0 at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionData {
    pub left: i32,
    pub top: i32,
    pub toptop: i32,
    pub topleft: i32,
    pub topright: i32,
    pub leftleft: i32,
    pub toprightright: i32,
}

impl PredictionData {
    /// Gathers the neighbours of `(x, y)` from the already decoded part of `image`.
    pub fn get(image: &Image<i32>, x: usize, y: usize) -> Self {
        let width = image.size().0;
        let row = image.row(y);
        let top_row = if y > 0 { Some(image.row(y - 1)) } else { None };
        let left = if x > 0 {
            row[x - 1]
        } else {
            top_row.map_or(0, |r| r[x])
        };
        let top = top_row.map_or(left, |r| r[x]);
        let topleft = match top_row {
            Some(r) if x > 0 => r[x - 1],
            _ => left,
        };
        let topright = match top_row {
            Some(r) if x + 1 < width => r[x + 1],
            _ => top,
        };
        let leftleft = if x > 1 { row[x - 2] } else { left };
        let toptop = if y > 1 { image.row(y - 2)[x] } else { top };
        let toprightright = match top_row {
            Some(r) if x + 2 < width => r[x + 2],
            _ => topright,
        };
        Self {
            left,
            top,
            toptop,
            topleft,
            topright,
            leftleft,
            toprightright,
        }
    }
}

impl Predictor {
    pub const NUM_PREDICTORS: u32 = Predictor::AverageAll as u32 + 1;

    pub fn predict_one(&self, data: PredictionData, wp_pred: i64) -> i64 {
        let PredictionData {
            left,
            top,
            toptop,
            topleft,
            topright,
            leftleft,
            toprightright,
        } = data;
        match self {
            Predictor::Zero => 0,
            Predictor::West => left as i64,
            Predictor::North => top as i64,
            Predictor::Select => select(left as i64, top as i64, topleft as i64),
            Predictor::Gradient => clamped_gradient(left as i64, top as i64, topleft as i64),
            Predictor::Weighted => wp_pred,
            Predictor::WestWest => leftleft as i64,
            Predictor::NorthEast => topright as i64,
            Predictor::NorthWest => topleft as i64,
            Predictor::AverageWestAndNorth => (top as i64 + left as i64) / 2,
            Predictor::AverageWestAndNorthWest => (left as i64 + topleft as i64) / 2,
            Predictor::AverageNorthAndNorthWest => (top as i64 + topleft as i64) / 2,
            Predictor::AverageNorthAndNorthEast => (top as i64 + topright as i64) / 2,
            Predictor::AverageAll => {
                (6 * top as i64 - 2 * toptop as i64
                    + 7 * left as i64
                    + leftleft as i64
                    + toprightright as i64
                    + 3 * topright as i64
                    + 8)
                    / 16
            }
        }
    }
}

fn select(left: i64, top: i64, topleft: i64) -> i64 {
    let p = left + top - topleft;
    if (p - left).abs() < (p - top).abs() {
        left
    } else {
        top
    }
}

/// The gradient `left + top - topleft`, clamped to the range spanned by `left` and `top`.
pub fn clamped_gradient(left: i64, top: i64, topleft: i64) -> i64 {
    let min = left.min(top);
    let max = left.max(top);
    let grad = left + top - topleft;
    let grad_clamp_max = if topleft < min { max } else { grad };
    if topleft > max {
        min
    } else {
        grad_clamp_max
    }
}

const NUM_PREDICTORS: usize = 4;
const PRED_EXTRA_BITS: i64 = 3;
const PREDICTION_ROUND: i64 = ((1 << PRED_EXTRA_BITS) >> 1) - 1;

/// Running state of the self-correcting predictor over one channel. Errors are kept for two
/// rows, with one extra column of margin on each side.
#[derive(Debug)]
pub struct WeightedPredictorState {
    prediction: [i64; NUM_PREDICTORS],
    pred: i64,
    pred_errors: [Vec<u32>; NUM_PREDICTORS],
    error: Vec<i32>,
    header: WeightedHeader,
    divlookup: [u32; 64],
}

fn add_bits(x: i32) -> i64 {
    (x as i64) << PRED_EXTRA_BITS
}

impl WeightedPredictorState {
    pub fn new(header: &WeightedHeader, xsize: usize) -> Result<Self> {
        let num_errors = (xsize + 2) * 2;
        let mut new_errors = || -> Result<Vec<u32>> {
            let mut v = Vec::new();
            v.try_reserve_exact(num_errors)?;
            v.resize(num_errors, 0);
            Ok(v)
        };
        let pred_errors = [new_errors()?, new_errors()?, new_errors()?, new_errors()?];
        let mut error = Vec::new();
        error.try_reserve_exact(num_errors)?;
        error.resize(num_errors, 0);
        let mut divlookup = [0u32; 64];
        for (i, d) in divlookup.iter_mut().enumerate() {
            *d = (1 << 24) / (i as u32 + 1);
        }
        Ok(Self {
            prediction: [0; NUM_PREDICTORS],
            pred: 0,
            pred_errors,
            error,
            header: header.clone(),
            divlookup,
        })
    }

    fn error_weight(&self, x: u64, maxweight: u32) -> u32 {
        let shift = ((x + 1).floor_log2() as i64 - 5).max(0) as u32;
        4 + ((maxweight * self.divlookup[(x >> shift) as usize]) >> shift)
    }

    fn weighted_average(&self, mut w: [u32; NUM_PREDICTORS]) -> i64 {
        let weight_sum: u32 = w.iter().sum();
        let log_weight = weight_sum.floor_log2();
        let mut weight_sum = 0;
        for w in w.iter_mut() {
            *w >>= log_weight - 4;
            weight_sum += *w;
        }
        let mut sum = (weight_sum as i64 >> 1) - 1;
        for (p, w) in self.prediction.iter().zip(w.iter()) {
            sum += p * *w as i64;
        }
        (sum * self.divlookup[weight_sum as usize - 1] as i64) >> 24
    }

    fn rows(y: usize, xsize: usize) -> (usize, usize) {
        if y & 1 != 0 {
            (0, xsize + 2)
        } else {
            (xsize + 2, 0)
        }
    }

    /// Returns the weighted prediction for `(x, y)` and the value of the maximum-error
    /// property.
    pub fn predict_and_property(
        &mut self,
        (x, y): (usize, usize),
        xsize: usize,
        data: &PredictionData,
    ) -> (i64, i32) {
        let (cur_row, prev_row) = Self::rows(y, xsize);
        let pos_n = prev_row + x;
        let pos_ne = if x + 1 < xsize { pos_n + 1 } else { pos_n };
        let pos_nw = if x > 0 { pos_n - 1 } else { pos_n };
        let maxweights = self.header.w;
        let mut weights = [0u32; NUM_PREDICTORS];
        for (i, weight) in weights.iter_mut().enumerate() {
            // pred_errors[pos_n] also holds the error of W, pred_errors[pos_nw] that of WW.
            let errors = &self.pred_errors[i];
            let sum = errors[pos_n] as u64 + errors[pos_ne] as u64 + errors[pos_nw] as u64;
            *weight = self.error_weight(sum, maxweights[i]);
        }

        let n = add_bits(data.top);
        let w = add_bits(data.left);
        let ne = add_bits(data.topright);
        let nw = add_bits(data.topleft);
        let nn = add_bits(data.toptop);

        let te_w = if x == 0 {
            0
        } else {
            self.error[cur_row + x - 1] as i64
        };
        let te_n = self.error[pos_n] as i64;
        let te_nw = self.error[pos_nw] as i64;
        let sum_wn = te_n + te_w;
        let te_ne = self.error[pos_ne] as i64;

        let mut property = te_w;
        for e in [te_n, te_nw, te_ne] {
            if e.abs() > property.abs() {
                property = e;
            }
        }

        let h = &self.header;
        self.prediction[0] = w + ne - n;
        self.prediction[1] = n - (((sum_wn + te_ne) * h.p1c as i64) >> 5);
        self.prediction[2] = w - (((sum_wn + te_nw) * h.p2c as i64) >> 5);
        self.prediction[3] = n
            - ((te_nw * h.p3ca as i64
                + te_n * h.p3cb as i64
                + te_ne * h.p3cc as i64
                + (nn - n) * h.p3cd as i64
                + (nw - w) * h.p3ce as i64)
                >> 5);

        self.pred = self.weighted_average(weights);

        // Clamp to the neighbours unless the three errors agree in sign.
        if ((te_n ^ te_w) | (te_n ^ te_nw)) <= 0 {
            let mx = w.max(ne.max(n));
            let mn = w.min(ne.min(n));
            self.pred = self.pred.clamp(mn, mx);
        }
        (
            (self.pred + PREDICTION_ROUND) >> PRED_EXTRA_BITS,
            property as i32,
        )
    }

    pub fn update_errors(&mut self, val: i32, (x, y): (usize, usize), xsize: usize) {
        let (cur_row, prev_row) = Self::rows(y, xsize);
        let val = add_bits(val);
        self.error[cur_row + x] = (self.pred - val) as i32;
        for i in 0..NUM_PREDICTORS {
            let err = (((self.prediction[i] - val).abs() + PREDICTION_ROUND) >> PRED_EXTRA_BITS)
                as u32;
            self.pred_errors[i][cur_row + x] = err;
            // Also accumulated on the NE position, i.e. on the next pixels' N and NW.
            let ne = &mut self.pred_errors[i][prev_row + x + 1];
            *ne = ne.wrapping_add(err);
        }
    }
}
