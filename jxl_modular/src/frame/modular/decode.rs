// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    entropy_coding::decode::Reader,
    error::{Error, Result},
    headers::modular::{GroupHeader, WeightedHeader},
    image::Image,
    util::tracing_wrappers::*,
};

use super::{
    ModularChannel,
    predict::{PredictionData, WeightedPredictorState},
    transforms::{TransformStep, meta_apply_transforms},
    tree::{
        NUM_NONREF_PROPERTIES, PROPERTIES_PER_PREVCHAN, Tree, Y_PROPERTY, compactify_with_y,
        predict, splits_on, uses_weighted_predictor,
    },
};

mod common;

pub use common::ModularStreamId;
use common::{make_pixel, precompute_references};

const LOCAL_TREE_SIZE_LIMIT: usize = 1 << 20;

#[instrument(level = "debug", skip(channels, wp_header, tree, reader, br), err)]
fn decode_modular_channel(
    channels: &mut [ModularChannel],
    chan: usize,
    stream_id: usize,
    wp_header: &WeightedHeader,
    tree: &Tree,
    reader: &mut Reader,
    br: &mut BitReader,
) -> Result<()> {
    let (previous, rest) = channels.split_at_mut(chan);
    let channel = &mut rest[0];
    if channel.is_decoded() {
        return Ok(());
    }
    if channel.is_empty() {
        channel.mark_decoded();
        return Ok(());
    }
    debug!("reading channel");
    let size = channel.size();

    let nodes = tree.compactify(chan, stream_id)?;
    let depends_on_y = splits_on(&nodes, Y_PROPERTY);
    let mut wp_state = if uses_weighted_predictor(&nodes) {
        Some(WeightedPredictorState::new(wp_header, size.0)?)
    } else {
        None
    };

    let num_refs = tree.num_prev_channels() * PROPERTIES_PER_PREVCHAN;
    let mut references = Image::<i32>::new((num_refs, size.0))?;
    let mut property_buffer = vec![0; NUM_NONREF_PROPERTIES + num_refs];
    property_buffer[0] = chan as i32;
    property_buffer[1] = stream_id as i32;

    let mut row_nodes = vec![];
    for y in 0..size.1 {
        let nodes = if depends_on_y {
            row_nodes = compactify_with_y(&nodes, chan, stream_id, y)?;
            &row_nodes
        } else {
            &nodes
        };
        if num_refs != 0 {
            precompute_references(previous, channel, y, &mut references);
        }
        property_buffer[9] = 0;
        for x in 0..size.0 {
            let prediction_data = PredictionData::get(&channel.data, x, y);
            let prediction_result = predict(
                nodes,
                prediction_data,
                size.0,
                wp_state.as_mut(),
                x,
                y,
                &references,
                &mut property_buffer,
            );
            let dec = reader.read_signed(br, prediction_result.context as usize)?;
            let val = make_pixel(dec, prediction_result.multiplier, prediction_result.guess);
            channel.data.row_mut(y)[x] = val;
            trace!(y, x, val, dec, ?prediction_result);
            if let Some(wp_state) = wp_state.as_mut() {
                wp_state.update_errors(val, (x, y), size.0);
            }
        }
    }
    channel.mark_decoded();
    Ok(())
}

/// A set of channels coded together: they share one group header, one MA tree and one entropy
/// reader. Transforms listed in the header change the channel list before decoding and are
/// undone, in reverse order, afterwards.
#[derive(Debug)]
pub struct ModularStream {
    pub channels: Vec<ModularChannel>,
    pub num_meta_channels: usize,
    bit_depth: u32,
    steps: Vec<TransformStep>,
    transformed: bool,
}

impl ModularStream {
    pub fn new(channels: Vec<ModularChannel>, bit_depth: u32) -> Self {
        ModularStream {
            channels,
            num_meta_channels: 0,
            bit_depth,
            steps: vec![],
            transformed: false,
        }
    }

    /// Applies the transforms of `header` to the channel shapes. Does nothing if the transforms
    /// have already been applied.
    pub fn apply_transforms(&mut self, header: &GroupHeader) -> Result<()> {
        if self.transformed {
            return Ok(());
        }
        self.transformed = true;
        self.steps = meta_apply_transforms(
            &mut self.channels,
            &mut self.num_meta_channels,
            &header.transforms,
            &header.wp_header,
        )?;
        trace!(channels = ?self.channels, "applied transforms");
        Ok(())
    }

    /// Decodes all the channels that fit in `max_chan_size`, up to the first one that does
    /// not. Channels that are already decoded are skipped.
    #[instrument(level = "debug", skip(self, header, global_tree, br), err)]
    pub fn decode_channels(
        &mut self,
        header: &GroupHeader,
        global_tree: Option<&Tree>,
        stream_id: usize,
        max_chan_size: usize,
        br: &mut BitReader,
    ) -> Result<()> {
        let mut end = self.channels.len();
        let mut num_decodable = 0;
        let mut total_pixels = 0u64;
        let mut distance_multiplier = 0;
        for (i, channel) in self.channels.iter().enumerate() {
            if channel.is_empty() {
                continue;
            }
            let (w, h) = channel.size();
            if i >= self.num_meta_channels && (w > max_chan_size || h > max_chan_size) {
                end = i;
                break;
            }
            num_decodable += 1;
            total_pixels = total_pixels.saturating_add(w as u64 * h as u64);
            distance_multiplier = distance_multiplier.max(w);
        }
        if num_decodable == 0 {
            return Ok(());
        }

        let local_tree = if header.use_global_tree {
            None
        } else {
            let limit = (1024 + total_pixels).min(LOCAL_TREE_SIZE_LIMIT as u64) as usize;
            Some(Tree::read(br, limit)?)
        };
        let tree = match (&local_tree, global_tree) {
            (Some(tree), _) => tree,
            (None, Some(tree)) => tree,
            (None, None) => return Err(Error::NoGlobalTree),
        };

        let mut reader = tree
            .histograms
            .make_reader_with_width(br, distance_multiplier)?;
        for chan in 0..end {
            decode_modular_channel(
                &mut self.channels,
                chan,
                stream_id,
                &header.wp_header,
                tree,
                &mut reader,
                br,
            )?;
        }
        reader.check_final_state()?;
        Ok(())
    }

    /// Undoes the transforms, in reverse order. Does nothing after the first call.
    pub fn undo_transforms(&mut self) -> Result<()> {
        while let Some(step) = self.steps.pop() {
            step.inverse(&mut self.channels, &mut self.num_meta_channels, self.bit_depth)?;
        }
        Ok(())
    }

    pub fn into_channels(self) -> Vec<ModularChannel> {
        self.channels
    }
}

/// Reads a complete modular stream that is not the global one: its header, then its channels,
/// and finally undoes its transforms.
pub fn decode_modular_subbitstream(
    channels: Vec<ModularChannel>,
    bit_depth: u32,
    stream_id: usize,
    global_tree: Option<&Tree>,
    br: &mut BitReader,
) -> Result<Vec<ModularChannel>> {
    if channels.is_empty() {
        return Ok(channels);
    }
    let header = GroupHeader::read(br)?;
    trace!(?header, stream_id);
    let mut stream = ModularStream::new(channels, bit_depth);
    stream.apply_transforms(&header)?;
    stream.decode_channels(&header, global_tree, stream_id, usize::MAX, br)?;
    stream.undo_transforms()?;
    Ok(stream.into_channels())
}
