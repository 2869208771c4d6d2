// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{collections::VecDeque, fmt::Debug};

use super::predict::{PredictionData, Predictor, WeightedPredictorState};
use crate::{
    bit_reader::BitReader,
    entropy_coding::decode::Histograms,
    error::{Error, Result},
    image::Image,
    util::tracing_wrappers::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeNode {
    Split {
        property: u8,
        val: i32,
        left: u32,
        right: u32,
    },
    Leaf {
        predictor: Predictor,
        offset: i32,
        multiplier: u32,
        id: u32,
    },
}

pub struct Tree {
    pub nodes: Vec<TreeNode>,
    pub histograms: Histograms,
}

impl Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tree[{:?}]", self.nodes)
    }
}

pub const NUM_NONREF_PROPERTIES: usize = 16;
pub const PROPERTIES_PER_PREVCHAN: usize = 4;

pub const CHANNEL_PROPERTY: u8 = 0;
pub const STREAM_ID_PROPERTY: u8 = 1;
pub const Y_PROPERTY: u8 = 2;
pub const WP_PROPERTY: u8 = 15;

const SPLIT_VAL_CONTEXT: usize = 0;
const PROPERTY_CONTEXT: usize = 1;
const PREDICTOR_CONTEXT: usize = 2;
const OFFSET_CONTEXT: usize = 3;
const MULTIPLIER_LOG_CONTEXT: usize = 4;
const MULTIPLIER_BITS_CONTEXT: usize = 5;
const NUM_TREE_CONTEXTS: usize = 6;

const MAX_TREE_SIZE: usize = 1 << 22;

/// Checks that every split leaves both children with a non-empty range of property values, and
/// that the tree is not too deep.
fn validate_tree(tree: &[TreeNode], num_properties: usize) -> Result<()> {
    const HEIGHT_LIMIT: usize = 2048;

    if tree.is_empty() {
        return Ok(());
    }

    // Explicit DFS that only keeps the ranges along the current root-to-node path. Each frame
    // remembers the range it overwrote so it can be restored on the way back up.
    #[derive(Clone, Copy, Debug)]
    enum Stage {
        Enter,
        AfterLeft,
        AfterRight,
    }

    struct Frame {
        node: usize,
        depth: usize,
        stage: Stage,
        restore: Option<(usize, (i32, i32))>,
    }

    let mut property_ranges: Vec<(i32, i32)> = vec![(i32::MIN, i32::MAX); num_properties];
    let mut stack = vec![Frame {
        node: 0,
        depth: 0,
        stage: Stage::Enter,
        restore: None,
    }];

    while let Some(mut frame) = stack.pop() {
        if frame.depth > HEIGHT_LIMIT {
            return Err(Error::TreeTooTall(frame.depth, HEIGHT_LIMIT));
        }
        match (frame.stage, tree[frame.node]) {
            (Stage::Enter, TreeNode::Leaf { .. }) | (Stage::AfterRight, TreeNode::Split { .. }) => {
                if let Some((p, old)) = frame.restore {
                    property_ranges[p] = old;
                }
            }
            (
                stage @ (Stage::Enter | Stage::AfterLeft),
                TreeNode::Split {
                    property,
                    val,
                    left,
                    right,
                },
            ) => {
                let p = property as usize;
                let (l, u) = property_ranges[p];
                if l > val || u <= val {
                    return Err(Error::TreeSplitOnEmptyRange(property, val, l, u));
                }
                let (child, range, next) = if matches!(stage, Stage::Enter) {
                    // Left child: property > val.
                    (left, (val + 1, u), Stage::AfterLeft)
                } else {
                    (right, (l, val), Stage::AfterRight)
                };
                frame.stage = next;
                let depth = frame.depth;
                stack.push(frame);
                let old = property_ranges[p];
                property_ranges[p] = range;
                stack.push(Frame {
                    node: child as usize,
                    depth: depth + 1,
                    stage: Stage::Enter,
                    restore: Some((p, old)),
                });
            }
            (Stage::AfterLeft | Stage::AfterRight, TreeNode::Leaf { .. }) => {
                unreachable!("leaves are never revisited")
            }
        }
    }

    Ok(())
}

/// Everything a leaf tells the channel decoder about a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafInfo {
    pub predictor: Predictor,
    pub offset: i32,
    pub multiplier: u32,
    pub context: u32,
}

/// Walks from the root of `nodes`, going left when the property is greater than the split
/// value, until a leaf is reached.
#[inline]
pub fn walk(nodes: &[TreeNode], properties: &[i32]) -> LeafInfo {
    let mut node = 0;
    loop {
        match nodes[node] {
            TreeNode::Split {
                property,
                val,
                left,
                right,
            } => {
                node = if properties[property as usize] > val {
                    left
                } else {
                    right
                } as usize;
            }
            TreeNode::Leaf {
                predictor,
                offset,
                multiplier,
                id,
            } => {
                return LeafInfo {
                    predictor,
                    offset,
                    multiplier,
                    context: id,
                };
            }
        }
    }
}

/// Rebuilds the tree in breadth-first order, replacing every split on a property for which
/// `fixed` returns a value with the child that value selects.
fn specialize(nodes: &[TreeNode], fixed: impl Fn(u8) -> Option<i32>) -> Result<Vec<TreeNode>> {
    let mut out = Vec::new();
    out.try_reserve(nodes.len())?;
    let mut queue = VecDeque::from([0usize]);
    while let Some(mut cur) = queue.pop_front() {
        while let TreeNode::Split {
            property,
            val,
            left,
            right,
        } = nodes[cur]
        {
            let Some(value) = fixed(property) else {
                break;
            };
            cur = if value > val { left } else { right } as usize;
        }
        match nodes[cur] {
            leaf @ TreeNode::Leaf { .. } => out.push(leaf),
            TreeNode::Split {
                property,
                val,
                left,
                right,
            } => {
                let new_left = (out.len() + queue.len() + 1) as u32;
                out.push(TreeNode::Split {
                    property,
                    val,
                    left: new_left,
                    right: new_left + 1,
                });
                queue.push_back(left as usize);
                queue.push_back(right as usize);
            }
        }
    }
    Ok(out)
}

/// Specializes the tree for one row of a channel, on top of [`Tree::compactify`].
pub fn compactify_with_y(
    nodes: &[TreeNode],
    channel: usize,
    stream_id: usize,
    y: usize,
) -> Result<Vec<TreeNode>> {
    specialize(nodes, |property| match property {
        CHANNEL_PROPERTY => Some(channel as i32),
        STREAM_ID_PROPERTY => Some(stream_id as i32),
        Y_PROPERTY => Some(y as i32),
        _ => None,
    })
}

/// Whether decoding with this tree needs the weighted predictor state, either for a
/// prediction or for the max-error property.
pub fn uses_weighted_predictor(nodes: &[TreeNode]) -> bool {
    nodes.iter().any(|node| match node {
        TreeNode::Leaf { predictor, .. } => *predictor == Predictor::Weighted,
        TreeNode::Split { property, .. } => *property == WP_PROPERTY,
    })
}

pub fn splits_on(nodes: &[TreeNode], prop: u8) -> bool {
    nodes
        .iter()
        .any(|node| matches!(node, TreeNode::Split { property, .. } if *property == prop))
}

#[derive(Debug)]
pub struct PredictionResult {
    pub guess: i64,
    pub multiplier: u32,
    pub context: u32,
}

// The first two properties are constant for a channel and set by the caller, which must also
// reset property 9 to 0 at the start of each row: property 8 uses its value at the previous
// pixel.
#[inline]
fn compute_properties(
    prediction_data: &PredictionData,
    xsize: usize,
    wp_state: Option<&mut WeightedPredictorState>,
    x: usize,
    y: usize,
    references: &Image<i32>,
    property_buffer: &mut [i32],
) -> i64 {
    let PredictionData {
        left,
        top,
        toptop,
        topleft,
        topright,
        leftleft,
        toprightright: _,
    } = *prediction_data;

    // Position
    property_buffer[2] = y as i32;
    property_buffer[3] = x as i32;

    // Neighbours
    property_buffer[4] = top.wrapping_abs();
    property_buffer[5] = left.wrapping_abs();
    property_buffer[6] = top;
    property_buffer[7] = left;

    // Local gradient
    property_buffer[8] = left.wrapping_sub(property_buffer[9]);
    property_buffer[9] = left.wrapping_add(top).wrapping_sub(topleft);

    // FFV1 context properties
    property_buffer[10] = left.wrapping_sub(topleft);
    property_buffer[11] = topleft.wrapping_sub(top);
    property_buffer[12] = top.wrapping_sub(topright);
    property_buffer[13] = top.wrapping_sub(toptop);
    property_buffer[14] = left.wrapping_sub(leftleft);

    let (wp_pred, wp_prop) = wp_state
        .map(|wp_state| wp_state.predict_and_property((x, y), xsize, prediction_data))
        .unwrap_or((0, 0));
    property_buffer[WP_PROPERTY as usize] = wp_prop;

    let num_refs = references.size().0;
    if num_refs != 0 {
        property_buffer[NUM_NONREF_PROPERTIES..NUM_NONREF_PROPERTIES + num_refs]
            .copy_from_slice(references.row(x));
    }

    wp_pred
}

#[inline]
pub(super) fn predict(
    tree: &[TreeNode],
    prediction_data: PredictionData,
    xsize: usize,
    wp_state: Option<&mut WeightedPredictorState>,
    x: usize,
    y: usize,
    references: &Image<i32>,
    property_buffer: &mut [i32],
) -> PredictionResult {
    let wp_pred = compute_properties(
        &prediction_data,
        xsize,
        wp_state,
        x,
        y,
        references,
        property_buffer,
    );
    let leaf = walk(tree, property_buffer);
    let pred = leaf.predictor.predict_one(prediction_data, wp_pred);
    PredictionResult {
        guess: pred + leaf.offset as i64,
        multiplier: leaf.multiplier,
        context: leaf.context,
    }
}

impl Tree {
    #[instrument(level = "debug", skip(br), err)]
    pub fn read(br: &mut BitReader, size_limit: usize) -> Result<Tree> {
        let size_limit = size_limit.min(MAX_TREE_SIZE);
        trace!(pos = br.total_bits_read());
        let tree_histograms = Histograms::decode(NUM_TREE_CONTEXTS, br, true)?;
        let mut tree_reader = tree_histograms.make_reader(br)?;
        let mut tree: Vec<TreeNode> = vec![];
        let mut to_decode = 1;
        let mut leaf_id = 0;
        let mut max_property = 0;
        while to_decode > 0 {
            if tree.len() > size_limit {
                return Err(Error::TreeTooLarge(tree.len(), size_limit));
            }
            if tree.len() >= tree.capacity() {
                tree.try_reserve(tree.len() * 2 + 1)?;
            }
            to_decode -= 1;
            let property = tree_reader.read(br, PROPERTY_CONTEXT)?;
            trace!(property);
            if let Some(property) = property.checked_sub(1) {
                if property > 255 {
                    return Err(Error::InvalidProperty(property));
                }
                max_property = max_property.max(property);
                let splitval = tree_reader.read_signed(br, SPLIT_VAL_CONTEXT)?;
                let left_child = (tree.len() + to_decode + 1) as u32;
                let node = TreeNode::Split {
                    property: property as u8,
                    val: splitval,
                    left: left_child,
                    right: left_child + 1,
                };
                trace!("split node {:?}", node);
                to_decode += 2;
                tree.push(node);
            } else {
                let predictor = Predictor::try_from(tree_reader.read(br, PREDICTOR_CONTEXT)?)?;
                let offset = tree_reader.read_signed(br, OFFSET_CONTEXT)?;
                let mul_log = tree_reader.read(br, MULTIPLIER_LOG_CONTEXT)?;
                if mul_log >= 31 {
                    return Err(Error::TreeMultiplierTooLarge(mul_log));
                }
                let mul_bits = tree_reader.read(br, MULTIPLIER_BITS_CONTEXT)?;
                if mul_bits as u64 >= (1u64 << (31 - mul_log)) - 1 {
                    return Err(Error::TreeMultiplierBitsTooLarge(mul_bits, mul_log));
                }
                let node = TreeNode::Leaf {
                    predictor,
                    offset,
                    id: leaf_id,
                    multiplier: (mul_bits + 1) << mul_log,
                };
                leaf_id += 1;
                trace!("leaf node {:?}", node);
                tree.push(node);
            }
        }
        tree_reader.check_final_state()?;

        validate_tree(&tree, max_property as usize + 1)?;

        let histograms = Histograms::decode(tree.len().div_ceil(2), br, true)?;

        Ok(Tree {
            nodes: tree,
            histograms,
        })
    }

    /// Resolves the splits on the channel index and the stream id, which are constant while
    /// decoding one channel.
    pub fn compactify(&self, channel: usize, stream_id: usize) -> Result<Vec<TreeNode>> {
        specialize(&self.nodes, |property| match property {
            CHANNEL_PROPERTY => Some(channel as i32),
            STREAM_ID_PROPERTY => Some(stream_id as i32),
            _ => None,
        })
    }

    pub fn max_property_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|x| match x {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { property, .. } => *property,
            })
            .max()
            .unwrap_or_default() as usize
            + 1
    }

    pub fn num_prev_channels(&self) -> usize {
        self.max_property_count()
            .saturating_sub(NUM_NONREF_PROPERTIES)
            .div_ceil(PROPERTIES_PER_PREVCHAN)
    }
}
