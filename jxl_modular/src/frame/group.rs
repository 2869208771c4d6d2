// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    image::Image,
    util::tracing_wrappers::*,
};

use super::modular::{ModularChannel, Tree, decode_modular_subbitstream};

/// Runs independent section decodes, either on a bounded rayon pool or on the calling thread.
pub struct GroupPool {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl GroupPool {
    /// A pool with `num_threads` workers. 1 decodes serially on the calling thread, 0 lets
    /// rayon pick the number of workers.
    pub fn new(num_threads: usize) -> Result<GroupPool> {
        #[cfg(feature = "parallel")]
        {
            let pool = if num_threads == 1 {
                None
            } else {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|i| format!("jxl-group-{i}"))
                    .build()
                    .map_err(|e| Error::ThreadPool(e.to_string()))?;
                Some(pool)
            };
            Ok(GroupPool { pool })
        }
        #[cfg(not(feature = "parallel"))]
        {
            if num_threads != 1 {
                debug!(num_threads, "built without the parallel feature, decoding serially");
            }
            Ok(GroupPool {})
        }
    }

    pub fn is_serial(&self) -> bool {
        #[cfg(feature = "parallel")]
        {
            self.pool.is_none()
        }
        #[cfg(not(feature = "parallel"))]
        {
            true
        }
    }

    /// Applies `f` to every item and returns the results in item order. Each result goes to
    /// its own pre-allocated slot, so workers never contend on the output. The first error
    /// stops the remaining work and is returned.
    pub fn run<I, R, F>(&self, items: Vec<I>, f: F) -> Result<Vec<R>>
    where
        I: Send,
        R: Send,
        F: Fn(I) -> Result<R> + Sync + Send,
    {
        let mut results: Vec<Option<R>> = Vec::new();
        results.try_reserve_exact(items.len())?;
        results.resize_with(items.len(), || None);

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            pool.install(|| {
                results
                    .par_iter_mut()
                    .zip(items.into_par_iter())
                    .try_for_each(|(slot, item)| -> Result<()> {
                        *slot = Some(f(item)?);
                        Ok(())
                    })
            })?;
            return Ok(results.into_iter().flatten().collect());
        }

        for (slot, item) in results.iter_mut().zip(items) {
            *slot = Some(f(item)?);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

/// Area of the frame covered by one section, and the range of channel shifts it codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRegion {
    /// Top-left corner, in frame samples.
    pub origin: (usize, usize),
    /// Side of the (square) region, in frame samples.
    pub dim: usize,
    pub min_shift: i32,
    pub max_shift: i32,
}

/// Samples of one frame channel decoded by a group, to be copied at `origin` in that channel.
#[derive(Debug)]
pub struct GroupChannel {
    pub channel: usize,
    pub origin: (usize, usize),
    pub data: Image<i32>,
}

/// Index of the first channel that is too large to be coded in the global section; every
/// channel from there on is split into groups.
pub fn first_group_channel(
    channels: &[ModularChannel],
    num_meta_channels: usize,
    group_dim: usize,
) -> usize {
    channels
        .iter()
        .enumerate()
        .skip(num_meta_channels)
        .find(|(_, c)| {
            let (w, h) = c.size();
            w > group_dim || h > group_dim
        })
        .map_or(channels.len(), |(i, _)| i)
}

/// Channels of `frame_channels` with a part inside `region`, together with the position of
/// that part. Returns (channel index, origin, size) triples.
pub fn group_channel_rects(
    frame_channels: &[ModularChannel],
    num_meta_channels: usize,
    group_dim: usize,
    region: &GroupRegion,
) -> Vec<(usize, (usize, usize), (usize, usize))> {
    let begin = first_group_channel(frame_channels, num_meta_channels, group_dim);
    let mut rects = vec![];
    for (c, channel) in frame_channels.iter().enumerate().skip(begin) {
        let Some((hshift, vshift)) = channel.shift else {
            continue;
        };
        let shift = hshift.min(vshift) as i32;
        if shift < region.min_shift || shift > region.max_shift {
            continue;
        }
        let (w, h) = channel.size();
        let x0 = region.origin.0 >> hshift;
        let y0 = region.origin.1 >> vshift;
        if x0 >= w || y0 >= h {
            continue;
        }
        let xsize = (region.dim >> hshift).min(w - x0);
        let ysize = (region.dim >> vshift).min(h - y0);
        if xsize == 0 || ysize == 0 {
            continue;
        }
        rects.push((c, (x0, y0), (xsize, ysize)));
    }
    rects
}

/// Decodes the modular sub-stream of one LF group or pass group. Only the channel layout of
/// `frame_channels` is read; the samples are returned to be merged later.
#[instrument(level = "debug", skip(frame_channels, global_tree, br), err)]
pub fn decode_modular_group(
    frame_channels: &[ModularChannel],
    num_meta_channels: usize,
    group_dim: usize,
    region: GroupRegion,
    bit_depth: u32,
    stream_id: usize,
    global_tree: Option<&Tree>,
    br: &mut BitReader,
) -> Result<Vec<GroupChannel>> {
    let rects = group_channel_rects(frame_channels, num_meta_channels, group_dim, &region);
    if rects.is_empty() {
        return Ok(vec![]);
    }
    let channels = rects
        .iter()
        .map(|&(c, _, size)| ModularChannel::new(size, frame_channels[c].shift))
        .collect::<Result<Vec<_>>>()?;
    trace!(?channels, "group channels");
    let decoded = decode_modular_subbitstream(channels, bit_depth, stream_id, global_tree, br)?;
    if decoded.len() != rects.len() {
        // Transforms local to a group must give back the channels they were given.
        return Err(Error::ChannelCountMismatch(decoded.len(), rects.len()));
    }
    Ok(rects
        .into_iter()
        .zip(decoded)
        .map(|((channel, origin, _), decoded)| GroupChannel {
            channel,
            origin,
            data: decoded.data,
        })
        .collect())
}

/// Copies decoded group samples into the frame channels.
pub fn merge_group_channels(
    frame_channels: &mut [ModularChannel],
    group_channels: Vec<GroupChannel>,
) -> Result<()> {
    for group_channel in group_channels {
        let channel = frame_channels
            .get_mut(group_channel.channel)
            .ok_or(Error::GroupOutOfBounds(group_channel.channel))?;
        channel
            .data
            .paste(group_channel.origin, &group_channel.data)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use test_log::test;

    fn channel(size: (usize, usize), shift: Option<(usize, usize)>) -> ModularChannel {
        ModularChannel::new(size, shift).unwrap()
    }

    #[test]
    fn serial_and_pooled_runs_agree() {
        let items: Vec<usize> = (0..100).collect();
        let square = |i: usize| -> Result<usize> { Ok(i * i) };
        let serial = GroupPool::new(1).unwrap().run(items.clone(), square).unwrap();
        let pooled = GroupPool::new(4).unwrap().run(items, square).unwrap();
        assert_eq!(serial, pooled);
        assert_eq!(serial[7], 49);
    }

    #[test]
    fn run_reports_errors() {
        let pool = GroupPool::new(3).unwrap();
        let result = pool.run((0..20).collect(), |i: usize| {
            if i == 13 {
                Err(Error::NoFrames)
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(Error::NoFrames)));
    }

    #[test]
    fn single_thread_is_serial() {
        assert!(GroupPool::new(1).unwrap().is_serial());
    }

    #[test]
    fn small_channels_stay_global() {
        let channels = vec![
            channel((4, 1), None),
            channel((100, 100), Some((0, 0))),
            channel((300, 10), Some((0, 0))),
            channel((10, 10), Some((0, 0))),
        ];
        assert_eq!(first_group_channel(&channels, 1, 128), 2);
        assert_eq!(first_group_channel(&channels, 1, 512), 4);
    }

    #[test]
    fn rects_follow_shifts() {
        // A 300x200 frame with groups of 128.
        let channels = vec![
            channel((300, 200), Some((0, 0))),
            channel((150, 100), Some((1, 1))),
            channel((38, 25), Some((3, 3))),
        ];
        let region = GroupRegion {
            origin: (256, 128),
            dim: 128,
            min_shift: 0,
            max_shift: 2,
        };
        let rects = group_channel_rects(&channels, 0, 128, &region);
        assert_eq!(
            rects,
            vec![(0, (256, 128), (44, 72)), (1, (128, 64), (22, 36))]
        );
    }

    #[test]
    fn lf_region_takes_downsampled_channels() {
        let channels = vec![
            channel((300, 200), Some((0, 0))),
            channel((38, 25), Some((3, 3))),
            channel((19, 13), Some((4, 4))),
        ];
        let region = GroupRegion {
            origin: (0, 0),
            dim: 1024,
            min_shift: 3,
            max_shift: 1000,
        };
        let rects = group_channel_rects(&channels, 0, 128, &region);
        assert_eq!(rects, vec![(1, (0, 0), (38, 25)), (2, (0, 0), (19, 13))]);
    }

    #[test]
    fn decode_and_merge() {
        let mut frame_channels = vec![channel((3, 2), Some((0, 0)))];
        let region = GroupRegion {
            origin: (2, 0),
            dim: 2,
            min_shift: 0,
            max_shift: 0,
        };

        let mut w = BitWriter::new();
        // Local tree, default weighted predictor header, no transforms.
        w.write_bool(false);
        w.write_bool(true);
        w.write(2, 0);
        // Single leaf with the zero predictor.
        w.write_histograms(6);
        w.write_symbol(0);
        w.write_symbol(0);
        w.write_signed_symbol(0);
        w.write_symbol(0);
        w.write_symbol(0);
        w.write_histograms(1);
        w.write_signed_symbol(7);
        w.write_signed_symbol(-3);
        let data = w.finish();
        let mut br = BitReader::new(&data);

        let decoded =
            decode_modular_group(&frame_channels, 0, 2, region, 8, 5, None, &mut br).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].origin, (2, 0));
        assert_eq!(decoded[0].data.size(), (1, 2));
        merge_group_channels(&mut frame_channels, decoded).unwrap();
        assert_eq!(frame_channels[0].data.row(0), &[0, 0, 7]);
        assert_eq!(frame_channels[0].data.row(1), &[0, 0, -3]);
    }

    #[test]
    fn empty_group_reads_nothing() {
        let frame_channels = vec![channel((8, 8), Some((0, 0)))];
        let region = GroupRegion {
            origin: (0, 0),
            dim: 8,
            min_shift: 3,
            max_shift: 1000,
        };
        let mut br = BitReader::new(&[]);
        let decoded =
            decode_modular_group(&frame_channels, 0, 4, region, 8, 1, None, &mut br).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(br.total_bits_read(), 0);
    }
}
