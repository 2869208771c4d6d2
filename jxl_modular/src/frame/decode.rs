// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{
    Frame, LfGlobalState, Section,
    group::{GroupChannel, GroupPool, GroupRegion, decode_modular_group, merge_group_channels},
    modular::{ModularChannel, ModularStream, ModularStreamId, Tree},
    quantizer::LfQuantFactors,
    render::convert_frame,
};
use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::modular::GroupHeader,
    image::Image,
    util::{CeilLog2, tracing_wrappers::*},
};

const MAX_GLOBAL_TREE_SIZE: usize = 1 << 22;
const LF_GROUP_MIN_SHIFT: i32 = 3;
const LF_GROUP_MAX_SHIFT: i32 = 1000;

impl Frame {
    fn global_channels(&self) -> Result<Vec<ModularChannel>> {
        let (width, height) = self.header.size();
        let color = (0..self.color_channels)
            .map(|_| ModularChannel::new((width, height), Some((0, 0))));
        let extra = self.ec_shifts.iter().map(|&shift| {
            let size = (width.div_ceil(1 << shift), height.div_ceil(1 << shift));
            ModularChannel::new(size, Some((shift, shift)))
        });
        color.chain(extra).collect()
    }

    fn lf_global_state(&self) -> Result<&LfGlobalState> {
        self.lf_global.as_ref().ok_or(Error::LfGlobalNotDecoded)
    }

    /// Reads the LF global section: the XYB dequantization factors, the global MA tree and the
    /// global modular stream with every channel small enough to skip the groups.
    #[instrument(skip_all, err)]
    pub fn decode_lf_global(&mut self, br: &mut BitReader) -> Result<()> {
        debug!(section_size = br.total_bits_available());

        let lf_quant = LfQuantFactors::new(br)?;
        debug!(?lf_quant);

        let tree = if br.read(1)? == 1 {
            let (width, height) = self.header.size();
            let num_channels = self.color_channels + self.ec_bit_depths.len();
            let size_limit = (1024 + width * height * num_channels / 16).min(MAX_GLOBAL_TREE_SIZE);
            Some(Tree::read(br, size_limit)?)
        } else {
            None
        };

        let channels = self.global_channels()?;
        let mut modular_global = ModularStream::new(channels, self.bit_depth.bits_per_sample());
        if !modular_global.channels.is_empty() {
            let header = GroupHeader::read(br)?;
            trace!(?header, "global modular header");
            modular_global.apply_transforms(&header)?;
            self.check_channel_shifts(&modular_global)?;
            modular_global.decode_channels(
                &header,
                tree.as_ref(),
                ModularStreamId::GlobalData.get_id(&self.header),
                self.header.group_dim(),
                br,
            )?;
        }

        self.lf_global = Some(LfGlobalState {
            lf_quant,
            tree,
            modular_global,
        });
        Ok(())
    }

    /// A channel split into groups with a shift above log2(lf_group_dim) would be empty in
    /// every group.
    fn check_channel_shifts(&self, stream: &ModularStream) -> Result<()> {
        let group_dim = self.header.group_dim();
        let lf_group_dim = self.header.lf_group_dim();
        let max_shift = lf_group_dim.ceil_log2();
        for channel in stream.channels.iter().skip(stream.num_meta_channels) {
            let (w, h) = channel.size();
            let Some((hshift, vshift)) = channel.shift else {
                continue;
            };
            let shift = hshift.max(vshift);
            if (w > group_dim || h > group_dim) && shift > max_shift {
                return Err(Error::ChannelShiftTooLarge(shift, lf_group_dim));
            }
        }
        Ok(())
    }

    fn lf_group_region(&self, group: usize) -> GroupRegion {
        let lf_group_dim = self.header.lf_group_dim();
        let (width_groups, _) = self.header.size_lf_groups();
        GroupRegion {
            origin: (
                (group % width_groups) * lf_group_dim,
                (group / width_groups) * lf_group_dim,
            ),
            dim: lf_group_dim,
            min_shift: LF_GROUP_MIN_SHIFT,
            max_shift: LF_GROUP_MAX_SHIFT,
        }
    }

    fn pass_group_region(&self, pass: usize, group: usize) -> GroupRegion {
        let group_dim = self.header.group_dim();
        let (width_groups, _) = self.header.size_groups();
        let (min_shift, max_shift) = self.header.passes.downsampling_bracket(pass);
        GroupRegion {
            origin: (
                (group % width_groups) * group_dim,
                (group / width_groups) * group_dim,
            ),
            dim: group_dim,
            min_shift,
            max_shift,
        }
    }

    fn decode_group(
        &self,
        region: GroupRegion,
        stream_id: ModularStreamId,
        br: &mut BitReader,
    ) -> Result<Vec<GroupChannel>> {
        let lf_global = self.lf_global_state()?;
        let stream = &lf_global.modular_global;
        decode_modular_group(
            &stream.channels,
            stream.num_meta_channels,
            self.header.group_dim(),
            region,
            self.bit_depth.bits_per_sample(),
            stream_id.get_id(&self.header),
            lf_global.tree.as_ref(),
            br,
        )
    }

    /// Decodes the channels of LF group `group`: those downsampled by at least 8. The decoded
    /// samples are returned for [`Frame::merge_groups`].
    #[instrument(level = "debug", skip(self, br), err)]
    pub fn decode_lf_group(&self, group: usize, br: &mut BitReader) -> Result<Vec<GroupChannel>> {
        self.decode_group(
            self.lf_group_region(group),
            ModularStreamId::ModularLF(group),
            br,
        )
    }

    /// Modular frames carry nothing in the HF global section.
    pub fn decode_hf_global(&self, br: &mut BitReader) -> Result<()> {
        debug!(section_size = br.total_bits_available(), "HF global");
        Ok(())
    }

    /// Decodes the samples of pass group (`pass`, `group`).
    #[instrument(level = "debug", skip(self, br), err)]
    pub fn decode_pass_group(
        &self,
        pass: usize,
        group: usize,
        br: &mut BitReader,
    ) -> Result<Vec<GroupChannel>> {
        self.decode_group(
            self.pass_group_region(pass, group),
            ModularStreamId::ModularHF { pass, group },
            br,
        )
    }

    /// Copies group results into the global channels.
    pub fn merge_groups(
        &mut self,
        groups: impl IntoIterator<Item = Vec<GroupChannel>>,
    ) -> Result<()> {
        let lf_global = self.lf_global.as_mut().ok_or(Error::LfGlobalNotDecoded)?;
        for group in groups {
            merge_group_channels(&mut lf_global.modular_global.channels, group)?;
        }
        Ok(())
    }

    /// Decodes every section of the frame from `sections`, as returned by [`Frame::sections`].
    ///
    /// With a single section all the data is read from one reader, in order. Otherwise the LF
    /// groups and then all the pass groups are decoded on `pool`, each from its own reader;
    /// results are merged once every group of a stage has completed.
    #[instrument(level = "debug", skip_all, err)]
    pub fn decode_sections(
        &mut self,
        mut sections: Vec<BitReader>,
        pool: &GroupPool,
    ) -> Result<()> {
        let num_lf_groups = self.header.num_lf_groups();
        let num_groups = self.header.num_groups();
        let num_passes = self.header.num_passes();
        debug!(num_lf_groups, num_groups, num_passes, serial = pool.is_serial());

        if self.header.num_toc_entries() == 1 {
            let br = sections.first_mut().ok_or(Error::MissingSection(0))?;
            self.decode_lf_global(br)?;
            for group in 0..num_lf_groups {
                let decoded = self.decode_lf_group(group, br)?;
                self.merge_groups([decoded])?;
            }
            self.decode_hf_global(br)?;
            for pass in 0..num_passes {
                for group in 0..num_groups {
                    let decoded = self.decode_pass_group(pass, group, br)?;
                    self.merge_groups([decoded])?;
                }
            }
            return Ok(());
        }

        let mut sections: Vec<Option<BitReader>> = sections.into_iter().map(Some).collect();
        let mut take = |frame: &Frame, section: Section| {
            let idx = frame.get_section_idx(section);
            sections
                .get_mut(idx)
                .and_then(Option::take)
                .ok_or(Error::MissingSection(idx))
        };

        let mut br = take(self, Section::LfGlobal)?;
        self.decode_lf_global(&mut br)?;

        let lf_items = (0..num_lf_groups)
            .map(|group| -> Result<_> { Ok((group, take(self, Section::Lf { group })?)) })
            .collect::<Result<Vec<_>>>()?;
        let lf_groups = pool.run(lf_items, |(group, mut br)| {
            self.decode_lf_group(group, &mut br)
        })?;
        self.merge_groups(lf_groups)?;

        let mut br = take(self, Section::HfGlobal)?;
        self.decode_hf_global(&mut br)?;

        // Passes never share a channel, so all the pass groups can be decoded at once. Results
        // are indexed by pass * num_groups + group.
        let mut pass_items = Vec::with_capacity(num_passes * num_groups);
        for pass in 0..num_passes {
            for group in 0..num_groups {
                pass_items.push((pass, group, take(self, Section::Hf { group, pass })?));
            }
        }
        let pass_groups = pool.run(pass_items, |(pass, group, mut br)| {
            self.decode_pass_group(pass, group, &mut br)
        })?;
        self.merge_groups(pass_groups)?;
        Ok(())
    }

    /// Undoes the global transforms and converts the frame to floating point channels: color
    /// first, then extra channels.
    #[instrument(level = "debug", skip_all, err)]
    pub fn finalize(self) -> Result<Vec<Image<f32>>> {
        let LfGlobalState {
            lf_quant,
            mut modular_global,
            ..
        } = self.lf_global.ok_or(Error::LfGlobalNotDecoded)?;
        modular_global.undo_transforms()?;
        let channels = modular_global.into_channels();
        convert_frame(
            &channels,
            self.color_channels,
            self.xyb_encoded,
            &lf_quant,
            &self.bit_depth,
            &self.ec_bit_depths,
        )
    }
}
