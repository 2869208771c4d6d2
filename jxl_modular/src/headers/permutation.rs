// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::ops::Deref;

use crate::{
    bit_reader::BitReader,
    entropy_coding::decode::Histograms,
    error::{Error, Result},
    headers::encodings::UnconditionalCoder,
    util::{CeilLog2, tracing_wrappers::*},
};

const NUM_CONTEXTS: usize = 8;

/// Order in which sections appear in the codestream. Entry `i` is the index of the
/// `i`-th stored section in the canonical order.
#[derive(Debug, PartialEq, Clone)]
pub struct Permutation(Vec<usize>);

impl Deref for Permutation {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

fn context(previous: u32) -> usize {
    (previous + 1).ceil_log2().min(NUM_CONTEXTS as u32 - 1) as usize
}

impl Permutation {
    pub fn identity(size: usize) -> Permutation {
        Permutation((0..size).collect())
    }

    /// Builds a permutation of `size` entries from the Lehmer code of its prefix. Entries that
    /// the code does not reach keep their relative order.
    ///
    /// `next_code` receives the context of each code, derived from the previous one.
    fn from_lehmer_code(
        size: u32,
        coded: u32,
        mut next_code: impl FnMut(usize) -> Result<u32>,
    ) -> Result<Permutation> {
        if coded > size {
            return Err(Error::InvalidPermutationSize(size, coded));
        }
        let mut remaining = Vec::new();
        remaining.try_reserve_exact(size as usize)?;
        remaining.extend(0..size as usize);
        let mut order = Vec::new();
        order.try_reserve_exact(size as usize)?;

        let mut previous = 0;
        for idx in 0..coded {
            let lehmer = next_code(context(previous))?;
            if lehmer as usize >= remaining.len() {
                return Err(Error::InvalidPermutationLehmerCode { size, idx, lehmer });
            }
            order.push(remaining.remove(lehmer as usize));
            previous = lehmer;
        }
        order.append(&mut remaining);
        Ok(Permutation(order))
    }

    /// Reads an entropy coded permutation of `size` entries, including its histograms.
    pub fn read(size: u32, br: &mut BitReader) -> Result<Permutation> {
        let histograms = Histograms::decode(NUM_CONTEXTS, br, false)?;
        let mut reader = histograms.make_reader(br)?;
        let coded = reader.read(br, context(size))?;
        let permutation =
            Permutation::from_lehmer_code(size, coded, |ctx| reader.read(br, ctx))?;
        reader.check_final_state()?;
        Ok(permutation)
    }
}

pub struct PermutationNonserialized {
    pub num_entries: u32,
    pub permuted: bool,
}

impl Permutation {
    #[allow(clippy::should_implement_trait)]
    pub fn default(nonserialized: &PermutationNonserialized) -> Permutation {
        Permutation::identity(nonserialized.num_entries as usize)
    }
}

impl UnconditionalCoder<()> for Permutation {
    type Nonserialized = PermutationNonserialized;

    /// Reads the permutation if there is one, then aligns the reader to the next byte.
    fn read_unconditional(
        _: &(),
        br: &mut BitReader,
        nonserialized: &PermutationNonserialized,
    ) -> Result<Permutation> {
        let permutation = if nonserialized.permuted {
            let permutation = Permutation::read(nonserialized.num_entries, br)?;
            debug!(?permutation, "sections are permuted");
            permutation
        } else {
            Permutation::identity(nonserialized.num_entries as usize)
        };
        br.jump_to_byte_boundary()?;
        Ok(permutation)
    }
}
