// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::bit_reader::BitReader;
use crate::entropy_coding::decode::Histograms;
use crate::error::{Error, Result};
use crate::util::tracing_wrappers::*;

fn inverse_move_to_front(values: &mut [u8]) {
    let mut mtf: [u8; 256] = std::array::from_fn(|i| i as u8);
    for value in values.iter_mut() {
        let index = *value as usize;
        let decoded = mtf[index];
        *value = decoded;
        if index != 0 {
            mtf.copy_within(0..index, 1);
            mtf[0] = decoded;
        }
    }
}

fn verify_context_map(context_map: &[u8]) -> Result<()> {
    let num_histograms = context_map.iter().copied().max().unwrap_or(0) as usize + 1;
    let mut seen = vec![false; num_histograms];
    for &id in context_map {
        seen[id as usize] = true;
    }
    let num_distinct = seen.iter().filter(|&&s| s).count();
    if num_distinct != num_histograms {
        return Err(Error::InvalidContextMapHole(
            num_histograms as u32,
            num_distinct as u32,
        ));
    }
    Ok(())
}

/// Reads the mapping from contexts to histogram (cluster) ids.
#[instrument(level = "debug", skip(br), err)]
pub fn decode_context_map(num_contexts: usize, br: &mut BitReader) -> Result<Vec<u8>> {
    let is_simple = br.read(1)? != 0;
    let context_map = if is_simple {
        let bits_per_entry = br.read(2)? as usize;
        if bits_per_entry != 0 {
            (0..num_contexts)
                .map(|_| Ok(br.read(bits_per_entry)? as u8))
                .collect::<Result<Vec<u8>>>()?
        } else {
            vec![0u8; num_contexts]
        }
    } else {
        let use_mtf = br.read(1)? != 0;
        let histograms = Histograms::decode(1, br, num_contexts > 2)?;
        let mut reader = histograms.make_reader(br)?;
        let mut context_map = (0..num_contexts)
            .map(|_| {
                let id = reader.read(br, 0)?;
                if id > u8::MAX as u32 {
                    return Err(Error::InvalidContextMap(id));
                }
                Ok(id as u8)
            })
            .collect::<Result<Vec<u8>>>()?;
        reader.check_final_state()?;
        if use_mtf {
            inverse_move_to_front(&mut context_map[..]);
        }
        context_map
    };
    verify_context_map(&context_map)?;
    trace!(?context_map);
    Ok(context_map)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use test_log::test;

    #[test]
    fn mtf() {
        let mut values = [1u8, 1, 0, 2, 0, 0];
        inverse_move_to_front(&mut values);
        assert_eq!(values, [1, 0, 0, 2, 2, 2]);
    }

    #[test]
    fn simple_map() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(2, 2);
        for id in [0, 1, 3, 2, 1] {
            w.write(2, id);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(decode_context_map(5, &mut br).unwrap(), vec![0, 1, 3, 2, 1]);
    }

    #[test]
    fn all_zero_map() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(2, 0);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(decode_context_map(3, &mut br).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn holes_are_rejected() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(2, 2);
        for id in [0, 2, 0] {
            w.write(2, id);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            decode_context_map(3, &mut br),
            Err(Error::InvalidContextMapHole(3, 2))
        ));
    }
}
