//! The minimal encoding of Equihash solutions.
//!
//! Each index is packed as a `collision_bit_length + 1`-bit big-endian field, and the
//! fields are concatenated with no padding. This is the form in which solutions appear
//! in block headers, so it must be reproduced byte-for-byte.

use std::io::Cursor;
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt};

use crate::params::Params;

pub(crate) fn expand_array(vin: &[u8], bit_len: usize, byte_pad: usize) -> Vec<u8> {
    assert!(bit_len >= 8);
    assert!(u32::BITS as usize >= 7 + bit_len);

    let out_width = (bit_len + 7) / 8 + byte_pad;
    let out_len = 8 * out_width * vin.len() / bit_len;

    // Shortcut for parameters where expansion is a no-op
    if out_len == vin.len() {
        return vin.to_vec();
    }

    let mut vout: Vec<u8> = vec![0; out_len];
    let bit_len_mask: u32 = (1 << bit_len) - 1;

    // The acc_bits least-significant bits of acc_value represent a bit sequence
    // in big-endian order.
    let mut acc_bits = 0;
    let mut acc_value: u32 = 0;

    let mut j = 0;
    for b in vin {
        acc_value = (acc_value << 8) | u32::from(*b);
        acc_bits += 8;

        // When we have bit_len or more bits in the accumulator, write the next
        // output element.
        if acc_bits >= bit_len {
            acc_bits -= bit_len;
            for x in byte_pad..out_width {
                vout[j + x] = ((
                    // Big-endian
                    acc_value >> (acc_bits + (8 * (out_width - x - 1)))
                ) & (
                    // Apply bit_len_mask across byte boundaries
                    (bit_len_mask >> (8 * (out_width - x - 1))) & 0xFF
                )) as u8;
            }
            j += out_width;
        }
    }

    vout
}

/// The inverse of [`expand_array`]: packs `byte_pad`-padded big-endian elements of
/// `bit_len` bits into a contiguous bit string.
pub(crate) fn compress_array(vin: &[u8], bit_len: usize, byte_pad: usize) -> Vec<u8> {
    assert!(bit_len >= 8);
    assert!(u32::BITS as usize >= 7 + bit_len);

    let in_width = (bit_len + 7) / 8 + byte_pad;
    let out_len = bit_len * vin.len() / (8 * in_width);

    // Shortcut for parameters where compression is a no-op
    if out_len == vin.len() {
        return vin.to_vec();
    }

    let mut vout: Vec<u8> = vec![0; out_len];
    let bit_len_mask: u32 = (1 << bit_len) - 1;

    // The acc_bits least-significant bits of acc_value represent a bit sequence
    // in big-endian order.
    let mut acc_bits = 0;
    let mut acc_value: u32 = 0;

    let mut j = 0;
    for out in vout.iter_mut() {
        // When we have fewer than 8 bits left in the accumulator, read the next
        // input element.
        if acc_bits < 8 {
            acc_value <<= bit_len;
            for x in byte_pad..in_width {
                acc_value |= (
                    // Apply bit_len_mask across byte boundaries
                    u32::from(vin[j + x]) & ((bit_len_mask >> (8 * (in_width - x - 1))) & 0xFF)
                ) << (8 * (in_width - x - 1)); // Big-endian
            }
            j += in_width;
            acc_bits += bit_len;
        }

        acc_bits -= 8;
        *out = (acc_value >> acc_bits) as u8;
    }

    vout
}

/// Decodes a minimally-encoded solution into its indices.
///
/// Returns `None` if `minimal` is not exactly [`Params::solution_width`] bytes long.
pub fn indices_from_minimal(p: Params, minimal: &[u8]) -> Option<Vec<u32>> {
    let c_bit_len = p.collision_bit_length();
    // Division is exact because k >= 3.
    if minimal.len() != ((1 << p.k) * (c_bit_len + 1)) / 8 {
        return None;
    }

    assert!(((c_bit_len + 1) + 7) / 8 <= size_of::<u32>());
    let len_indices = u32::BITS as usize * minimal.len() / (c_bit_len + 1);
    let byte_pad = size_of::<u32>() - ((c_bit_len + 1) + 7) / 8;

    let mut csr = Cursor::new(expand_array(minimal, c_bit_len + 1, byte_pad));
    let mut ret = Vec::with_capacity(len_indices);

    // Big-endian so that lexicographic array comparison is equivalent to integer
    // comparison
    while let Ok(i) = csr.read_u32::<BigEndian>() {
        ret.push(i);
    }

    Some(ret)
}

/// Encodes the indices of a solution in minimal form.
///
/// Bits of an index above [`Params::index_bit_length`] are discarded. For a full
/// solution of [`Params::proof_size`] indices the result is [`Params::solution_width`]
/// bytes long.
pub fn minimal_from_indices(p: Params, indices: &[u32]) -> Vec<u8> {
    let c_bit_len = p.collision_bit_length();
    let index_bytes = size_of::<u32>();
    let digit_bytes = ((c_bit_len + 1) + 7) / 8;
    assert!(digit_bytes <= index_bytes);

    let len_indices = indices.len() * index_bytes;
    let byte_pad = index_bytes - digit_bytes;

    // Big-endian so that lexicographic array comparison is equivalent to integer
    // comparison
    let mut array = Vec::with_capacity(len_indices);
    for i in indices {
        array.extend_from_slice(&i.to_be_bytes());
    }

    compress_array(&array, c_bit_len + 1, byte_pad)
}
