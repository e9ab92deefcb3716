//! Byte encoding of typed payloads.
//!
//! All numeric payloads travel as contiguous arrays of plain values in
//! little-endian byte order. Counts are never sent in-band; both sides know
//! them from earlier protocol steps.

#[cfg(target_endian = "big")]
compile_error!("wire payloads are cast in place and require a little-endian target");

use bytemuck::{Pod, Zeroable};

use super::ChannelError;

/// Copies a slice of plain values into an owned byte payload.
pub(crate) fn encode<T: Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Decodes a byte payload into plain values.
///
/// The payload is copied into a correctly aligned buffer, so any byte
/// alignment of the incoming message is accepted.
///
/// # Errors
///
/// Returns [`ChannelError::Payload`] if the length is not a multiple of the
/// value size.
pub(crate) fn decode<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, ChannelError> {
    let size = size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(ChannelError::Payload {
            len: bytes.len(),
            size,
        });
    }

    let mut values = vec![T::zeroed(); bytes.len() / size];
    bytemuck::cast_slice_mut(&mut values).copy_from_slice(bytes);
    Ok(values)
}

/// Decodes a payload expected to hold exactly one value.
pub(crate) fn decode_one<T: Pod>(bytes: &[u8]) -> Result<T, ChannelError> {
    match decode::<T>(bytes)?.as_slice() {
        [value] => Ok(*value),
        _ => Err(ChannelError::Payload {
            len: bytes.len(),
            size: size_of::<T>(),
        }),
    }
}

/// Contiguous range of world ranks, as exchanged when a channel connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct RankRange {
    pub first: u64,
    pub count: u64,
}

impl RankRange {
    pub(crate) fn from_range(range: &std::ops::Range<usize>) -> Self {
        Self {
            first: range.start as u64,
            count: range.len() as u64,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn to_range(self) -> std::ops::Range<usize> {
        let first = self.first as usize;
        first..first + self.count as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reals_survive_encoding() {
        let values = [1.5_f64, -2.25, 1e300];
        let decoded: Vec<f64> = decode(&encode(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn payload_bytes_are_little_endian() {
        assert_eq!(encode(&[1.0_f64]), 1.0_f64.to_le_bytes());
        assert_eq!(encode(&[0x0102_u64]), [2, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn ragged_payload_is_rejected() {
        let err = decode::<f64>(&[0u8; 12]).unwrap_err();
        assert_eq!(err, ChannelError::Payload { len: 12, size: 8 });
    }

    #[test]
    fn decode_one_requires_a_single_value() {
        assert_eq!(decode_one::<f64>(&encode(&[4.0_f64])).unwrap(), 4.0);
        assert!(decode_one::<f64>(&encode(&[1.0_f64, 2.0])).is_err());
        assert!(decode_one::<f64>(&[]).is_err());
    }

    #[test]
    fn rank_range_converts_both_ways() {
        let range = RankRange::from_range(&(3..7));
        assert_eq!(range, RankRange { first: 3, count: 4 });
        assert_eq!(range.to_range(), 3..7);
    }
}
