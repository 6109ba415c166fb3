//! Annex-B byte stream helpers for H.264 and H.265 elementary streams.

use bytes::Bytes;

use crate::codec::CodecFormat;
use crate::frame::FrameKind;

/// Offsets of every start code (`00 00 01` or `00 00 00 01`) in `data`,
/// as `(start_code_offset, payload_offset)`.
fn start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let begin = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            found.push((begin, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    found
}

/// NAL unit payloads in `data`, without their start codes.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let codes = start_codes(data);
    let mut units = Vec::with_capacity(codes.len());
    for (n, &(_, payload)) in codes.iter().enumerate() {
        let end = codes.get(n + 1).map_or(data.len(), |&(begin, _)| begin);
        if end > payload {
            units.push(&data[payload..end]);
        }
    }
    units
}

pub fn nal_type(format: CodecFormat, nal: &[u8]) -> Option<u8> {
    let header = *nal.first()?;
    Some(match format {
        CodecFormat::H264 => header & 0x1F,
        CodecFormat::H265 => (header >> 1) & 0x3F,
    })
}

/// Whether the NAL carries coded slice data.
pub fn is_vcl(format: CodecFormat, nal: &[u8]) -> bool {
    match (format, nal_type(format, nal)) {
        (CodecFormat::H264, Some(t)) => (1..=5).contains(&t),
        (CodecFormat::H265, Some(t)) => t <= 31,
        _ => false,
    }
}

/// IDR slice for H.264; IRAP (BLA, IDR, CRA) for H.265.
pub fn is_key(format: CodecFormat, nal: &[u8]) -> bool {
    match (format, nal_type(format, nal)) {
        (CodecFormat::H264, Some(t)) => t == 5,
        (CodecFormat::H265, Some(t)) => (16..=21).contains(&t),
        _ => false,
    }
}

/// True for the first slice of a picture.
///
/// H.264 checks that `first_mb_in_slice` is zero (its ue(v) code is a
/// single `1` bit); H.265 reads `first_slice_segment_in_pic_flag`.
pub fn starts_picture(format: CodecFormat, nal: &[u8]) -> bool {
    if !is_vcl(format, nal) {
        return false;
    }
    match format {
        CodecFormat::H264 => nal.get(1).is_some_and(|b| b & 0x80 != 0),
        CodecFormat::H265 => nal.get(2).is_some_and(|b| b & 0x80 != 0),
    }
}

/// Key if any NAL in the unit is a key slice.
pub fn classify(format: CodecFormat, unit: &[u8]) -> FrameKind {
    if split_nal_units(unit).iter().any(|nal| is_key(format, nal)) {
        FrameKind::Key
    } else {
        FrameKind::Delta
    }
}

/// Groups a raw elementary stream into access units, start codes included.
///
/// Parameter sets and SEI preceding a picture stay attached to it, so the
/// first access unit of a stream carries SPS/PPS together with the IDR.
pub fn access_units(format: CodecFormat, data: &Bytes) -> Vec<Bytes> {
    let codes = start_codes(data);
    let mut units = Vec::new();
    let mut unit_begin = codes.first().map_or(0, |&(begin, _)| begin);
    let mut has_picture = false;

    for (n, &(begin, payload)) in codes.iter().enumerate() {
        let end = codes.get(n + 1).map_or(data.len(), |&(next, _)| next);
        let nal = &data[payload..end];
        let vcl = is_vcl(format, nal);

        // A non-VCL NAL after a picture, or a new picture's first slice,
        // opens the next access unit.
        let opens_unit = has_picture && (!vcl || starts_picture(format, nal));
        if opens_unit && begin > unit_begin {
            units.push(data.slice(unit_begin..begin));
            unit_begin = begin;
            has_picture = false;
        }
        if vcl {
            has_picture = true;
        }
    }

    if unit_begin < data.len() && !codes.is_empty() {
        units.push(data.slice(unit_begin..));
    }
    units
}

#[cfg(test)]
#[path = "annexb_test.rs"]
mod annexb_test;
