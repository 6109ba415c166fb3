use bytes::Bytes;

use super::{access_units, classify, is_key, is_vcl, nal_type, split_nal_units, starts_picture};
use crate::codec::CodecFormat;
use crate::frame::FrameKind;

const SPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, 0x95];
const PPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];
const IDR: &[u8] = &[0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x33];
const P_SLICE: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x04];
// Second slice of the same picture: first_mb_in_slice != 0.
const P_SLICE_CONT: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x40, 0x11, 0x22];

fn concat(parts: &[&[u8]]) -> Bytes {
    Bytes::from(parts.concat())
}

#[test]
fn test_split_handles_both_start_code_lengths() {
    let stream = concat(&[SPS, PPS, IDR]);
    let nals = split_nal_units(&stream);
    assert_eq!(nals.len(), 3);
    assert_eq!(nals[0], &SPS[4..]);
    assert_eq!(nals[1], &PPS[4..]);
    assert_eq!(nals[2], &IDR[3..]);
}

#[test]
fn test_split_without_start_code_is_empty() {
    assert!(split_nal_units(&[0x65, 0x88, 0x84]).is_empty());
    assert!(split_nal_units(&[]).is_empty());
}

#[test]
fn test_h264_nal_types() {
    assert_eq!(nal_type(CodecFormat::H264, &SPS[4..]), Some(7));
    assert_eq!(nal_type(CodecFormat::H264, &PPS[4..]), Some(8));
    assert!(is_key(CodecFormat::H264, &IDR[3..]));
    assert!(!is_key(CodecFormat::H264, &P_SLICE[4..]));
    assert!(is_vcl(CodecFormat::H264, &P_SLICE[4..]));
    assert!(!is_vcl(CodecFormat::H264, &SPS[4..]));
    assert_eq!(nal_type(CodecFormat::H264, &[]), None);
}

#[test]
fn test_h265_nal_types() {
    // IDR_W_RADL = 19, VPS = 32, TRAIL_R = 1
    let idr = [0x26, 0x01, 0xAF];
    let vps = [0x40, 0x01, 0x0C];
    let trail = [0x02, 0x01, 0x80];
    assert_eq!(nal_type(CodecFormat::H265, &idr), Some(19));
    assert!(is_key(CodecFormat::H265, &idr));
    assert!(!is_vcl(CodecFormat::H265, &vps));
    assert!(is_vcl(CodecFormat::H265, &trail));
    assert!(starts_picture(CodecFormat::H265, &trail));
    assert!(!starts_picture(CodecFormat::H265, &[0x02, 0x01, 0x00]));
}

#[test]
fn test_classify_unit() {
    assert_eq!(classify(CodecFormat::H264, &concat(&[SPS, PPS, IDR])), FrameKind::Key);
    assert_eq!(classify(CodecFormat::H264, P_SLICE), FrameKind::Delta);
}

#[test]
fn test_access_units_group_parameter_sets_with_picture() {
    let stream = concat(&[SPS, PPS, IDR, P_SLICE, P_SLICE_CONT, P_SLICE]);
    let units = access_units(CodecFormat::H264, &stream);

    assert_eq!(units.len(), 3);
    assert_eq!(units[0], concat(&[SPS, PPS, IDR]));
    assert_eq!(units[1], concat(&[P_SLICE, P_SLICE_CONT]));
    assert_eq!(units[2], Bytes::from_static(P_SLICE));
}

#[test]
fn test_access_units_split_before_next_parameter_sets() {
    let stream = concat(&[SPS, PPS, IDR, SPS, PPS, IDR]);
    let units = access_units(CodecFormat::H264, &stream);
    assert_eq!(units.len(), 2);
    assert_eq!(units[0], units[1]);
}

#[test]
fn test_access_units_skip_leading_garbage() {
    let stream = concat(&[&[0xFF_u8, 0xEE][..], IDR]);
    let units = access_units(CodecFormat::H264, &stream);
    assert_eq!(units, vec![Bytes::from_static(IDR)]);
    assert!(access_units(CodecFormat::H264, &Bytes::from_static(&[1, 2, 3])).is_empty());
}
