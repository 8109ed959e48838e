use block_map::algs::communicator::CommTag;
use block_map::algs::wire::{
    SUMMARY_CONTIGUOUS, SUMMARY_NONEMPTY, WireDirEntry, WireRankSummary, WireReply,
    decode_records, encode_records,
};
use block_map::map_error::BlockMapError;

#[test]
fn commtag_offset_wrap() {
    let t = CommTag::new(u16::MAX).offset(1);
    assert_eq!(t.as_u16(), 0);
}

#[test]
fn records_are_little_endian() {
    let bytes = encode_records(&[WireDirEntry::new(1, 2, 3)]);
    assert_eq!(bytes.len(), 24);
    assert_eq!(&bytes[..8], &1i64.to_le_bytes());
    assert_eq!(&bytes[8..16], &2u64.to_le_bytes());
    assert_eq!(&bytes[16..], &3u64.to_le_bytes());
}

#[test]
fn summary_survives_the_wire() {
    let s = WireRankSummary::new(
        SUMMARY_NONEMPTY | SUMMARY_CONTIGUOUS,
        6,
        45,
        (-4, 1),
        (5, 10),
    );
    let back: Vec<WireRankSummary> = decode_records(&encode_records(&[s]), 0).unwrap();
    assert_eq!(back.len(), 1);
    assert!(back[0].has(SUMMARY_CONTIGUOUS));
    assert_eq!(back[0].num_elements(), 6);
    assert_eq!(back[0].num_points(), 45);
    assert_eq!(back[0].gid_range(), (-4, 1));
    assert_eq!(back[0].size_range(), (5, 10));
}

#[test]
fn missing_reply_uses_minus_one() {
    let bytes = encode_records(&[WireReply::missing()]);
    assert_eq!(&bytes[..8], &(-1i64).to_le_bytes());
    assert_eq!(&bytes[8..16], &(-1i64).to_le_bytes());
}

#[test]
fn truncated_buffer_is_reported() {
    let bytes = encode_records(&[WireReply::found(1, 2, 3)]);
    let err = decode_records::<WireReply>(&bytes[..20], 3).unwrap_err();
    assert!(matches!(err, BlockMapError::BufferSizeMismatch { neighbor: 3, got: 20, .. }));
}
