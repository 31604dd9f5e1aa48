//! Property tests for the frame codec.
//!
//! Covers masked encode/decode round-trips, the choice of length tier for
//! every payload size band, mask involution, and agreement between the
//! stream decoder and the buffered decoder.

use bytes::BytesMut;
use proptest::prelude::*;

use wsframe::Error;
use wsframe::frame::{Frame, OpCode, decode_frame, encode_frame, read_frame};
use wsframe::mask::apply_mask;

const MAX: usize = 1 << 20;

fn decode(wire: &[u8]) -> Result<Frame, Error> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut reader = wire;
    rt.block_on(read_frame(&mut reader, MAX))
}

fn arb_opcode() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Close),
        Just(OpCode::Ping),
        Just(OpCode::Pong),
    ]
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=125),
        prop::collection::vec(any::<u8>(), 126..=2048),
        prop::collection::vec(any::<u8>(), 65530..=65545),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn masked_round_trip(
        payload in arb_payload(),
        opcode in arb_opcode(),
        mask in any::<[u8; 4]>(),
    ) {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, opcode, &payload, Some(mask));

        let frame = decode(&wire).unwrap();
        prop_assert!(frame.header.fin);
        prop_assert!(frame.header.masked);
        prop_assert_eq!(frame.header.mask, Some(mask));
        prop_assert_eq!(frame.opcode(), opcode);
        prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn unmasked_round_trip(payload in arb_payload(), opcode in arb_opcode()) {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, opcode, &payload, None);

        let frame = decode(&wire).unwrap();
        prop_assert!(!frame.header.masked);
        prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
        prop_assert_eq!(wire.len(), frame.header.header_size() + payload.len());
    }

    #[test]
    fn length_tier_matches_size(payload in arb_payload()) {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, OpCode::Binary, &payload, None);

        let len = payload.len();
        let (marker, header_len) = match len {
            0..=125 => (len as u8, 2),
            126..=65535 => (126, 4),
            _ => (127, 10),
        };
        prop_assert_eq!(wire[1] & 0x7F, marker);
        prop_assert_eq!(wire.len(), header_len + len);

        let decoded = decode(&wire).unwrap();
        prop_assert_eq!(decoded.header.payload_len, len as u64);
    }

    #[test]
    fn masked_payload_differs_on_the_wire_only(
        payload in prop::collection::vec(any::<u8>(), 1..=512),
        mask in any::<[u8; 4]>(),
    ) {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, OpCode::Binary, &payload, Some(mask));

        let start = wire.len() - payload.len();
        let mut on_wire = wire[start..].to_vec();
        apply_mask(&mut on_wire, mask);
        prop_assert_eq!(on_wire, payload);
    }

    #[test]
    fn mask_is_involution(data in prop::collection::vec(any::<u8>(), 0..=4096), mask in any::<[u8; 4]>()) {
        let mut buf = data.clone();
        apply_mask(&mut buf, mask);
        apply_mask(&mut buf, mask);
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn mask_matches_byte_loop(
        data in prop::collection::vec(any::<u8>(), 0..=300),
        mask in any::<[u8; 4]>(),
    ) {
        let mut fast = data.clone();
        apply_mask(&mut fast, mask);

        let slow: Vec<u8> = data
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4])
            .collect();
        prop_assert_eq!(fast, slow);
    }

    #[test]
    fn truncated_frames_never_decode(
        payload in prop::collection::vec(any::<u8>(), 0..=300),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, OpCode::Text, &payload, Some([1, 2, 3, 4]));

        // Keep at least one byte so the stream is not a clean EOF
        let keep = 1 + cut.index(wire.len() - 1);
        let err = decode(&wire[..keep]).unwrap_err();
        prop_assert!(matches!(err, Error::FrameRead(_)), "unexpected error: {err}");
    }

    #[test]
    fn buffered_decoder_agrees_with_stream_decoder(
        payloads in prop::collection::vec(arb_payload(), 1..4),
        split in any::<prop::sample::Index>(),
    ) {
        let mut wire = BytesMut::new();
        for payload in &payloads {
            encode_frame(&mut wire, OpCode::Binary, payload, Some([5, 6, 7, 8]));
        }

        // Feed the wire in two arbitrary pieces
        let at = split.index(wire.len() + 1);
        let mut buf = BytesMut::from(&wire[..at]);
        let mut decoded = Vec::new();
        while let Some(frame) = decode_frame(&mut buf, MAX).unwrap() {
            decoded.push(frame);
        }
        buf.extend_from_slice(&wire[at..]);
        while let Some(frame) = decode_frame(&mut buf, MAX).unwrap() {
            decoded.push(frame);
        }
        prop_assert!(buf.is_empty());

        let mut reader = &wire[..];
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        for frame in decoded {
            let streamed = rt.block_on(read_frame(&mut reader, MAX)).unwrap();
            prop_assert_eq!(frame, streamed);
        }
        prop_assert!(reader.is_empty());
    }
}
