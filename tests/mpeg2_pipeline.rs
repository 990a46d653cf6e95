//! MPEG-2 解码端到端测试: 经注册表创建解码器, 按块送入合成码流.

mod stream_builder;

use stream_builder::Mpeg2StreamBuilder;
use swdec::codec::decoders::mpeg2::Mpeg2Decoder;
use swdec::codec::{
    CodecId, DecodeFlags, Decoder, DecoderParams, MediaData, PictureType, SkipLevel, VideoFrame,
};
use swdec::core::{ErrorKind, PixelFormat, SwdecError};

const WIDTH: u32 = 48;
const HEIGHT: u32 = 32;

fn gop_stream(pattern: &str) -> Vec<u8> {
    Mpeg2StreamBuilder::new(WIDTH, HEIGHT)
        .sequence()
        .gop()
        .frames(pattern, 7)
        .sequence_end()
        .bytes()
}

fn open(params: DecoderParams) -> Box<dyn Decoder> {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = swdec::default_codec_registry();
    let mut decoder = registry.create_decoder(params.codec_id).unwrap();
    decoder.open(&params).unwrap();
    decoder
}

/// 取出当前可用的所有帧, 流已结束时返回 true
fn drain(decoder: &mut dyn Decoder, frames: &mut Vec<VideoFrame>) -> bool {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => frames.push(frame),
            Err(SwdecError::NeedMoreData) => return false,
            Err(SwdecError::Eof) => return true,
            Err(err) => panic!("意外错误: {err}"),
        }
    }
}

/// 按 `chunk` 字节分块送入, 每块之后取出所有可用帧
fn decode_chunked(decoder: &mut dyn Decoder, stream: &[u8], chunk: usize) -> Vec<VideoFrame> {
    let mut frames = Vec::new();
    for part in stream.chunks(chunk) {
        decoder
            .send_data(&MediaData::from_data(part.to_vec()))
            .unwrap();
        assert!(!drain(decoder, &mut frames));
    }
    decoder.send_data(&MediaData::end_of_stream()).unwrap();
    assert!(drain(decoder, &mut frames));
    frames
}

fn types(frames: &[VideoFrame]) -> Vec<PictureType> {
    frames.iter().map(|f| f.picture_type).collect()
}

#[test]
fn test_registry_decoder_outputs_display_order() {
    let mut decoder = open(DecoderParams::new(CodecId::Mpeg2Video));
    assert_eq!(decoder.name(), "mpeg2video");
    let frames = decode_chunked(decoder.as_mut(), &gop_stream("IPBBPBB"), 13);

    use PictureType::{B, I, P};
    assert_eq!(types(&frames), vec![I, B, B, P, B, B, P]);
    for (k, frame) in frames.iter().enumerate() {
        assert!((frame.time - 0.04 * k as f64).abs() < 1e-6);
        assert_eq!((frame.width, frame.height), (WIDTH, HEIGHT));
        assert_eq!(frame.pixel_format, PixelFormat::Yuv420p);
        assert!(!frame.corrupted);
        assert!((frame.plane_average(0) - 135.0).abs() <= 1.0);
    }
}

#[test]
fn test_worker_threads_match_single_thread() {
    let stream = gop_stream("IPBBPBBPBB");
    let mut single = open(DecoderParams::new(CodecId::Mpeg2Video));
    let expected = decode_chunked(single.as_mut(), &stream, 4096);

    let mut params = DecoderParams::new(CodecId::Mpeg2Video);
    params.max_threads = 4;
    let mut parallel = open(params);
    let frames = decode_chunked(parallel.as_mut(), &stream, 4096);

    assert_eq!(types(&frames), types(&expected));
    for (a, b) in frames.iter().zip(&expected) {
        assert_eq!(a.data, b.data);
        assert_eq!(a.time, b.time);
    }
}

#[test]
fn test_decode_order_when_reorder_disabled() {
    let mut params = DecoderParams::new(CodecId::Mpeg2Video);
    params.flags = DecodeFlags::empty();
    let mut decoder = open(params);
    let frames = decode_chunked(decoder.as_mut(), &gop_stream("IPBB"), 64);

    use PictureType::{B, I, P};
    assert_eq!(types(&frames), vec![I, P, B, B]);
}

#[test]
fn test_skip_policy_through_concrete_decoder() {
    let mut decoder = Mpeg2Decoder::new().unwrap();
    let mut params = DecoderParams::new(CodecId::Mpeg2Video);
    params.skip_level = SkipLevel::B;
    decoder.open(&params).unwrap();
    let frames = decode_chunked(&mut decoder, &gop_stream("IPBBPBB"), 1024);

    use PictureType::{I, P};
    assert_eq!(types(&frames), vec![I, P, P]);
    assert_eq!(decoder.skipped_frames(), 4);
    assert_eq!(decoder.change_decoding_speed(-5), SkipLevel::None);
}

#[test]
fn test_display_api_and_user_data() {
    let stream = Mpeg2StreamBuilder::new(WIDTH, HEIGHT)
        .sequence()
        .gop()
        .user_data(b"caption")
        .frames("IP", 15)
        .sequence_end()
        .bytes();
    let mut decoder = Mpeg2Decoder::new().unwrap();
    decoder
        .open(&DecoderParams::new(CodecId::Mpeg2Video))
        .unwrap();
    decoder.send_data(&MediaData::from_data(stream)).unwrap();
    decoder.send_data(&MediaData::end_of_stream()).unwrap();

    let info = decoder.stream_info().unwrap();
    assert_eq!((info.width, info.height), (WIDTH, HEIGHT));
    assert_eq!(info.frame_rate, 25.0);
    assert!(info.time_code.closed_gop);
    assert_eq!(decoder.pop_user_data().unwrap().data, b"caption");

    let index = decoder.display_index().unwrap();
    assert_eq!(decoder.frame_type(index), Some(PictureType::I));
    assert_eq!(decoder.corruption_flag(index), Some(false));
    let frame = decoder.frame(index).unwrap();
    assert!((frame.plane_average(0) - 143.0).abs() <= 1.0);
    decoder.release_displayed(index);

    let index = decoder.display_index().unwrap();
    assert_eq!(decoder.frame_type(index), Some(PictureType::P));
    assert!((decoder.decoded_time(index).unwrap() - 0.04).abs() < 1e-6);
    decoder.release_displayed(index);
    assert!(decoder.display_index().is_none());
    assert!(decoder.is_consistent());
}

#[test]
fn test_nv12_output_and_time_override() {
    let mut params = DecoderParams::new(CodecId::Mpeg2Video);
    params.output_format = Some(PixelFormat::Nv12);
    let mut decoder = open(params);
    decoder
        .send_data(&MediaData::from_data(gop_stream("IP")).with_time(10.0))
        .unwrap();
    decoder.send_data(&MediaData::end_of_stream()).unwrap();

    let first = decoder.receive_frame().unwrap();
    assert_eq!(first.pixel_format, PixelFormat::Nv12);
    assert_eq!(first.data.len(), 2);
    assert!((first.time - 10.0).abs() < 1e-9);
    assert!(first.is_original_time);
    let second = decoder.receive_frame().unwrap();
    assert!((second.time - 10.04).abs() < 1e-6);
    assert!(!second.is_original_time);
    assert!(matches!(decoder.receive_frame(), Err(SwdecError::Eof)));
}

#[test]
fn test_wrong_codec_is_fatal_configuration() {
    let registry = swdec::default_codec_registry();
    let mut decoder = registry.create_decoder(CodecId::Mpeg2Video).unwrap();
    let err = decoder
        .open(&DecoderParams::new(CodecId::Mjpeg))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FatalConfiguration);
}
