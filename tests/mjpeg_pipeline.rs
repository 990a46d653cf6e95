//! Motion JPEG 解码端到端测试

mod stream_builder;

use stream_builder::JpegImageBuilder;
use swdec::codec::decoders::mjpeg::{ColorSpace, MjpegDecoder};
use swdec::codec::{
    CodecId, Decoder, DecoderParams, JpegScale, MediaData, PictureType, VideoFrame,
};
use swdec::core::{PixelFormat, SwdecError};

fn open(configure: impl FnOnce(&mut DecoderParams)) -> Box<dyn Decoder> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut params = DecoderParams::new(CodecId::Mjpeg);
    configure(&mut params);
    let registry = swdec::default_codec_registry();
    let mut decoder = registry.create_decoder(CodecId::Mjpeg).unwrap();
    decoder.open(&params).unwrap();
    decoder
}

fn decode_single(decoder: &mut dyn Decoder, data: &[u8]) -> VideoFrame {
    decoder
        .send_data(&MediaData::from_data(data.to_vec()))
        .unwrap();
    decoder.receive_frame().unwrap()
}

fn drain(decoder: &mut dyn Decoder) -> Vec<VideoFrame> {
    let mut frames = Vec::new();
    loop {
        match decoder.receive_frame() {
            Ok(frame) => frames.push(frame),
            Err(SwdecError::NeedMoreData) | Err(SwdecError::Eof) => return frames,
            Err(err) => panic!("意外错误: {err}"),
        }
    }
}

#[test]
fn test_custom_huffman_tables_gray_blocks() {
    let data = JpegImageBuilder::gray(16, 16, vec![10, -20, 30, -40]).encode();
    let mut decoder = open(|_| {});
    let frame = decode_single(decoder.as_mut(), &data);

    assert_eq!(frame.pixel_format, PixelFormat::Gray8);
    assert_eq!((frame.width, frame.height), (16, 16));
    assert_eq!(frame.picture_type, PictureType::I);
    assert_eq!(frame.sample(0, 2, 2), 138);
    assert_eq!(frame.sample(0, 13, 2), 108);
    assert_eq!(frame.sample(0, 2, 13), 158);
    assert_eq!(frame.sample(0, 13, 13), 88);
    assert!(!frame.corrupted);
}

#[test]
fn test_restart_intervals_do_not_change_pixels() {
    let dc: Vec<i32> = (0..12).map(|k| k * 5 - 30).collect();
    let plain = JpegImageBuilder::gray(32, 24, dc.clone()).encode();
    let expected = decode_single(open(|_| {}).as_mut(), &plain);

    for interval in [1, 2, 5] {
        let data = JpegImageBuilder::gray(32, 24, dc.clone())
            .restart_interval(interval)
            .encode();
        let frame = decode_single(open(|_| {}).as_mut(), &data);
        assert_eq!(frame.data, expected.data, "重启间隔 {interval}");
        assert!(!frame.corrupted);
    }
}

#[test]
fn test_interleaved_yuv420_formats() {
    let data = JpegImageBuilder::yuv420([10, 20, 30, 40])
        .restart_interval(1)
        .encode();

    let frame = decode_single(open(|_| {}).as_mut(), &data);
    assert_eq!(frame.pixel_format, PixelFormat::Yuv420p);
    assert_eq!(frame.sample(0, 0, 0), 138);
    assert_eq!(frame.sample(0, 15, 15), 168);
    assert_eq!(frame.sample(1, 4, 4), 128);

    let frame = decode_single(
        open(|p| p.output_format = Some(PixelFormat::Nv12)).as_mut(),
        &data,
    );
    assert_eq!(frame.pixel_format, PixelFormat::Nv12);
    assert_eq!(frame.data.len(), 2);

    let frame = decode_single(
        open(|p| p.output_format = Some(PixelFormat::Rgb24)).as_mut(),
        &data,
    );
    assert_eq!(frame.pixel_format, PixelFormat::Rgb24);
    for k in 0..3 {
        assert_eq!(frame.sample(0, k, 0), 138);
    }
}

#[test]
fn test_scaled_output() {
    let data = JpegImageBuilder::gray(16, 16, vec![10, -20, 30, -40]).encode();
    for (scale, size) in [
        (JpegScale::Half, 8),
        (JpegScale::Quarter, 4),
        (JpegScale::Eighth, 2),
    ] {
        let frame = decode_single(open(|p| p.jpeg_scale = scale).as_mut(), &data);
        assert_eq!((frame.width, frame.height), (size, size), "{scale:?}");
        let last = size as usize - 1;
        assert_eq!(frame.sample(0, 0, 0), 138, "{scale:?}");
        assert_eq!(frame.sample(0, last, last), 88, "{scale:?}");
    }
}

#[test]
fn test_parallel_matches_serial() {
    let dc: Vec<i32> = (0..64).map(|k| (k * 7) % 90 - 45).collect();
    let data = JpegImageBuilder::gray(64, 64, dc).encode();
    let serial = decode_single(open(|_| {}).as_mut(), &data);
    let parallel = decode_single(open(|p| p.max_threads = 8).as_mut(), &data);
    assert_eq!(serial.data, parallel.data);
}

#[test]
fn test_motion_jpeg_stream_in_small_chunks() {
    let mut stream = Vec::new();
    for dc in [4, 8, 12, 16] {
        stream.extend_from_slice(&JpegImageBuilder::gray(8, 8, vec![dc]).encode());
    }
    let mut decoder = MjpegDecoder::new();
    decoder.open(&DecoderParams::new(CodecId::Mjpeg)).unwrap();

    let mut frames = Vec::new();
    for chunk in stream.chunks(5) {
        decoder
            .send_data(&MediaData::from_data(chunk.to_vec()))
            .unwrap();
        frames.extend(drain(&mut decoder));
    }
    decoder.send_data(&MediaData::end_of_stream()).unwrap();
    frames.extend(drain(&mut decoder));

    let values: Vec<u16> = frames.iter().map(|f| f.sample(0, 0, 0)).collect();
    assert_eq!(values, vec![132, 136, 140, 144]);
    for (k, frame) in frames.iter().enumerate() {
        assert!((frame.time - k as f64 / 30.0).abs() < 1e-9);
        assert!(!frame.is_original_time);
    }
    assert_eq!(decoder.decoded_images(), 4);

    let info = decoder.image_info().unwrap();
    assert_eq!(info.color_space, ColorSpace::Gray);
    assert_eq!((info.width, info.height), (8, 8));
    assert!(matches!(decoder.receive_frame(), Err(SwdecError::Eof)));
}

#[test]
fn test_truncated_image_is_flagged_corrupted() {
    let mut data = JpegImageBuilder::gray(16, 8, vec![10, 20]).encode();
    data.truncate(data.len() - 2);
    let mut decoder = open(|_| {});
    decoder.send_data(&MediaData::from_data(data)).unwrap();
    assert!(matches!(
        decoder.receive_frame(),
        Err(SwdecError::NeedMoreData)
    ));
    decoder.send_data(&MediaData::end_of_stream()).unwrap();
    let frames = drain(decoder.as_mut());
    assert_eq!(frames.len(), 1);
    assert!(frames[0].corrupted);
    assert_eq!(frames[0].sample(0, 12, 0), 148);
}
