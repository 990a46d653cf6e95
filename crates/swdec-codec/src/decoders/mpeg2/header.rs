//! MPEG-2 头部解析
//!
//! 所有函数都假定读取器已越过 4 字节起始码.

use log::{debug, trace, warn};
use swdec_core::bitreader::BitReader;
use swdec_core::{Rational, SwdecError, SwdecResult};

use super::tables::ZIGZAG_SCAN;
use super::types::*;

/// 序列头解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeaderStatus {
    /// 参数未变化
    Unchanged,
    /// 首个序列头
    Initial,
    /// 尺寸或色度格式变化, 需要在继续解码前重新分配帧缓冲
    ResolutionChanged,
}

/// 读取一个 zig-zag 顺序传输的 64 项矩阵, 返回自然顺序
fn read_matrix(br: &mut BitReader<'_>) -> SwdecResult<[u8; 64]> {
    let mut m = [0u8; 64];
    for &pos in &ZIGZAG_SCAN {
        m[pos] = br.read_bits(8)? as u8;
    }
    if m[0] == 0 {
        return Err(SwdecError::InvalidData("量化矩阵含零项".into()));
    }
    Ok(m)
}

fn marker_bit(br: &mut BitReader<'_>, what: &str) -> SwdecResult<()> {
    if br.read_bit()? != 1 {
        warn!("MPEG-2: {what} 缺少 marker_bit");
    }
    Ok(())
}

/// 解析 sequence_header (不含扩展)
///
/// 矩阵只在序列头中重置; 尺寸变化通过返回值报告.
pub(super) fn parse_sequence_header(
    br: &mut BitReader<'_>,
    seq: &mut SequenceHeader,
    quant: &mut QuantMatrices,
) -> SwdecResult<HeaderStatus> {
    let width = br.read_bits(12)?;
    let height = br.read_bits(12)?;
    if width == 0 || height == 0 {
        return Err(SwdecError::InvalidData(format!(
            "序列头尺寸无效: {width}x{height}"
        )));
    }
    let aspect_ratio_code = br.read_bits(4)? as u8;
    let frame_rate_code = br.read_bits(4)? as u8;
    let bit_rate = br.read_bits(18)?;
    marker_bit(br, "sequence_header")?;
    let vbv_buffer_size = br.read_bits(10)?;
    let _constrained = br.read_flag()?;

    let intra = if br.read_flag()? {
        read_matrix(br)?
    } else {
        super::tables::DEFAULT_INTRA_MATRIX
    };
    let non_intra = if br.read_flag()? {
        read_matrix(br)?
    } else {
        super::tables::DEFAULT_NON_INTRA_MATRIX
    };
    *quant = QuantMatrices {
        intra,
        non_intra,
        chroma_intra: intra,
        chroma_non_intra: non_intra,
    };

    let status = if seq.width == 0 {
        HeaderStatus::Initial
    } else if (seq.width & 0xFFF) != width || (seq.height & 0xFFF) != height {
        HeaderStatus::ResolutionChanged
    } else {
        HeaderStatus::Unchanged
    };

    // 高位由序列扩展补齐
    seq.width = width;
    seq.height = height;
    seq.aspect_ratio_code = aspect_ratio_code;
    seq.frame_rate_code = frame_rate_code;
    seq.bit_rate = bit_rate.saturating_mul(400);
    seq.vbv_buffer_size = vbv_buffer_size;
    seq.has_extension = false;
    seq.signal = SignalInfo {
        video_format: 5,
        colour_primaries: 1,
        transfer_characteristics: 1,
        matrix_coefficients: 1,
        display_width: width,
        display_height: height,
    };

    debug!(
        "MPEG-2: 序列头 {width}x{height}, aspect={aspect_ratio_code}, frame_rate_code={frame_rate_code}, bit_rate={}",
        seq.bit_rate
    );
    Ok(status)
}

/// 解析 sequence_extension, 读取器位于扩展标识之后
///
/// 返回色度格式或尺寸高位是否改变.
pub(super) fn parse_sequence_extension(
    br: &mut BitReader<'_>,
    seq: &mut SequenceHeader,
) -> SwdecResult<bool> {
    let profile_and_level = br.read_bits(8)?;
    let progressive_sequence = br.read_flag()?;
    let chroma_code = br.read_bits(2)?;
    let width_ext = br.read_bits(2)?;
    let height_ext = br.read_bits(2)?;
    let bit_rate_ext = br.read_bits(12)?;
    marker_bit(br, "sequence_extension")?;
    let vbv_ext = br.read_bits(8)?;
    let low_delay = br.read_flag()?;
    let frame_rate_ext_n = br.read_bits(2)? as u8;
    let frame_rate_ext_d = br.read_bits(5)? as u8;

    // 忽略 escape 位
    let profile = ((profile_and_level >> 4) & 0x7) as u8;
    let level = (profile_and_level & 0xF) as u8;
    if !matches!(level, 4 | 6 | 8 | 10) {
        return Err(SwdecError::Unsupported(format!(
            "MPEG-2 level {level} (profile_and_level=0x{profile_and_level:02X})"
        )));
    }
    let chroma_format = ChromaFormat::from_code(chroma_code)
        .ok_or_else(|| SwdecError::InvalidData("chroma_format 为保留值 0".into()))?;

    let width = (seq.width & 0xFFF) | (width_ext << 12);
    let height = (seq.height & 0xFFF) | (height_ext << 12);
    let changed = seq.has_extension
        && (chroma_format != seq.chroma_format || width != seq.width || height != seq.height);

    seq.profile = profile;
    seq.level = level;
    seq.progressive_sequence = progressive_sequence;
    seq.chroma_format = chroma_format;
    seq.width = width;
    seq.height = height;
    if bit_rate_ext != 0 {
        let raw = (seq.bit_rate / 400) | (bit_rate_ext << 18);
        seq.bit_rate = raw.saturating_mul(400);
    }
    seq.vbv_buffer_size |= vbv_ext << 10;
    seq.low_delay = low_delay;
    seq.frame_rate_ext_n = frame_rate_ext_n;
    seq.frame_rate_ext_d = frame_rate_ext_d;
    seq.has_extension = true;

    debug!(
        "MPEG-2: 序列扩展 profile={profile} level={level} progressive={progressive_sequence} chroma={chroma_format:?} {width}x{height}"
    );
    Ok(changed)
}

/// 解析 sequence_display_extension
pub(super) fn parse_sequence_display_extension(
    br: &mut BitReader<'_>,
    seq: &mut SequenceHeader,
) -> SwdecResult<()> {
    let video_format = br.read_bits(3)? as u8;
    let mut signal = SignalInfo {
        video_format,
        colour_primaries: 1,
        transfer_characteristics: 1,
        matrix_coefficients: 1,
        ..SignalInfo::default()
    };
    if br.read_flag()? {
        signal.colour_primaries = br.read_bits(8)? as u8;
        signal.transfer_characteristics = br.read_bits(8)? as u8;
        signal.matrix_coefficients = br.read_bits(8)? as u8;
    }
    signal.display_width = br.read_bits(14)?;
    marker_bit(br, "sequence_display_extension")?;
    signal.display_height = br.read_bits(14)?;
    trace!("MPEG-2: 序列显示扩展 {signal:?}");
    seq.signal = signal;
    Ok(())
}

/// 解析 quant_matrix_extension
pub(super) fn parse_quant_matrix_extension(
    br: &mut BitReader<'_>,
    quant: &mut QuantMatrices,
) -> SwdecResult<()> {
    if br.read_flag()? {
        quant.intra = read_matrix(br)?;
        quant.chroma_intra = quant.intra;
    }
    if br.read_flag()? {
        quant.non_intra = read_matrix(br)?;
        quant.chroma_non_intra = quant.non_intra;
    }
    if br.read_flag()? {
        quant.chroma_intra = read_matrix(br)?;
    }
    if br.read_flag()? {
        quant.chroma_non_intra = read_matrix(br)?;
    }
    trace!("MPEG-2: 量化矩阵扩展已加载");
    Ok(())
}

/// 解析 group_of_pictures_header
pub(super) fn parse_gop_header(br: &mut BitReader<'_>) -> SwdecResult<GopTimeCode> {
    let drop_frame = br.read_flag()?;
    let hours = br.read_bits(5)? as u8;
    let minutes = br.read_bits(6)? as u8;
    marker_bit(br, "group_of_pictures_header")?;
    let seconds = br.read_bits(6)? as u8;
    let pictures = br.read_bits(6)? as u8;
    let closed_gop = br.read_flag()?;
    let broken_link = br.read_flag()?;
    let gop = GopTimeCode {
        drop_frame,
        hours,
        minutes,
        seconds,
        pictures,
        closed_gop,
        broken_link,
    };
    debug!(
        "MPEG-2: GOP {hours:02}:{minutes:02}:{seconds:02}.{pictures:02} closed={closed_gop} broken={broken_link}"
    );
    Ok(gop)
}

/// 解析 picture_header
pub(super) fn parse_picture_header(br: &mut BitReader<'_>) -> SwdecResult<PictureHeader> {
    let temporal_reference = br.read_bits(10)? as u16;
    let type_code = br.read_bits(3)?;
    // D 图片按 I 处理
    let coding_type = match type_code {
        4 => PictureCodingType::I,
        code => PictureCodingType::from_code(code).ok_or_else(|| {
            SwdecError::InvalidData(format!("无效的 picture_coding_type {code}"))
        })?,
    };
    let vbv_delay = br.read_bits(16)? as u16;

    let header = PictureHeader {
        temporal_reference,
        coding_type,
        vbv_delay,
        f_code: [[15; 2]; 2],
        ..PictureHeader::default()
    };

    // MPEG-1 遗留字段, 在 MPEG-2 中必须为 full_pel=0, f_code=7
    if matches!(coding_type, PictureCodingType::P | PictureCodingType::B) {
        let _full_pel_forward = br.read_flag()?;
        let forward_f_code = br.read_bits(3)?;
        if forward_f_code == 0 {
            return Err(SwdecError::InvalidData("forward_f_code 为 0".into()));
        }
    }
    if coding_type == PictureCodingType::B {
        let _full_pel_backward = br.read_flag()?;
        let backward_f_code = br.read_bits(3)?;
        if backward_f_code == 0 {
            return Err(SwdecError::InvalidData("backward_f_code 为 0".into()));
        }
    }
    while br.bits_left() >= 9 && br.read_flag()? {
        br.skip_bits(8)?;
    }

    trace!("MPEG-2: 图片头 type={coding_type:?} temporal_reference={temporal_reference}");
    Ok(header)
}

/// 解析 picture_coding_extension
pub(super) fn parse_picture_coding_extension(
    br: &mut BitReader<'_>,
    header: &mut PictureHeader,
) -> SwdecResult<()> {
    for s in 0..2 {
        for t in 0..2 {
            header.f_code[s][t] = br.read_bits(4)? as u8;
        }
    }
    header.intra_dc_precision = br.read_bits(2)? as u8;
    let structure = br.read_bits(2)?;
    header.top_field_first = br.read_flag()?;
    header.frame_pred_frame_dct = br.read_flag()?;
    header.concealment_motion_vectors = br.read_flag()?;
    header.q_scale_type = br.read_flag()?;
    header.intra_vlc_format = br.read_flag()?;
    header.alternate_scan = br.read_flag()?;
    header.repeat_first_field = br.read_flag()?;
    header.chroma_420_type = br.read_flag()?;
    header.progressive_frame = br.read_flag()?;
    if br.read_flag()? {
        // composite_display: v_axis, field_sequence, sub_carrier, burst_amplitude, sub_carrier_phase
        br.skip_bits(20)?;
    }
    header.picture_structure = PictureStructure::from_code(structure)
        .ok_or_else(|| SwdecError::InvalidData("picture_structure 为保留值 0".into()))?;
    header.has_coding_extension = true;

    let coding_type = header.coding_type;
    let f_code_used = |s: usize| match coding_type {
        PictureCodingType::I => false,
        PictureCodingType::P => s == 0,
        PictureCodingType::B => true,
    };
    for s in 0..2 {
        if f_code_used(s) && header.f_code[s].iter().any(|&f| f == 0 || (10..15).contains(&f)) {
            return Err(SwdecError::InvalidData(format!(
                "f_code 越界: {:?}",
                header.f_code[s]
            )));
        }
    }

    trace!(
        "MPEG-2: 图片编码扩展 structure={:?} f_code={:?} dc_precision={} tff={} rff={} progressive={}",
        header.picture_structure,
        header.f_code,
        header.intra_dc_precision,
        header.top_field_first,
        header.repeat_first_field,
        header.progressive_frame
    );
    Ok(())
}

/// 解析 picture_display_extension
///
/// 偏移个数由序列与图片结构决定.
pub(super) fn parse_picture_display_extension(
    br: &mut BitReader<'_>,
    seq: &SequenceHeader,
    header: &mut PictureHeader,
) -> SwdecResult<()> {
    let count = if seq.progressive_sequence {
        if header.repeat_first_field {
            if header.top_field_first { 3 } else { 2 }
        } else {
            1
        }
    } else if header.picture_structure.is_field() {
        1
    } else if header.repeat_first_field {
        3
    } else {
        2
    };
    header.frame_centre_offsets.clear();
    for _ in 0..count {
        if br.bits_left() < 34 {
            break;
        }
        let h = br.read_bits_signed(16)? as i16;
        marker_bit(br, "picture_display_extension")?;
        let v = br.read_bits_signed(16)? as i16;
        marker_bit(br, "picture_display_extension")?;
        header.frame_centre_offsets.push((h, v));
    }
    Ok(())
}

/// 由显示宽高比码计算像素宽高比
///
/// 1 表示方形像素, 2/3/4 为显示宽高比 4:3, 16:9, 2.21:1.
pub(super) fn sample_aspect_ratio(code: u8, width: u32, height: u32) -> Rational {
    let (dw, dh) = match code {
        1 => return Rational::new(1, 1),
        2 => (4i64, 3i64),
        3 => (16, 9),
        4 => (221, 100),
        _ => return Rational::UNDEFINED,
    };
    if width == 0 || height == 0 {
        return Rational::UNDEFINED;
    }
    let num = dw * i64::from(height);
    let den = dh * i64::from(width);
    let g = gcd(num, den).max(1);
    Rational::new((num / g) as i32, (den / g) as i32)
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.abs()
}
