//! 单幅图像的解码流程
//!
//! 标记段按出现顺序处理; 各扫描的系数 (或无损样本) 累积到所有扫描结束,
//! 然后统一重建, 上采样并转换为输出格式.

use log::{debug, trace, warn};
use rayon::ThreadPool;
use swdec_core::{PixelFormat, Rational, SwdecError, SwdecResult};

use super::color;
use super::header::{self, TableSet};
use super::huffman::HuffmanTable;
use super::lossless;
use super::markers::{
    APP0, APP14, COM, DHT, DNL, DQT, DRI, EOI, MarkerReader, SOI, SOS, is_rst, is_sof,
};
use super::reconstruct::{SamplePlane, reconstruct_component};
use super::scan::{BlockMode, CoefPlane, decode_dct_scan};
use super::tables::default_spec;
use super::types::{FrameHeader, ImageInfo, JfifInfo, ScanHeader};
use crate::codec_parameters::JpegScale;
use crate::frame::{PictureType, VideoFrame};

/// 输出相关的参数
pub(super) struct OutputParams<'a> {
    pub scale: JpegScale,
    pub format: Option<PixelFormat>,
    pub bit_depth: u8,
    pub pool: Option<&'a ThreadPool>,
}

/// 解码结果
pub(super) struct DecodedImage {
    pub frame: VideoFrame,
    pub info: ImageInfo,
}

/// 扫描数据的累积形式
enum Samples {
    Dct(Vec<CoefPlane>),
    Lossless(Vec<SamplePlane>),
}

pub(super) struct ImageDecoder<'t> {
    tables: &'t mut TableSet,
    frame: Option<FrameHeader>,
    samples: Option<Samples>,
    restart_interval: u16,
    jfif: Option<JfifInfo>,
    adobe_transform: Option<u8>,
    comment: Option<Vec<u8>>,
    /// 无损扫描的点变换
    point_transform: u8,
    scans: usize,
    corrupted: bool,
}

impl<'t> ImageDecoder<'t> {
    pub fn new(tables: &'t mut TableSet) -> Self {
        Self {
            tables,
            frame: None,
            samples: None,
            restart_interval: 0,
            jfif: None,
            adobe_transform: None,
            comment: None,
            point_transform: 0,
            scans: 0,
            corrupted: false,
        }
    }

    /// 解码 `data` 中的一幅图像 (应以 SOI 开头, 缺少 EOI 时按损坏处理)
    pub fn decode(mut self, data: &[u8], out: &OutputParams<'_>) -> SwdecResult<DecodedImage> {
        let mut reader = MarkerReader::new(data, true);
        let mut complete = false;
        while let Some(seg) = reader.next_segment()? {
            match seg.marker {
                SOI => {}
                EOI => {
                    complete = true;
                    break;
                }
                DHT => header::parse_dht(seg.payload, self.tables)?,
                DQT => header::parse_dqt(seg.payload, self.tables)?,
                DRI => {
                    self.restart_interval = header::parse_dri(seg.payload)?;
                    trace!("JPEG: 重启间隔 {}", self.restart_interval);
                }
                SOS => self.on_scan(seg.payload, seg.entropy)?,
                APP0 => {
                    if let Some(info) = header::parse_app0(seg.payload) {
                        self.jfif = Some(info);
                    }
                }
                APP14 => {
                    if let Some(transform) = header::parse_app14(seg.payload) {
                        self.adobe_transform = Some(transform);
                    }
                }
                COM => self.comment = Some(seg.payload.to_vec()),
                DNL => warn!("JPEG: 忽略 DNL 段"),
                m if is_sof(m) => self.on_frame(m, seg.payload)?,
                m if is_rst(m) => trace!("JPEG: 扫描之外的 RST{}", m & 7),
                m => trace!("JPEG: 跳过标记 0x{m:02X} ({} 字节)", seg.payload.len()),
            }
        }
        if !complete {
            warn!("JPEG: 图像缺少 EOI, 按损坏输出");
            self.corrupted = true;
        }
        self.finish(out)
    }

    fn on_frame(&mut self, marker: u8, payload: &[u8]) -> SwdecResult<()> {
        if self.frame.is_some() {
            return Err(SwdecError::InvalidData("JPEG: 一幅图像中出现多个 SOF".into()));
        }
        let frame = header::parse_sof(marker, payload)?;
        self.samples = Some(if frame.process.is_dct() {
            Samples::Dct(CoefPlane::allocate(&frame)?)
        } else {
            Samples::Lossless(lossless::allocate(&frame)?)
        });
        self.frame = Some(frame);
        Ok(())
    }

    fn on_scan(&mut self, payload: &[u8], entropy: &[u8]) -> SwdecResult<()> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| SwdecError::InvalidData("JPEG: SOS 出现在 SOF 之前".into()))?;
        let scan = header::parse_sos(payload, frame)?;
        let corrupted = match self.samples.as_mut() {
            Some(Samples::Dct(planes)) => {
                install_default_tables(self.tables, &scan, BlockMode::of(frame.process, &scan))?;
                decode_dct_scan(
                    frame,
                    &scan,
                    self.tables,
                    self.restart_interval,
                    entropy,
                    planes,
                )?
            }
            Some(Samples::Lossless(planes)) => {
                self.point_transform = scan.al;
                lossless::decode_lossless_scan(
                    frame,
                    &scan,
                    self.tables,
                    self.restart_interval,
                    entropy,
                    planes,
                )?
            }
            None => return Err(SwdecError::Internal("JPEG: 样本缓冲未分配".into())),
        };
        self.scans += 1;
        if corrupted {
            self.corrupted = true;
        }
        trace!(
            "JPEG: 扫描 {} 完成, 分量 {}, Ss={} Se={} Ah={} Al={}, {} 字节",
            self.scans,
            scan.components.len(),
            scan.ss,
            scan.se,
            scan.ah,
            scan.al,
            entropy.len()
        );
        Ok(())
    }

    fn finish(self, out: &OutputParams<'_>) -> SwdecResult<DecodedImage> {
        let frame = self
            .frame
            .ok_or_else(|| SwdecError::InvalidData("JPEG: 图像没有帧头".into()))?;
        if self.scans == 0 {
            return Err(SwdecError::InvalidData("JPEG: 图像没有扫描数据".into()));
        }
        let color_space = header::color_space(&frame, self.adobe_transform)?;
        if !frame.process.is_dct() && out.scale != JpegScale::Full {
            return Err(SwdecError::NotImplemented(
                "JPEG: 无损图像不支持缩放输出".into(),
            ));
        }
        let format = color::resolve_format(color_space, &frame, out.format, out.bit_depth)?;

        let planes = match self.samples {
            Some(Samples::Dct(coefs)) => {
                let mut planes = Vec::with_capacity(coefs.len());
                for (plane, comp) in coefs.iter().zip(&frame.components) {
                    let quant = self.tables.quant[usize::from(comp.quant_table)]
                        .as_ref()
                        .ok_or_else(|| {
                            SwdecError::InvalidData(format!(
                                "JPEG: 量化表 {} 未定义",
                                comp.quant_table
                            ))
                        })?;
                    planes.push(reconstruct_component(
                        plane,
                        quant,
                        frame.precision,
                        out.scale,
                        out.pool,
                    )?);
                }
                planes
            }
            Some(Samples::Lossless(mut planes)) => {
                let max = (1u32 << frame.precision) - 1;
                let pt = u32::from(self.point_transform);
                for plane in &mut planes {
                    for v in &mut plane.data {
                        *v = (u32::from(*v) << pt).min(max) as u16;
                    }
                }
                planes
            }
            None => return Err(SwdecError::Internal("JPEG: 样本缓冲未分配".into())),
        };

        let width = out.scale.scaled(frame.width);
        let height = out.scale.scaled(frame.height);
        let channels = color::upsample(&planes, &frame, width as usize, height as usize);
        let mut video = color::convert(
            &channels,
            color_space,
            frame.precision,
            format,
            width,
            height,
        )?;
        video.picture_type = PictureType::I;
        video.progressive = true;
        video.corrupted = self.corrupted;
        if let Some(jfif) = &self.jfif {
            if jfif.x_density > 0 && jfif.y_density > 0 {
                video.sample_aspect_ratio =
                    Rational::new(i32::from(jfif.y_density), i32::from(jfif.x_density)).reduce();
            }
        }
        debug!(
            "JPEG: 解码 {}x{} {} ({:?}, {} 位) -> {width}x{height} {format}, 损坏={}",
            frame.width,
            frame.height,
            color_space,
            frame.process,
            frame.precision,
            self.corrupted
        );

        let info = ImageInfo {
            width: frame.width,
            height: frame.height,
            precision: frame.precision,
            process: frame.process,
            color_space,
            sampling: frame.components.iter().map(|c| (c.h, c.v)).collect(),
            restart_interval: self.restart_interval,
            jfif: self.jfif,
            adobe_transform: self.adobe_transform,
            comment: self.comment,
        };
        Ok(DecodedImage { frame: video, info })
    }
}

/// 扫描引用了未定义的 Huffman 表时装入标准表
fn install_default_tables(
    tables: &mut TableSet,
    scan: &ScanHeader,
    mode: BlockMode,
) -> SwdecResult<()> {
    for sc in &scan.components {
        let (td, ta) = (usize::from(sc.dc_table), usize::from(sc.ac_table));
        if mode.needs_dc_table() && tables.dc[td].is_none() {
            debug!("JPEG: DC 表 {td} 未定义, 使用标准表");
            tables.dc[td] = Some(HuffmanTable::from_spec(&default_spec(false, td))?);
        }
        if mode.needs_ac_table() && tables.ac[ta].is_none() {
            debug!("JPEG: AC 表 {ta} 未定义, 使用标准表");
            tables.ac[ta] = Some(HuffmanTable::from_spec(&default_spec(true, ta))?);
        }
    }
    Ok(())
}
