//! 集成测试用码流合成工具
//!
//! - [`Mpeg2StreamBuilder`]: 逐行 MPEG-2 基本流. I 宏块只含 DC,
//!   P/B 宏块为零向量且无残差, 因此每帧亮度为 `128 + dc`.
//! - [`JpegImageBuilder`]: 基线 JPEG. 每个块只有 DC 系数, 量化表全为 8,
//!   重建样本为 `128 + dc`. 使用自定义 Huffman 表: DC 类别码固定 4 位,
//!   AC 表只有 EOB (码字 `0`).
//!
//! 其他测试文件通过 `mod stream_builder;` 引入.

#![allow(dead_code)]

use swdec_core::bitwriter::BitWriter;

// ============================================================================
// MPEG-2
// ============================================================================

pub struct Mpeg2StreamBuilder {
    width: u32,
    height: u32,
    out: Vec<u8>,
}

impl Mpeg2StreamBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            out: Vec::new(),
        }
    }

    fn push(&mut self, bw: BitWriter) {
        self.out.extend_from_slice(&bw.finish());
    }

    /// 序列头 (25 fps, 正方形像素) 与 Main profile 序列扩展
    pub fn sequence(&mut self) -> &mut Self {
        let mut bw = BitWriter::new();
        bw.write_start_code(0xB3);
        bw.write_bits(self.width, 12);
        bw.write_bits(self.height, 12);
        bw.write_bits(1, 4);
        bw.write_bits(3, 4);
        bw.write_bits(10000, 18);
        bw.write_bit(1);
        bw.write_bits(112, 10);
        bw.write_bit(0);
        bw.write_bit(0);
        bw.write_bit(0);

        bw.write_start_code(0xB5);
        bw.write_bits(1, 4);
        bw.write_bits(0x48, 8);
        bw.write_bit(1); // progressive_sequence
        bw.write_bits(1, 2); // 4:2:0
        bw.write_bits(0, 2);
        bw.write_bits(0, 2);
        bw.write_bits(0, 12);
        bw.write_bit(1);
        bw.write_bits(0, 8);
        bw.write_bit(0);
        bw.write_bits(0, 2);
        bw.write_bits(0, 5);
        self.push(bw);
        self
    }

    /// 闭合 GOP, 时间码 00:00:00:00
    pub fn gop(&mut self) -> &mut Self {
        let mut bw = BitWriter::new();
        bw.write_start_code(0xB8);
        bw.write_bits(0, 12);
        bw.write_bit(1); // marker
        bw.write_bits(0, 12);
        bw.write_bit(1); // closed_gop
        bw.write_bit(0);
        self.push(bw);
        self
    }

    pub fn user_data(&mut self, payload: &[u8]) -> &mut Self {
        let mut bw = BitWriter::new();
        bw.write_start_code(0xB2);
        bw.write_bytes(payload);
        self.push(bw);
        self
    }

    pub fn sequence_end(&mut self) -> &mut Self {
        self.out.extend_from_slice(&[0, 0, 1, 0xB7]);
        self
    }

    /// 按模式串追加帧图片, 如 "IPBB"; `dc` 只能是 0, 7 或 15
    pub fn frames(&mut self, pattern: &str, dc: u32) -> &mut Self {
        for coding in pattern.chars() {
            self.frame(coding, dc);
        }
        self
    }

    pub fn frame(&mut self, coding: char, dc: u32) -> &mut Self {
        let type_code = match coding {
            'I' => 1,
            'P' => 2,
            'B' => 3,
            other => panic!("未知图片类型 {other}"),
        };
        let mut bw = BitWriter::new();
        bw.write_start_code(0x00);
        bw.write_bits(0, 10);
        bw.write_bits(type_code, 3);
        bw.write_bits(0xFFFF, 16);
        if type_code >= 2 {
            bw.write_bit(0);
            bw.write_bits(7, 3);
        }
        if type_code == 3 {
            bw.write_bit(0);
            bw.write_bits(7, 3);
        }
        bw.write_bit(0);

        let forward = if type_code >= 2 { 1 } else { 15 };
        let backward = if type_code == 3 { 1 } else { 15 };
        bw.write_start_code(0xB5);
        bw.write_bits(8, 4);
        for f in [forward, forward, backward, backward] {
            bw.write_bits(f, 4);
        }
        bw.write_bits(0, 2); // intra_dc_precision
        bw.write_bits(3, 2); // 帧图片
        bw.write_bit(0);
        bw.write_bit(1); // frame_pred_frame_dct
        for _ in 0..5 {
            bw.write_bit(0);
        }
        bw.write_bit(1); // chroma_420_type
        bw.write_bit(1); // progressive_frame
        bw.write_bit(0);

        let cols = self.width.div_ceil(16) as usize;
        let rows = self.height.div_ceil(16) as usize;
        for row in 0..rows {
            bw.write_start_code(row as u8 + 1);
            bw.write_bits(8, 5);
            bw.write_bit(0);
            match type_code {
                1 => {
                    for mb in 0..cols {
                        write_increment(&mut bw, 1);
                        write_intra_macroblock(&mut bw, if mb == 0 { dc } else { 0 });
                    }
                }
                2 => {
                    write_increment(&mut bw, 1);
                    bw.write_bits(0b001, 3);
                    bw.write_bits(0b11, 2);
                    if cols > 1 {
                        write_increment(&mut bw, cols - 1);
                        bw.write_bits(0b001, 3);
                        bw.write_bits(0b11, 2);
                    }
                }
                _ => {
                    write_increment(&mut bw, 1);
                    bw.write_bits(0b10, 2);
                    bw.write_bits(0b1111, 4);
                    if cols > 1 {
                        write_increment(&mut bw, cols - 1);
                        bw.write_bits(0b10, 2);
                        bw.write_bits(0b1111, 4);
                    }
                }
            }
        }
        self.push(bw);
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.out.clone()
    }
}

fn write_increment(bw: &mut BitWriter, increment: usize) {
    match increment {
        1 => bw.write_bits(0b1, 1),
        2 => bw.write_bits(0b011, 3),
        3 => bw.write_bits(0b010, 3),
        4 => bw.write_bits(0b0011, 4),
        5 => bw.write_bits(0b0010, 4),
        n => panic!("不支持地址增量 {n}"),
    }
}

fn write_luma_dc(bw: &mut BitWriter, diff: u32) {
    match diff {
        0 => bw.write_bits(0b100, 3),
        7 => {
            bw.write_bits(0b101, 3);
            bw.write_bits(7, 3);
        }
        15 => {
            bw.write_bits(0b110, 3);
            bw.write_bits(15, 4);
        }
        n => panic!("不支持 DC 差值 {n}"),
    }
}

fn write_intra_macroblock(bw: &mut BitWriter, dc: u32) {
    bw.write_bits(1, 1);
    write_luma_dc(bw, dc);
    bw.write_bits(0b10, 2);
    for _ in 0..3 {
        write_luma_dc(bw, 0);
        bw.write_bits(0b10, 2);
    }
    for _ in 0..2 {
        bw.write_bits(0b00, 2);
        bw.write_bits(0b10, 2);
    }
}

// ============================================================================
// JPEG
// ============================================================================

#[derive(Debug, Clone)]
pub struct JpegImageBuilder {
    width: u16,
    height: u16,
    /// (id, H, V)
    components: Vec<(u8, u8, u8)>,
    restart_interval: u16,
    /// 每个分量按块光栅顺序的量化 DC 值
    dc: Vec<Vec<i32>>,
}

impl JpegImageBuilder {
    /// 灰度图, `dc` 按 8x8 块光栅顺序给出
    pub fn gray(width: u16, height: u16, dc: Vec<i32>) -> Self {
        let blocks = usize::from(width).div_ceil(8) * usize::from(height).div_ceil(8);
        assert_eq!(dc.len(), blocks, "DC 数量与块数不符");
        Self {
            width,
            height,
            components: vec![(1, 1, 1)],
            restart_interval: 0,
            dc: vec![dc],
        }
    }

    /// 16x16 4:2:0, 四个亮度块, 色度为中性
    pub fn yuv420(luma: [i32; 4]) -> Self {
        Self {
            width: 16,
            height: 16,
            components: vec![(1, 2, 2), (2, 1, 1), (3, 1, 1)],
            restart_interval: 0,
            dc: vec![luma.to_vec(), vec![0], vec![0]],
        }
    }

    pub fn restart_interval(mut self, interval: u16) -> Self {
        self.restart_interval = interval;
        self
    }

    fn mcu_count(&self) -> (usize, usize) {
        let h = self.components.iter().map(|c| c.1).max().unwrap_or(1);
        let v = self.components.iter().map(|c| c.2).max().unwrap_or(1);
        (
            usize::from(self.width).div_ceil(8 * usize::from(h)),
            usize::from(self.height).div_ceil(8 * usize::from(v)),
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];

        let mut dqt = vec![0u8];
        dqt.extend_from_slice(&[8u8; 64]);
        segment(&mut out, 0xDB, &dqt);

        let mut sof = vec![8];
        sof.extend_from_slice(&self.height.to_be_bytes());
        sof.extend_from_slice(&self.width.to_be_bytes());
        sof.push(self.components.len() as u8);
        for &(id, h, v) in &self.components {
            sof.extend_from_slice(&[id, (h << 4) | v, 0]);
        }
        segment(&mut out, 0xC0, &sof);

        // DC 表 0: 类别 0..=11, 码长全为 4
        let mut dht = vec![0x00];
        let mut bits = [0u8; 16];
        bits[3] = 12;
        dht.extend_from_slice(&bits);
        dht.extend(0u8..12);
        // AC 表 0: 只有 EOB
        dht.push(0x10);
        let mut bits = [0u8; 16];
        bits[0] = 1;
        dht.extend_from_slice(&bits);
        dht.push(0x00);
        segment(&mut out, 0xC4, &dht);

        if self.restart_interval > 0 {
            segment(&mut out, 0xDD, &self.restart_interval.to_be_bytes());
        }

        let mut sos = vec![self.components.len() as u8];
        for &(id, _, _) in &self.components {
            sos.extend_from_slice(&[id, 0x00]);
        }
        sos.extend_from_slice(&[0, 63, 0]);
        segment(&mut out, 0xDA, &sos);

        out.extend_from_slice(&self.entropy_data());
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn entropy_data(&self) -> Vec<u8> {
        let (mcus_x, mcus_y) = self.mcu_count();
        let total = mcus_x * mcus_y;
        let interval = match self.restart_interval {
            0 => total,
            n => usize::from(n),
        };
        let single = self.components.len() == 1;
        let mut bw = BitWriter::with_byte_stuffing();
        let mut pred = vec![0i32; self.components.len()];
        let mut restarts = 0u8;
        for mcu in 0..total {
            if mcu > 0 && mcu % interval == 0 {
                bw.align_with_ones();
                bw.write_marker(0xD0 + (restarts & 7));
                restarts = restarts.wrapping_add(1);
                pred.iter_mut().for_each(|p| *p = 0);
            }
            let (mx, my) = (mcu % mcus_x, mcu / mcus_x);
            for (c, &(_, h, v)) in self.components.iter().enumerate() {
                let (h, v) = if single {
                    (1, 1)
                } else {
                    (usize::from(h), usize::from(v))
                };
                let blocks_w = mcus_x * h;
                for by in 0..v {
                    for bx in 0..h {
                        let value = self.dc[c][(my * v + by) * blocks_w + mx * h + bx];
                        write_dc_diff(&mut bw, value - pred[c]);
                        pred[c] = value;
                        bw.write_bits(0, 1); // EOB
                    }
                }
            }
        }
        bw.align_with_ones();
        bw.finish()
    }
}

fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

/// 4 位类别码 + 附加位
fn write_dc_diff(bw: &mut BitWriter, diff: i32) {
    let category = 32 - diff.unsigned_abs().leading_zeros();
    bw.write_bits(category, 4);
    if category > 0 {
        let extra = if diff > 0 {
            diff
        } else {
            diff + (1 << category) - 1
        };
        bw.write_bits(extra as u32, category);
    }
}

// ============================================================================
// 自检
// ============================================================================

#[test]
fn test_mpeg2_builder_emits_start_codes() {
    let mut builder = Mpeg2StreamBuilder::new(32, 16);
    let stream = builder.sequence().gop().frames("IP", 7).sequence_end().bytes();
    assert_eq!(&stream[..4], &[0, 0, 1, 0xB3]);
    assert_eq!(&stream[stream.len() - 4..], &[0, 0, 1, 0xB7]);
    let pictures = stream
        .windows(4)
        .filter(|w| w == &[0, 0, 1, 0x00])
        .count();
    assert_eq!(pictures, 2);
}

#[test]
fn test_jpeg_builder_restart_markers() {
    let image = JpegImageBuilder::gray(32, 8, vec![1, 2, 3, 4]).restart_interval(1);
    let data = image.encode();
    assert_eq!(&data[..2], &[0xFF, 0xD8]);
    assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);
    let rst: Vec<u8> = data
        .windows(2)
        .filter(|w| w[0] == 0xFF && (0xD0..=0xD7).contains(&w[1]))
        .map(|w| w[1])
        .collect();
    assert_eq!(rst, vec![0xD0, 0xD1, 0xD2]);
}
