//! swdec - MPEG-2 / JPEG 软件解码命令行工具
//!
//! 读取 MPEG-2 基本流或 JPEG / MJPEG 文件, 按块送入解码器,
//! 打印每一帧的信息并可把原始像素平面写入输出文件.

mod options;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use swdec_codec::{Decoder, DecoderParams, MediaData, VideoFrame};
use swdec_core::SwdecError;

use options::resolve_settings;

#[derive(Parser, Debug)]
#[command(name = "swdec", version, about = "纯 Rust MPEG-2 / JPEG 软件解码工具")]
pub(crate) struct Cli {
    /// 输入码流文件
    input: Option<PathBuf>,

    /// 编解码器 (mpeg2video / mjpeg), 默认按文件头判断
    #[arg(long)]
    codec: Option<String>,

    /// 工作线程数 (1..=8)
    #[arg(long)]
    threads: Option<usize>,

    /// 跳帧等级: 0 不跳过, 1 跳过 B, 2 跳过 P 和 B, 3 全部跳过
    #[arg(long = "skip-level")]
    skip_level: Option<i32>,

    /// JPEG 缩放分母 (1, 2, 4, 8)
    #[arg(long)]
    scale: Option<u32>,

    /// 输出像素格式 (如 yuv420p, nv12, rgb24, gray8)
    #[arg(long)]
    format: Option<String>,

    /// JSON 配置文件, 命令行参数优先
    #[arg(long)]
    config: Option<PathBuf>,

    /// 原始像素输出文件
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 日志目录
    #[arg(long = "log-dir")]
    log_dir: Option<String>,

    /// 每次送入解码器的字节数
    #[arg(long = "chunk-size", default_value_t = 64 * 1024)]
    chunk_size: usize,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 控制台日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 显示版本和已注册的解码器
    #[arg(long)]
    build_info: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("错误: {err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.build_info {
        print_build_info();
        return Ok(());
    }
    let Some(input) = cli.input.clone() else {
        bail!("缺少输入文件, 使用 --help 查看用法");
    };
    if let Some(output) = &cli.output {
        if !cli.overwrite && output.exists() {
            bail!("输出文件已存在 '{}', 使用 -y 覆盖", output.display());
        }
    }

    let data = std::fs::read(&input)
        .with_context(|| format!("读取输入文件失败: {}", input.display()))?;
    let settings = resolve_settings(&cli, &data)?;
    swdec::logging::init(settings.logging)?;

    eprintln!(
        "swdec 版本 {} -- 纯 Rust MPEG-2 / JPEG 软件解码器",
        swdec::version()
    );
    eprintln!("输入: {} ({} 字节)", input.display(), data.len());
    eprintln!(
        "解码器: {}, 线程: {}, 跳帧: {:?}",
        settings.params.codec_id,
        settings.params.thread_count(),
        settings.params.skip_level
    );

    let output = cli.output.clone();
    let chunk_size = cli.chunk_size.max(1);
    let stats = tokio::task::spawn_blocking(move || {
        decode_file(&data, &settings.params, chunk_size, output.as_deref())
    })
    .await
    .context("解码任务异常退出")??;

    eprintln!(
        "完成: {} 帧, 其中损坏 {} 帧, 写出 {} 字节",
        stats.frames, stats.corrupted, stats.bytes_written
    );
    info!(
        "解码完成: frames={}, corrupted={}, bytes={}",
        stats.frames, stats.corrupted, stats.bytes_written
    );
    Ok(())
}

#[derive(Debug, Default)]
struct DecodeStats {
    frames: u64,
    corrupted: u64,
    bytes_written: u64,
}

fn decode_file(
    data: &[u8],
    params: &DecoderParams,
    chunk_size: usize,
    output: Option<&Path>,
) -> Result<DecodeStats> {
    let registry = swdec::default_codec_registry();
    let mut decoder = registry.create_decoder(params.codec_id)?;
    decoder.open(params)?;

    let mut sink = match output {
        Some(path) => Some(BufWriter::new(File::create(path).with_context(|| {
            format!("创建输出文件失败: {}", path.display())
        })?)),
        None => None,
    };

    let mut stats = DecodeStats::default();
    for chunk in data.chunks(chunk_size) {
        feed(decoder.as_mut(), &MediaData::from_data(chunk.to_vec()))?;
        drain(decoder.as_mut(), &mut stats, sink.as_mut())?;
    }
    feed(decoder.as_mut(), &MediaData::end_of_stream())?;
    drain(decoder.as_mut(), &mut stats, sink.as_mut())?;

    if let Some(sink) = sink.as_mut() {
        sink.flush().context("写出输出文件失败")?;
    }
    Ok(stats)
}

fn feed(decoder: &mut dyn Decoder, data: &MediaData) -> Result<()> {
    match decoder.send_data(data) {
        Ok(()) => Ok(()),
        Err(err) if err.is_recoverable() => {
            warn!("送入数据时检测到可恢复错误: {err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// 取出当前可用的所有帧
fn drain(
    decoder: &mut dyn Decoder,
    stats: &mut DecodeStats,
    mut sink: Option<&mut BufWriter<File>>,
) -> Result<()> {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => {
                print_frame(stats.frames, &frame);
                stats.frames += 1;
                if frame.corrupted {
                    stats.corrupted += 1;
                }
                if let Some(sink) = sink.as_deref_mut() {
                    stats.bytes_written += write_planes(sink, &frame)?;
                }
            }
            Err(SwdecError::NeedMoreData) | Err(SwdecError::Eof) => return Ok(()),
            Err(err) if err.is_recoverable() => warn!("解码错误, 继续: {err}"),
            Err(err) => return Err(err.into()),
        }
    }
}

fn print_frame(index: u64, frame: &VideoFrame) {
    println!(
        "帧 {index:5}: {:?} {}x{} {} t={:.3}s{}{}",
        frame.picture_type,
        frame.width,
        frame.height,
        frame.pixel_format,
        frame.time,
        if frame.is_original_time { "" } else { " (推算)" },
        if frame.corrupted { " [损坏]" } else { "" }
    );
}

fn write_planes(sink: &mut impl Write, frame: &VideoFrame) -> Result<u64> {
    let mut written = 0u64;
    for plane in &frame.data {
        sink.write_all(plane).context("写出像素数据失败")?;
        written += plane.len() as u64;
    }
    Ok(written)
}

fn print_build_info() {
    println!("swdec 版本 {}", swdec::version());
    println!("  构建目标: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
    println!();
    let registry = swdec::default_codec_registry();
    let decoders = registry.list_decoders();
    println!("已注册解码器 ({}):", decoders.len());
    for (id, name) in &decoders {
        println!("  {name} ({id})");
    }
}
