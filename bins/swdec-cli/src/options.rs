//! 命令行参数与配置文件合并

use anyhow::{Context, Result};
use swdec::config::DecoderConfig;
use swdec::logging::LoggingConfig;
use swdec_codec::DecoderParams;

use crate::Cli;

/// 合并后的运行设置
#[derive(Debug)]
pub(crate) struct Settings {
    pub params: DecoderParams,
    pub logging: LoggingConfig,
}

/// 配置文件为基础, 命令行参数覆盖; 未指定编解码器时按文件头判断
pub(crate) fn resolve_settings(cli: &Cli, data: &[u8]) -> Result<Settings> {
    let mut config = match &cli.config {
        Some(path) => DecoderConfig::from_json_file(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
        None => DecoderConfig {
            codec: detect_codec(data).to_string(),
            ..DecoderConfig::default()
        },
    };
    if let Some(codec) = &cli.codec {
        config.codec = codec.clone();
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(level) = cli.skip_level {
        config.skip_level = level;
    }
    if let Some(scale) = cli.scale {
        config.jpeg_scale = scale;
    }
    if let Some(format) = &cli.format {
        config.output_format = Some(format.clone());
    }

    let mut logging = config.logging.clone().unwrap_or_default();
    if let Some(dir) = &cli.log_dir {
        logging.directory = dir.clone();
    }
    match cli.verbose {
        0 => {}
        1 => logging.console_level = "debug".into(),
        _ => logging.console_level = "trace".into(),
    }

    let params = config.to_params().context("解码参数无效")?;
    Ok(Settings { params, logging })
}

/// 以 SOI 开头的是 JPEG, 其余按 MPEG-2 基本流处理
fn detect_codec(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8]) {
        "mjpeg"
    } else {
        "mpeg2video"
    }
}
