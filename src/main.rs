use anyhow::{Context, Result};
use chrono::DateTime;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;
use url::Url;

use timerange_analyzer::{
    parse_time_range_request, upstream_url, AnalyzerConfig, Extent, RequestOptions, TimeRangeQuery,
};

const CONFIG_FILE: &str = "analyzer.json";

/// 优先使用JSON配置，失败时使用默认配置
fn load_config() -> AnalyzerConfig {
    match AnalyzerConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => {
            println!("✅ 成功从JSON配置文件加载配置: {}", CONFIG_FILE);
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({}), 使用默认配置", e);
            AnalyzerConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("--- ClickHouse 时间范围查询分析器 ---");
    let config = load_config();
    println!("\n[配置信息]:");
    println!("  上游地址: {}", config.upstream_url);
    println!("  查询参数: {}", config.query_param);
    println!("  回填容忍: {}s", config.backfill_tolerance_secs);
    println!("\n输入 SQL 进行分析；\\i <start> <end> 用新的时间范围生成上游请求；\\q 退出\n");

    let mut editor = DefaultEditor::new().context("无法初始化行编辑器")?;
    let mut last: Option<(TimeRangeQuery, RequestOptions)> = None;

    loop {
        let line = match editor.readline("sql> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("读取输入失败"),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line).ok();

        if line == "\\q" {
            break;
        }
        if let Some(args) = line.strip_prefix("\\i") {
            match &last {
                Some((trq, ro)) => interpolate(args, trq, ro, &config),
                None => println!("✗ 还没有可用的模板，请先输入一条 SQL"),
            }
            continue;
        }
        if let Some(analyzed) = analyze(line, &config)? {
            last = Some(analyzed);
        }
    }
    Ok(())
}

fn analyze(statement: &str, config: &AnalyzerConfig) -> Result<Option<(TimeRangeQuery, RequestOptions)>> {
    let url = Url::parse_with_params(&config.upstream_url, &[(config.query_param.as_str(), statement)])
        .with_context(|| format!("无效的上游地址: {}", config.upstream_url))?;

    match parse_time_range_request(&url, config) {
        Ok((trq, ro, _)) => {
            println!("✓ 时间范围查询");
            println!("  步长: {:?}", trq.step);
            println!("  范围: {} .. {}", trq.extent.start, trq.extent.end);
            println!("  时间字段: {} (基础字段 {})", trq.timestamp_field.name, ro.base_timestamp_field_name);
            let tags: Vec<_> = trq.tag_fields.iter().map(|f| f.name.as_str()).collect();
            println!("  标签字段: {}", tags.join(", "));
            println!("  输出格式: {}", ro.output_format.name());
            println!("  模板: {}", trq.statement);
            Ok(Some((trq, ro)))
        }
        Err(e) => {
            println!("✗ {}", e);
            if e.can_object_cache() {
                println!("  ⚠️ 可以作为普通对象缓存");
            }
            Ok(None)
        }
    }
}

fn interpolate(args: &str, trq: &TimeRangeQuery, ro: &RequestOptions, config: &AnalyzerConfig) {
    let bounds: Vec<_> = args
        .split_whitespace()
        .filter_map(|s| s.parse::<i64>().ok())
        .filter_map(|secs| DateTime::from_timestamp(secs, 0))
        .collect();
    let [start, end] = bounds[..] else {
        println!("✗ 用法: \\i <start> <end>（epoch 秒）");
        return;
    };
    match upstream_url(trq, ro, &config.query_param, &Extent::new(start, end)) {
        Some(url) => println!("{}", url),
        None => println!("✗ 该查询没有模板地址"),
    }
}
