use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use piiscrub_core::{reidentify, Action, BatchOptions, Config, EntityFilter, Outcome, Scrubber, ScrubOptions};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "piiscrub", version, about = "敏感实体脱敏 / 去标识 / 还原")]
struct Cli {
    /// 配置文件（TOML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 数据目录（映射表、忽略名单、自定义人名），覆盖配置与 DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 检测规则文件（TOML），覆盖配置与 RULES_PATH
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// 输入输出参数
#[derive(Args, Debug)]
struct IoArgs {
    /// 输入文件；缺省读取标准输入
    #[arg(long)]
    input: Option<PathBuf>,

    /// 输出文件；缺省写到标准输出
    #[arg(long)]
    output: Option<PathBuf>,

    /// 以 JSON 输出 {"result", "entities_found"}
    #[arg(long)]
    json: bool,
}

/// 检测参数
#[derive(Args, Debug)]
struct DetectArgs {
    /// 置信度阈值（0–1）
    #[arg(long)]
    threshold: Option<f32>,

    /// 启用的实体类型，逗号分隔；不传表示全部
    #[arg(long, value_delimiter = ',')]
    entities: Option<Vec<String>>,

    /// 语言代码
    #[arg(long)]
    language: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 不可逆脱敏：实体替换为 <TYPE>
    Anonymize {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// 可逆去标识：实体替换为编号占位符
    Deidentify {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// 按映射表还原占位符
    Reidentify {
        #[command(flatten)]
        io: IoArgs,
    },
    /// 清空映射表
    ClearMappings,
    /// 批处理目录（仅第一层文件）
    Batch {
        /// 动作：anonymize / deidentify / reidentify
        #[arg(long, value_parser = ["anonymize", "deidentify", "reidentify"])]
        action: String,

        /// 输入目录
        #[arg(long)]
        input: PathBuf,

        /// 输出目录
        #[arg(long)]
        output: PathBuf,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 最大处理文件大小（字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        #[command(flatten)]
        detect: DetectArgs,
    },
    /// 健康检查
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load(cli.config.as_deref()).context("load config")?;
    if let Some(dir) = cli.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(rules) = cli.rules {
        cfg.rules_path = rules;
    }
    // 初始化日志（RUST_LOG 优先，其次配置中的 log_level）
    init_tracing(&cfg.log_level);

    match cli.command {
        Commands::Health => {
            let status = serde_json::json!({
                "status": "healthy",
                "service": "piiscrub",
                "version": env!("CARGO_PKG_VERSION"),
            });
            println!("{status}");
        }
        Commands::ClearMappings => {
            Scrubber::vault_from_config(&cfg).clear().context("clear mappings")?;
            info!(data_dir = %cfg.data_dir.display(), "mappings cleared");
        }
        Commands::Anonymize { io, detect } => run_single(&cfg, Action::Anonymize, &io, &detect)?,
        Commands::Deidentify { io, detect } => run_single(&cfg, Action::Deidentify, &io, &detect)?,
        Commands::Reidentify { io } => {
            // 还原只读映射表，不需要规则文件
            let vault = Scrubber::vault_from_config(&cfg);
            let text = read_input(io.input.as_deref())?;
            let outcome = reidentify(&text, &vault);
            write_output(io.output.as_deref(), &outcome, io.json)?;
        }
        Commands::Batch { action, input, output, threads, max_file_size, detect } => {
            let action: Action = action.parse().context("parse action")?;
            info!(?input, ?output, action = action.as_str(), "starting batch");
            let scrubber = Scrubber::from_config(&cfg).context("initialize scrubber")?;
            let opts = scrub_options(&cfg, &detect);
            let batch = BatchOptions { max_file_size, threads: parse_threads(&threads) };
            let stats = scrubber.process_dir(&input, &output, action, &opts, &batch).context("batch processing failed")?;
            info!(
                files_processed = stats.files_processed,
                files_skipped = stats.files_skipped,
                files_failed = stats.files_failed,
                entities_found = stats.entities_found,
                "batch finished"
            );
        }
    }

    Ok(())
}

/// 处理单个输入
fn run_single(cfg: &Config, action: Action, io: &IoArgs, detect: &DetectArgs) -> Result<()> {
    let scrubber = Scrubber::from_config(cfg).context("initialize scrubber")?;
    let text = read_input(io.input.as_deref())?;
    let opts = scrub_options(cfg, detect);
    let outcome = scrubber.process(&text, action, &opts).with_context(|| format!("{} failed", action.as_str()))?;
    write_output(io.output.as_deref(), &outcome, io.json)
}

/// 命令行参数覆盖配置中的检测选项
fn scrub_options(cfg: &Config, detect: &DetectArgs) -> ScrubOptions {
    let mut opts = cfg.scrub_options();
    if let Some(t) = detect.threshold {
        opts.threshold = t;
    }
    if let Some(list) = &detect.entities {
        opts.enabled = EntityFilter::from_list(list.iter().map(|s| s.trim()).filter(|s| !s.is_empty()));
    }
    if let Some(lang) = &detect.language {
        opts.language = lang.clone();
    }
    opts
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("read input {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, outcome: &Outcome, json: bool) -> Result<()> {
    let mut out: Box<dyn Write> = match path {
        Some(p) => Box::new(BufWriter::new(File::create(p).with_context(|| format!("create output {}", p.display()))?)),
        None => Box::new(std::io::stdout().lock()),
    };
    if json {
        serde_json::to_writer(&mut out, outcome).context("write json output")?;
        writeln!(out)?;
    } else {
        out.write_all(outcome.result.as_bytes()).context("write output")?;
    }
    out.flush().context("flush output")?;
    Ok(())
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到 stderr，stdout 只留给处理结果
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") { return None; }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
