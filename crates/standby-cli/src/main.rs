//! warm-standby 시세 클라이언트 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 기본 설정 파일로 실행
//! standby
//!
//! # 설정 파일 지정, 디버그 로그
//! standby --config config/prod.toml --log-level debug run
//!
//! # 설정 검증만 수행
//! standby check-config
//! ```

use clap::{Parser, Subcommand};
use standby_core::{init_logging, AppConfig, LogConfig};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "standby")]
#[command(about = "Warm-standby streaming feed client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 설정 파일 경로
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 (설정 파일 값보다 우선)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 채널을 열고 장애 조치 루프 실행 (기본)
    Run,

    /// 설정 파일을 로드하고 검증만 수행
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일은 없어도 됨
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let mut log_config = LogConfig::from(&config.logging);
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::run(config).await,
        Commands::CheckConfig => {
            commands::check_config::print_summary(&config, &cli.config);
            Ok(())
        }
    }
}
