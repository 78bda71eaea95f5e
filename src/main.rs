// ==========================================
// 定额匹配系统 - 命令行入口
// ==========================================
// 用法: quota-match [--db PATH] <command>
// 数据库路径: --db > QUOTA_MATCH_DB_PATH > 用户数据目录
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use quota_match::app::{get_default_db_path, AppState};
use quota_match::importer::CsvImporter;
use quota_match::logging;

#[derive(Parser)]
#[command(name = "quota-match")]
#[command(version, about = "工程量清单 - 企业定额智能匹配与学习引擎")]
struct Cli {
    /// SQLite 数据库文件路径
    #[arg(long, global = true, env = "QUOTA_MATCH_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 创建数据库表结构
    Init,

    /// 从 CSV 导入企业定额
    ImportQuotas {
        csv: PathBuf,
        /// 导入到指定定额版本
        #[arg(long)]
        version: Option<i64>,
    },

    /// 从 CSV 导入工程量清单
    ImportItems {
        csv: PathBuf,
        #[arg(long)]
        user: Option<i64>,
    },

    /// 批量自动匹配并输出运行报告
    Match {
        /// 只使用该版本的定额
        version_id: Option<i64>,
    },

    /// 执行一次学习分析（关键词权重 + 同义词）
    Learn,

    /// 为已有匹配结果补录学习记录
    BootstrapLearning,

    /// 按配置周期运行学习任务，Ctrl-C 退出
    Schedule,

    /// 查看或修改配置
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// 输出当前生效的配置
    Show,
    /// 写入一个配置项
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db_path = cli
        .db
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(get_default_db_path);

    let state = AppState::new(db_path).await.map_err(|e| anyhow!(e))?;
    let result = run(&state, cli.command).await;
    state.shutdown();
    result
}

async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            println!("数据库已初始化: {}", state.db_path);
        }
        Commands::ImportQuotas { csv, version } => {
            let importer = CsvImporter::new(state.conn.clone());
            let summary = importer
                .import_quotas(&csv, version)
                .with_context(|| format!("导入定额失败: {}", csv.display()))?;
            print_json(&summary)?;
        }
        Commands::ImportItems { csv, user } => {
            let importer = CsvImporter::new(state.conn.clone());
            let summary = importer
                .import_items(&csv, user)
                .with_context(|| format!("导入清单失败: {}", csv.display()))?;
            print_json(&summary)?;
        }
        Commands::Match { version_id } => {
            let api = Arc::clone(&state.quota_match_api);
            let report = tokio::task::spawn_blocking(move || api.run_batch_match(version_id))
                .await
                .context("批量匹配任务异常退出")??;
            print_json(&report)?;
        }
        Commands::Learn => {
            let summary = state
                .learning_scheduler()
                .run_once()
                .await
                .context("学习分析失败")?;
            print_json(&summary)?;
        }
        Commands::BootstrapLearning => {
            let api = Arc::clone(&state.quota_match_api);
            let summary = tokio::task::spawn_blocking(move || api.collect_all_match_data())
                .await
                .context("学习数据回灌任务异常退出")??;
            print_json(&summary)?;
        }
        Commands::Schedule => {
            let scheduler = state.learning_scheduler();
            tracing::info!("学习定时任务启动: period={:?}", scheduler.period());
            let passes = scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("监听 Ctrl-C 失败: {}", e);
                    }
                })
                .await;
            println!("学习定时任务已停止，共执行 {} 轮", passes);
        }
        Commands::Config(ConfigCommands::Show) => {
            print_json(&state.config)?;
        }
        Commands::Config(ConfigCommands::Set { key, value }) => {
            state
                .config_manager
                .set_global_config_value(&key, &value)
                .map_err(|e| anyhow!("写入配置失败: {}", e))?;
            println!("{} = {}（下次启动生效）", key, value);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
