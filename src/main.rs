// ==========================================
// 保护定值同步系统 - 命令行入口
// ==========================================
// 流程: 读取配置 → 加载定值（带重试）→ 构建索引 → 逐台下发 → 写出报表
// 模型: 离线快照（设备表 + 类型库表），写入记入日志 CSV
// ==========================================

use anyhow::{Context, Result};
use clap::Parser;
use protection_settings_sync::config::{default_db_path, ConfigManager, RunConfig};
use protection_settings_sync::db::{init_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use protection_settings_sync::engine::{NetworkModel, SnapshotModel, UpdateOrchestrator};
use protection_settings_sync::index::{AltNameTable, SettingIndex, TypeResolver};
use protection_settings_sync::report::write_results_csv;
use protection_settings_sync::rules::{CurveMapping, RuleStore};
use protection_settings_sync::source::{RetryingSource, SettingsQuery, SettingsSource, SqliteSettingsSource};
use protection_settings_sync::{logging, Region, APP_NAME, VERSION};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 将定值库中的保护定值匹配并下发到网络模型设备
#[derive(Parser, Debug)]
#[command(name = "protection-settings-sync", version, about)]
struct Cli {
    /// 定值库（SQLite）路径
    #[arg(long, env = "PROTECTION_SYNC_DB_PATH")]
    db: Option<PathBuf>,

    /// 设备快照文件（handle, name, type_pattern, substation）
    #[arg(long)]
    devices: PathBuf,

    /// 类型库快照文件（name, type_pattern, attributes）
    #[arg(long)]
    types: PathBuf,

    /// 覆盖配置中的区域（Energex / Ergon）
    #[arg(long)]
    region: Option<Region>,

    /// 仅处理这些设备标识键（逗号分隔）
    #[arg(long, value_delimiter = ',')]
    plants: Vec<String>,

    /// 结果报表输出路径
    #[arg(long, default_value = "update_results.csv")]
    output: PathBuf,

    /// 写入日志输出路径
    #[arg(long)]
    journal: Option<PathBuf>,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    info!("==================================================");
    info!("{} v{}", APP_NAME, VERSION);
    info!("==================================================");

    // ===== 配置 =====
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let db_path_str = db_path.to_string_lossy().to_string();
    info!(db = %db_path_str, "使用定值库");

    let conn = open_sqlite_connection(&db_path_str).with_context(|| format!("无法打开定值库 {}", db_path_str))?;
    init_schema(&conn).context("定值库建表失败")?;
    if let Some(v) = read_schema_version(&conn)? {
        if v != CURRENT_SCHEMA_VERSION {
            warn!(found = v, expected = CURRENT_SCHEMA_VERSION, "定值库 schema_version 与程序不一致");
        }
    }
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())?;
    let mut run_config = RunConfig::load(&config)?;
    if let Some(region) = cli.region {
        run_config.region = region;
    }
    info!(region = %run_config.region, config = %config.get_config_snapshot()?, "运行配置已加载");

    // ===== 定值 =====
    let mut query = SettingsQuery::region(run_config.region);
    if !cli.plants.is_empty() {
        query = query.with_plant_scope(cli.plants.clone());
    }
    let source = RetryingSource::new(SqliteSettingsSource::from_connection(conn), run_config.retry_policy());
    let records = source.fetch(&query).await.context("定值读取失败")?;

    // ===== 模型 + 索引 =====
    let mut model = SnapshotModel::load(&cli.devices, &cli.types, run_config.region)
        .context("模型快照加载失败")?;

    let index = SettingIndex::build_with_options(records, run_config.region, &run_config.index_options())?;
    let types = TypeResolver::build_with_suffixes(model.type_library()?, &run_config.type_suffixes)?;
    let alt_names = AltNameTable::load(&run_config.alt_name_file)?;
    let curves = CurveMapping::load(&run_config.curve_mapping_file)?;
    let mut rules = RuleStore::load(&run_config.type_mapping_file, &run_config.rules_dir, curves)?;

    // ===== 下发 =====
    let mut devices = model.devices()?;
    let orchestrator = UpdateOrchestrator::new(run_config.region, run_config.orchestrator_options());
    let report = orchestrator.run(&mut devices, &index, &types, &alt_names, &mut rules, &mut model);

    write_results_csv(&cli.output, &report.results)?;
    if let Some(journal) = &cli.journal {
        model.write_journal_csv(journal)?;
    }

    info!(
        run_id = %report.run_id,
        updated = report.summary.updated,
        not_found = report.summary.not_found(),
        failed = report.summary.failed,
        rule_file_hits = report.cache_stats.rule_file_hits,
        rule_file_misses = report.cache_stats.rule_file_misses,
        output = %cli.output.display(),
        "运行结束"
    );
    Ok(())
}
