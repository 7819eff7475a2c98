//! 变量管理命令行工具：查看 / 搜索变量表、导入变量、切换变量表启用状态。

use clap::{ArgAction, Parser, Subcommand};
use dms_config::AppConfig;
use dms_import::{OpcUaBrowseSource, TiaTagTableSource};
use dms_storage::{EntityStore, PgEntityStore, apply_schema};
use dms_telemetry::{init_tracing, metrics};
use dms_workset::{SessionOptions, TracingNotifier, VariableTableSession};
use domain::{OpcUaUpdateMode, Variable};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dms-cli", version, about = "Variable table maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 列出变量表中的变量
    List {
        table: i64,
        /// 忽略大小写的搜索词
        #[arg(long)]
        search: Option<String>,
    },
    /// 导入 TIA Portal 导出的 PLC 变量表（xlsx）
    ImportTia { table: i64, path: PathBuf },
    /// 导入 OPC UA 浏览结果（JSON）
    ImportOpcua {
        table: i64,
        path: PathBuf,
        #[arg(long, default_value = "subscription")]
        update_mode: OpcUaUpdateMode,
    },
    /// 启用 / 停用变量表
    SetActive {
        table: i64,
        #[arg(action = ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        active: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    init_tracing();

    let store = PgEntityStore::connect(config.require_database_url()?, config.db_max_connections)
        .await?;
    if config.apply_schema {
        apply_schema(&store.pool).await?;
    }
    let store: Arc<dyn EntityStore> = Arc::new(store);
    let mut session = VariableTableSession::new(
        store,
        Arc::new(TracingNotifier),
        SessionOptions {
            operator: config.operator.clone(),
            default_poll_level: config.default_poll_level,
        },
    );

    match cli.command {
        Command::List { table, search } => {
            session.load(table).await?;
            if let Some(search) = search {
                session.set_search_text(&search);
            }
            let rows = session.filtered();
            for variable in &rows {
                print_variable(variable);
            }
            println!("{} of {} variables", rows.len(), session.records().len());
        }
        Command::ImportTia { table, path } => {
            session.load(table).await?;
            let imported = session.import_from(&TiaTagTableSource::new(path)).await?;
            println!("imported {imported} variables");
        }
        Command::ImportOpcua {
            table,
            path,
            update_mode,
        } => {
            session.load(table).await?;
            let source = OpcUaBrowseSource::from_dump(path).with_update_mode(update_mode);
            let imported = session.import_from(&source).await?;
            println!("imported {imported} variables");
        }
        Command::SetActive { table, active } => {
            session.load(table).await?;
            if !session.set_active(active).await? {
                return Err(format!("variable table {table} was not updated").into());
            }
            println!("variable table {table} active={active}");
        }
    }

    let snapshot = metrics().snapshot();
    info!(
        target: "dms.cli",
        session_id = session.session_id(),
        loads = snapshot.loads,
        imports = snapshot.imports,
        records_imported = snapshot.records_imported,
        errors_reported = snapshot.errors_reported,
        "done"
    );
    Ok(())
}

fn print_variable(variable: &Variable) {
    println!(
        "{:>6}  {:<32}  {:<6}  {:<28}  {:<8}  {:<5}  {}",
        variable.id,
        variable.name,
        variable.protocol.as_str(),
        variable.protocol_address().unwrap_or("-"),
        variable.data_type,
        variable.poll_level.as_str(),
        variable.display_value
    );
}
