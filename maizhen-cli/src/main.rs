//! 脉诊命令行工具

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use maizhen_client::{ApiClient, CredentialStore, MemoryCredentials, RecordApi};
use maizhen_config::{init_logging, ConfigManager, MaizhenConfig};
use maizhen_core::{ImageUpload, Medicine, PulseGrid};
use maizhen_prescription::raster::guess_mime_type;
use maizhen_prescription::{
    medicines_to_text, text_to_medicines, AnnotationSource, PrescriptionAnnotator,
};
use maizhen_workbench::{LocalStore, Workbench};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "maizhen")]
#[command(about = "脉诊病历录入命令行工具")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 访问令牌，不指定时使用本地会话
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 处方文本转为药物列表JSON
    Parse { file: PathBuf },

    /// 药物列表JSON转为处方文本
    Format { file: PathBuf },

    /// 查看病历摘要
    Record { id: i64 },

    /// 按九宫格JSON搜索相似病历
    Similar { grid: PathBuf },

    /// 识别处方图片中的患者信息
    Recognize { image: PathBuf },

    /// 本地草稿
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
}

#[derive(Subcommand, Debug)]
enum DraftAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging)?;

    if let Err(e) = run(args, config).await {
        error!("命令执行失败: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args, config: MaizhenConfig) -> Result<()> {
    let store = LocalStore::open(&config.storage.data_dir)
        .with_context(|| format!("无法打开数据目录 {}", config.storage.data_dir.display()))?;

    let credentials: Arc<dyn CredentialStore> = match args.token {
        Some(token) => Arc::new(MemoryCredentials::new(Some(token))),
        None => Arc::new(store.clone()),
    };
    let client = Arc::new(ApiClient::new(config.api.base_url.clone(), credentials));

    match args.command {
        Command::Parse { file } => {
            let text = read_text(&file)?;
            let medicines = text_to_medicines(&text);
            println!("{}", serde_json::to_string_pretty(&medicines)?);
        }
        Command::Format { file } => {
            let medicines: Vec<Medicine> = serde_json::from_str(&read_text(&file)?)
                .with_context(|| format!("{} 不是有效的药物列表", file.display()))?;
            println!("{}", medicines_to_text(&medicines));
        }
        Command::Record { id } => {
            let debounce = Duration::from_millis(config.pulse.debounce_ms);
            let mut workbench = Workbench::new(client.clone(), client, store, debounce);
            workbench.load_record(id).await?;
            print_record(&workbench);
        }
        Command::Similar { grid } => {
            let grid: PulseGrid = serde_json::from_str(&read_text(&grid)?)
                .context("九宫格JSON格式错误")?;
            if grid.is_empty() {
                bail!("九宫格为空");
            }
            let records = client.search_similar(&grid).await?;
            info!("Found {} similar records", records.len());
            for record in records {
                println!(
                    "#{} {} 相似度: {}% {} 主诉: {}",
                    record.record_id,
                    record.patient_name,
                    record.score,
                    record.visit_date,
                    if record.complaint.is_empty() { "无" } else { &record.complaint },
                );
            }
        }
        Command::Recognize { image } => {
            let upload = read_image(&image)?;
            let mut annotator = PrescriptionAnnotator::new(client, config.annotator.clone());
            annotator.select_file(upload)?;
            annotator.recognize().await?;
            if annotator.is_mock() {
                println!("注意: 识别服务返回的是模拟结果");
            }
            if let Some(err) = annotator.api_error() {
                println!("识别错误: {}", err);
            }
            println!("{}", serde_json::to_string_pretty(&annotator.patient_info())?);
        }
        Command::Draft { action } => match action {
            DraftAction::Show => match store.load_draft() {
                Some(draft) => println!("{}", serde_json::to_string_pretty(&draft)?),
                None => println!("没有本地草稿"),
            },
            DraftAction::Clear => {
                store.clear_draft()?;
                println!("本地草稿已清除");
            }
        },
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("无法读取 {}", path.display()))
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
    let mime_type = guess_mime_type(path).unwrap_or("application/octet-stream");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "prescription".to_string());
    Ok(ImageUpload {
        file_name,
        mime_type: mime_type.to_string(),
        bytes,
    })
}

fn print_record(workbench: &Workbench) {
    let patient = workbench.patient_info();
    let record = workbench.medical_record();
    println!("患者: {} {} {}", patient.name, patient.gender, patient.age);
    println!("主诉: {}", record.complaint);

    let prescription = medicines_to_text(workbench.medicines().medicines());
    if !prescription.is_empty() {
        println!("处方:\n{}", prescription);
    }

    let grid = workbench.pulse().grid();
    for (position, value) in grid.filled_cells() {
        println!("  {}{}: {}", position.hand.label(), position.label(), value);
    }
    if !grid.overall_description().is_empty() {
        println!("整体脉象: {}", grid.overall_description());
    }
    if !record.note.is_empty() {
        println!("备注: {}", record.note);
    }

    let permissions = workbench.permissions();
    if !permissions.can_edit {
        println!(
            "(只读，所有者: {})",
            permissions.owner_name.as_deref().unwrap_or("未知")
        );
    }
}
